//! Two concurrent evaluations of a SHARED cached field: one resolves, the other
//! waits on the processing marker. A third evaluation is a plain cache hit.
//!
//! Run with `RUST_LOG=fieldcache=debug cargo run --example field_cache`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fieldcache::{
    CACHE_DIRECTIVE_SDL, CacheDirective, Directive, DirectiveArgs, MemoryStore, QueryInfo,
    ResolveParams, resolver,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("{CACHE_DIRECTIVE_SDL}");

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let slow_reviews = resolver(move |params: ResolveParams| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(1500)).await;
            let review = json!({"product": params.parent["id"].clone(), "stars": 4});
            Ok(json!([review]))
        }
    });

    let directive = CacheDirective::new(Arc::new(MemoryStore::new()));
    let args = DirectiveArgs::new()
        .with("ttl", 60)
        .with("cacheKey", json!(["parent.id"]))
        .with("pingInterval", 200);
    let directives = [Directive::new(CacheDirective::NAME, args)];
    let reviews = directive.visit_field(&directives, slow_reviews);

    let (a, b) = tokio::join!(reviews(params()), reviews(params()));
    println!("first:  {}", a?);
    println!("second: {}", b?);

    let c = reviews(params()).await?;
    println!("third:  {c}");
    println!("resolver calls: {}", calls.load(Ordering::SeqCst));

    Ok(())
}

fn params() -> ResolveParams {
    let info = QueryInfo::new("Product", "reviews");
    ResolveParams::new(json!({"id": "12345"}), info)
}
