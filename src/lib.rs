//! # fieldcache
//!
//! Field-level caching for async GraphQL resolvers, driven by a `@cache`
//! schema directive.
//!
//! A field carrying `@cache(...)` gets its resolver wrapped: each evaluation
//! compiles a cache key from the parent value, arguments and variables, serves
//! the value from a shared key-value store when present, and otherwise calls the
//! original resolver and stores the result with a time-to-live. In `SHARED` mode
//! concurrent evaluations of the same key wait on a processing marker instead
//! of all calling the resolver.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fieldcache::{
//!     CacheDirective, Directive, DirectiveArgs, MemoryStore, QueryInfo, ResolveParams, resolver,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let directive = CacheDirective::new(Arc::new(MemoryStore::new()));
//!
//!     // reviews(first: Int): [Review] @cache(ttl: 300, cacheKey: ["parent.id", "args"])
//!     let reviews = directive.visit_field(
//!         &[Directive::new(
//!             "cache",
//!             DirectiveArgs::new()
//!                 .with("ttl", 300)
//!                 .with("cacheKey", json!(["parent.id", "args"])),
//!         )],
//!         resolver(|params: ResolveParams| async move {
//!             Ok(json!([{"product": params.parent["id"].clone(), "stars": 5}]))
//!         }),
//!     );
//!
//!     let info = QueryInfo::new("Product", "reviews");
//!     let params = ResolveParams::new(json!({"id": "12345"}), info).with_args(json!({"first": 10}));
//!     println!("{}", reviews(params).await?);
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod coordinator;
pub mod directive;
pub mod interceptor;
pub mod key;
pub mod store;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use context::{Extensions, QueryInfo, ResolveParams};
pub use coordinator::{CacheEntry, Coordinator, EntryState};
pub use directive::{CACHE_DIRECTIVE_SDL, CacheType, Directive, DirectiveArgs, FieldCacheConfig};
pub use interceptor::{
    CacheDirective, FieldError, FieldResolver, FieldResult, IntoResolver, ResolverFuture, resolver,
};
pub use key::{KEY_PREFIX, compile_key};
pub use store::{CacheStore, MemoryStore, StoreError};
