//! Field resolution interceptor — wraps a field's resolver with the `@cache`
//! directive's behavior.
//!
//! This module defines the resolver types the execution engine calls and the
//! [`CacheDirective`] that decorates them.
//!
//! ## Core types
//!
//! - [`FieldResolver`] — type-erased, cheaply-cloneable resolver function.
//! - [`IntoResolver`] / [`resolver`] — turn an async closure into a
//!   [`FieldResolver`].
//! - [`CacheDirective`] — the directive implementation: finds `@cache` on a
//!   field, and wraps the field's resolver so every evaluation goes through the
//!   key compiler and the [`Coordinator`].
//! - [`FieldError`] — failure of one field evaluation.
//!
//! ## Per-evaluation flow
//!
//! 1. Read [`FieldCacheConfig`] from the directive arguments.
//! 2. Compile the key from parent, arguments and variables.
//! 3. Hand the key and the original resolver to the coordinator.
//!
//! Fields without the directive keep their original resolver, untouched.

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::context::ResolveParams;
use crate::coordinator::Coordinator;
use crate::directive::{Directive, DirectiveArgs, FieldCacheConfig};
use crate::key::compile_key;
use crate::store::{CacheStore, StoreError};

/// Boxed error produced by user resolvers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that fail a field evaluation.
///
/// Each one surfaces in the GraphQL response exactly like an uncached resolver
/// failure.
#[derive(Debug, Error)]
pub enum FieldError {
    /// The resolver itself failed. Passed through unchanged.
    #[error(transparent)]
    Resolver(BoxError),

    /// The cache store could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A cache entry could not be serialized.
    #[error("failed to encode cache entry: {0}")]
    Encode(#[from] serde_json::Error),
}

impl FieldError {
    /// A resolver failure carrying only a message.
    pub fn resolver(message: impl Into<String>) -> Self {
        Self::Resolver(message.into().into())
    }

    /// A resolver failure wrapping another error.
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Resolver(Box::new(error))
    }
}

/// Result of one field evaluation.
pub type FieldResult = Result<Value, FieldError>;

/// Boxed future returned by a [`FieldResolver`].
pub type ResolverFuture = Pin<Box<dyn Future<Output = FieldResult> + Send>>;

/// A type-erased, reference-counted field resolver.
///
/// The [`Arc`] wrapper makes resolvers cheap to clone, so a wrapped resolver
/// can hold the original and still be shared by every evaluation of the field.
///
/// Construct one with [`resolver`] or by wrapping a closure directly:
///
/// ```rust
/// use std::sync::Arc;
/// use fieldcache::{FieldResolver, ResolveParams, ResolverFuture};
///
/// let name: FieldResolver = Arc::new(|params: ResolveParams| -> ResolverFuture {
///     Box::pin(async move { Ok(params.parent["name"].clone()) })
/// });
/// ```
pub type FieldResolver = Arc<dyn Fn(ResolveParams) -> ResolverFuture + Send + Sync + 'static>;

/// Conversion trait for async resolver functions.
///
/// Any `Fn(ResolveParams) -> impl Future<Output = FieldResult> + Send` that is
/// also `Send + Sync + 'static` implements this trait via the blanket impl
/// below.
pub trait IntoResolver: Send + Sync + 'static {
    /// Call the resolver, boxing the returned future.
    fn call(&self, params: ResolveParams) -> ResolverFuture;
}

impl<T, F> IntoResolver for T
where
    T: Fn(ResolveParams) -> F + Send + Sync + 'static,
    F: Future<Output = FieldResult> + Send + 'static,
{
    fn call(&self, params: ResolveParams) -> ResolverFuture {
        Box::pin((self)(params))
    }
}

/// Converts an async function into a [`FieldResolver`].
///
/// # Examples
///
/// ```rust
/// use fieldcache::{ResolveParams, resolver};
/// use serde_json::json;
///
/// let reviews = resolver(|params: ResolveParams| async move {
///     Ok(json!([{"product": params.parent["id"].clone(), "stars": 5}]))
/// });
/// ```
pub fn resolver<R>(r: R) -> FieldResolver
where
    R: IntoResolver,
{
    Arc::new(move |params: ResolveParams| r.call(params))
}

/// The `@cache` directive.
///
/// Holds the store shared by every cached field of a schema and the defaults
/// applied to arguments a field leaves out. Several directives with different
/// stores can coexist in one process.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use fieldcache::{
///     CacheDirective, Directive, DirectiveArgs, MemoryStore, ResolveParams, resolver,
/// };
/// use serde_json::json;
///
/// let directive = CacheDirective::new(Arc::new(MemoryStore::new()));
/// let field_directives = vec![Directive::new(
///     "cache",
///     DirectiveArgs::new().with("ttl", 300).with("cacheKey", json!(["parent.id"])),
/// )];
///
/// let product = resolver(|params: ResolveParams| async move {
///     Ok(json!({"id": params.parent["id"].clone()}))
/// });
/// let product = directive.visit_field(&field_directives, product);
/// ```
#[derive(Clone)]
pub struct CacheDirective {
    coordinator: Coordinator,
    defaults: Arc<FieldCacheConfig>,
}

impl CacheDirective {
    /// Directive name as written in SDL, without the `@`.
    pub const NAME: &'static str = "cache";

    /// Creates the directive over `store`, with the documented defaults.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            coordinator: Coordinator::new(store),
            defaults: Arc::new(FieldCacheConfig::default()),
        }
    }

    /// Replaces the defaults used for absent or malformed arguments.
    #[must_use]
    pub fn with_defaults(mut self, defaults: FieldCacheConfig) -> Self {
        self.defaults = Arc::new(defaults);
        self
    }

    /// The defaults applied to absent arguments.
    pub fn defaults(&self) -> &FieldCacheConfig {
        &self.defaults
    }

    /// Reads a field's configuration from its declared arguments.
    pub fn configuration(&self, args: &DirectiveArgs) -> FieldCacheConfig {
        FieldCacheConfig::from_args(args, &self.defaults)
    }

    /// Returns the arguments of the `@cache` directive among `directives`, if any.
    pub fn find(directives: &[Directive]) -> Option<&DirectiveArgs> {
        directives
            .iter()
            .find(|directive| directive.name == Self::NAME)
            .map(|directive| &directive.arguments)
    }

    /// Decorates a field's resolver according to its directives.
    ///
    /// # Arguments
    ///
    /// - `directives` — every directive applied to the field definition.
    /// - `original` — the field's resolver.
    ///
    /// # Returns
    ///
    /// `original` itself when the field has no `@cache` directive, otherwise
    /// the caching wrapper from [`wrap_resolver`](Self::wrap_resolver).
    pub fn visit_field(&self, directives: &[Directive], original: FieldResolver) -> FieldResolver {
        match Self::find(directives) {
            Some(args) => self.wrap_resolver(original, args.clone()),
            None => original,
        }
    }

    /// Wraps `original` so that each call is served from or written to the cache.
    ///
    /// The configuration is re-read from `args` on every call; `args` itself is
    /// never modified. Errors from `original` are returned unchanged.
    pub fn wrap_resolver(&self, original: FieldResolver, args: DirectiveArgs) -> FieldResolver {
        let directive = self.clone();
        let args = Arc::new(args);

        Arc::new(move |params: ResolveParams| -> ResolverFuture {
            let directive = directive.clone();
            let args = Arc::clone(&args);
            let original = Arc::clone(&original);

            Box::pin(async move {
                let config = directive.configuration(&args);
                let vars = params.variables();
                let key = compile_key(&config.cache_key, &params.parent, &params.args, vars);

                debug!(
                    key = %key,
                    field = %params.info.field_name,
                    parent_type = %params.info.parent_type,
                    cache_type = %config.cache_type,
                    "resolving cached field"
                );

                directive
                    .coordinator
                    .resolve(&key, &config, move || original(params))
                    .await
            })
        })
    }
}
