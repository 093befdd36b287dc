//! Cache coordination — read-through, write-through and in-flight
//! deduplication for a single cache key.
//!
//! All coordination goes through the shared [`CacheStore`]; there are no
//! in-process locks, so callers in different processes sharing one store
//! coordinate the same way as tasks inside one process.
//!
//! ## SHARED
//!
//! ```text
//!            ┌── COMPLETED ──▶ return stored value
//!  read ─────┼── ABSENT ─────▶ write {processing} (ttl = pollingTimeout)
//!            │                 call resolver
//!            │                 write {completed, value} (ttl = ttl)
//!            └── PROCESSING ─▶ sleep pingInterval, read again
//! ```
//!
//! A waiter gives up on a claim after `ceil(pollingTimeout / pingInterval)`
//! polls and stakes its own, which is what it would do anyway once the
//! marker's ttl lapses. Claims are staked with a plain read-then-write, so two
//! callers that both observe ABSENT may both resolve.
//!
//! ## SCOPED
//!
//! No marker. A miss calls the resolver and writes the raw value; concurrent
//! misses all resolve independently.
//!
//! A resolver error is returned unchanged. Nothing is written on failure; a
//! processing marker left behind expires after `pollingTimeout`.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::directive::{CacheType, FieldCacheConfig};
use crate::interceptor::{FieldError, FieldResult};
use crate::store::CacheStore;

/// Shape of a SHARED-mode entry in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CacheEntry {
    /// A caller is resolving the field right now.
    Processing,
    /// The resolved value.
    Completed { value: Value },
}

/// What a caller observes when it reads a key.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryState {
    Absent,
    Processing,
    Completed(Value),
}

impl EntryState {
    fn decode(raw: &str, cache_type: CacheType) -> serde_json::Result<Self> {
        let state = match cache_type {
            CacheType::Shared => match serde_json::from_str(raw)? {
                CacheEntry::Processing => Self::Processing,
                CacheEntry::Completed { value } => Self::Completed(value),
            },
            CacheType::Scoped => Self::Completed(serde_json::from_str(raw)?),
        };
        Ok(state)
    }
}

/// Drives the cache state machine for one key at a time against a shared store.
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn CacheStore>,
}

impl Coordinator {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Reads `key` and decodes it according to `cache_type`.
    ///
    /// Undecodable entries are reported as [`EntryState::Absent`] so the caller
    /// overwrites them with a fresh value.
    ///
    /// # Errors
    ///
    /// Returns [`FieldError::Store`] if the store read fails.
    pub async fn read(&self, key: &str, cache_type: CacheType) -> Result<EntryState, FieldError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(EntryState::Absent);
        };

        match EntryState::decode(&raw, cache_type) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(
                    key = %key,
                    cache_type = %cache_type,
                    error = %e,
                    "undecodable cache entry, treating as absent"
                );
                Ok(EntryState::Absent)
            }
        }
    }

    /// Returns the cached value for `key`, or produces it with `resolve`.
    ///
    /// `resolve` is called at most once. On a hit it is never called.
    ///
    /// # Arguments
    ///
    /// - `key` — the compiled cache key.
    /// - `config` — the field's configuration; selects SHARED or SCOPED.
    /// - `resolve` — produces the field value on a miss.
    ///
    /// # Errors
    ///
    /// - The resolver's own error, unchanged.
    /// - [`FieldError::Store`] if a store read or write fails.
    /// - [`FieldError::Encode`] if an entry cannot be serialized.
    pub async fn resolve<F, Fut>(
        &self,
        key: &str,
        config: &FieldCacheConfig,
        resolve: F,
    ) -> FieldResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FieldResult>,
    {
        match config.cache_type {
            CacheType::Shared => self.resolve_shared(key, config, resolve).await,
            CacheType::Scoped => self.resolve_scoped(key, config, resolve).await,
        }
    }

    async fn resolve_shared<F, Fut>(
        &self,
        key: &str,
        config: &FieldCacheConfig,
        resolve: F,
    ) -> FieldResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FieldResult>,
    {
        let max_polls = config.max_polls();
        let mut polls = 0;

        loop {
            match self.read(key, CacheType::Shared).await? {
                EntryState::Completed(value) => {
                    debug!(key = %key, polls, "cache hit");
                    return Ok(value);
                }
                EntryState::Processing if polls < max_polls => {
                    polls += 1;
                    debug!(key = %key, polls, "entry is being resolved elsewhere, waiting");
                    tokio::time::sleep(config.poll_interval()).await;
                    continue;
                }
                EntryState::Processing => {
                    warn!(
                        key = %key,
                        polls,
                        "processing claim outlived polling timeout, taking over"
                    );
                }
                EntryState::Absent => {
                    debug!(key = %key, polls, "cache miss");
                }
            }

            return self.claim_and_resolve(key, config, resolve).await;
        }
    }

    async fn claim_and_resolve<F, Fut>(
        &self,
        key: &str,
        config: &FieldCacheConfig,
        resolve: F,
    ) -> FieldResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FieldResult>,
    {
        let claim = serde_json::to_string(&CacheEntry::Processing)?;
        self.store.set(key, claim, config.claim_ttl()).await?;
        debug!(key = %key, ttl_secs = config.polling_timeout, "staked processing claim");

        let value = resolve().await?;

        let entry = CacheEntry::Completed {
            value: value.clone(),
        };
        let completed = serde_json::to_string(&entry)?;
        self.store.set(key, completed, config.entry_ttl()).await?;
        debug!(key = %key, ttl_secs = config.ttl, "stored completed entry");

        Ok(value)
    }

    async fn resolve_scoped<F, Fut>(
        &self,
        key: &str,
        config: &FieldCacheConfig,
        resolve: F,
    ) -> FieldResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FieldResult>,
    {
        if let EntryState::Completed(value) = self.read(key, CacheType::Scoped).await? {
            debug!(key = %key, "cache hit");
            return Ok(value);
        }

        debug!(key = %key, "cache miss");
        let value = resolve().await?;
        self.store
            .set(key, value.to_string(), config.entry_ttl())
            .await?;
        debug!(key = %key, ttl_secs = config.ttl, "stored value");

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::time::Instant;

    use super::*;
    use crate::store::{MemoryStore, StoreError};

    const KEY: &str = "ch-test";
    const PROCESSING: &str = r#"{"status":"processing"}"#;

    fn config(cache_type: CacheType) -> FieldCacheConfig {
        FieldCacheConfig {
            cache_type,
            ..FieldCacheConfig::default()
        }
    }

    async fn counted(calls: &AtomicUsize, value: Value) -> FieldResult {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }

    async fn failing(message: &'static str) -> FieldResult {
        Err(FieldError::resolver(message))
    }

    /// A memory store, a coordinator over it and a resolver call counter.
    struct Harness {
        store: Arc<MemoryStore>,
        coordinator: Coordinator,
        calls: AtomicUsize,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let coordinator = Coordinator::new(store.clone());
            Self {
                store,
                coordinator,
                calls: AtomicUsize::new(0),
            }
        }

        /// Resolves `KEY` with a resolver that counts and returns `value`.
        async fn call(&self, cfg: &FieldCacheConfig, value: Value) -> FieldResult {
            let calls = &self.calls;
            self.coordinator
                .resolve(KEY, cfg, || counted(calls, value))
                .await
        }

        async fn seed(&self, raw: &str, ttl_secs: u64) {
            let ttl = Duration::from_secs(ttl_secs);
            self.store.set(KEY, raw.to_string(), ttl).await.unwrap();
        }

        async fn stored(&self) -> Option<String> {
            self.store.get(KEY).await.unwrap()
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    struct FailingStore;

    #[async_trait]
    impl CacheStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    // ── SCOPED ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn scoped_miss_resolves_and_stores_raw_value() {
        let h = Harness::new();

        let value = h.call(&config(CacheType::Scoped), json!({"n": 1})).await;

        assert_eq!(value.unwrap(), json!({"n": 1}));
        assert_eq!(h.calls(), 1);
        assert_eq!(h.stored().await.as_deref(), Some(r#"{"n":1}"#));
    }

    #[tokio::test]
    async fn scoped_hit_skips_resolver() {
        let h = Harness::new();
        let cfg = config(CacheType::Scoped);

        h.call(&cfg, json!("first")).await.unwrap();
        let second = h.call(&cfg, json!("second")).await.unwrap();

        assert_eq!(second, json!("first"));
        assert_eq!(h.calls(), 1);
    }

    #[tokio::test]
    async fn scoped_caches_null() {
        let h = Harness::new();
        let cfg = config(CacheType::Scoped);

        h.call(&cfg, Value::Null).await.unwrap();
        h.call(&cfg, json!(1)).await.unwrap();

        assert_eq!(h.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scoped_entry_expires_after_ttl() {
        let h = Harness::new();
        let cfg = FieldCacheConfig {
            ttl: 10,
            ..config(CacheType::Scoped)
        };

        h.call(&cfg, json!(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(9)).await;
        h.call(&cfg, json!(2)).await.unwrap();
        assert_eq!(h.calls(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        let value = h.call(&cfg, json!(3)).await.unwrap();
        assert_eq!(value, json!(3));
        assert_eq!(h.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn scoped_concurrent_callers_all_resolve() {
        let h = Harness::new();
        let cfg = config(CacheType::Scoped);

        let (calls, store) = (&h.calls, &h.store);
        let slow = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            // Both callers missed and nothing was claimed on their behalf.
            assert_eq!(store.get(KEY).await.unwrap(), None);
            tokio::time::sleep(Duration::from_millis(350)).await;
            Ok::<_, FieldError>(json!("fresh"))
        };

        let (a, b) = tokio::join!(
            h.coordinator.resolve(KEY, &cfg, slow),
            h.coordinator.resolve(KEY, &cfg, slow),
        );

        assert_eq!(a.unwrap(), json!("fresh"));
        assert_eq!(b.unwrap(), json!("fresh"));
        assert_eq!(h.calls(), 2);
        assert_eq!(h.stored().await.as_deref(), Some(r#""fresh""#));
    }

    // ── SHARED ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn shared_miss_writes_completed_marker() {
        let h = Harness::new();

        let value = h.call(&config(CacheType::Shared), json!([1, 2])).await;

        assert_eq!(value.unwrap(), json!([1, 2]));
        let raw = h.stored().await.unwrap();
        let entry: CacheEntry = serde_json::from_str(&raw).unwrap();
        let expected = CacheEntry::Completed {
            value: json!([1, 2]),
        };
        assert_eq!(entry, expected);
        assert_eq!(h.calls(), 1);
    }

    #[tokio::test]
    async fn shared_hit_skips_resolver() {
        let h = Harness::new();
        let completed = r#"{"status":"completed","value":"cached"}"#;
        h.seed(completed, 60).await;

        let value = h.call(&config(CacheType::Shared), json!("fresh")).await;

        assert_eq!(value.unwrap(), json!("cached"));
        assert_eq!(h.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shared_waiter_returns_value_completed_elsewhere() {
        let h = Harness::new();
        h.seed(PROCESSING, 30).await;

        let writer = h.store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            let completed = r#"{"status":"completed","value":42}"#.to_string();
            let ttl = Duration::from_secs(60);
            writer.set(KEY, completed, ttl).await.unwrap();
        });

        let value = h.call(&config(CacheType::Shared), json!(0)).await;

        assert_eq!(value.unwrap(), json!(42));
        assert_eq!(h.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shared_waiter_takes_over_after_marker_expires() {
        let h = Harness::new();
        h.seed(PROCESSING, 3).await;
        let start = Instant::now();

        let value = h.call(&config(CacheType::Shared), json!("mine")).await;

        assert_eq!(value.unwrap(), json!("mine"));
        assert_eq!(h.calls(), 1);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn shared_waiter_stops_polling_after_budget() {
        let h = Harness::new();
        // A claim that lives far longer than this field's polling timeout.
        h.seed(PROCESSING, 3600).await;
        let cfg = FieldCacheConfig {
            polling_timeout: 2,
            ping_interval: 500,
            ..config(CacheType::Shared)
        };
        let start = Instant::now();

        let value = h.call(&cfg, json!(7)).await.unwrap();

        assert_eq!(value, json!(7));
        assert_eq!(h.calls(), 1);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn shared_concurrent_callers_resolve_once() {
        let h = Harness::new();
        let cfg = FieldCacheConfig {
            ping_interval: 100,
            ..config(CacheType::Shared)
        };

        let calls = &h.calls;
        let slow = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(350)).await;
            Ok::<_, FieldError>(json!({"expensive": true}))
        };

        let (a, b) = tokio::join!(
            h.coordinator.resolve(KEY, &cfg, slow),
            h.coordinator.resolve(KEY, &cfg, slow),
        );

        assert_eq!(a.unwrap(), json!({"expensive": true}));
        assert_eq!(b.unwrap(), json!({"expensive": true}));
        assert_eq!(h.calls(), 1);
    }

    // ── Failures ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn shared_resolver_error_leaves_processing_marker() {
        let h = Harness::new();
        let cfg = config(CacheType::Shared);

        let err = h.coordinator
            .resolve(KEY, &cfg, || failing("upstream timed out"))
            .await
            .unwrap_err();

        assert!(matches!(err, FieldError::Resolver(_)));
        assert_eq!(err.to_string(), "upstream timed out");
        assert_eq!(h.stored().await.as_deref(), Some(PROCESSING));
    }

    #[tokio::test(start_paused = true)]
    async fn shared_failure_heals_once_claim_expires() {
        let h = Harness::new();
        let cfg = FieldCacheConfig {
            polling_timeout: 5,
            ..config(CacheType::Shared)
        };

        let failed = h.coordinator
            .resolve(KEY, &cfg, || failing("flaky upstream"))
            .await;
        assert!(failed.is_err());

        let start = Instant::now();
        let value = h.call(&cfg, json!("recovered")).await.unwrap();

        assert_eq!(value, json!("recovered"));
        assert_eq!(h.calls(), 1);
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(6));
        let raw = h.stored().await.unwrap();
        assert_eq!(raw, r#"{"status":"completed","value":"recovered"}"#);
    }

    #[tokio::test]
    async fn scoped_resolver_error_writes_nothing() {
        let h = Harness::new();
        let cfg = config(CacheType::Scoped);

        let result = h.coordinator.resolve(KEY, &cfg, || failing("boom")).await;

        assert!(result.is_err());
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn store_failure_propagates_without_resolving() {
        let coordinator = Coordinator::new(Arc::new(FailingStore));
        let calls = AtomicUsize::new(0);

        for cache_type in [CacheType::Shared, CacheType::Scoped] {
            let err = coordinator
                .resolve(KEY, &config(cache_type), || counted(&calls, json!(1)))
                .await
                .unwrap_err();
            assert!(matches!(err, FieldError::Store(_)));
            assert!(err.to_string().contains("connection refused"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn undecodable_shared_entry_is_absent() {
        let h = Harness::new();
        h.seed("\"raw scoped value\"", 60).await;

        let shared = h.coordinator.read(KEY, CacheType::Shared).await;
        let scoped = h.coordinator.read(KEY, CacheType::Scoped).await;

        assert_eq!(shared.unwrap(), EntryState::Absent);
        let raw = json!("raw scoped value");
        assert_eq!(scoped.unwrap(), EntryState::Completed(raw));
    }
}
