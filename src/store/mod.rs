//! Key-value store abstraction consumed by the cache coordinator.
//!
//! The coordinator only needs two operations — read a string by key and write
//! a string with a time-to-live — so any backend (in-process map, Redis,
//! memcached, an edge KV) can sit behind [`CacheStore`]. Entries expire purely
//! by ttl; there is no delete.
//!
//! [`MemoryStore`] is the in-process reference backend.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Longest lifetime [`MemoryStore`] gives an entry; longer ttls are clamped.
pub const MAX_TTL: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Errors reported by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected or failed an operation.
    #[error("cache store operation failed: {0}")]
    Backend(String),
}

/// A string key-value store with per-entry time-to-live.
///
/// # Contract
///
/// - `get` returns `Ok(None)` for keys that were never written or whose ttl
///   has lapsed.
/// - `set` overwrites any existing entry (last write wins) and restarts its ttl.
/// - Implementations must be `Send + Sync`; one store is shared by every
///   concurrent field resolution.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Reads the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;
}

struct StoredValue {
    value: String,
    expires_at: Instant,
}

/// In-process [`CacheStore`] backed by a mutex-guarded map.
///
/// Expiry is measured with [`tokio::time::Instant`], so a paused test clock
/// controls it. Expired entries are dropped lazily when read, or eagerly via
/// [`purge_expired`](Self::purge_expired). A ttl above [`MAX_TTL`] is stored
/// as `MAX_TTL`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use fieldcache::store::{CacheStore, MemoryStore};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new();
/// store.set("ch-1", "42".to_string(), Duration::from_secs(60)).await?;
/// assert_eq!(store.get("ch-1").await?, Some("42".to_string()));
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, StoredValue>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, including ones not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Returns `true` if no entries are held.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Drops every expired entry and returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, stored| stored.expires_at > now);
        before - entries.len()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(stored) if stored.expires_at > Instant::now() => {
                return Ok(Some(stored.value.clone()));
            }
            Some(_) => {}
            None => return Ok(None),
        }

        // Lapsed entry: forget it so the map does not grow unbounded.
        entries.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Instant::now() + ttl.min(MAX_TTL);
        self.entries
            .lock()
            .await
            .insert(key.to_owned(), StoredValue { value, expires_at });
        Ok(())
    }
}
