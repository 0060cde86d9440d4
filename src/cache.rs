//! Expiring key/value store shared by all request tasks, backed by Moka.

use std::time::Duration;

/// Upper bound on cached keys; listings and download URLs are small
const DEFAULT_MAX_CAPACITY: u64 = 100_000;

/// Time-only expiry cache keyed by string.
///
/// Every entry lives for one TTL from its last `set`. A zero TTL disables
/// caching entirely: `set` is dropped and `get` always misses.
pub struct TtlCache<V> {
    inner: Option<moka::future::Cache<String, V>>,
    ttl: Duration,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        let inner = (!ttl.is_zero()).then(|| {
            moka::future::Cache::builder()
                .max_capacity(DEFAULT_MAX_CAPACITY)
                .time_to_live(ttl)
                .build()
        });
        Self { inner, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the live value for `key`, or `None` when absent or expired.
    pub async fn get(&self, key: &str) -> Option<V> {
        self.inner.as_ref()?.get(key).await
    }

    /// Stores `value` under `key` for one TTL, replacing any previous value.
    pub async fn set(&self, key: impl Into<String>, value: V) {
        if let Some(cache) = &self.inner {
            cache.insert(key.into(), value).await;
        }
    }

    /// Number of live entries after pending evictions are applied.
    pub async fn len(&self) -> u64 {
        match &self.inner {
            Some(cache) => {
                cache.run_pending_tasks().await;
                cache.entry_count()
            }
            None => 0,
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
