//! Get-or-compute memoization with a fixed TTL.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Duration;
use dashmap::DashMap;
use ratekeeper_common::{expires_in, is_expired, now, Timestamp};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::config::CacheConfig;

/// Cached value entry.
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    value: T,
    expires_at: Timestamp,
    last_access: Timestamp,
}

impl<T> CacheEntry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: expires_in(ttl),
            last_access: now(),
        }
    }

    fn is_valid(&self) -> bool {
        !is_expired(self.expires_at)
    }
}

impl<T: Clone> CacheEntry<T> {
    fn value_if_valid(&self, key: &str) -> Option<T> {
        if !self.is_valid() {
            debug!(key, "Cache entry expired");
            return None;
        }
        Some(self.value.clone())
    }
}

type Gates = DashMap<String, Arc<AsyncMutex<()>>>;

/// A caller's hold on the coalescing gate for one key.
///
/// Dropping it, on completion or cancellation, removes the gate from the map
/// once no other caller holds it.
struct InFlight<'a> {
    gates: &'a Gates,
    key: &'a str,
    gate: Arc<AsyncMutex<()>>,
}

impl<'a> InFlight<'a> {
    fn join(gates: &'a Gates, key: &'a str) -> Self {
        let gate = Arc::clone(&gates.entry(key.to_string()).or_default());
        Self { gates, key, gate }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        // Only the map and this caller hold the gate: nobody is waiting on it.
        self.gates
            .remove_if(self.key, |_, gate| Arc::strong_count(gate) == 2);
    }
}

/// Thread-safe memoization cache keyed by string.
///
/// Entries expire `ttl` after they were stored. Expiry is checked lazily on
/// read; a stale entry stays in the store until its key is recomputed, the
/// capacity bound evicts it, or [`ExpiringCache::evict_expired`] is called.
///
/// By default two callers that miss on the same key at the same time both run
/// their producer and the last one to finish wins. Set
/// [`CacheConfig::coalesce_misses`] to make later callers wait for the first
/// producer instead.
pub struct ExpiringCache<T> {
    entries: DashMap<String, CacheEntry<T>>,
    in_flight: Gates,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: Clone> ExpiringCache<T> {
    /// Create an unbounded cache with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self::with_config(CacheConfig {
            ttl,
            ..Default::default()
        })
    }

    /// Create a new cache with custom configuration.
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Lifetime applied to every stored entry.
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Return the cached value for `key`, or run `produce` and cache its
    /// output.
    ///
    /// A failed `produce` leaves the cache untouched and its error is returned
    /// as-is, so the next call for the same key runs a producer again.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &str, produce: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key, "Cache hit");
            return Ok(value);
        }

        if !self.config.coalesce_misses {
            return self.compute(key, produce).await;
        }

        let in_flight = InFlight::join(&self.in_flight, key);
        let _guard = in_flight.gate.lock().await;

        // Another caller may have filled the key while we waited.
        match self.get(key) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Cache hit after waiting for in-flight fetch");
                Ok(value)
            }
            None => self.compute(key, produce).await,
        }
    }

    async fn compute<F, Fut, E>(&self, key: &str, produce: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key, "Cache miss");

        match produce().await {
            Ok(value) => {
                self.insert(key, value.clone());
                Ok(value)
            }
            Err(e) => {
                debug!(key, "Producer failed, nothing cached");
                Err(e)
            }
        }
    }

    /// Get a value from cache if valid.
    ///
    /// Access time is only recorded when the cache is bounded, so reads on an
    /// unbounded cache take a shared lock.
    pub fn get(&self, key: &str) -> Option<T> {
        if self.config.max_entries.is_none() {
            return self.entries.get(key)?.value_if_valid(key);
        }

        let mut entry = self.entries.get_mut(key)?;
        let value = entry.value_if_valid(key)?;
        entry.last_access = now();
        Some(value)
    }

    /// Store a value, overwriting any previous entry for `key`.
    pub fn insert(&self, key: &str, value: T) {
        if let Some(max) = self.config.max_entries {
            if !self.entries.contains_key(key) && self.entries.len() >= max {
                self.make_room(max);
            }
        }

        self.entries
            .insert(key.to_string(), CacheEntry::new(value, self.config.ttl));
    }

    /// Remove an entry.
    pub fn remove(&self, key: &str) -> Option<T> {
        self.entries.remove(key).map(|(_, entry)| entry.value)
    }

    /// Clear all cached values.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Get the number of entries in cache, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evict expired entries.
    pub fn evict_expired(&self) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_valid());
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            debug!(evicted, "Evicted expired cache entries");
        }
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let total = self.entries.len();
        let valid = self.entries.iter().filter(|e| e.is_valid()).count();

        CacheStats {
            total_entries: total,
            valid_entries: valid,
            expired_entries: total.saturating_sub(valid),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drop expired entries, then least recently used ones, until a new key
    /// fits. Concurrent inserts can briefly overshoot `max`.
    fn make_room(&self, max: usize) {
        self.evict_expired();

        while self.entries.len() >= max {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|entry| entry.last_access)
                .map(|entry| entry.key().clone());

            match oldest {
                Some(key) => {
                    debug!(key = %key, "Evicting least recently used entry");
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl<T: Clone> Default for ExpiringCache<T> {
    fn default() -> Self {
        Self::with_config(CacheConfig::default())
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    /// Calls answered from the store.
    pub hits: u64,
    /// Calls that ran a producer.
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FxEngineConfig;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    fn counting_producer(
        calls: &AtomicUsize,
        value: i32,
    ) -> impl Future<Output = Result<i32, String>> + '_ {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        }
    }

    #[tokio::test]
    async fn test_produce_runs_once_within_ttl() {
        let cache = ExpiringCache::new(Duration::seconds(60));
        let calls = AtomicUsize::new(0);

        let first = cache
            .get_or_compute("k", || counting_producer(&calls, 1))
            .await
            .unwrap();
        let second = cache
            .get_or_compute("k", || counting_producer(&calls, 2))
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_largest_ttl_does_not_overflow() {
        let config = FxEngineConfig {
            cache: CacheConfig::with_ttl_ms(i64::MAX),
        };
        assert!(config.validate().is_ok());

        let cache = ExpiringCache::with_config(config.cache);
        let calls = AtomicUsize::new(0);

        let first = cache.get_or_compute("k", || counting_producer(&calls, 1)).await;
        let second = cache.get_or_compute("k", || counting_producer(&calls, 2)).await;

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().expired_entries, 0);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let cache = ExpiringCache::new(Duration::seconds(60));
        let calls = AtomicUsize::new(0);

        let a = cache
            .get_or_compute("a", || counting_producer(&calls, 1))
            .await
            .unwrap();
        let b = cache
            .get_or_compute("b", || counting_producer(&calls, 2))
            .await
            .unwrap();

        assert_eq!((a, b), (1, 2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_recomputes_after_expiry() {
        let cache = ExpiringCache::new(Duration::milliseconds(50));
        let calls = AtomicUsize::new(0);

        cache
            .get_or_compute("k", || counting_producer(&calls, 1))
            .await
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(70)).await;
        assert!(cache.get("k").is_none());
        // Stale entries are not swept on read
        assert_eq!(cache.len(), 1);

        let refreshed = cache
            .get_or_compute("k", || counting_producer(&calls, 2))
            .await
            .unwrap();

        assert_eq!(refreshed, 2);
        assert_eq!(cache.get("k"), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let cache: ExpiringCache<i32> = ExpiringCache::new(Duration::seconds(60));
        let calls = AtomicUsize::new(0);

        let result = cache
            .get_or_compute("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>("provider down".to_string())
            })
            .await;

        assert_eq!(result, Err("provider down".to_string()));
        assert!(cache.is_empty());

        let value = cache
            .get_or_compute("k", || counting_producer(&calls, 7))
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_each_fetch_by_default() {
        let cache = ExpiringCache::new(Duration::seconds(60));
        let calls = AtomicUsize::new(0);

        let calls = &calls;
        let lookups = (0..8).map(|i| {
            cache.get_or_compute("k", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(StdDuration::from_millis(20)).await;
                Ok::<_, String>(i)
            })
        });
        let results = futures::future::join_all(lookups).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(calls.load(Ordering::SeqCst), 8);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_coalesced_misses_fetch_once() {
        let cache = ExpiringCache::with_config(CacheConfig {
            coalesce_misses: true,
            ..Default::default()
        });
        let calls = AtomicUsize::new(0);

        let calls = &calls;
        let lookups = (0..8).map(|i| {
            cache.get_or_compute("k", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(StdDuration::from_millis(20)).await;
                Ok::<_, String>(i)
            })
        });
        let results = futures::future::join_all(lookups).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r == &Ok(0)));
        assert!(cache.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_coalesced_failure_lets_waiter_retry() {
        let cache = ExpiringCache::with_config(CacheConfig {
            coalesce_misses: true,
            ..Default::default()
        });
        let calls = AtomicUsize::new(0);

        let calls = &calls;
        let lookups = (0..2).map(|_| {
            cache.get_or_compute("k", move || async move {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(StdDuration::from_millis(10)).await;
                if call == 0 {
                    Err("first fetch failed".to_string())
                } else {
                    Ok(42)
                }
            })
        });
        let results = futures::future::join_all(lookups).await;

        assert_eq!(results[0], Err("first fetch failed".to_string()));
        assert_eq!(results[1], Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelled_fetch_releases_gate() {
        let cache = ExpiringCache::with_config(CacheConfig {
            coalesce_misses: true,
            ..Default::default()
        });

        let slow = cache.get_or_compute("k", || async {
            tokio::time::sleep(StdDuration::from_secs(60)).await;
            Ok::<_, String>(1)
        });
        assert!(tokio::time::timeout(StdDuration::from_millis(10), slow)
            .await
            .is_err());

        assert!(cache.in_flight.is_empty());
        assert!(cache.is_empty());

        let value = cache
            .get_or_compute("k", || async { Ok::<_, String>(2) })
            .await;
        assert_eq!(value, Ok(2));
        assert!(cache.in_flight.is_empty());
    }

    #[test]
    fn test_access_time_tracked_only_when_bounded() {
        let unbounded = ExpiringCache::<i32>::default();
        let bounded = ExpiringCache::with_config(CacheConfig {
            max_entries: Some(4),
            ..Default::default()
        });
        unbounded.insert("k", 1);
        bounded.insert("k", 1);
        let unbounded_before = unbounded.entries.get("k").unwrap().last_access;
        let bounded_before = bounded.entries.get("k").unwrap().last_access;

        std::thread::sleep(StdDuration::from_millis(5));
        assert_eq!(unbounded.get("k"), Some(1));
        assert_eq!(bounded.get("k"), Some(1));

        assert_eq!(unbounded.entries.get("k").unwrap().last_access, unbounded_before);
        assert!(bounded.entries.get("k").unwrap().last_access > bounded_before);
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let cache = ExpiringCache::with_config(CacheConfig {
            max_entries: Some(2),
            ..Default::default()
        });

        cache.insert("a", 1);
        std::thread::sleep(StdDuration::from_millis(2));
        cache.insert("b", 2);
        std::thread::sleep(StdDuration::from_millis(2));
        assert_eq!(cache.get("a"), Some(1));
        std::thread::sleep(StdDuration::from_millis(2));

        cache.insert("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), Some(3));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = ExpiringCache::with_config(CacheConfig {
            max_entries: Some(2),
            ..Default::default()
        });

        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn test_evict_expired_and_stats() {
        let cache = ExpiringCache::new(Duration::milliseconds(30));
        cache.insert("a", 1);
        cache.insert("b", 2);

        std::thread::sleep(StdDuration::from_millis(40));
        cache.insert("c", 3);

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.valid_entries, 1);
        assert_eq!(stats.expired_entries, 2);

        cache.evict_expired();
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove() {
        let cache = ExpiringCache::<&str>::default();
        cache.insert("k", "v");

        assert_eq!(cache.remove("k"), Some("v"));
        assert_eq!(cache.remove("k"), None);
        assert_eq!(cache.ttl(), Duration::milliseconds(60_000));
    }
}
