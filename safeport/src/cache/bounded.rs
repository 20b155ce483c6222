//! Capacity- and age-bounded cache using moka.
//!
//! Every cache in the placement core has the same shape: a bounded number of
//! entries, each of which expires a fixed time after insertion. moka gives
//! both bounds without a separate sweeper task, and its lock-free reads keep
//! lookups off the runtime's critical path.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::future::Cache;
use serde::Serialize;

/// A cached value together with the moment it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The cached value.
    pub value: V,
    /// When the value was inserted.
    pub inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Wraps a value stamped with the current time.
    pub fn new(value: V) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
        }
    }

    /// Time since insertion.
    pub fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups that found a live entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Approximate number of live entries.
    pub entries: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, or 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Cache evicting entries when over capacity or older than the TTL.
///
/// Eviction under pressure follows moka's admission policy (TinyLFU), which
/// favours frequently used keys over strict recency.
pub struct BoundedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    cache: Cache<K, CacheEntry<V>>,
    capacity: u64,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> BoundedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache holding at most `capacity` entries for at most `ttl` each.
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();

        Self {
            cache,
            capacity,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached value, if present and not expired.
    pub async fn get(&self, key: &K) -> Option<V> {
        self.get_entry(key).await.map(|entry| entry.value)
    }

    /// Returns the cached entry with its insertion time.
    pub async fn get_entry(&self, key: &K) -> Option<CacheEntry<V>> {
        match self.cache.get(key).await {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores a value, replacing any previous entry for the key.
    pub async fn insert(&self, key: K, value: V) {
        self.cache.insert(key, CacheEntry::new(value)).await;
    }

    /// Removes an entry.
    pub async fn invalidate(&self, key: &K) {
        self.cache.invalidate(key).await;
    }

    /// Whether a live entry exists. Does not count as a lookup.
    pub fn contains(&self, key: &K) -> bool {
        self.cache.contains_key(key)
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    /// Applies pending evictions so counts are exact.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Time-to-live of each entry.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.cache.entry_count(),
        }
    }
}

impl<K, V> std::fmt::Debug for BoundedCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache")
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_after_insert() {
        let cache: BoundedCache<u32, String> = BoundedCache::new(16, Duration::from_secs(60));
        cache.insert(1, "one".to_string()).await;

        assert_eq!(cache.get(&1).await.as_deref(), Some("one"));
        assert_eq!(cache.get(&2).await, None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_entries_expire_after_ttl() {
        let cache: BoundedCache<u32, u32> = BoundedCache::new(16, Duration::from_millis(30));
        cache.insert(1, 10).await;
        assert!(cache.contains(&1));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.get(&1).await, None);
    }

    #[tokio::test]
    async fn test_capacity_bound() {
        let cache: BoundedCache<u32, u32> = BoundedCache::new(8, Duration::from_secs(60));
        for i in 0..100 {
            cache.insert(i, i).await;
        }
        cache.run_pending_tasks().await;
        assert!(cache.entry_count() <= 8);
    }

    #[tokio::test]
    async fn test_entry_records_insertion_time() {
        let cache: BoundedCache<&'static str, u8> = BoundedCache::new(4, Duration::from_secs(60));
        let before = Instant::now();
        cache.insert("a", 1).await;

        let entry = cache.get_entry(&"a").await.unwrap();
        assert!(entry.inserted_at >= before);
        assert_eq!(entry.value, 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache: BoundedCache<u32, u32> = BoundedCache::new(4, Duration::from_secs(60));
        cache.insert(1, 1).await;
        cache.clear().await;
        assert!(!cache.contains(&1));
        assert_eq!(cache.entry_count(), 0);
    }
}
