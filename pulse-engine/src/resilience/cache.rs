//! Bounded in-memory TTL cache
//!
//! Entries past their TTL are not served as fresh but stay available as an
//! explicit stale fallback until evicted. Inserting beyond capacity evicts
//! the oldest entry by timestamp.

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use pulse_common::Clock;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Default entry cap
pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub payload: T,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub struct MemoryCache<T> {
    clock: Arc<dyn Clock>,
    /// Reads use `peek`, so recency order is insertion order
    entries: Mutex<LruCache<String, CacheEntry<T>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T: Clone> MemoryCache<T> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(clock, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            clock,
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn entries(&self) -> MutexGuard<'_, LruCache<String, CacheEntry<T>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Entry younger than `ttl`; counts a hit or a miss
    pub fn get_fresh(&self, key: &str, ttl: Duration) -> Option<T> {
        let now = self.clock.now();
        let fresh = self
            .entries()
            .peek(key)
            .filter(|entry| now - entry.timestamp < ttl)
            .map(|entry| entry.payload.clone());

        match fresh {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        fresh
    }

    /// Entry regardless of age
    pub fn get_stale(&self, key: &str) -> Option<T> {
        self.entries().peek(key).map(|entry| entry.payload.clone())
    }

    pub fn insert(&self, key: &str, payload: T) {
        let timestamp = self.clock.now();
        let evicted = self
            .entries()
            .push(key.to_string(), CacheEntry { payload, timestamp });
        if let Some((evicted_key, _)) = evicted.filter(|(k, _)| k != key) {
            tracing::debug!(key = %evicted_key, "Evicted oldest cache entry");
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses) counted since the last `take_counters`
    pub fn pending_counters(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }

    /// Read and reset the hit/miss counters
    pub fn take_counters(&self) -> (u64, u64) {
        (
            self.hits.swap(0, Ordering::Relaxed),
            self.misses.swap(0, Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pulse_common::ManualClock;

    fn cache(capacity: usize) -> (MemoryCache<u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap(),
        ));
        (MemoryCache::with_capacity(clock.clone(), capacity), clock)
    }

    #[test]
    fn test_fresh_until_ttl_then_stale() {
        let (cache, clock) = cache(DEFAULT_CAPACITY);
        cache.insert("AAPL:1d", 7);
        assert_eq!(cache.get_fresh("AAPL:1d", Duration::seconds(60)), Some(7));

        clock.advance(Duration::seconds(60));
        assert_eq!(cache.get_fresh("AAPL:1d", Duration::seconds(60)), None);
        assert_eq!(cache.get_stale("AAPL:1d"), Some(7));
        assert_eq!(cache.pending_counters(), (1, 1));
    }

    #[test]
    fn test_evicts_oldest_beyond_capacity() {
        let (cache, clock) = cache(3);
        for (i, key) in ["a", "b", "c", "d"].iter().enumerate() {
            cache.insert(key, i as u32);
            clock.advance(Duration::seconds(1));
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get_stale("a"), None);
        assert_eq!(cache.get_stale("d"), Some(3));
    }

    #[test]
    fn test_reads_do_not_protect_from_eviction() {
        let (cache, clock) = cache(3);
        for key in ["a", "b", "c"] {
            cache.insert(key, 1);
            clock.advance(Duration::seconds(1));
        }
        assert_eq!(cache.get_fresh("a", Duration::seconds(60)), Some(1));
        assert_eq!(cache.get_stale("a"), Some(1));

        cache.insert("d", 2);
        assert_eq!(cache.get_stale("a"), None);
        assert_eq!(cache.get_stale("b"), Some(1));
    }

    #[test]
    fn test_reinsert_refreshes_position() {
        let (cache, clock) = cache(2);
        cache.insert("a", 1);
        clock.advance(Duration::seconds(1));
        cache.insert("b", 2);
        clock.advance(Duration::seconds(1));
        cache.insert("a", 3);
        cache.insert("c", 4);
        assert_eq!(cache.get_stale("b"), None);
        assert_eq!(cache.get_stale("a"), Some(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_default_cap_is_fifty() {
        let (cache, clock) = cache(DEFAULT_CAPACITY);
        for i in 0..60 {
            cache.insert(&format!("k{}", i), i);
            clock.advance(Duration::milliseconds(10));
        }
        assert_eq!(cache.len(), 50);
        assert_eq!(cache.get_stale("k9"), None);
        assert_eq!(cache.get_stale("k10"), Some(10));
    }

    #[test]
    fn test_take_counters_resets() {
        let (cache, _) = cache(DEFAULT_CAPACITY);
        cache.get_fresh("missing", Duration::seconds(5));
        assert_eq!(cache.take_counters(), (0, 1));
        assert_eq!(cache.pending_counters(), (0, 0));
    }
}
