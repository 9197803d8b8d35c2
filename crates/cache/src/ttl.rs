//! In-process TTL cache backed by DashMap for lock-free concurrent access.
//! Expired entries are kept and handed back marked stale, so readers can
//! serve the last known value while a refresh is in flight.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

/// Lock-free TTL cache with stale-aware reads.
pub struct TtlCache<K: Eq + Hash, V: Clone> {
    store: Arc<DashMap<K, CacheEntry<V>>>,
    max_entries: usize,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: Arc::new(DashMap::with_capacity(max_entries)),
            max_entries,
        }
    }

    /// Get a value plus its staleness flag, or None if the key was never
    /// set (or was invalidated). Expired entries come back with `true`.
    pub fn get(&self, key: &K) -> Option<(V, bool)> {
        match self.store.get(key) {
            Some(entry) => {
                let expired = entry.inserted_at.elapsed() > entry.ttl;
                if expired {
                    metrics::counter!("cache.stale_hit").increment(1);
                } else {
                    metrics::counter!("cache.hit").increment(1);
                }
                Some((entry.value.clone(), expired))
            }
            None => {
                metrics::counter!("cache.miss").increment(1);
                None
            }
        }
    }

    /// Insert or refresh a value with its own time-to-live.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        // Simple eviction: at capacity, skip new keys (evict_expired frees space)
        if self.store.len() >= self.max_entries && !self.store.contains_key(&key) {
            return;
        }
        self.store.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.store.remove(key);
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// Remove expired entries. Call this periodically from a background task.
    pub fn evict_expired(&self) -> usize {
        let before = self.store.len();
        self.store
            .retain(|_, entry| entry.inserted_at.elapsed() <= entry.ttl);
        let removed = before - self.store.len();
        if removed > 0 {
            debug!(removed, "evicted expired cache entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
