use serde::Serialize;
use std::time::SystemTime;

/// Cache entry metadata
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    /// Store generation the value was computed against.
    pub generation: u64,
    pub created_at: SystemTime,
    pub access_count: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, generation: u64) -> Self {
        Self {
            value,
            generation,
            created_at: SystemTime::now(),
            access_count: 0,
        }
    }

    pub fn touch(&mut self) {
        self.access_count += 1;
    }
}

/// Cache performance statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub invalidations: u64,
    pub hit_rate: f64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }

    pub fn miss_rate(&self) -> f64 {
        1.0 - self.hit_rate()
    }
}

/// Memoization of final response payloads, keyed by a canonical parameter string.
///
/// Entries never expire on their own. They are dropped wholesale by [`clear_all`] when the
/// knowledge store is reloaded, and an entry computed against an older store generation is
/// never served.
///
/// [`clear_all`]: ResponseCache::clear_all
pub trait ResponseCache<V>: Send + Sync {
    /// Returns the cached value if it was produced by `generation`.
    fn get(&self, key: &str, generation: u64) -> Option<V>;

    /// Stores `value` as produced by `generation`. Writes for a generation older than the
    /// last invalidation are discarded.
    fn put(&self, key: String, value: V, generation: u64);

    /// Drops every entry and refuses writes from generations before `generation`.
    fn clear_all(&self, generation: u64);

    fn stats(&self) -> CacheStats;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
