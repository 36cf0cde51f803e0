use crate::{CacheEntry, CacheStats, ResponseCache};
use dashmap::DashMap;
use feinschmecker_core::RawParams;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

const KEY_PREFIX: &str = "recipes:";

/// Canonical cache key for a set of raw request parameters.
///
/// Pairs are serialized in key order, so the order parameters arrived in never changes the key.
pub fn canonical_key(params: &RawParams) -> String {
    let map: Map<String, Value> = params
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    format!("{}{}", KEY_PREFIX, Value::Object(map))
}

/// Process-local response cache backed by a sharded concurrent map.
pub struct InMemoryResponseCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    floor_generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

impl<V> Default for InMemoryResponseCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> InMemoryResponseCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            floor_generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("response_cache_misses").increment(1);
    }
}

impl<V: Clone + Send + Sync> ResponseCache<V> for InMemoryResponseCache<V> {
    fn get(&self, key: &str, generation: u64) -> Option<V> {
        let Some(mut entry) = self.entries.get_mut(key) else {
            self.miss();
            return None;
        };
        if entry.generation != generation {
            debug!(
                key,
                cached = entry.generation,
                current = generation,
                "Ignoring cache entry from another store generation"
            );
            self.miss();
            return None;
        }
        entry.touch();
        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("response_cache_hits").increment(1);
        Some(entry.value.clone())
    }

    fn put(&self, key: String, value: V, generation: u64) {
        if generation < self.floor_generation.load(Ordering::Acquire) {
            debug!(key, generation, "Discarding cache write from a superseded store generation");
            return;
        }
        self.entries.insert(key, CacheEntry::new(value, generation));
    }

    fn clear_all(&self, generation: u64) {
        self.floor_generation.fetch_max(generation, Ordering::AcqRel);
        let dropped = self.entries.len();
        self.entries.clear();
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        debug!(dropped, generation, "Response cache cleared");
    }

    fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            hit_rate: 0.0,
        };
        stats.hit_rate = stats.hit_rate();
        stats
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> RawParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_key_ignores_parameter_order() {
        let a = params(&[("vegan", "true"), ("calories_max", "500")]);
        let b = params(&[("calories_max", "500"), ("vegan", "true")]);
        assert_eq!(canonical_key(&a), canonical_key(&b));
        assert_eq!(
            canonical_key(&a),
            r#"recipes:{"calories_max":"500","vegan":"true"}"#
        );
        assert_ne!(canonical_key(&a), canonical_key(&params(&[("vegan", "false")])));
    }

    #[test]
    fn test_get_put_and_stats() {
        let cache = InMemoryResponseCache::new();
        assert_eq!(cache.get("k", 1), None);
        cache.put("k".to_string(), 42u32, 1);
        assert_eq!(cache.get("k", 1), Some(42));
        assert_eq!(cache.get("k", 1), Some(42));

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_stale_generation_is_a_miss() {
        let cache = InMemoryResponseCache::new();
        cache.put("k".to_string(), "old", 1);
        assert_eq!(cache.get("k", 2), None);
    }

    #[test]
    fn test_clear_all_rejects_late_writes() {
        let cache = InMemoryResponseCache::new();
        cache.put("a".to_string(), 1, 1);
        cache.clear_all(2);
        assert!(cache.is_empty());

        // A query that started before the reload finishes afterwards.
        cache.put("a".to_string(), 1, 1);
        assert!(cache.is_empty());

        cache.put("a".to_string(), 2, 2);
        assert_eq!(cache.get("a", 2), Some(2));
        assert_eq!(cache.stats().invalidations, 1);
    }
}
