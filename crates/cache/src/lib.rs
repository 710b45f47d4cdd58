//! Generic immutable-snapshot cache shared by every cached configuration
//! domain (routes, rate limits, client access configs, key material).
//!
//! Writers never mutate published state: a refresh builds a complete
//! replacement map and swaps a single reference. Readers take the current
//! snapshot without locks and observe it in full — a replace in progress is
//! invisible to them, and two entries read from one snapshot always came
//! from the same `replace` call.

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// A keyed snapshot-swap cache.
///
/// `get` never fails for a missing key — absence is a normal outcome, not an
/// error. All values are handed out as `Arc`s so readers can hold an entry
/// across a concurrent swap without cloning the payload.
pub struct ConfigCache<K, V> {
    snapshot: ArcSwap<HashMap<K, Arc<V>>>,
}

impl<K, V> ConfigCache<K, V>
where
    K: Eq + Hash,
{
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    /// Looks up a single entry in the current snapshot.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.snapshot.load().get(key).cloned()
    }

    /// Returns the number of entries in the current snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    /// Returns `true` if the current snapshot holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }

    /// Atomically publishes a complete replacement snapshot.
    pub fn replace(&self, entries: HashMap<K, V>) {
        let next: HashMap<K, Arc<V>> =
            entries.into_iter().map(|(k, v)| (k, Arc::new(v))).collect();
        self.snapshot.store(Arc::new(next));
    }

    /// Atomically publishes a snapshot whose values are already shared.
    ///
    /// Used by writers that rebuild a map from the previous snapshot and
    /// want to keep unchanged entries allocated once.
    pub fn replace_shared(&self, entries: HashMap<K, Arc<V>>) {
        self.snapshot.store(Arc::new(entries));
    }

    /// Replaces the snapshot with an empty map.
    pub fn clear(&self) {
        self.snapshot.store(Arc::new(HashMap::new()));
    }

    /// Returns a handle to the full current snapshot for iteration.
    ///
    /// The handle stays coherent even if a `replace` lands afterwards; it
    /// simply keeps the older snapshot alive until dropped.
    #[must_use]
    pub fn snapshot(&self) -> Arc<HashMap<K, Arc<V>>> {
        self.snapshot.load_full()
    }
}

impl<K, V> Default for ConfigCache<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_get_missing_returns_none() {
        let cache: ConfigCache<String, u32> = ConfigCache::new();
        assert!(cache.get(&"absent".to_string()).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_replace_publishes_all_entries() {
        let cache = ConfigCache::new();
        cache.replace(HashMap::from([("a".to_string(), 1), ("b".to_string(), 2)]));
        assert_eq!(cache.len(), 2);
        assert_eq!(*cache.get(&"a".to_string()).unwrap(), 1);
        assert_eq!(*cache.get(&"b".to_string()).unwrap(), 2);
    }

    #[test]
    fn test_replace_drops_stale_entries() {
        let cache = ConfigCache::new();
        cache.replace(HashMap::from([("a".to_string(), 1)]));
        cache.replace(HashMap::from([("b".to_string(), 2)]));
        assert!(cache.get(&"a".to_string()).is_none());
        assert_eq!(*cache.get(&"b".to_string()).unwrap(), 2);
    }

    #[test]
    fn test_clear() {
        let cache = ConfigCache::new();
        cache.replace(HashMap::from([("a".to_string(), 1)]));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_held_entry_survives_swap() {
        let cache = ConfigCache::new();
        cache.replace(HashMap::from([("a".to_string(), 1)]));
        let held = cache.get(&"a".to_string()).unwrap();
        cache.clear();
        assert_eq!(*held, 1);
    }

    /// A reader iterating one snapshot must never see entries from two
    /// different `replace` calls mixed together. Every published generation
    /// is internally uniform, so any mixture would be observable as two
    /// distinct values inside one snapshot handle.
    #[test]
    fn test_snapshot_never_mixes_generations() {
        let cache = Arc::new(ConfigCache::new());
        let writer_cache = Arc::clone(&cache);

        let writer = thread::spawn(move || {
            for generation in 0u64..500 {
                let map: HashMap<String, u64> =
                    (0..8).map(|i| (format!("k{i}"), generation)).collect();
                writer_cache.replace(map);
            }
        });

        let mut observations = 0u32;
        while observations < 2_000 {
            let snap = cache.snapshot();
            if snap.is_empty() {
                continue;
            }
            let mut generations = snap.values().map(|v| **v);
            let first = generations.next().unwrap();
            assert!(
                generations.all(|g| g == first),
                "snapshot mixed entries from different replace() calls"
            );
            observations += 1;
        }

        writer.join().unwrap();
    }
}
