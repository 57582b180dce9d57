//! Process-wide resolution cache for catalog lookups.
//!
//! Entries are inserted once and never evicted. Catalog entries are treated
//! as static for the lifetime of the process, so a catalog edit only becomes
//! visible after a restart.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::RwLock;

/// Narrow cache interface used by the batched resolver.
///
/// Implementations must be safe to share across concurrent requests and
/// must never block callers for longer than a single map operation.
pub trait ResolutionCache<K, V>: Send + Sync {
    /// Returns a copy of the cached value for `key`.
    fn get(&self, key: &K) -> Option<V>;

    fn contains(&self, key: &K) -> bool;

    /// Inserts `value` unless `key` is already present.
    ///
    /// Returns `true` when the value was stored.
    fn insert_if_absent(&self, key: K, value: V) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Append-only in-memory cache backed by a `HashMap`.
#[derive(Debug)]
pub struct InMemoryResolutionCache<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> InMemoryResolutionCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryResolutionCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ResolutionCache<K, V> for InMemoryResolutionCache<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    fn contains(&self, key: &K) -> bool {
        self.entries.read().contains_key(key)
    }

    fn insert_if_absent(&self, key: K, value: V) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, value);
        true
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_insert_if_absent_keeps_first_value() {
        let cache: InMemoryResolutionCache<String, u32> = InMemoryResolutionCache::new();
        assert!(cache.is_empty());

        assert!(cache.insert_if_absent("a".to_string(), 1));
        assert!(!cache.insert_if_absent("a".to_string(), 2));

        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert!(cache.contains(&"a".to_string()));
        assert!(!cache.contains(&"b".to_string()));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_population_is_consistent() {
        let cache: Arc<InMemoryResolutionCache<u32, u32>> = Arc::new(InMemoryResolutionCache::new());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move {
                for key in 0..100u32 {
                    cache.insert_if_absent(key, key * 10);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(cache.len(), 100);
        assert_eq!(cache.get(&42), Some(420));
    }
}
