//! Chunked, cache-filtered batch lookups.
//!
//! Backends that only accept a bounded id list per query are driven through
//! [`BatchedResolver`]: ids are partitioned into fixed-size chunks, ids already
//! present in the resolution cache are dropped from each chunk, and every
//! value returned by the backend is written back into the cache.

use std::future::Future;
use std::hash::Hash;

use tracing::trace;

use super::cache::ResolutionCache;

/// Values that know the key they are cached under.
pub trait Keyed {
    type Key: Clone + Eq + Hash;

    fn key(&self) -> Self::Key;
}

/// Counters describing one batched resolution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Backend lookups actually issued
    pub lookups_issued: usize,
    /// Ids skipped because the cache already held them
    pub served_from_cache: usize,
    /// Values returned by the backend
    pub fetched: usize,
}

/// Drives bounded batch lookups against a backend, filling a cache.
#[derive(Debug, Clone, Copy)]
pub struct BatchedResolver {
    batch_size: usize,
}

impl BatchedResolver {
    /// Creates a resolver issuing at most `batch_size` ids per lookup.
    ///
    /// A zero batch size is raised to one.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Splits `ids` into consecutive chunks of at most `batch_size`.
    pub fn partition<'a, K>(&self, ids: &'a [K]) -> std::slice::Chunks<'a, K> {
        ids.chunks(self.batch_size)
    }

    /// Resolves `ids` into `cache`, one `lookup` call per chunk with uncached ids.
    ///
    /// `ids` should already be distinct. Chunks are formed before cache
    /// filtering, so a partially cached chunk issues a smaller lookup and a
    /// fully cached chunk issues none. Lookups run sequentially; the first
    /// backend error aborts the pass, keeping whatever earlier chunks cached.
    ///
    /// # Errors
    /// Returns the first error produced by `lookup`.
    pub async fn resolve<V, C, F, Fut, E>(
        &self,
        ids: &[V::Key],
        cache: &C,
        mut lookup: F,
    ) -> Result<BatchStats, E>
    where
        V: Keyed,
        C: ResolutionCache<V::Key, V> + ?Sized,
        F: FnMut(Vec<V::Key>) -> Fut,
        Fut: Future<Output = Result<Vec<V>, E>>,
    {
        let mut stats = BatchStats::default();

        for chunk in self.partition(ids) {
            let pending: Vec<V::Key> = chunk
                .iter()
                .filter(|id| !cache.contains(id))
                .cloned()
                .collect();
            stats.served_from_cache += chunk.len() - pending.len();

            if pending.is_empty() {
                continue;
            }

            trace!(chunk_len = chunk.len(), pending = pending.len(), "Issuing batch lookup");
            stats.lookups_issued += 1;

            for value in lookup(pending).await? {
                stats.fetched += 1;
                cache.insert_if_absent(value.key(), value);
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Mutex;

    use proptest::prelude::*;

    use super::*;
    use crate::catalog::cache::InMemoryResolutionCache;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry(u32);

    impl Keyed for Entry {
        type Key = u32;

        fn key(&self) -> u32 {
            self.0
        }
    }

    async fn run(
        resolver: BatchedResolver,
        ids: &[u32],
        cache: &InMemoryResolutionCache<u32, Entry>,
    ) -> (BatchStats, Vec<Vec<u32>>) {
        let calls = Mutex::new(Vec::new());
        let stats = resolver
            .resolve(ids, cache, |chunk: Vec<u32>| {
                calls.lock().unwrap().push(chunk.clone());
                async move { Ok::<_, Infallible>(chunk.into_iter().map(Entry).collect::<Vec<_>>()) }
            })
            .await
            .unwrap();
        (stats, calls.into_inner().unwrap())
    }

    #[tokio::test]
    async fn test_twenty_three_ids_issue_three_chunks() {
        let ids: Vec<u32> = (0..23).collect();
        let cache = InMemoryResolutionCache::new();

        let (stats, calls) = run(BatchedResolver::new(10), &ids, &cache).await;

        let sizes: Vec<usize> = calls.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 3]);
        assert_eq!(stats.lookups_issued, 3);
        assert_eq!(stats.fetched, 23);
        assert_eq!(cache.len(), 23);
    }

    #[tokio::test]
    async fn test_cached_ids_filtered_from_chunks() {
        let ids: Vec<u32> = (0..23).collect();
        let cache = InMemoryResolutionCache::new();
        // First chunk fully cached, second chunk partially
        for id in (0..10).chain(10..13) {
            cache.insert_if_absent(id, Entry(id));
        }

        let (stats, calls) = run(BatchedResolver::new(10), &ids, &cache).await;

        assert_eq!(calls, vec![(13..20).collect::<Vec<_>>(), vec![20, 21, 22]]);
        assert_eq!(stats.served_from_cache, 13);
        assert_eq!(stats.lookups_issued, 2);
    }

    #[tokio::test]
    async fn test_second_pass_is_served_entirely_from_cache() {
        let ids: Vec<u32> = (0..15).collect();
        let cache = InMemoryResolutionCache::new();
        let resolver = BatchedResolver::new(10);

        run(resolver, &ids, &cache).await;
        let (stats, calls) = run(resolver, &ids, &cache).await;

        assert!(calls.is_empty());
        assert_eq!(stats.served_from_cache, 15);
    }

    #[tokio::test]
    async fn test_lookup_error_stops_pass() {
        let ids: Vec<u32> = (0..25).collect();
        let cache: InMemoryResolutionCache<u32, Entry> = InMemoryResolutionCache::new();
        let mut call = 0;

        let result = BatchedResolver::new(10)
            .resolve(&ids, &cache, |chunk: Vec<u32>| {
                call += 1;
                let fail = call == 2;
                async move {
                    if fail {
                        Err("backend down")
                    } else {
                        Ok(chunk.into_iter().map(Entry).collect::<Vec<_>>())
                    }
                }
            })
            .await;

        assert_eq!(result, Err("backend down"));
        assert_eq!(call, 2);
        assert_eq!(cache.len(), 10);
    }

    #[test]
    fn test_zero_batch_size_raised_to_one() {
        let resolver = BatchedResolver::new(0);
        assert_eq!(resolver.batch_size(), 1);
        assert_eq!(resolver.partition(&[1, 2, 3]).count(), 3);
    }

    proptest! {
        #[test]
        fn prop_each_uncached_id_requested_once(
            ids in proptest::collection::btree_set(0u32..500, 0..80),
            cached in proptest::collection::btree_set(0u32..500, 0..40),
            batch_size in 1usize..15,
        ) {
            let ids: Vec<u32> = ids.into_iter().collect();
            let cache = InMemoryResolutionCache::new();
            for id in &cached {
                cache.insert_if_absent(*id, Entry(*id));
            }

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (_, calls) = runtime.block_on(run(BatchedResolver::new(batch_size), &ids, &cache));

            let mut requested: Vec<u32> = calls.iter().flatten().copied().collect();
            prop_assert!(calls.iter().all(|c| !c.is_empty() && c.len() <= batch_size));
            requested.sort_unstable();
            let expected: Vec<u32> = ids.iter().copied().filter(|id| !cached.contains(id)).collect();
            prop_assert_eq!(requested, expected);
        }
    }
}
