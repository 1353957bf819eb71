use std::{
    collections::HashMap,
    hash::{BuildHasher, RandomState},
    num::NonZeroUsize,
    sync::Arc,
};

use super::ResultShard;
use crate::{job::EntityId, result::TrainingResult};

pub const DEFAULT_SHARDS: NonZeroUsize = NonZeroUsize::new(64).unwrap();

/// The shared mapping from entity to its latest trained model.
///
/// Keys are spread over independent `ResultShard`s by hash, so consumers working on
/// different entities rarely contend for the same lock. Cloning a store is cheap and
/// every clone sees the same entries.
///
/// Two consumers writing the same entity concurrently resolve as last-write-wins; keeping
/// at most one in-flight job per entity is up to whoever feeds the queue.
#[derive(Debug)]
pub struct ResultStore<K: EntityId> {
    shards: Arc<[ResultShard<K>]>,
    hasher: RandomState,
}

impl<K: EntityId> Clone for ResultStore<K> {
    fn clone(&self) -> Self {
        Self {
            shards: Arc::clone(&self.shards),
            hasher: self.hasher.clone(),
        }
    }
}

impl<K: EntityId> Default for ResultStore<K> {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl<K: EntityId> ResultStore<K> {
    /// Creates a new empty `ResultStore`.
    ///
    /// # Arguments
    /// * `nshards` - The amount of independently locked buckets.
    pub fn new(nshards: NonZeroUsize) -> Self {
        let shards: Vec<_> = (0..nshards.get()).map(|_| ResultShard::new()).collect();

        Self {
            shards: Arc::from(shards),
            hasher: RandomState::new(),
        }
    }

    fn shard(&self, key: &K) -> &ResultShard<K> {
        let idx = self.hasher.hash_one(key) as usize % self.shards.len();
        &self.shards[idx]
    }

    /// Returns the latest result stored for `key`.
    pub fn get(&self, key: &K) -> Option<Arc<TrainingResult>> {
        self.shard(key).get(key)
    }

    /// Stores `result` for `key`, overwriting and returning any previous entry.
    pub fn set(&self, key: K, result: TrainingResult) -> Option<Arc<TrainingResult>> {
        self.shard(&key).insert(key, Arc::new(result))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.shard(key).contains(key)
    }

    /// Amount of entities with a stored result.
    pub fn len(&self) -> usize {
        self.shards.iter().map(ResultShard::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collects every entry into an owned map.
    ///
    /// Shards are visited one at a time, so entries written while the snapshot is being
    /// taken may or may not show up.
    pub fn snapshot(&self) -> HashMap<K, Arc<TrainingResult>> {
        let mut out = HashMap::with_capacity(self.len());
        for shard in self.shards.iter() {
            shard.extend_into(&mut out);
        }
        out
    }

    /// Consumes the store returning every result, meant to be called once all consumers
    /// have terminated.
    pub fn into_results(self) -> HashMap<K, TrainingResult> {
        self.snapshot()
            .into_iter()
            .map(|(k, v)| (k, Arc::unwrap_or_clone(v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use ndarray::Array1;

    use super::*;

    fn result_with(value: f64, nfeatures: usize) -> TrainingResult {
        let indices = (0..nfeatures).collect();
        TrainingResult::new(Array1::from_elem(nfeatures + 1, value), indices).unwrap()
    }

    #[test]
    fn test_set_overwrites_previous_result() {
        let store = ResultStore::default();

        assert!(store.set("E1", result_with(1., 2)).is_none());
        let previous = store.set("E1", result_with(2., 2)).unwrap();

        assert_eq!(previous.intercept(), 1.);
        assert_eq!(store.get(&"E1").unwrap().intercept(), 2.);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_key_yields_none() {
        let store: ResultStore<u64> = ResultStore::default();
        assert!(store.get(&42).is_none());
        assert!(!store.contains(&42));
        assert!(store.is_empty());
    }

    #[test]
    fn test_clones_share_entries() {
        let store = ResultStore::new(NonZeroUsize::new(4).unwrap());
        let clone = store.clone();

        clone.set(7u64, result_with(3., 1));
        assert_eq!(store.get(&7).unwrap().intercept(), 3.);
    }

    #[test]
    fn test_single_shard_store_keeps_every_key() {
        let store = ResultStore::new(NonZeroUsize::new(1).unwrap());
        for id in 0..100u64 {
            store.set(id, result_with(id as f64, 1));
        }

        assert_eq!(store.len(), 100);
        let results = store.into_results();
        for id in 0..100u64 {
            assert_eq!(results[&id].intercept(), id as f64);
        }
    }

    #[test]
    fn test_concurrent_writers_on_distinct_keys() {
        const WRITERS: u64 = 8;
        const KEYS_PER_WRITER: u64 = 500;

        let store = ResultStore::new(NonZeroUsize::new(16).unwrap());

        thread::scope(|s| {
            for w in 0..WRITERS {
                let store = store.clone();
                s.spawn(move || {
                    for k in 0..KEYS_PER_WRITER {
                        let key = w * KEYS_PER_WRITER + k;
                        store.set(key, result_with(key as f64, 2));
                    }
                });
            }
        });

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), (WRITERS * KEYS_PER_WRITER) as usize);
        for (key, result) in snapshot {
            assert_eq!(result.intercept(), key as f64);
        }
    }
}
