use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

use crate::{job::EntityId, result::TrainingResult};

/// A single bucket of the result store.
///
/// Readers of the same bucket proceed in parallel, a writer excludes everyone else in
/// the bucket but never touches other buckets.
#[derive(Debug)]
pub struct ResultShard<K: EntityId> {
    entries: RwLock<HashMap<K, Arc<TrainingResult>>>,
}

impl<K: EntityId> Default for ResultShard<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityId> ResultShard<K> {
    /// Creates a new empty `ResultShard`.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the result stored for `key`, if any.
    pub fn get(&self, key: &K) -> Option<Arc<TrainingResult>> {
        self.entries.read().get(key).cloned()
    }

    /// Stores `result` for `key`, returning the previous entry.
    pub fn insert(&self, key: K, result: Arc<TrainingResult>) -> Option<Arc<TrainingResult>> {
        self.entries.write().insert(key, result)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Copies every entry of the shard into `out`.
    pub fn extend_into(&self, out: &mut HashMap<K, Arc<TrainingResult>>) {
        let entries = self.entries.read();
        out.extend(entries.iter().map(|(k, v)| (k.clone(), Arc::clone(v))));
    }
}
