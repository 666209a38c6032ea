//! In-memory reference store.

use crate::{BatchOp, SeekDirection, Store};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// BTreeMap-backed store used for tests, light nodes and as the bottom layer
/// under the caches. Byte-ordered iteration comes for free from the map.
#[derive(Default)]
pub struct MemoryStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.read().get(key).cloned()
    }

    fn seek(&self, prefix: &[u8], direction: SeekDirection) -> Vec<(Vec<u8>, Vec<u8>)> {
        let map = self.map.read();
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if direction == SeekDirection::Backward {
            entries.reverse();
        }
        entries
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        self.map.write().insert(key, value);
    }

    fn delete(&self, key: &[u8]) {
        self.map.write().remove(key);
    }

    fn put_batch(&self, ops: Vec<BatchOp>) {
        let mut map = self.map.write();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    map.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    map.remove(&key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let store = MemoryStore::new();
        store.put(vec![1, 2], vec![3]);
        assert_eq!(store.get(&[1, 2]), Some(vec![3]));
        store.delete(&[1, 2]);
        assert_eq!(store.get(&[1, 2]), None);
    }

    #[test]
    fn seek_respects_prefix_and_order() {
        let store = MemoryStore::new();
        store.put(vec![1, 2], vec![0]);
        store.put(vec![1, 1], vec![0]);
        store.put(vec![2, 0], vec![0]);
        let forward = store.seek(&[1], SeekDirection::Forward);
        assert_eq!(
            forward.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
            vec![vec![1, 1], vec![1, 2]]
        );
        let backward = store.seek(&[1], SeekDirection::Backward);
        assert_eq!(backward[0].0, vec![1, 2]);
    }

    #[test]
    fn batch_is_applied_in_order() {
        let store = MemoryStore::new();
        store.put_batch(vec![
            BatchOp::Put {
                key: vec![9],
                value: vec![1],
            },
            BatchOp::Delete { key: vec![9] },
        ]);
        assert_eq!(store.get(&[9]), None);
    }
}
