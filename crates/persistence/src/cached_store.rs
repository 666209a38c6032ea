//! The write-through overlay cache.

use crate::{BatchOp, SeekDirection, Store};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How an overlay entry relates to the layer below.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Tracked {
    /// Written in this layer (new or changed).
    Written(Vec<u8>),
    /// Deleted in this layer, whatever the base holds.
    Deleted,
}

/// A snapshot overlay over another [`Store`].
///
/// Overlays compose into a cons-list: per-transaction over per-block over
/// persistent base. Reads fall through to the base; writes stay in the
/// overlay until [`MemCachedStore::commit`] flattens them down one layer.
/// A clean overlay commit is a no-op thanks to the dirty flag.
pub struct MemCachedStore {
    base: Arc<dyn Store>,
    map: RwLock<BTreeMap<Vec<u8>, Tracked>>,
    dirty: AtomicBool,
}

impl MemCachedStore {
    pub fn new(base: Arc<dyn Store>) -> Self {
        Self {
            base,
            map: RwLock::new(BTreeMap::new()),
            dirty: AtomicBool::new(false),
        }
    }

    /// Stacks a fresh overlay on top of this one.
    pub fn overlay(self: &Arc<Self>) -> MemCachedStore {
        MemCachedStore::new(self.clone() as Arc<dyn Store>)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Flattens this overlay into its base as one atomic batch and clears
    /// the overlay.
    pub fn commit(&self) {
        if !self.is_dirty() {
            return;
        }
        let mut map = self.map.write();
        let ops: Vec<BatchOp> = map
            .iter()
            .map(|(key, tracked)| match tracked {
                Tracked::Written(value) => BatchOp::Put {
                    key: key.clone(),
                    value: value.clone(),
                },
                Tracked::Deleted => BatchOp::Delete { key: key.clone() },
            })
            .collect();
        self.base.put_batch(ops);
        map.clear();
        self.dirty.store(false, Ordering::Release);
    }

    /// Drops all pending writes.
    pub fn discard(&self) {
        self.map.write().clear();
        self.dirty.store(false, Ordering::Release);
    }

    /// The pending writes as a batch, without committing them.
    pub fn change_set(&self) -> Vec<BatchOp> {
        self.map
            .read()
            .iter()
            .map(|(key, tracked)| match tracked {
                Tracked::Written(value) => BatchOp::Put {
                    key: key.clone(),
                    value: value.clone(),
                },
                Tracked::Deleted => BatchOp::Delete { key: key.clone() },
            })
            .collect()
    }
}

impl Store for MemCachedStore {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.map.read().get(key) {
            Some(Tracked::Written(value)) => Some(value.clone()),
            Some(Tracked::Deleted) => None,
            None => self.base.get(key),
        }
    }

    fn seek(&self, prefix: &[u8], direction: SeekDirection) -> Vec<(Vec<u8>, Vec<u8>)> {
        let overlay = self.map.read();
        let base_entries = self.base.seek(prefix, SeekDirection::Forward);
        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = base_entries
            .into_iter()
            .map(|(k, v)| (k, Some(v)))
            .collect();
        for (key, tracked) in overlay
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match tracked {
                Tracked::Written(value) => {
                    merged.insert(key.clone(), Some(value.clone()));
                }
                Tracked::Deleted => {
                    merged.insert(key.clone(), None);
                }
            }
        }
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = merged
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect();
        if direction == SeekDirection::Backward {
            entries.reverse();
        }
        entries
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        self.map.write().insert(key, Tracked::Written(value));
        self.dirty.store(true, Ordering::Release);
    }

    fn delete(&self, key: &[u8]) {
        self.map.write().insert(key.to_vec(), Tracked::Deleted);
        self.dirty.store(true, Ordering::Release);
    }

    fn put_batch(&self, ops: Vec<BatchOp>) {
        let mut map = self.map.write();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    map.insert(key, Tracked::Written(value));
                }
                BatchOp::Delete { key } => {
                    map.insert(key, Tracked::Deleted);
                }
            }
        }
        self.dirty.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    fn layered() -> (Arc<MemoryStore>, Arc<MemCachedStore>) {
        let base = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemCachedStore::new(base.clone() as Arc<dyn Store>));
        (base, cache)
    }

    #[test]
    fn reads_fall_through() {
        let (base, cache) = layered();
        base.put(vec![1], vec![10]);
        assert_eq!(cache.get(&[1]), Some(vec![10]));
        cache.put(vec![1], vec![20]);
        assert_eq!(cache.get(&[1]), Some(vec![20]));
        assert_eq!(base.get(&[1]), Some(vec![10]));
    }

    #[test]
    fn delete_shadows_base() {
        let (base, cache) = layered();
        base.put(vec![1], vec![10]);
        cache.delete(&[1]);
        assert_eq!(cache.get(&[1]), None);
        assert!(base.contains(&[1]));
    }

    #[test]
    fn commit_flattens_one_layer() {
        let (base, cache) = layered();
        let tx_overlay = cache.overlay();
        tx_overlay.put(vec![1], vec![1]);
        tx_overlay.delete(&[2]);
        base.put(vec![2], vec![2]);
        tx_overlay.commit();
        assert_eq!(cache.get(&[1]), Some(vec![1]));
        assert_eq!(cache.get(&[2]), None);
        // Base untouched until the block layer commits.
        assert_eq!(base.get(&[1]), None);
        cache.commit();
        assert_eq!(base.get(&[1]), Some(vec![1]));
        assert_eq!(base.get(&[2]), None);
    }

    #[test]
    fn discard_drops_pending_writes() {
        let (_base, cache) = layered();
        let overlay = cache.overlay();
        overlay.put(vec![7], vec![7]);
        overlay.discard();
        overlay.commit();
        assert_eq!(cache.get(&[7]), None);
        assert!(!overlay.is_dirty());
    }

    #[test]
    fn seek_merges_layers_in_byte_order() {
        let (base, cache) = layered();
        base.put(vec![1, 1], vec![1]);
        base.put(vec![1, 3], vec![3]);
        cache.put(vec![1, 2], vec![2]);
        cache.delete(&[1, 3]);
        let keys: Vec<Vec<u8>> = cache
            .seek(&[1], SeekDirection::Forward)
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![vec![1, 1], vec![1, 2]]);
    }

    #[test]
    fn clean_commit_is_noop() {
        let (_base, cache) = layered();
        assert!(!cache.is_dirty());
        cache.commit();
        assert!(!cache.is_dirty());
    }
}
