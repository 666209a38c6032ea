//! Trie operations over a backing store.

use crate::node::{Node, BRANCH_WIDTH};
use crate::{common_prefix, to_nibbles, MptError, MptResult};
use neonova_core::UInt256;
use neonova_persistence::{prefix, Store};
use std::sync::Arc;

const VALUE_SLOT: usize = BRANCH_WIDTH - 1;

/// A view of the trie at one root, supporting copy-on-write mutation.
///
/// With `full_state` set the store retains every committed root, so commits
/// only add references; without it the trie keeps the latest state only and
/// dereferences nodes bypassed by each commit.
pub struct Trie {
    root: Node,
    store: Arc<dyn Store>,
    full_state: bool,
    /// Committed nodes whose parent on the mutation path was rewritten.
    removed: Vec<UInt256>,
}

impl Trie {
    pub fn new(root: Option<UInt256>, store: Arc<dyn Store>, full_state: bool) -> Self {
        Self {
            root: match root {
                Some(hash) => Node::Hash(hash),
                None => Node::Empty,
            },
            store,
            full_state,
            removed: Vec::new(),
        }
    }

    /// Root hash of the current (possibly uncommitted) state.
    pub fn root_hash(&self) -> Option<UInt256> {
        self.root.hash()
    }

    fn node_key(hash: &UInt256) -> Vec<u8> {
        let mut key = Vec::with_capacity(33);
        key.push(prefix::DATA_MPT);
        key.extend_from_slice(hash.as_bytes());
        key
    }

    fn resolve(&self, hash: &UInt256) -> MptResult<Node> {
        let stored = self
            .store
            .get(&Self::node_key(hash))
            .ok_or(MptError::MissingNode(*hash))?;
        if stored.len() < 4 {
            return Err(MptError::Corrupt("missing refcount suffix".into()));
        }
        Node::from_bytes(&stored[..stored.len() - 4])
    }

    // ---- reads -----------------------------------------------------------

    pub fn get(&self, key: &[u8]) -> MptResult<Option<Vec<u8>>> {
        let path = to_nibbles(key);
        self.get_from(&self.root, &path)
    }

    fn get_from(&self, node: &Node, path: &[u8]) -> MptResult<Option<Vec<u8>>> {
        match node {
            Node::Empty => Ok(None),
            Node::Leaf(value) => {
                if path.is_empty() {
                    Ok(Some(value.clone()))
                } else {
                    Ok(None)
                }
            }
            Node::Extension { key, next } => {
                if path.len() >= key.len() && path[..key.len()] == key[..] {
                    self.get_from(next, &path[key.len()..])
                } else {
                    Ok(None)
                }
            }
            Node::Branch(children) => {
                if path.is_empty() {
                    self.get_from(&children[VALUE_SLOT], &[])
                } else {
                    self.get_from(&children[path[0] as usize], &path[1..])
                }
            }
            Node::Hash(hash) => {
                let resolved = self.resolve(hash)?;
                self.get_from(&resolved, path)
            }
        }
    }

    // ---- writes ----------------------------------------------------------

    pub fn put(&mut self, key: &[u8], value: Vec<u8>) -> MptResult<()> {
        let path = to_nibbles(key);
        let root = std::mem::replace(&mut self.root, Node::Empty);
        self.root = self.put_into(root, &path, value)?;
        Ok(())
    }

    fn put_into(&mut self, node: Node, path: &[u8], value: Vec<u8>) -> MptResult<Node> {
        match node {
            Node::Empty => Ok(wrap_path(path, Node::Leaf(value))),
            Node::Leaf(old) => {
                if path.is_empty() {
                    return Ok(Node::Leaf(value));
                }
                // The old value terminates here; the new one forks deeper.
                let mut branch = Node::new_branch();
                if let Node::Branch(children) = &mut branch {
                    children[VALUE_SLOT] = Node::Leaf(old);
                    children[path[0] as usize] = wrap_path(&path[1..], Node::Leaf(value));
                }
                Ok(branch)
            }
            Node::Branch(mut children) => {
                if path.is_empty() {
                    children[VALUE_SLOT] = Node::Leaf(value);
                } else {
                    let index = path[0] as usize;
                    let child = std::mem::replace(&mut children[index], Node::Empty);
                    children[index] = self.put_into(child, &path[1..], value)?;
                }
                Ok(Node::Branch(children))
            }
            Node::Extension { key, next } => {
                let lcp = common_prefix(&key, path);
                if lcp == key.len() {
                    let next = self.put_into(*next, &path[lcp..], value)?;
                    return Ok(Node::Extension {
                        key,
                        next: Box::new(next),
                    });
                }
                // Split the extension at the divergence point.
                let mut branch = Node::new_branch();
                if let Node::Branch(children) = &mut branch {
                    let existing_index = key[lcp] as usize;
                    children[existing_index] = wrap_path(&key[lcp + 1..], *next);
                    if path.len() == lcp {
                        children[VALUE_SLOT] = Node::Leaf(value);
                    } else {
                        children[path[lcp] as usize] =
                            wrap_path(&path[lcp + 1..], Node::Leaf(value));
                    }
                }
                Ok(wrap_path(&path[..lcp.min(path.len())], branch))
            }
            Node::Hash(hash) => {
                let resolved = self.resolve(&hash)?;
                self.removed.push(hash);
                self.put_into(resolved, path, value)
            }
        }
    }

    pub fn delete(&mut self, key: &[u8]) -> MptResult<()> {
        let path = to_nibbles(key);
        let root = std::mem::replace(&mut self.root, Node::Empty);
        self.root = self.delete_from(root, &path)?;
        Ok(())
    }

    fn delete_from(&mut self, node: Node, path: &[u8]) -> MptResult<Node> {
        match node {
            Node::Empty => Ok(Node::Empty),
            Node::Leaf(value) => {
                if path.is_empty() {
                    Ok(Node::Empty)
                } else {
                    Ok(Node::Leaf(value))
                }
            }
            Node::Extension { key, next } => {
                if path.len() >= key.len() && path[..key.len()] == key[..] {
                    let next = self.delete_from(*next, &path[key.len()..])?;
                    Ok(self.normalize_extension(key, next)?)
                } else {
                    Ok(Node::Extension { key, next })
                }
            }
            Node::Branch(mut children) => {
                if path.is_empty() {
                    children[VALUE_SLOT] = Node::Empty;
                } else {
                    let index = path[0] as usize;
                    let child = std::mem::replace(&mut children[index], Node::Empty);
                    children[index] = self.delete_from(child, &path[1..])?;
                }
                self.collapse_branch(children)
            }
            Node::Hash(hash) => {
                let resolved = self.resolve(&hash)?;
                self.removed.push(hash);
                self.delete_from(resolved, path)
            }
        }
    }

    /// Canonicalizes an extension: merges nested extensions, drops empty
    /// tails, and keeps leaves wrapped.
    fn normalize_extension(&mut self, key: Vec<u8>, next: Node) -> MptResult<Node> {
        match next {
            Node::Empty => Ok(Node::Empty),
            Node::Extension {
                key: inner_key,
                next: inner_next,
            } => {
                let mut merged = key;
                merged.extend_from_slice(&inner_key);
                Ok(Node::Extension {
                    key: merged,
                    next: inner_next,
                })
            }
            Node::Hash(hash) => {
                // Resolve to decide whether a merge is required; an
                // unresolved extension child could hide another extension.
                let resolved = self.resolve(&hash)?;
                if matches!(resolved, Node::Extension { .. }) {
                    self.removed.push(hash);
                    self.normalize_extension(key, resolved)
                } else {
                    Ok(Node::Extension {
                        key,
                        next: Box::new(Node::Hash(hash)),
                    })
                }
            }
            other => Ok(Node::Extension {
                key,
                next: Box::new(other),
            }),
        }
    }

    /// Collapses a branch left with at most one child into its canonical
    /// smaller form.
    fn collapse_branch(&mut self, mut children: Box<[Node; BRANCH_WIDTH]>) -> MptResult<Node> {
        let occupied: Vec<usize> = (0..BRANCH_WIDTH)
            .filter(|i| !children[*i].is_empty())
            .collect();
        match occupied.len() {
            0 => Ok(Node::Empty),
            1 => {
                let index = occupied[0];
                let child = std::mem::replace(&mut children[index], Node::Empty);
                if index == VALUE_SLOT {
                    // Only the terminal value remains: the branch position
                    // itself is the key.
                    Ok(child)
                } else {
                    self.normalize_extension(vec![index as u8], child)
                }
            }
            _ => Ok(Node::Branch(children)),
        }
    }

    // ---- commit & GC -----------------------------------------------------

    /// Writes every materialized node to the store with reference-count
    /// accounting and collapses the in-memory tree to a hash reference.
    pub fn commit(&mut self) -> MptResult<Option<UInt256>> {
        let root = std::mem::replace(&mut self.root, Node::Empty);
        self.root = self.commit_node(root, true)?;
        if !self.full_state {
            let removed = std::mem::take(&mut self.removed);
            for hash in removed {
                self.deref_node(&hash)?;
            }
        } else {
            self.removed.clear();
        }
        Ok(self.root.hash())
    }

    fn commit_node(&mut self, node: Node, is_root: bool) -> MptResult<Node> {
        match node {
            Node::Empty => Ok(Node::Empty),
            Node::Hash(hash) => {
                if !is_root {
                    // A new parent took a reference to this committed node.
                    self.incr_ref(&hash)?;
                }
                Ok(Node::Hash(hash))
            }
            Node::Leaf(value) => self.store_node(Node::Leaf(value)),
            Node::Extension { key, next } => {
                let next = self.commit_node(*next, false)?;
                self.store_node(Node::Extension {
                    key,
                    next: Box::new(next),
                })
            }
            Node::Branch(mut children) => {
                for slot in children.iter_mut() {
                    let child = std::mem::replace(slot, Node::Empty);
                    *slot = self.commit_node(child, false)?;
                }
                self.store_node(Node::Branch(children))
            }
        }
    }

    fn store_node(&mut self, node: Node) -> MptResult<Node> {
        let bytes = node.to_bytes();
        let hash = node.hash().expect("materialized nodes always hash");
        let key = Self::node_key(&hash);
        match self.store.get(&key) {
            Some(mut stored) => {
                let count = read_count(&stored)? + 1;
                let len = stored.len();
                stored[len - 4..].copy_from_slice(&count.to_le_bytes());
                self.store.put(key, stored);
            }
            None => {
                let mut stored = bytes;
                stored.extend_from_slice(&1u32.to_le_bytes());
                self.store.put(key, stored);
            }
        }
        Ok(Node::Hash(hash))
    }

    fn incr_ref(&mut self, hash: &UInt256) -> MptResult<()> {
        let key = Self::node_key(hash);
        let mut stored = self
            .store
            .get(&key)
            .ok_or(MptError::MissingNode(*hash))?;
        let count = read_count(&stored)? + 1;
        let len = stored.len();
        stored[len - 4..].copy_from_slice(&count.to_le_bytes());
        self.store.put(key, stored);
        Ok(())
    }

    fn deref_node(&mut self, hash: &UInt256) -> MptResult<()> {
        let key = Self::node_key(hash);
        let Some(mut stored) = self.store.get(&key) else {
            return Ok(());
        };
        let count = read_count(&stored)?;
        if count > 1 {
            let len = stored.len();
            stored[len - 4..].copy_from_slice(&(count - 1).to_le_bytes());
            self.store.put(key, stored);
            return Ok(());
        }
        let node = Node::from_bytes(&stored[..stored.len() - 4])?;
        self.store.delete(&key);
        match node {
            Node::Extension { next, .. } => {
                if let Node::Hash(child) = *next {
                    self.deref_node(&child)?;
                }
            }
            Node::Branch(children) => {
                for child in children.iter() {
                    if let Node::Hash(child) = child {
                        self.deref_node(child)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Dereferences an entire historic root, pruning nodes that fall to
    /// zero. Used when a block leaves the traceable window.
    pub fn release_root(store: &Arc<dyn Store>, root: UInt256) -> MptResult<()> {
        let mut trie = Trie::new(None, store.clone(), true);
        trie.deref_node(&root)
    }
}

fn read_count(stored: &[u8]) -> MptResult<u32> {
    if stored.len() < 4 {
        return Err(MptError::Corrupt("missing refcount suffix".into()));
    }
    let bytes: [u8; 4] = stored[stored.len() - 4..].try_into().unwrap();
    Ok(u32::from_le_bytes(bytes))
}

/// Wraps `node` under an extension for `path`, avoiding empty-key
/// extensions.
fn wrap_path(path: &[u8], node: Node) -> Node {
    if path.is_empty() {
        node
    } else {
        Node::Extension {
            key: path.to_vec(),
            next: Box::new(node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neonova_persistence::MemoryStore;

    fn new_trie(full: bool) -> Trie {
        Trie::new(None, Arc::new(MemoryStore::new()) as Arc<dyn Store>, full)
    }

    #[test]
    fn put_get_round_trip() {
        let mut trie = new_trie(false);
        trie.put(b"alpha", vec![1]).unwrap();
        trie.put(b"alpine", vec![2]).unwrap();
        trie.put(b"beta", vec![3]).unwrap();
        assert_eq!(trie.get(b"alpha").unwrap(), Some(vec![1]));
        assert_eq!(trie.get(b"alpine").unwrap(), Some(vec![2]));
        assert_eq!(trie.get(b"beta").unwrap(), Some(vec![3]));
        assert_eq!(trie.get(b"missing").unwrap(), None);
    }

    #[test]
    fn overwrite_updates_value() {
        let mut trie = new_trie(false);
        trie.put(b"key", vec![1]).unwrap();
        trie.put(b"key", vec![2]).unwrap();
        assert_eq!(trie.get(b"key").unwrap(), Some(vec![2]));
    }

    #[test]
    fn root_hash_is_content_addressed() {
        let mut a = new_trie(false);
        a.put(b"x", vec![1]).unwrap();
        a.put(b"y", vec![2]).unwrap();
        let mut b = new_trie(false);
        b.put(b"y", vec![2]).unwrap();
        b.put(b"x", vec![1]).unwrap();
        assert_eq!(a.root_hash(), b.root_hash());
    }

    #[test]
    fn insert_then_delete_restores_prior_root() {
        let mut trie = new_trie(false);
        trie.put(b"alpha", vec![1]).unwrap();
        trie.put(b"beta", vec![2]).unwrap();
        let before = trie.root_hash();
        trie.put(b"gamma", vec![3]).unwrap();
        assert_ne!(trie.root_hash(), before);
        trie.delete(b"gamma").unwrap();
        assert_eq!(trie.root_hash(), before);
    }

    #[test]
    fn delete_missing_key_is_noop() {
        let mut trie = new_trie(false);
        trie.put(b"alpha", vec![1]).unwrap();
        let before = trie.root_hash();
        trie.delete(b"omega").unwrap();
        assert_eq!(trie.root_hash(), before);
    }

    #[test]
    fn survives_commit_and_reload() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        let root = {
            let mut trie = Trie::new(None, store.clone(), true);
            trie.put(b"alpha", vec![1]).unwrap();
            trie.put(b"alpine", vec![2]).unwrap();
            trie.commit().unwrap().unwrap()
        };
        let trie = Trie::new(Some(root), store, true);
        assert_eq!(trie.get(b"alpha").unwrap(), Some(vec![1]));
        assert_eq!(trie.get(b"alpine").unwrap(), Some(vec![2]));
    }

    #[test]
    fn commit_after_mutation_keeps_history_roots_readable() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        let mut trie = Trie::new(None, store.clone(), true);
        trie.put(b"k1", vec![1]).unwrap();
        let root1 = trie.commit().unwrap().unwrap();
        trie.put(b"k2", vec![2]).unwrap();
        let root2 = trie.commit().unwrap().unwrap();
        let old = Trie::new(Some(root1), store.clone(), true);
        assert_eq!(old.get(b"k1").unwrap(), Some(vec![1]));
        assert_eq!(old.get(b"k2").unwrap(), None);
        let new = Trie::new(Some(root2), store, true);
        assert_eq!(new.get(b"k2").unwrap(), Some(vec![2]));
    }

    #[test]
    fn release_root_prunes_unshared_nodes() {
        let store = Arc::new(MemoryStore::new()) as Arc<dyn Store>;
        let mut trie = Trie::new(None, store.clone(), true);
        trie.put(b"k1", vec![1]).unwrap();
        let root1 = trie.commit().unwrap().unwrap();
        trie.put(b"k2", vec![2]).unwrap();
        let root2 = trie.commit().unwrap().unwrap();
        Trie::release_root(&store, root1).unwrap();
        let survivor = Trie::new(Some(root2), store.clone(), true);
        assert_eq!(survivor.get(b"k1").unwrap(), Some(vec![1]));
        assert_eq!(survivor.get(b"k2").unwrap(), Some(vec![2]));
        let gone = Trie::new(Some(root1), store, true);
        assert!(gone.get(b"k1").is_err());
    }
}
