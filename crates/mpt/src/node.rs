//! Trie node representation and canonical encoding.

use crate::{MptError, MptResult};
use neonova_core::UInt256;
use neonova_io::{BinaryWriter, MemoryReader};

const KIND_BRANCH: u8 = 0x00;
const KIND_EXTENSION: u8 = 0x01;
const KIND_LEAF: u8 = 0x02;
const KIND_HASH: u8 = 0x03;
const KIND_EMPTY: u8 = 0x04;

/// Number of branch children: one per nibble plus the terminal value slot.
pub const BRANCH_WIDTH: usize = 17;

/// One node of the trie.
///
/// `Hash` is a lazy reference to a committed node; it resolves through the
/// store on first touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Empty,
    /// Terminal value.
    Leaf(Vec<u8>),
    /// Shared nibble path prefix.
    Extension { key: Vec<u8>, next: Box<Node> },
    /// Sixteen nibble children plus the value child at index 16.
    Branch(Box<[Node; BRANCH_WIDTH]>),
    /// Reference to a committed node.
    Hash(UInt256),
}

impl Node {
    pub fn new_branch() -> Node {
        Node::Branch(Box::new(std::array::from_fn(|_| Node::Empty)))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }

    /// Hash of the canonical encoding. `Empty` has no hash; `Hash` nodes
    /// return their reference unchanged.
    pub fn hash(&self) -> Option<UInt256> {
        match self {
            Node::Empty => None,
            Node::Hash(hash) => Some(*hash),
            _ => Some(UInt256::from_array(neonova_crypto::hash256(
                &self.to_bytes(),
            ))),
        }
    }

    /// Canonical encoding: children appear as hash references, so the
    /// encoding (and therefore the hash) is independent of resolution state.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        self.write(&mut writer);
        writer.into_bytes()
    }

    fn write(&self, writer: &mut BinaryWriter) {
        match self {
            Node::Empty => writer.write_u8(KIND_EMPTY),
            Node::Leaf(value) => {
                writer.write_u8(KIND_LEAF);
                writer.write_var_bytes(value);
            }
            Node::Extension { key, next } => {
                writer.write_u8(KIND_EXTENSION);
                writer.write_var_bytes(key);
                next.write_ref(writer);
            }
            Node::Branch(children) => {
                writer.write_u8(KIND_BRANCH);
                for child in children.iter() {
                    child.write_ref(writer);
                }
            }
            Node::Hash(hash) => {
                writer.write_u8(KIND_HASH);
                writer.write_bytes(hash.as_bytes());
            }
        }
    }

    /// Writes a child as a reference: empty stays empty, anything else
    /// collapses to its hash.
    fn write_ref(&self, writer: &mut BinaryWriter) {
        match self.hash() {
            None => writer.write_u8(KIND_EMPTY),
            Some(hash) => {
                writer.write_u8(KIND_HASH);
                writer.write_bytes(hash.as_bytes());
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> MptResult<Node> {
        let mut reader = MemoryReader::new(bytes);
        let node = Self::read(&mut reader)?;
        Ok(node)
    }

    fn read(reader: &mut MemoryReader<'_>) -> MptResult<Node> {
        let corrupt = |e: neonova_io::IoError| MptError::Corrupt(e.to_string());
        let kind = reader.read_u8().map_err(corrupt)?;
        Ok(match kind {
            KIND_EMPTY => Node::Empty,
            KIND_LEAF => Node::Leaf(reader.read_var_bytes(u16::MAX as usize).map_err(corrupt)?),
            KIND_EXTENSION => {
                let key = reader.read_var_bytes(u16::MAX as usize).map_err(corrupt)?;
                let next = Self::read(reader)?;
                Node::Extension {
                    key,
                    next: Box::new(next),
                }
            }
            KIND_BRANCH => {
                let mut children = Vec::with_capacity(BRANCH_WIDTH);
                for _ in 0..BRANCH_WIDTH {
                    children.push(Self::read(reader)?);
                }
                let array: [Node; BRANCH_WIDTH] = children
                    .try_into()
                    .map_err(|_| MptError::Corrupt("branch width".into()))?;
                Node::Branch(Box::new(array))
            }
            KIND_HASH => {
                let bytes = reader.read_array::<32>().map_err(corrupt)?;
                Node::Hash(UInt256::from_array(bytes))
            }
            other => return Err(MptError::Corrupt(format!("node kind {other:#04x}"))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_resolution_independent() {
        let leaf = Node::Leaf(vec![1, 2, 3]);
        let leaf_hash = leaf.hash().unwrap();
        let resolved = Node::Extension {
            key: vec![0xa],
            next: Box::new(leaf.clone()),
        };
        let lazy = Node::Extension {
            key: vec![0xa],
            next: Box::new(Node::Hash(leaf_hash)),
        };
        assert_eq!(resolved.hash(), lazy.hash());
    }

    #[test]
    fn encoding_round_trip() {
        let mut branch = Node::new_branch();
        if let Node::Branch(children) = &mut branch {
            children[3] = Node::Hash(UInt256::from_array([7; 32]));
            children[16] = Node::Hash(UInt256::from_array([9; 32]));
        }
        let decoded = Node::from_bytes(&branch.to_bytes()).unwrap();
        assert_eq!(decoded.hash(), branch.hash());
    }

    #[test]
    fn empty_has_no_hash() {
        assert!(Node::Empty.hash().is_none());
    }
}
