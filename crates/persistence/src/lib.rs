//! Storage abstraction: an ordered key-value store with range iteration,
//! atomic batches, and layerable write-through caches.
//!
//! The applicator opens one [`MemCachedStore`] per block and a second one per
//! transaction; a transaction overlay commits into the block overlay on HALT
//! and is dropped on FAULT. The block overlay persists into the base store as
//! one atomic batch.

mod cached_store;
mod memory_store;
mod storage_key;

pub use cached_store::MemCachedStore;
pub use memory_store::MemoryStore;
pub use storage_key::{StorageItem, StorageKey};

use thiserror::Error;

/// Key prefixes partitioning the flat key space.
pub mod prefix {
    /// Blocks and transactions, keyed by hash.
    pub const DATA_EXECUTABLE: u8 = 0x01;
    /// Merkle Patricia Trie nodes.
    pub const DATA_MPT: u8 = 0x02;
    /// Header hash list batches, keyed by big-endian batch number.
    pub const IX_HEADER_HASH_LIST: u8 = 0x05;
    /// Current block pointer.
    pub const SYS_CURRENT_BLOCK: u8 = 0x0c;
    /// Current header pointer.
    pub const SYS_CURRENT_HEADER: u8 = 0x0d;
    /// Storage version record.
    pub const SYS_VERSION: u8 = 0x0f;
    /// Contract storage: `0x70 ‖ contract id LE32 ‖ user key`.
    pub const ST_STORAGE: u8 = 0x70;
    /// State roots, keyed by block height.
    pub const DATA_MPT_AUX: u8 = 0xf1;
}

/// Iteration direction for range scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    Forward,
    Backward,
}

/// One write of an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// An ordered key-value store.
///
/// All methods take `&self`; implementations guard internal state with locks
/// because readers (RPC, verification) run concurrently with the single
/// writer.
pub trait Store: Send + Sync {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    fn contains(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Entries whose key starts with `prefix`, in byte order (reversed for
    /// backward scans).
    fn seek(&self, prefix: &[u8], direction: SeekDirection) -> Vec<(Vec<u8>, Vec<u8>)>;

    fn put(&self, key: Vec<u8>, value: Vec<u8>);

    fn delete(&self, key: &[u8]);

    /// Applies `ops` atomically: readers never observe a partial batch.
    fn put_batch(&self, ops: Vec<BatchOp>);
}

/// Storage-layer errors (initialization checks live in the ledger crate).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("malformed stored value under {context}: {reason}")]
    Corrupt { context: &'static str, reason: String },
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
