//! Typed data-access facade over the flat key-value store.
//!
//! A `Dao` wraps one storage layer (base store, block overlay or transaction
//! overlay); commit and discard are operations of the underlying
//! [`neonova_persistence::MemCachedStore`], not of the facade.

use neonova_core::{Block, Transaction, UInt160, UInt256};
use neonova_io::{BinaryWriter, MemoryReader, Serializable};
use neonova_mpt::StateRoot;
use neonova_persistence::{prefix, SeekDirection, StorageKey, Store};
use std::sync::Arc;

const RECORD_BLOCK: u8 = 0x00;
const RECORD_TRANSACTION: u8 = 0x01;
const RECORD_CONFLICT: u8 = 0x02;

/// Version-record flag bits; a mismatch between the stored byte and the
/// running configuration is fatal at startup.
pub mod version_flags {
    pub const STATE_ROOT_IN_HEADER: u8 = 0b0000_0001;
    pub const P2P_SIG_EXTENSIONS: u8 = 0b0000_0010;
    pub const P2P_STATE_EXCHANGE: u8 = 0b0000_0100;
    pub const KEEP_ONLY_LATEST_STATE: u8 = 0b0000_1000;
}

#[derive(Clone)]
pub struct Dao {
    store: Arc<dyn Store>,
}

impl Dao {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    // ---- version ---------------------------------------------------------

    pub fn put_version(&self, version: &str, flags: u8) {
        let mut value = version.as_bytes().to_vec();
        value.push(flags);
        self.store.put(vec![prefix::SYS_VERSION], value);
    }

    pub fn get_version(&self) -> Option<(String, u8)> {
        let value = self.store.get(&[prefix::SYS_VERSION])?;
        let (version, flags) = value.split_at(value.len().checked_sub(1)?);
        Some((String::from_utf8(version.to_vec()).ok()?, flags[0]))
    }

    // ---- chain pointers --------------------------------------------------

    pub fn put_current_block(&self, hash: &UInt256, index: u32) {
        let mut value = hash.to_vec();
        value.extend_from_slice(&index.to_le_bytes());
        self.store.put(vec![prefix::SYS_CURRENT_BLOCK], value);
    }

    pub fn current_block(&self) -> Option<(UInt256, u32)> {
        let value = self.store.get(&[prefix::SYS_CURRENT_BLOCK])?;
        parse_pointer(&value)
    }

    pub fn put_current_header(&self, hash: &UInt256, index: u32) {
        let mut value = hash.to_vec();
        value.extend_from_slice(&index.to_le_bytes());
        self.store.put(vec![prefix::SYS_CURRENT_HEADER], value);
    }

    pub fn current_header(&self) -> Option<(UInt256, u32)> {
        let value = self.store.get(&[prefix::SYS_CURRENT_HEADER])?;
        parse_pointer(&value)
    }

    /// Height of the persisted chain; `None` before genesis.
    pub fn height(&self) -> Option<u32> {
        self.current_block().map(|(_, index)| index)
    }

    // ---- header hash list ------------------------------------------------

    /// Appends a block hash to its batch of the header hash list.
    pub fn append_header_hash(&self, index: u32, hash: &UInt256) {
        let batch = index as usize / neonova_config::HEADER_HASH_BATCH;
        let key = header_batch_key(batch as u32);
        let mut value = self.store.get(&key).unwrap_or_default();
        value.extend_from_slice(hash.as_bytes());
        self.store.put(key, value);
    }

    pub fn block_hash(&self, index: u32) -> Option<UInt256> {
        let batch = index as usize / neonova_config::HEADER_HASH_BATCH;
        let offset = (index as usize % neonova_config::HEADER_HASH_BATCH) * UInt256::SIZE;
        let value = self.store.get(&header_batch_key(batch as u32))?;
        let bytes = value.get(offset..offset + UInt256::SIZE)?;
        UInt256::from_slice(bytes).ok()
    }

    /// Number of hashes stored in a batch; used by the startup contiguity
    /// check.
    pub fn header_batch_len(&self, batch: u32) -> Option<usize> {
        self.store
            .get(&header_batch_key(batch))
            .map(|v| v.len() / UInt256::SIZE)
    }

    // ---- blocks ----------------------------------------------------------

    pub fn store_block(&self, block: &Block) {
        let mut value = vec![RECORD_BLOCK];
        value.extend_from_slice(&block.to_bytes());
        self.store.put(executable_key(&block.hash()), value);
    }

    pub fn get_block(
        &self,
        hash: &UInt256,
        state_root_in_header: bool,
        max_transactions: usize,
    ) -> Option<Block> {
        let value = self.store.get(&executable_key(hash))?;
        if value.first() != Some(&RECORD_BLOCK) {
            return None;
        }
        Block::from_bytes(&value[1..], state_root_in_header, max_transactions).ok()
    }

    pub fn delete_block(&self, hash: &UInt256) {
        self.store.delete(&executable_key(hash));
    }

    // ---- transactions ----------------------------------------------------

    pub fn store_transaction(&self, tx: &Transaction, height: u32, vm_state: u8) {
        let mut value = vec![RECORD_TRANSACTION, vm_state];
        value.extend_from_slice(&height.to_le_bytes());
        value.extend_from_slice(&tx.to_bytes());
        self.store.put(executable_key(&tx.hash()), value);
    }

    /// Returns `(transaction, height, vm state byte)`.
    pub fn get_transaction(&self, hash: &UInt256) -> Option<(Transaction, u32, u8)> {
        let value = self.store.get(&executable_key(hash))?;
        if value.first() != Some(&RECORD_TRANSACTION) || value.len() < 6 {
            return None;
        }
        let vm_state = value[1];
        let height = u32::from_le_bytes(value[2..6].try_into().ok()?);
        let tx = Transaction::from_bytes(&value[6..]).ok()?;
        Some((tx, height, vm_state))
    }

    pub fn contains_transaction(&self, hash: &UInt256) -> bool {
        self.store
            .get(&executable_key(hash))
            .map(|v| v.first() == Some(&RECORD_TRANSACTION))
            .unwrap_or(false)
    }

    pub fn delete_transaction(&self, hash: &UInt256) {
        self.store.delete(&executable_key(hash));
    }

    // ---- conflict stubs --------------------------------------------------

    /// Records that an on-chain transaction at `height` declared a conflict
    /// with `hash`, remembering its fee-paying signers.
    pub fn store_conflict_record(&self, hash: &UInt256, height: u32, signers: &[UInt160]) {
        let mut writer = BinaryWriter::new();
        writer.write_u8(RECORD_CONFLICT);
        writer.write_u32(height);
        writer.write_var_int(signers.len() as u64);
        for signer in signers {
            signer.serialize(&mut writer).expect("fixed width");
        }
        self.store.put(executable_key(hash), writer.into_bytes());
    }

    /// Returns `(height, signers)` of a conflict record, if one exists.
    pub fn get_conflict_record(&self, hash: &UInt256) -> Option<(u32, Vec<UInt160>)> {
        let value = self.store.get(&executable_key(hash))?;
        if value.first() != Some(&RECORD_CONFLICT) {
            return None;
        }
        let mut reader = MemoryReader::new(&value[1..]);
        let height = reader.read_u32().ok()?;
        let count = reader
            .read_var_int(neonova_config::MAX_TRANSACTION_SIGNERS as u64)
            .ok()? as usize;
        let mut signers = Vec::with_capacity(count);
        for _ in 0..count {
            signers.push(UInt160::deserialize(&mut reader).ok()?);
        }
        Some((height, signers))
    }

    // ---- state roots -----------------------------------------------------

    pub fn put_state_root(&self, root: &StateRoot) {
        self.store
            .put(state_root_key(root.index), root.to_bytes());
    }

    pub fn get_state_root(&self, index: u32) -> Option<StateRoot> {
        let value = self.store.get(&state_root_key(index))?;
        StateRoot::from_bytes(&value).ok()
    }

    pub fn delete_state_root(&self, index: u32) {
        self.store.delete(&state_root_key(index));
    }

    // ---- contract storage ------------------------------------------------

    pub fn get_storage(&self, key: &StorageKey) -> Option<Vec<u8>> {
        self.store.get(&key.to_store_key())
    }

    pub fn put_storage(&self, key: &StorageKey, value: Vec<u8>) {
        self.store.put(key.to_store_key(), value);
    }

    pub fn delete_storage(&self, key: &StorageKey) {
        self.store.delete(&key.to_store_key());
    }

    /// Entries of a contract whose user key starts with `key_prefix`.
    pub fn find_storage(
        &self,
        id: i32,
        key_prefix: &[u8],
        backwards: bool,
    ) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut seek_prefix = StorageKey::contract_prefix(id);
        seek_prefix.extend_from_slice(key_prefix);
        let direction = if backwards {
            SeekDirection::Backward
        } else {
            SeekDirection::Forward
        };
        self.store
            .seek(&seek_prefix, direction)
            .into_iter()
            .filter_map(|(key, value)| {
                StorageKey::from_store_key(&key).map(|sk| (sk.key, value))
            })
            .collect()
    }
}

fn executable_key(hash: &UInt256) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(prefix::DATA_EXECUTABLE);
    key.extend_from_slice(hash.as_bytes());
    key
}

fn header_batch_key(batch: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(5);
    key.push(prefix::IX_HEADER_HASH_LIST);
    key.extend_from_slice(&batch.to_be_bytes());
    key
}

fn state_root_key(index: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(5);
    key.push(prefix::DATA_MPT_AUX);
    key.extend_from_slice(&index.to_be_bytes());
    key
}

fn parse_pointer(value: &[u8]) -> Option<(UInt256, u32)> {
    if value.len() != UInt256::SIZE + 4 {
        return None;
    }
    let hash = UInt256::from_slice(&value[..UInt256::SIZE]).ok()?;
    let index = u32::from_le_bytes(value[UInt256::SIZE..].try_into().ok()?);
    Some((hash, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use neonova_core::{Signer, Witness};
    use neonova_persistence::MemoryStore;

    fn dao() -> Dao {
        Dao::new(Arc::new(MemoryStore::new()))
    }

    fn sample_tx() -> Transaction {
        Transaction {
            version: 0,
            nonce: 5,
            system_fee: 100,
            network_fee: 200,
            valid_until_block: 99,
            signers: vec![Signer::called_by_entry(UInt160::from_array([1; 20]))],
            attributes: vec![],
            script: vec![0x11],
            witnesses: vec![Witness::default()],
        }
    }

    #[test]
    fn transaction_round_trip_with_metadata() {
        let dao = dao();
        let tx = sample_tx();
        dao.store_transaction(&tx, 12, 0x01);
        let (loaded, height, state) = dao.get_transaction(&tx.hash()).unwrap();
        assert_eq!(loaded, tx);
        assert_eq!(height, 12);
        assert_eq!(state, 0x01);
        assert!(dao.contains_transaction(&tx.hash()));
    }

    #[test]
    fn header_hash_list_indexing() {
        let dao = dao();
        for i in 0..5u32 {
            dao.append_header_hash(i, &UInt256::from_array([i as u8; 32]));
        }
        assert_eq!(dao.block_hash(3), Some(UInt256::from_array([3; 32])));
        assert_eq!(dao.block_hash(9), None);
        assert_eq!(dao.header_batch_len(0), Some(5));
    }

    #[test]
    fn conflict_records_do_not_masquerade_as_transactions() {
        let dao = dao();
        let hash = UInt256::from_array([9; 32]);
        dao.store_conflict_record(&hash, 7, &[UInt160::from_array([1; 20])]);
        assert!(!dao.contains_transaction(&hash));
        let (height, signers) = dao.get_conflict_record(&hash).unwrap();
        assert_eq!(height, 7);
        assert_eq!(signers.len(), 1);
    }

    #[test]
    fn chain_pointers() {
        let dao = dao();
        assert_eq!(dao.height(), None);
        dao.put_current_block(&UInt256::from_array([1; 32]), 10);
        assert_eq!(dao.height(), Some(10));
        assert_eq!(dao.current_block().unwrap().1, 10);
    }

    #[test]
    fn storage_find_respects_prefix() {
        let dao = dao();
        dao.put_storage(&StorageKey::new(1, vec![1, 1]), vec![0xa]);
        dao.put_storage(&StorageKey::new(1, vec![1, 2]), vec![0xb]);
        dao.put_storage(&StorageKey::new(1, vec![2, 0]), vec![0xc]);
        dao.put_storage(&StorageKey::new(2, vec![1, 0]), vec![0xd]);
        let found = dao.find_storage(1, &[1], false);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, vec![1, 1]);
    }
}
