//! The Ledger native contract: a read-only façade over stored blocks and
//! transactions, gated by the traceability window.

use super::{native_hash, NativeContract, NativeMethodMeta};
use crate::engine::ApplicationEngine;
use neonova_core::{Block, Transaction, UInt160, UInt256};
use neonova_io::Serializable;
use neonova_vm::{ReferenceCounter, StackItem, VmError, VmResult};
use num_traits::ToPrimitive;

const ID: i32 = -4;

pub struct LedgerContract {
    hash: UInt160,
    methods: Vec<NativeMethodMeta>,
}

impl LedgerContract {
    pub fn new() -> Self {
        let methods = vec![
            NativeMethodMeta::safe("currentHash", 0, 1 << 15),
            NativeMethodMeta::safe("currentIndex", 0, 1 << 15),
            NativeMethodMeta::safe("getBlock", 1, 1 << 15),
            NativeMethodMeta::safe("getTransaction", 1, 1 << 15),
            NativeMethodMeta::safe("getTransactionHeight", 1, 1 << 15),
            NativeMethodMeta::safe("getTransactionFromBlock", 2, 1 << 16),
            NativeMethodMeta::safe("getTransactionSigners", 1, 1 << 15),
            NativeMethodMeta::safe("getTransactionVMState", 1, 1 << 15),
        ];
        Self {
            hash: native_hash("LedgerContract"),
            methods,
        }
    }

    fn is_traceable(&self, engine: &ApplicationEngine, index: u32) -> bool {
        let height = engine.block_height();
        let max_traceable = engine.settings().max_traceable_blocks;
        index <= height && index + max_traceable > height
    }

    /// Interop parameters name blocks either by index or by hash.
    fn block_hash_from_item(
        &self,
        engine: &ApplicationEngine,
        item: &StackItem,
    ) -> VmResult<UInt256> {
        if let Ok(index) = item.as_int() {
            if let Some(index) = index.to_u32() {
                if index > engine.block_height() {
                    return Err(VmError::throw(format!("no block with index {index}")));
                }
                return engine
                    .snapshot()
                    .block_hash(index)
                    .ok_or_else(|| VmError::throw(format!("no block with index {index}")));
            }
        }
        let bytes = item.as_bytes()?;
        UInt256::from_slice(&bytes).map_err(|_| VmError::throw("invalid block hash"))
    }

    fn load_block(&self, engine: &ApplicationEngine, hash: &UInt256) -> Option<Block> {
        engine.snapshot().get_block(
            hash,
            engine.settings().state_root_in_header,
            engine.settings().max_transactions_per_block as usize,
        )
    }
}

impl Default for LedgerContract {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for LedgerContract {
    fn name(&self) -> &'static str {
        "LedgerContract"
    }

    fn id(&self) -> i32 {
        ID
    }

    fn hash(&self) -> UInt160 {
        self.hash
    }

    fn methods(&self) -> &[NativeMethodMeta] {
        &self.methods
    }

    /// Stores the persisting block, its header hash and its transactions.
    fn on_persist(&self, engine: &mut ApplicationEngine) -> VmResult<()> {
        let Some(block) = engine.persisting_block().cloned() else {
            return Err(VmError::invalid_operation("Ledger OnPersist without block"));
        };
        let dao = engine.snapshot();
        dao.store_block(&block);
        dao.append_header_hash(block.index(), &block.hash());
        for tx in &block.transactions {
            // VM state is recorded as NONE here and rewritten by the
            // applicator once the transaction actually executed.
            dao.store_transaction(tx, block.index(), 0x00);
            if engine.settings().p2p_sig_extensions {
                let signers: Vec<UInt160> = tx.signers.iter().map(|s| s.account).collect();
                for attr in tx.attributes_of(neonova_core::TransactionAttribute::CONFLICTS) {
                    if let neonova_core::TransactionAttribute::Conflicts { hash } = attr {
                        dao.store_conflict_record(hash, block.index(), &signers);
                    }
                }
            }
        }
        Ok(())
    }

    fn invoke(
        &self,
        engine: &mut ApplicationEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> VmResult<StackItem> {
        let rc = engine.vm().reference_counter().clone();
        match method {
            "currentHash" => {
                let (hash, _) = engine
                    .snapshot()
                    .current_block()
                    .ok_or_else(|| VmError::throw("chain is empty"))?;
                Ok(StackItem::from_bytes(hash.to_vec()))
            }
            "currentIndex" => Ok(StackItem::from_int(
                engine.snapshot().height().map(i64::from).unwrap_or(-1),
            )),
            "getBlock" => {
                let hash = self.block_hash_from_item(engine, &args[0])?;
                match self.load_block(engine, &hash) {
                    Some(block) if self.is_traceable(engine, block.index()) => {
                        block_to_item(&rc, &block)
                    }
                    _ => Ok(StackItem::Null),
                }
            }
            "getTransaction" => {
                let hash = tx_hash_arg(&args[0])?;
                match engine.snapshot().get_transaction(&hash) {
                    Some((tx, height, _)) if self.is_traceable(engine, height) => {
                        transaction_to_item(&rc, &tx)
                    }
                    _ => Ok(StackItem::Null),
                }
            }
            "getTransactionHeight" => {
                let hash = tx_hash_arg(&args[0])?;
                match engine.snapshot().get_transaction(&hash) {
                    Some((_, height, _)) if self.is_traceable(engine, height) => {
                        Ok(StackItem::from_int(height as i64))
                    }
                    _ => Ok(StackItem::from_int(-1)),
                }
            }
            "getTransactionFromBlock" => {
                let hash = self.block_hash_from_item(engine, &args[0])?;
                let index = args[1].as_index()?;
                match self.load_block(engine, &hash) {
                    Some(block) if self.is_traceable(engine, block.index()) => {
                        let tx = block
                            .transactions
                            .get(index)
                            .ok_or_else(|| VmError::throw("wrong transaction index"))?;
                        transaction_to_item(&rc, tx)
                    }
                    _ => Ok(StackItem::Null),
                }
            }
            "getTransactionSigners" => {
                let hash = tx_hash_arg(&args[0])?;
                match engine.snapshot().get_transaction(&hash) {
                    Some((tx, height, _)) if self.is_traceable(engine, height) => {
                        signers_to_item(&rc, &tx)
                    }
                    _ => Ok(StackItem::Null),
                }
            }
            "getTransactionVMState" => {
                let hash = tx_hash_arg(&args[0])?;
                match engine.snapshot().get_transaction(&hash) {
                    // NONE (0) is the answer for untraceable and unknown
                    // transactions alike.
                    Some((_, height, vm_state)) if self.is_traceable(engine, height) => {
                        Ok(StackItem::from_int(vm_state as i64))
                    }
                    _ => Ok(StackItem::from_int(0)),
                }
            }
            _ => Err(VmError::throw(format!("unknown Ledger method {method}"))),
        }
    }
}

fn tx_hash_arg(item: &StackItem) -> VmResult<UInt256> {
    let bytes = item.as_bytes()?;
    UInt256::from_slice(&bytes).map_err(|_| VmError::throw("invalid transaction hash"))
}

fn block_to_item(rc: &ReferenceCounter, block: &Block) -> VmResult<StackItem> {
    StackItem::new_array(
        rc,
        vec![
            StackItem::from_bytes(block.hash().to_vec()),
            StackItem::from_int(block.header.version as i64),
            StackItem::from_bytes(block.header.prev_hash.to_vec()),
            StackItem::from_bytes(block.header.merkle_root.to_vec()),
            StackItem::from_int(block.header.timestamp as i64),
            StackItem::from_int(num_bigint::BigInt::from(block.header.nonce)),
            StackItem::from_int(block.index() as i64),
            StackItem::from_bytes(block.header.next_consensus.to_vec()),
            StackItem::from_int(block.transactions.len() as i64),
        ],
    )
}

fn transaction_to_item(rc: &ReferenceCounter, tx: &Transaction) -> VmResult<StackItem> {
    StackItem::new_array(
        rc,
        vec![
            StackItem::from_bytes(tx.hash().to_vec()),
            StackItem::from_int(tx.version as i64),
            StackItem::from_int(tx.nonce as i64),
            StackItem::from_bytes(tx.sender().to_vec()),
            StackItem::from_int(tx.system_fee),
            StackItem::from_int(tx.network_fee),
            StackItem::from_int(tx.valid_until_block as i64),
            StackItem::from_bytes(tx.script.clone()),
        ],
    )
}

fn signers_to_item(rc: &ReferenceCounter, tx: &Transaction) -> VmResult<StackItem> {
    let mut entries = Vec::with_capacity(tx.signers.len());
    for signer in &tx.signers {
        let contracts: Vec<StackItem> = signer
            .allowed_contracts
            .iter()
            .map(|c| StackItem::from_bytes(c.to_vec()))
            .collect();
        let groups: Vec<StackItem> = signer
            .allowed_groups
            .iter()
            .map(|g| StackItem::from_bytes(g.to_vec()))
            .collect();
        entries.push(StackItem::new_array(
            rc,
            vec![
                StackItem::from_bytes(signer.to_bytes()),
                StackItem::from_bytes(signer.account.to_vec()),
                StackItem::from_int(signer.scopes.bits() as i64),
                StackItem::new_array(rc, contracts)?,
                StackItem::new_array(rc, groups)?,
                StackItem::from_int(signer.rules.len() as i64),
            ],
        )?);
    }
    StackItem::new_array(rc, entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable() {
        assert_eq!(LedgerContract::new().hash(), native_hash("LedgerContract"));
    }
}
