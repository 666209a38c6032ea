//! The single-writer chain state machine.

use crate::{AppExecResult, BlockchainError, InitError, MemPool, Subscriptions};
use neonova_config::{ProtocolSettings, STORAGE_VERSION};
use neonova_contract::dao::version_flags;
use neonova_contract::native::{native_contract_state, NativeContract, NativeRegistry};
use neonova_contract::{ApplicationEngine, Dao, TriggerType};
use neonova_core::{merkle_root, Block, Header, UInt160, UInt256, Witness};
use neonova_mpt::{StateRoot, Trie};
use neonova_persistence::{prefix, BatchOp, MemCachedStore, Store};
use neonova_vm::{CallFlags, ScriptBuilder, VmState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const MEMPOOL_CAPACITY: usize = 50_000;
const GENESIS_TIMESTAMP: u64 = 1_468_595_301_000;
const GENESIS_NONCE: u64 = 2_083_236_893;

/// Owns the persistent store and drives block commitment. Readers
/// (verification, RPC, subscribers) run against committed state while the
/// applicator works in an overlay.
pub struct Blockchain {
    store: Arc<dyn Store>,
    settings: Arc<ProtocolSettings>,
    natives: Arc<NativeRegistry>,
    mempool: MemPool,
    subscriptions: Subscriptions,
    /// Re-verify transactions inside incoming blocks. Trusted-sync setups
    /// turn this off and rely on consensus signatures alone.
    verify_block_transactions: bool,
    shutting_down: AtomicBool,
}

impl std::fmt::Debug for Blockchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blockchain")
            .field("verify_block_transactions", &self.verify_block_transactions)
            .field("shutting_down", &self.shutting_down)
            .finish_non_exhaustive()
    }
}

impl Blockchain {
    /// Opens (or bootstraps) a chain on `store`.
    pub fn new(
        store: Arc<dyn Store>,
        settings: Arc<ProtocolSettings>,
    ) -> Result<Self, InitError> {
        settings
            .validate()
            .map_err(|_| InitError::FlagMismatch { flag: "settings" })?;
        let chain = Self {
            store,
            settings,
            natives: Arc::new(NativeRegistry::new()),
            mempool: MemPool::new(MEMPOOL_CAPACITY),
            subscriptions: Subscriptions::new(),
            verify_block_transactions: true,
            shutting_down: AtomicBool::new(false),
        };
        let dao = chain.dao();
        match dao.get_version() {
            None => {
                dao.put_version(STORAGE_VERSION, chain.version_flags());
                chain
                    .persist_genesis()
                    .map_err(|e| {
                        warn!(error = %e, "genesis persist failed");
                        InitError::MissingCurrentBlock
                    })?;
            }
            Some(_) => chain.run_startup_checks(&dao)?,
        }
        Ok(chain)
    }

    /// Disables per-transaction re-verification inside incoming blocks.
    pub fn with_unverified_blocks(mut self) -> Self {
        self.verify_block_transactions = false;
        self
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    pub(crate) fn settings_arc(&self) -> Arc<ProtocolSettings> {
        self.settings.clone()
    }

    pub fn natives(&self) -> Arc<NativeRegistry> {
        self.natives.clone()
    }

    pub fn mempool(&self) -> &MemPool {
        &self.mempool
    }

    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    /// Read view over committed state.
    pub fn dao(&self) -> Dao {
        Dao::new(self.store.clone())
    }

    pub fn height(&self) -> u32 {
        self.dao().height().unwrap_or(0)
    }

    pub fn current_hash(&self) -> Option<UInt256> {
        self.dao().current_block().map(|(hash, _)| hash)
    }

    /// Begins shutdown: in-flight `add_block` completes, new ones fail.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        info!("ledger shutting down; rejecting new blocks");
    }

    fn version_flags(&self) -> u8 {
        let mut flags = 0u8;
        if self.settings.state_root_in_header {
            flags |= version_flags::STATE_ROOT_IN_HEADER;
        }
        if self.settings.p2p_sig_extensions {
            flags |= version_flags::P2P_SIG_EXTENSIONS;
        }
        if self.settings.p2p_state_exchange_extensions {
            flags |= version_flags::P2P_STATE_EXCHANGE;
        }
        if self.settings.keep_only_latest_state {
            flags |= version_flags::KEEP_ONLY_LATEST_STATE;
        }
        flags
    }

    // ---- startup validation ---------------------------------------------

    fn run_startup_checks(&self, dao: &Dao) -> Result<(), InitError> {
        let (stored_version, stored_flags) = dao.get_version().expect("checked by caller");
        if stored_version != STORAGE_VERSION {
            return Err(InitError::VersionMismatch {
                stored: stored_version,
                running: STORAGE_VERSION.to_string(),
            });
        }
        let current_flags = self.version_flags();
        for (bit, name) in [
            (version_flags::STATE_ROOT_IN_HEADER, "StateRootInHeader"),
            (version_flags::P2P_SIG_EXTENSIONS, "P2PSigExtensions"),
            (
                version_flags::P2P_STATE_EXCHANGE,
                "P2PStateExchangeExtensions",
            ),
            (version_flags::KEEP_ONLY_LATEST_STATE, "KeepOnlyLatestState"),
        ] {
            if stored_flags & bit != current_flags & bit {
                return Err(InitError::FlagMismatch { flag: name });
            }
        }

        let (block_hash, height) = dao.current_block().ok_or(InitError::MissingCurrentBlock)?;
        if dao
            .get_block(
                &block_hash,
                self.settings.state_root_in_header,
                self.settings.max_transactions_per_block as usize,
            )
            .is_none()
        {
            return Err(InitError::MissingCurrentBlock);
        }
        let (header_hash, _) = dao.current_header().ok_or(InitError::MissingCurrentHeader)?;
        if dao
            .get_block(
                &header_hash,
                self.settings.state_root_in_header,
                self.settings.max_transactions_per_block as usize,
            )
            .is_none()
        {
            return Err(InitError::MissingCurrentHeader);
        }

        // Header hash batches must be full up to the current height.
        let full_batches = (height as usize + 1) / neonova_config::HEADER_HASH_BATCH;
        for batch in 0..full_batches {
            match dao.header_batch_len(batch as u32) {
                Some(len) if len == neonova_config::HEADER_HASH_BATCH => {}
                _ => return Err(InitError::HeaderHashListGap {
                    batch: batch as u32,
                }),
            }
        }
        let tail = (height as usize + 1) % neonova_config::HEADER_HASH_BATCH;
        if tail > 0 {
            match dao.header_batch_len(full_batches as u32) {
                Some(len) if len >= tail => {}
                _ => return Err(InitError::HeaderHashListGap {
                    batch: full_batches as u32,
                }),
            }
        }

        let root = dao
            .get_state_root(height)
            .ok_or(InitError::MissingStateRoot { height })?;
        let trie = Trie::new(
            Some(root.root),
            self.store.clone(),
            !self.settings.keep_only_latest_state,
        );
        trie.get(b"\x00probe")
            .map_err(|_| InitError::MissingStateRoot { height })?;

        // Stored native states must equal the autogenerated schema.
        for native in self.natives.all() {
            if !self.settings.native_active_in(native.name(), height) {
                continue;
            }
            let stored = neonova_contract::native::management::get_contract(dao, &native.hash())
                .ok_or_else(|| InitError::MissingNativeState {
                    name: native.name().to_string(),
                })?;
            let generated = native_contract_state(native.as_ref());
            if stored.to_stored_bytes() != generated.to_stored_bytes() {
                return Err(InitError::NativeStateMismatch {
                    name: native.name().to_string(),
                });
            }
        }
        debug!(height, "startup checks passed");
        Ok(())
    }

    // ---- genesis ---------------------------------------------------------

    /// The consensus account of the standby validators.
    pub fn next_consensus_address(&self) -> UInt160 {
        let keys: Vec<neonova_crypto::ECPoint> = self
            .settings
            .committee_keys()
            .iter()
            .filter_map(|bytes| neonova_crypto::ECPoint::from_bytes(bytes).ok())
            .take(self.settings.validators_count)
            .collect();
        if keys.is_empty() {
            return UInt160::zero();
        }
        let m = keys.len() - (keys.len() - 1) / 3;
        match neonova_contract::create_multisig_script(m, &keys) {
            Some(script) => UInt160::from_array(neonova_crypto::hash160(&script)),
            None => UInt160::zero(),
        }
    }

    fn genesis_block(&self) -> Block {
        Block {
            header: Header {
                version: 0,
                prev_hash: UInt256::zero(),
                merkle_root: merkle_root(&[]),
                timestamp: GENESIS_TIMESTAMP,
                nonce: GENESIS_NONCE,
                index: 0,
                primary_index: 0,
                next_consensus: self.next_consensus_address(),
                witness: Witness::new(vec![], vec![neonova_vm::OpCode::PUSHT as u8]),
                prev_state_root: if self.settings.state_root_in_header {
                    Some(UInt256::zero())
                } else {
                    None
                },
            },
            transactions: vec![],
        }
    }

    fn persist_genesis(&self) -> Result<(), BlockchainError> {
        let genesis = self.genesis_block();
        info!(hash = %genesis.hash(), "bootstrapping chain from genesis");
        self.persist_block(&genesis)
    }

    // ---- block acceptance -------------------------------------------------

    /// Validates and commits a block, fanning out events on success.
    pub fn add_block(&self, block: &Block) -> Result<(), BlockchainError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(BlockchainError::ShuttingDown);
        }
        self.verify_header(block)?;
        if self.verify_block_transactions {
            let dao = self.dao();
            for tx in &block.transactions {
                self.verify_tx_stateful(&dao, tx)
                    .map_err(BlockchainError::Tx)?;
            }
        }
        self.persist_block(block)?;
        self.mempool.remove_stale(&block.transactions);
        self.mempool.remove_expired(block.index());
        Ok(())
    }

    fn verify_header(&self, block: &Block) -> Result<(), BlockchainError> {
        let dao = self.dao();
        let (prev_hash, height) = dao
            .current_block()
            .ok_or(BlockchainError::HeaderLinkage { index: block.index() })?;
        if block.header.prev_hash != prev_hash || block.index() != height + 1 {
            return Err(BlockchainError::HeaderLinkage {
                index: block.index(),
            });
        }
        let prev = dao
            .get_block(
                &prev_hash,
                self.settings.state_root_in_header,
                self.settings.max_transactions_per_block as usize,
            )
            .ok_or(BlockchainError::HeaderLinkage {
                index: block.index(),
            })?;
        if block.header.timestamp <= prev.header.timestamp {
            return Err(BlockchainError::HeaderTimestamp);
        }
        if block.computed_merkle_root() != block.header.merkle_root {
            return Err(BlockchainError::HeaderMerkleRoot);
        }
        // The block witness must be the consensus account declared by the
        // previous block, and must verify.
        let witness_hash = block.header.witness.script_hash();
        if witness_hash != prev.header.next_consensus {
            return Err(BlockchainError::HeaderWitness);
        }
        if !self.verify_header_witness(block) {
            return Err(BlockchainError::HeaderWitness);
        }
        match (&block.header.prev_state_root, self.settings.state_root_in_header) {
            (Some(_), false) => return Err(BlockchainError::HdrStateRootSetting),
            (None, true) => return Err(BlockchainError::HdrStateRootSetting),
            (Some(declared), true) => {
                let local = dao
                    .get_state_root(height)
                    .map(|r| r.root)
                    .unwrap_or_default();
                if *declared != local {
                    return Err(BlockchainError::HdrInvalidStateRoot);
                }
            }
            (None, false) => {}
        }
        Ok(())
    }

    fn verify_header_witness(&self, block: &Block) -> bool {
        let witness = &block.header.witness;
        let Some((m, _)) = neonova_contract::is_multisig_script(&witness.verification_script)
        else {
            return false;
        };
        // Signatures are pushed by the invocation script; check them
        // directly against the declared keys.
        let message = block.header.sign_data(self.settings.network);
        let mut signatures = Vec::new();
        let mut position = 0usize;
        let script = &witness.invocation_script;
        while position + 2 <= script.len() && script[position] == 0x0c && script[position + 1] == 64
        {
            let end = position + 2 + 64;
            if end > script.len() {
                return false;
            }
            signatures.push(script[position + 2..end].to_vec());
            position = end;
        }
        if signatures.len() < m {
            return false;
        }
        let keys = multisig_keys(&witness.verification_script);
        let mut matched = 0usize;
        let mut key_index = 0usize;
        for signature in &signatures {
            while key_index < keys.len() {
                if neonova_crypto::verify_signature(&message, signature, &keys[key_index]) {
                    matched += 1;
                    key_index += 1;
                    break;
                }
                key_index += 1;
            }
        }
        matched >= m
    }

    // ---- persistence -------------------------------------------------------

    fn persist_block(&self, block: &Block) -> Result<(), BlockchainError> {
        let overlay = Arc::new(MemCachedStore::new(self.store.clone()));
        let block_dao = Dao::new(overlay.clone() as Arc<dyn Store>);
        let mut executions: Vec<AppExecResult> = Vec::new();

        // OnPersist natives.
        let on_persist = self.run_system_script(
            &block_dao,
            block,
            TriggerType::OnPersist,
            "System.Contract.NativeOnPersist",
        )?;
        executions.push(on_persist);

        // Transactions, each in its own overlay.
        for tx in &block.transactions {
            let tx_overlay = Arc::new(MemCachedStore::new(overlay.clone() as Arc<dyn Store>));
            let tx_dao = Dao::new(tx_overlay.clone() as Arc<dyn Store>);
            let mut engine = ApplicationEngine::new(
                TriggerType::Application,
                Some(tx.clone()),
                tx_dao,
                Some(block.clone()),
                self.settings.clone(),
                self.natives.clone(),
                tx.system_fee,
            );
            if let Err(e) = engine.load_entry_script(tx.script.clone(), CallFlags::ALL) {
                warn!(tx = %tx.hash(), error = %e, "transaction script failed to load");
            }
            let state = engine.execute();
            let vm_state_byte = state.to_byte();
            if state == VmState::Halt {
                tx_overlay.commit();
            } else {
                tx_overlay.discard();
                debug!(tx = %tx.hash(), "transaction faulted; state rolled back");
            }
            // Rewrite the Ledger record with the final VM state.
            block_dao.store_transaction(tx, block.index(), vm_state_byte);
            let stack = engine.result_stack_items();
            let gas_consumed = engine.gas_consumed();
            let exception = engine.exception_message();
            let (notifications, _) = engine.into_events();
            executions.push(AppExecResult {
                container: tx.hash(),
                trigger: TriggerType::Application,
                vm_state: state,
                gas_consumed,
                stack,
                notifications: if state == VmState::Halt {
                    notifications
                } else {
                    Vec::new()
                },
                exception,
            });
        }

        // PostPersist natives.
        let post_persist = self.run_system_script(
            &block_dao,
            block,
            TriggerType::PostPersist,
            "System.Contract.NativePostPersist",
        )?;
        executions.push(post_persist);

        // State root over the block's storage mutations.
        let prev_root = if block.index() == 0 {
            None
        } else {
            block_dao.get_state_root(block.index() - 1).map(|r| r.root)
        };
        let mut trie = Trie::new(
            prev_root,
            overlay.clone() as Arc<dyn Store>,
            !self.settings.keep_only_latest_state,
        );
        for op in overlay.change_set() {
            match op {
                BatchOp::Put { key, value } if key.first() == Some(&prefix::ST_STORAGE) => {
                    trie.put(&key[1..], value).map_err(|e| {
                        BlockchainError::Mpt(e.to_string())
                    })?;
                }
                BatchOp::Delete { key } if key.first() == Some(&prefix::ST_STORAGE) => {
                    trie.delete(&key[1..])
                        .map_err(|e| BlockchainError::Mpt(e.to_string()))?;
                }
                _ => {}
            }
        }
        let new_root = trie
            .commit()
            .map_err(|e| BlockchainError::Mpt(e.to_string()))?
            .unwrap_or_default();
        block_dao.put_state_root(&StateRoot::new(block.index(), new_root));

        // Chain pointers, then one atomic commit.
        block_dao.put_current_block(&block.hash(), block.index());
        block_dao.put_current_header(&block.hash(), block.index());
        overlay.commit();

        self.prune_untraceable(block.index());
        info!(height = block.index(), hash = %block.hash(), txs = block.transactions.len(), "block committed");

        // Event fan-out in commit order.
        self.subscriptions.publish_block(block);
        for tx in &block.transactions {
            self.subscriptions.publish_transaction(tx);
        }
        for execution in &executions {
            for notification in &execution.notifications {
                self.subscriptions.publish_notification(notification);
            }
        }
        for execution in executions {
            self.subscriptions.publish_execution(&execution);
        }
        Ok(())
    }

    fn run_system_script(
        &self,
        block_dao: &Dao,
        block: &Block,
        trigger: TriggerType,
        syscall: &str,
    ) -> Result<AppExecResult, BlockchainError> {
        let mut engine = ApplicationEngine::new(
            trigger,
            None,
            block_dao.clone(),
            Some(block.clone()),
            self.settings.clone(),
            self.natives.clone(),
            i64::MAX / 2,
        );
        let mut builder = ScriptBuilder::new();
        builder.emit_syscall_named(syscall);
        engine
            .load_entry_script(builder.into_bytes(), CallFlags::STATES.union(CallFlags::ALLOW_NOTIFY).union(CallFlags::ALLOW_CALL))
            .map_err(|e| BlockchainError::SystemFault(e.to_string()))?;
        let state = engine.execute();
        if state != VmState::Halt {
            return Err(BlockchainError::SystemFault(
                engine
                    .exception_message()
                    .unwrap_or_else(|| "persist hook faulted".into()),
            ));
        }
        let stack = engine.result_stack_items();
        let gas_consumed = engine.gas_consumed();
        let (notifications, _) = engine.into_events();
        Ok(AppExecResult {
            container: block.hash(),
            trigger,
            vm_state: state,
            gas_consumed,
            stack,
            notifications,
            exception: None,
        })
    }

    /// Drops blocks, transactions and state roots that fell out of the
    /// traceable window.
    fn prune_untraceable(&self, height: u32) {
        if !self.settings.remove_untraceable_blocks {
            return;
        }
        let Some(stale_height) = height.checked_sub(self.settings.max_traceable_blocks) else {
            return;
        };
        let dao = self.dao();
        let Some(stale_hash) = dao.block_hash(stale_height) else {
            return;
        };
        if let Some(stale) = dao.get_block(
            &stale_hash,
            self.settings.state_root_in_header,
            self.settings.max_transactions_per_block as usize,
        ) {
            for tx in &stale.transactions {
                dao.delete_transaction(&tx.hash());
            }
            dao.delete_block(&stale_hash);
        }
        if let Some(root) = dao.get_state_root(stale_height) {
            if !self.settings.keep_only_latest_state {
                if let Err(e) = Trie::release_root(&self.store, root.root) {
                    warn!(height = stale_height, error = %e, "state root GC failed");
                }
            }
            dao.delete_state_root(stale_height);
        }
        debug!(height = stale_height, "untraceable block pruned");
    }
}

/// Extracts the public keys of a multisig verification script.
fn multisig_keys(script: &[u8]) -> Vec<Vec<u8>> {
    let mut keys = Vec::new();
    let mut position = 0usize;
    while position + 35 <= script.len() {
        if script[position] == 0x0c && script[position + 1] == 33 {
            keys.push(script[position + 2..position + 35].to_vec());
            position += 35;
        } else {
            position += 1;
        }
    }
    keys
}
