//! Full-chain scenarios: genesis, transfers, attribute gating, faulted
//! transactions and restart validation.

use neonova_config::{ProtocolSettings, GAS_FACTOR};
use neonova_contract::native::NativeContract;
use neonova_core::{
    Block, Header, Signer, Transaction, TransactionAttribute, UInt160, Witness,
};
use neonova_ledger::{Blockchain, InitError, VerifyError};
use neonova_persistence::{MemoryStore, Store};
use neonova_vm::{CallFlags, OpCode, ScriptBuilder, VmState};
use std::sync::Arc;

const COMMITTEE_KEY: [u8; 32] = [7u8; 32];

fn settings() -> Arc<ProtocolSettings> {
    let key = neonova_crypto::public_key(&COMMITTEE_KEY).unwrap();
    Arc::new(ProtocolSettings {
        standby_committee: vec![hex::encode(key.as_bytes())],
        validators_count: 1,
        ..Default::default()
    })
}

fn new_chain() -> (Arc<dyn Store>, Blockchain) {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let chain = Blockchain::new(store.clone(), settings()).unwrap();
    (store, chain)
}

/// The 1-of-1 multisig account holding the genesis funds.
fn committee_account(chain: &Blockchain) -> UInt160 {
    chain
        .natives()
        .neo()
        .committee_address(&chain.dao(), chain.settings())
}

fn multisig_witness(message: &[u8]) -> Witness {
    let key = neonova_crypto::public_key(&COMMITTEE_KEY).unwrap();
    let verification = neonova_contract::create_multisig_script(1, &[key]).unwrap();
    let signature = neonova_crypto::sign(message, &COMMITTEE_KEY).unwrap();
    let mut invocation = vec![OpCode::PUSHDATA1 as u8, 64];
    invocation.extend_from_slice(&signature);
    Witness::new(invocation, verification)
}

fn signed_tx(
    chain: &Blockchain,
    script: Vec<u8>,
    system_fee: i64,
    network_fee: i64,
    attributes: Vec<TransactionAttribute>,
) -> Transaction {
    let mut tx = Transaction {
        version: 0,
        nonce: rand_nonce(&script),
        system_fee,
        network_fee,
        valid_until_block: chain.height() + 5,
        signers: vec![Signer::called_by_entry(committee_account(chain))],
        attributes,
        script,
        witnesses: vec![Witness::default()],
    };
    let message = tx.sign_data(chain.settings().network);
    tx.witnesses = vec![multisig_witness(&message)];
    tx
}

/// Deterministic per-script nonce so repeated helpers build distinct txs.
fn rand_nonce(script: &[u8]) -> u32 {
    let digest = neonova_crypto::sha256(script);
    u32::from_le_bytes(digest[..4].try_into().unwrap())
}

fn next_block(chain: &Blockchain, transactions: Vec<Transaction>) -> Block {
    let dao = chain.dao();
    let (prev_hash, height) = dao.current_block().unwrap();
    let prev = dao
        .get_block(&prev_hash, chain.settings().state_root_in_header, 512)
        .unwrap();
    let mut header = Header {
        version: 0,
        prev_hash,
        merkle_root: Default::default(),
        timestamp: prev.header.timestamp + chain.settings().ms_per_block as u64,
        nonce: height as u64 + 1,
        index: height + 1,
        primary_index: 0,
        next_consensus: chain.next_consensus_address(),
        witness: Witness::default(),
        prev_state_root: None,
    };
    let block = Block {
        header: header.clone(),
        transactions,
    };
    header.merkle_root = block.computed_merkle_root();
    let mut block = Block {
        header,
        transactions: block.transactions,
    };
    let message = block.header.sign_data(chain.settings().network);
    block.header.witness = multisig_witness(&message);
    block
}

fn transfer_script(chain: &Blockchain, asset: UInt160, from: UInt160, to: UInt160, amount: i64) -> Vec<u8> {
    let _ = chain;
    let mut builder = ScriptBuilder::new();
    builder.push_null();
    builder.push_int(amount);
    builder.push_bytes(to.as_bytes());
    builder.push_bytes(from.as_bytes());
    builder.push_int(4);
    builder.emit(OpCode::PACK);
    builder.push_int(CallFlags::ALL.bits() as i64);
    builder.push_string("transfer");
    builder.push_bytes(asset.as_bytes());
    builder.emit_syscall_named("System.Contract.Call");
    builder.into_bytes()
}

#[test]
fn genesis_bootstraps_chain() {
    let (_store, chain) = new_chain();
    assert_eq!(chain.height(), 0);
    assert!(chain.current_hash().is_some());
    // Natives deployed and funded.
    let committee = committee_account(&chain);
    assert_eq!(
        chain.natives().neo().balance_of(&chain.dao(), &committee),
        num_bigint::BigInt::from(100_000_000u64)
    );
    assert!(chain
        .natives()
        .gas()
        .balance_of(&chain.dao(), &committee)
        > num_bigint::BigInt::from(0)
    );
    // State root recorded for genesis.
    assert!(chain.dao().get_state_root(0).is_some());
}

#[test]
fn neo_transfer_block_moves_balances_and_claims_gas() {
    let (_store, chain) = new_chain();
    let from = committee_account(&chain);
    let to = UInt160::from_array([
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
        0x0f, 0x10, 0x11, 0x12, 0x13, 0x14,
    ]);
    let neo_hash = chain.natives().neo().hash();
    let gas_hash = chain.natives().gas().hash();
    let script = transfer_script(&chain, neo_hash, from, to, 1);
    let tx = signed_tx(&chain, script, 9_000_000, 1_300_000, vec![]);

    let executions = chain.subscriptions().subscribe_executions();
    let gas_before = chain.natives().gas().total_supply(&chain.dao());
    let block = next_block(&chain, vec![tx.clone()]);
    chain.add_block(&block).unwrap();

    // Balances moved.
    assert_eq!(
        chain.natives().neo().balance_of(&chain.dao(), &to),
        num_bigint::BigInt::from(1)
    );
    assert_eq!(
        chain.natives().neo().balance_of(&chain.dao(), &from),
        num_bigint::BigInt::from(99_999_999u64)
    );

    // The transfer halted and emitted the NEO Transfer plus the sender's
    // GAS claim.
    let mut tx_result = None;
    while let Ok(result) = executions.try_recv() {
        if result.container == tx.hash() {
            tx_result = Some(result);
        }
    }
    let result = tx_result.expect("transaction execution event");
    assert_eq!(result.vm_state, VmState::Halt);
    let names: Vec<(&UInt160, &str)> = result
        .notifications
        .iter()
        .map(|n| (&n.contract, n.name.as_str()))
        .collect();
    assert!(names.contains(&(&neo_hash, "Transfer")));
    assert!(names.contains(&(&gas_hash, "Transfer")));

    // Fees burned from supply during OnPersist, partially re-minted as
    // rewards; the burn itself equals systemFee + networkFee.
    let gas_after = chain.natives().gas().total_supply(&chain.dao());
    let burned = tx.system_fee + tx.network_fee;
    let minted_back = gas_after.clone() + burned - &gas_before;
    assert!(minted_back >= num_bigint::BigInt::from(0));
}

#[test]
fn high_priority_without_committee_signer_is_rejected() {
    let (_store, chain) = new_chain();
    let mut tx = signed_tx(
        &chain,
        vec![OpCode::PUSH1 as u8],
        1_000_000,
        2_000_000,
        vec![TransactionAttribute::HighPriority],
    );
    // Replace the committee signer with a stranger.
    tx.signers = vec![Signer::called_by_entry(UInt160::from_array([9; 20]))];
    let message = tx.sign_data(chain.settings().network);
    tx.witnesses = vec![multisig_witness(&message)];
    match chain.verify_tx(&tx) {
        Err(VerifyError::InvalidAttribute { kind, .. }) => assert_eq!(kind, "HighPriority"),
        other => panic!("expected InvalidAttribute, got {other:?}"),
    }
}

#[test]
fn oracle_response_with_unknown_request_is_rejected() {
    let (_store, chain) = new_chain();
    let script = chain.natives().oracle().response_script();
    let tx = signed_tx(
        &chain,
        script,
        1_000_000,
        2_000_000,
        vec![TransactionAttribute::OracleResponse {
            id: 42,
            code: neonova_core::OracleResponseCode::Success,
            result: vec![1],
        }],
    );
    match chain.verify_tx(&tx) {
        Err(VerifyError::InvalidAttribute { kind, reason }) => {
            assert_eq!(kind, "OracleResponse");
            assert!(reason.contains("unknown request"), "reason: {reason}");
        }
        other => panic!("expected InvalidAttribute, got {other:?}"),
    }
}

#[test]
fn pooling_twice_overdraws_the_sender() {
    let (_store, chain) = new_chain();
    let balance = chain
        .natives()
        .gas()
        .balance_of(&chain.dao(), &committee_account(&chain));
    use num_traits::ToPrimitive;
    // Just over half each, so the two together overdraw the sender.
    let half = balance.to_i64().unwrap() / 2 + 1;
    let tx_a = signed_tx(&chain, vec![OpCode::PUSH1 as u8], 0, half, vec![]);
    let tx_b = signed_tx(&chain, vec![OpCode::PUSH2 as u8], 0, half, vec![]);
    chain.pool_tx(tx_a).unwrap();
    assert_eq!(chain.pool_tx(tx_b), Err(VerifyError::MemPoolConflict));
}

#[test]
fn expired_transaction_is_rejected() {
    let (_store, chain) = new_chain();
    let mut tx = signed_tx(&chain, vec![OpCode::PUSH1 as u8], 1_000_000, 2_000_000, vec![]);
    tx.valid_until_block = 0;
    let message = tx.sign_data(chain.settings().network);
    tx.witnesses = vec![multisig_witness(&message)];
    assert_eq!(chain.verify_tx(&tx), Err(VerifyError::Expired));
}

#[test]
fn tampered_witness_fails_verification() {
    let (_store, chain) = new_chain();
    let mut tx = signed_tx(&chain, vec![OpCode::PUSH1 as u8], 1_000_000, 2_000_000, vec![]);
    // Re-sign over a different nonce so the carried signature goes stale.
    tx.nonce ^= 0xffff;
    match chain.verify_tx(&tx) {
        Err(VerifyError::VerificationFailed(_)) => {}
        other => panic!("expected VerificationFailed, got {other:?}"),
    }
}

#[test]
fn underfunded_witness_budget_fails_verification() {
    let (_store, chain) = new_chain();
    // Network fee covers the size fee but not the signature check.
    let tx = signed_tx(&chain, vec![OpCode::PUSH1 as u8], 1_000_000, 400_000, vec![]);
    match chain.verify_tx(&tx) {
        Err(VerifyError::VerificationFailed(_)) => {}
        other => panic!("expected VerificationFailed, got {other:?}"),
    }
}

#[test]
fn push_add_script_executes_in_block() {
    let (_store, chain) = new_chain();
    // PUSH1 PUSH2 ADD
    let tx = signed_tx(
        &chain,
        vec![0x11, 0x12, 0x9e],
        1_000_000,
        2_000_000,
        vec![],
    );
    let executions = chain.subscriptions().subscribe_executions();
    let block = next_block(&chain, vec![tx.clone()]);
    chain.add_block(&block).unwrap();
    let mut tx_result = None;
    while let Ok(result) = executions.try_recv() {
        if result.container == tx.hash() {
            tx_result = Some(result);
        }
    }
    let result = tx_result.expect("execution event");
    assert_eq!(result.vm_state, VmState::Halt);
    assert!(result.notifications.is_empty());
    assert_eq!(result.stack.len(), 1);
    // Canonical serialization of Integer 3.
    assert_eq!(result.stack[0].as_deref(), Some(&[0x21, 0x01, 0x03][..]));
}

#[test]
fn faulted_transaction_does_not_abort_block() {
    let (_store, chain) = new_chain();
    // PUSH1 PUSH0 DIV → division by zero fault.
    let tx = signed_tx(
        &chain,
        vec![0x11, 0x10, 0xa1],
        1_000_000,
        2_000_000,
        vec![],
    );
    let executions = chain.subscriptions().subscribe_executions();
    let gas_before = chain
        .natives()
        .gas()
        .balance_of(&chain.dao(), &committee_account(&chain));
    let block = next_block(&chain, vec![tx.clone()]);
    chain.add_block(&block).unwrap();
    assert_eq!(chain.height(), 1);
    let mut tx_result = None;
    while let Ok(result) = executions.try_recv() {
        if result.container == tx.hash() {
            tx_result = Some(result);
        }
    }
    let result = tx_result.expect("execution event");
    assert_eq!(result.vm_state, VmState::Fault);
    assert!(result.exception.is_some());
    // Fees were still paid even though the script faulted; block rewards go
    // to the member's signature account, not the multisig sender.
    let gas_after = chain
        .natives()
        .gas()
        .balance_of(&chain.dao(), &committee_account(&chain));
    assert_eq!(
        gas_before - gas_after,
        num_bigint::BigInt::from(tx.system_fee + tx.network_fee)
    );
}

#[test]
fn duplicate_transaction_is_rejected() {
    let (_store, chain) = new_chain();
    let tx = signed_tx(&chain, vec![OpCode::PUSH1 as u8], 1_000_000, 2_000_000, vec![]);
    let block = next_block(&chain, vec![tx.clone()]);
    chain.add_block(&block).unwrap();
    assert_eq!(chain.verify_tx(&tx), Err(VerifyError::AlreadyExists));
}

#[test]
fn bad_header_linkage_is_rejected() {
    let (_store, chain) = new_chain();
    let mut block = next_block(&chain, vec![]);
    block.header.prev_hash = Default::default();
    let message = block.header.sign_data(chain.settings().network);
    block.header.witness = multisig_witness(&message);
    assert!(matches!(
        chain.add_block(&block),
        Err(neonova_ledger::BlockchainError::HeaderLinkage { .. })
    ));
}

#[test]
fn restart_with_flipped_flag_fails_with_flag_kind() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    {
        let _chain = Blockchain::new(store.clone(), settings()).unwrap();
    }
    // Reopen with KeepOnlyLatestState flipped.
    let key = neonova_crypto::public_key(&COMMITTEE_KEY).unwrap();
    let flipped = Arc::new(ProtocolSettings {
        standby_committee: vec![hex::encode(key.as_bytes())],
        validators_count: 1,
        keep_only_latest_state: true,
        ..Default::default()
    });
    match Blockchain::new(store, flipped) {
        Err(InitError::FlagMismatch { flag }) => assert_eq!(flag, "KeepOnlyLatestState"),
        other => panic!("expected FlagMismatch, got {other:?}"),
    }
}

#[test]
fn restart_with_same_settings_passes_checks() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    {
        let chain = Blockchain::new(store.clone(), settings()).unwrap();
        let block = next_block(&chain, vec![]);
        chain.add_block(&block).unwrap();
    }
    let chain = Blockchain::new(store, settings()).unwrap();
    assert_eq!(chain.height(), 1);
}

#[test]
fn shutdown_rejects_new_blocks() {
    let (_store, chain) = new_chain();
    chain.shutdown();
    let block = next_block(&chain, vec![]);
    assert_eq!(
        chain.add_block(&block),
        Err(neonova_ledger::BlockchainError::ShuttingDown)
    );
}

#[test]
fn determinism_same_block_same_state_root() {
    let run = || {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let chain = Blockchain::new(store, settings()).unwrap();
        let from = committee_account(&chain);
        let to = UInt160::from_array([3; 20]);
        let script = transfer_script(&chain, chain.natives().neo().hash(), from, to, 5);
        let tx = signed_tx(&chain, script, 9_000_000, 1_300_000, vec![]);
        let block = next_block(&chain, vec![tx]);
        chain.add_block(&block).unwrap();
        chain.dao().get_state_root(1).unwrap().root
    };
    assert_eq!(run(), run());
}

#[test]
fn gas_fee_accounting_survives_blocks() {
    let (_store, chain) = new_chain();
    let tx = signed_tx(
        &chain,
        vec![OpCode::PUSH1 as u8],
        GAS_FACTOR / 100,
        2_000_000,
        vec![],
    );
    let supply_before = chain.natives().gas().total_supply(&chain.dao());
    let block = next_block(&chain, vec![tx.clone()]);
    chain.add_block(&block).unwrap();
    let supply_after = chain.natives().gas().total_supply(&chain.dao());
    // Burned sys+net, re-minted net fee and the committee reward.
    let expected = supply_before - (tx.system_fee + tx.network_fee) + tx.network_fee
        + num_bigint::BigInt::from(5 * GAS_FACTOR / 10);
    assert_eq!(supply_after, expected);
}
