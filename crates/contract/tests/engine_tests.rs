//! End-to-end engine tests: native bootstrap, dispatch and state access.

use neonova_config::ProtocolSettings;
use neonova_contract::native::{NativeContract, NativeRegistry};
use neonova_contract::{ApplicationEngine, Dao, TriggerType};
use neonova_core::{Block, Header, UInt160, UInt256, Witness};
use neonova_persistence::{MemCachedStore, MemoryStore, Store};
use neonova_vm::{CallFlags, OpCode, ScriptBuilder, VmState};
use std::sync::Arc;

fn test_settings() -> Arc<ProtocolSettings> {
    let key = neonova_crypto::public_key(&[7u8; 32]).unwrap();
    Arc::new(ProtocolSettings {
        standby_committee: vec![hex::encode(key.as_bytes())],
        validators_count: 1,
        ..Default::default()
    })
}

fn genesis_block() -> Block {
    Block {
        header: Header {
            version: 0,
            prev_hash: UInt256::zero(),
            merkle_root: UInt256::zero(),
            timestamp: 1_468_595_301_000,
            nonce: 2_083_236_893,
            index: 0,
            primary_index: 0,
            next_consensus: UInt160::zero(),
            witness: Witness::default(),
            prev_state_root: None,
        },
        transactions: vec![],
    }
}

struct Chain {
    dao: Dao,
    settings: Arc<ProtocolSettings>,
    natives: Arc<NativeRegistry>,
}

/// Runs the genesis OnPersist hooks so natives are deployed and funded.
fn bootstrap() -> Chain {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let overlay = Arc::new(MemCachedStore::new(store));
    let dao = Dao::new(overlay as Arc<dyn Store>);
    let settings = test_settings();
    let natives = Arc::new(NativeRegistry::new());
    let mut engine = ApplicationEngine::new(
        TriggerType::OnPersist,
        None,
        dao.clone(),
        Some(genesis_block()),
        settings.clone(),
        natives.clone(),
        i64::MAX / 2,
    );
    for native in natives.all() {
        native.on_persist(&mut engine).unwrap();
    }
    Chain {
        dao,
        settings,
        natives,
    }
}

fn app_engine(chain: &Chain) -> ApplicationEngine {
    ApplicationEngine::new(
        TriggerType::Application,
        None,
        chain.dao.clone(),
        None,
        chain.settings.clone(),
        chain.natives.clone(),
        2_000_000_000,
    )
}

fn call_script(hash: UInt160, method: &str) -> Vec<u8> {
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::NEWARRAY0);
    builder.push_int(CallFlags::ALL.bits() as i64);
    builder.push_string(method);
    builder.push_bytes(hash.as_bytes());
    builder.emit_syscall_named("System.Contract.Call");
    builder.into_bytes()
}

#[test]
fn genesis_deploys_all_natives() {
    let chain = bootstrap();
    for native in chain.natives.all() {
        let state = neonova_contract::native::management::get_contract(&chain.dao, &native.hash())
            .unwrap_or_else(|| panic!("{} not deployed", native.name()));
        assert_eq!(state.id, native.id());
        assert_eq!(state.manifest.name, native.name());
    }
}

#[test]
fn policy_defaults_via_contract_call() {
    let chain = bootstrap();
    let policy_hash = chain.natives.policy().hash();
    let mut engine = app_engine(&chain);
    engine
        .load_entry_script(call_script(policy_hash, "getFeePerByte"), CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VmState::Halt);
    let result = engine.vm().result_stack().items();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].as_i64().unwrap(), 1000);
}

#[test]
fn neo_total_supply_via_contract_call() {
    let chain = bootstrap();
    let neo_hash = chain.natives.neo().hash();
    let mut engine = app_engine(&chain);
    engine
        .load_entry_script(call_script(neo_hash, "totalSupply"), CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VmState::Halt);
    assert_eq!(
        engine.vm().result_stack().items()[0].as_i64().unwrap(),
        100_000_000
    );
}

#[test]
fn genesis_funds_committee() {
    let chain = bootstrap();
    let committee = chain
        .natives
        .neo()
        .committee_address(&chain.dao, &chain.settings);
    assert!(!committee.is_zero());
    let neo_balance = chain.natives.neo().balance_of(&chain.dao, &committee);
    assert_eq!(neo_balance, num_bigint::BigInt::from(100_000_000u64));
    let gas_balance = chain.natives.gas().balance_of(&chain.dao, &committee);
    assert_eq!(
        gas_balance,
        num_bigint::BigInt::from(chain.settings.initial_gas_distribution)
    );
}

#[test]
fn unknown_native_method_faults() {
    let chain = bootstrap();
    let policy_hash = chain.natives.policy().hash();
    let mut engine = app_engine(&chain);
    engine
        .load_entry_script(call_script(policy_hash, "noSuchMethod"), CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VmState::Fault);
}

#[test]
fn set_fee_without_committee_witness_faults() {
    let chain = bootstrap();
    let policy_hash = chain.natives.policy().hash();
    let mut builder = ScriptBuilder::new();
    // args = [123]
    builder.push_int(123);
    builder.push_int(1);
    builder.emit(OpCode::PACK);
    builder.push_int(CallFlags::ALL.bits() as i64);
    builder.push_string("setFeePerByte");
    builder.push_bytes(policy_hash.as_bytes());
    builder.emit_syscall_named("System.Contract.Call");
    let mut engine = app_engine(&chain);
    engine
        .load_entry_script(builder.into_bytes(), CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VmState::Fault);
}

#[test]
fn runtime_platform_syscall() {
    let chain = bootstrap();
    let mut builder = ScriptBuilder::new();
    builder.emit_syscall_named("System.Runtime.Platform");
    let mut engine = app_engine(&chain);
    engine
        .load_entry_script(builder.into_bytes(), CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VmState::Halt);
    assert_eq!(
        engine.vm().result_stack().items()[0].as_string().unwrap(),
        "NEO"
    );
}

#[test]
fn gas_left_reflects_budget() {
    let chain = bootstrap();
    let mut builder = ScriptBuilder::new();
    builder.emit_syscall_named("System.Runtime.GasLeft");
    let mut engine = app_engine(&chain);
    engine
        .load_entry_script(builder.into_bytes(), CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VmState::Halt);
    let left = engine.vm().result_stack().items()[0].as_i64().unwrap();
    assert!(left > 0 && left <= 2_000_000_000);
}

#[test]
fn notifications_require_allow_notify() {
    let chain = bootstrap();
    // State first, then the name: Notify pops the name from the top.
    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::NEWARRAY0);
    builder.push_string("Event");
    builder.emit_syscall_named("System.Runtime.Notify");
    let script = builder.into_bytes();

    let mut engine = app_engine(&chain);
    engine
        .load_entry_script(script.clone(), CallFlags::READ_ONLY)
        .unwrap();
    assert_eq!(engine.execute(), VmState::Fault);

    let mut engine = app_engine(&chain);
    engine.load_entry_script(script, CallFlags::ALL).unwrap();
    assert_eq!(engine.execute(), VmState::Halt);
    assert_eq!(engine.notifications().len(), 1);
    assert_eq!(engine.notifications()[0].name, "Event");
}

#[test]
fn storage_syscalls_are_flag_gated() {
    let chain = bootstrap();
    let mut builder = ScriptBuilder::new();
    builder.emit_syscall_named("System.Storage.GetContext");
    let mut engine = app_engine(&chain);
    engine
        .load_entry_script(builder.into_bytes(), CallFlags::NONE)
        .unwrap();
    assert_eq!(engine.execute(), VmState::Fault);
}
