//! Native contracts: pre-compiled contracts dispatched by name through
//! `System.Contract.CallNative`.
//!
//! Each native is instantiated per chain (caches are per-instance, never
//! process-global) and registered in a fixed order that also fixes the
//! OnPersist/PostPersist sequence.

pub mod crypto_lib;
pub mod gas_token;
pub mod ledger_contract;
pub mod management;
pub(crate) mod nep17;
pub mod neo_token;
pub mod notary;
pub mod oracle;
pub mod policy;
pub mod role_management;
pub mod std_lib;

pub use crypto_lib::CryptoLib;
pub use gas_token::GasToken;
pub use ledger_contract::LedgerContract;
pub use management::ContractManagement;
pub use neo_token::NeoToken;
pub use notary::Notary;
pub use oracle::OracleContract;
pub use policy::PolicyContract;
pub use role_management::RoleManagement;
pub use std_lib::StdLib;

use crate::dao::Dao;
use crate::engine::ApplicationEngine;
use crate::manifest::{ContractManifest, ContractMethod, ContractParameter, ContractPermission};
use crate::{standard, ContractState, NefFile};
use neonova_core::UInt160;
use neonova_persistence::StorageKey;
use neonova_vm::{CallFlags, ScriptBuilder, StackItem, VmResult};
use std::sync::Arc;

/// Descriptor of one native method.
pub struct NativeMethodMeta {
    pub name: &'static str,
    pub params: usize,
    pub price: i64,
    pub required_flags: CallFlags,
    pub safe: bool,
    pub has_return: bool,
}

impl NativeMethodMeta {
    pub const fn safe(name: &'static str, params: usize, price: i64) -> Self {
        Self {
            name,
            params,
            price,
            required_flags: CallFlags::READ_STATES,
            safe: true,
            has_return: true,
        }
    }

    pub const fn write(name: &'static str, params: usize, price: i64) -> Self {
        Self {
            name,
            params,
            price,
            required_flags: CallFlags::STATES,
            safe: false,
            has_return: true,
        }
    }

    pub const fn write_void(name: &'static str, params: usize, price: i64) -> Self {
        Self {
            name,
            params,
            price,
            required_flags: CallFlags::STATES,
            safe: false,
            has_return: false,
        }
    }

    pub const fn pure(name: &'static str, params: usize, price: i64) -> Self {
        Self {
            name,
            params,
            price,
            required_flags: CallFlags::NONE,
            safe: true,
            has_return: true,
        }
    }

    pub const fn with_flags(mut self, flags: CallFlags) -> Self {
        self.required_flags = flags;
        self
    }
}

/// A contract implemented by the node itself.
pub trait NativeContract: Send + Sync {
    fn name(&self) -> &'static str;

    fn id(&self) -> i32;

    fn hash(&self) -> UInt160;

    fn methods(&self) -> &[NativeMethodMeta];

    /// Runs once when the native first activates, inside the activating
    /// block's OnPersist.
    fn initialize(&self, _engine: &mut ApplicationEngine) -> VmResult<()> {
        Ok(())
    }

    fn on_persist(&self, _engine: &mut ApplicationEngine) -> VmResult<()> {
        Ok(())
    }

    fn post_persist(&self, _engine: &mut ApplicationEngine) -> VmResult<()> {
        Ok(())
    }

    fn invoke(
        &self,
        engine: &mut ApplicationEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> VmResult<StackItem>;
}

/// Stub script every native carries: a single CallNative syscall.
pub fn native_script() -> Vec<u8> {
    let mut builder = ScriptBuilder::new();
    builder.emit_syscall_named("System.Contract.CallNative");
    builder.into_bytes()
}

/// Builds the canonical ContractState of a native, derived purely from its
/// metadata so startup can validate stored states byte-for-byte.
pub fn native_contract_state(native: &dyn NativeContract) -> ContractState {
    let mut manifest = ContractManifest {
        name: native.name().to_string(),
        groups: Vec::new(),
        supported_standards: Vec::new(),
        abi: Default::default(),
        permissions: vec![ContractPermission::wildcard()],
        trusts: None,
        extra: None,
    };
    for meta in native.methods() {
        manifest.abi.methods.push(ContractMethod {
            name: meta.name.to_string(),
            parameters: (0..meta.params)
                .map(|i| ContractParameter {
                    name: format!("arg{i}"),
                    param_type: "Any".to_string(),
                })
                .collect(),
            return_type: if meta.has_return { "Any" } else { "Void" }.to_string(),
            offset: 0,
            safe: meta.safe,
        });
    }
    let mut nef = NefFile::new("neonova-native", native_script());
    nef.checksum = nef.compute_checksum();
    ContractState {
        id: native.id(),
        update_counter: 0,
        hash: native.hash(),
        nef,
        manifest,
    }
}

/// Hash shared by every native: derived from the zero sender and name.
pub fn native_hash(name: &str) -> UInt160 {
    standard::contract_hash(&UInt160::zero(), 0, name)
}

/// The full native set, in persist order.
pub struct NativeRegistry {
    contracts: Vec<Arc<dyn NativeContract>>,
    management: Arc<ContractManagement>,
    std_lib: Arc<StdLib>,
    crypto_lib: Arc<CryptoLib>,
    ledger: Arc<LedgerContract>,
    neo: Arc<NeoToken>,
    gas: Arc<GasToken>,
    policy: Arc<PolicyContract>,
    role_management: Arc<RoleManagement>,
    oracle: Arc<OracleContract>,
    notary: Arc<Notary>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        let management = Arc::new(ContractManagement::new());
        let std_lib = Arc::new(StdLib::new());
        let crypto_lib = Arc::new(CryptoLib::new());
        let ledger = Arc::new(LedgerContract::new());
        let neo = Arc::new(NeoToken::new());
        let gas = Arc::new(GasToken::new());
        let policy = Arc::new(PolicyContract::new());
        let role_management = Arc::new(RoleManagement::new());
        let oracle = Arc::new(OracleContract::new());
        let notary = Arc::new(Notary::new());
        let contracts: Vec<Arc<dyn NativeContract>> = vec![
            management.clone(),
            std_lib.clone(),
            crypto_lib.clone(),
            ledger.clone(),
            neo.clone(),
            gas.clone(),
            policy.clone(),
            role_management.clone(),
            oracle.clone(),
            notary.clone(),
        ];
        Self {
            contracts,
            management,
            std_lib,
            crypto_lib,
            ledger,
            neo,
            gas,
            policy,
            role_management,
            oracle,
            notary,
        }
    }

    pub fn all(&self) -> Vec<Arc<dyn NativeContract>> {
        self.contracts.clone()
    }

    pub fn by_hash(&self, hash: &UInt160) -> Option<Arc<dyn NativeContract>> {
        self.contracts.iter().find(|c| c.hash() == *hash).cloned()
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<dyn NativeContract>> {
        self.contracts.iter().find(|c| c.name() == name).cloned()
    }

    pub fn management(&self) -> Arc<ContractManagement> {
        self.management.clone()
    }

    pub fn std_lib(&self) -> Arc<StdLib> {
        self.std_lib.clone()
    }

    pub fn crypto_lib(&self) -> Arc<CryptoLib> {
        self.crypto_lib.clone()
    }

    pub fn ledger(&self) -> Arc<LedgerContract> {
        self.ledger.clone()
    }

    pub fn neo(&self) -> Arc<NeoToken> {
        self.neo.clone()
    }

    pub fn gas(&self) -> Arc<GasToken> {
        self.gas.clone()
    }

    pub fn policy(&self) -> Arc<PolicyContract> {
        self.policy.clone()
    }

    pub fn role_management(&self) -> Arc<RoleManagement> {
        self.role_management.clone()
    }

    pub fn oracle(&self) -> Arc<OracleContract> {
        self.oracle.clone()
    }

    pub fn notary(&self) -> Arc<Notary> {
        self.notary.clone()
    }
}

impl Default for NativeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---- shared storage helpers ---------------------------------------------

pub(crate) fn storage_get(dao: &Dao, id: i32, key: &[u8]) -> Option<Vec<u8>> {
    dao.get_storage(&StorageKey::new(id, key))
}

pub(crate) fn storage_put(dao: &Dao, id: i32, key: &[u8], value: Vec<u8>) {
    dao.put_storage(&StorageKey::new(id, key), value);
}

pub(crate) fn storage_delete(dao: &Dao, id: i32, key: &[u8]) {
    dao.delete_storage(&StorageKey::new(id, key));
}

/// Little-endian integer trimmed of leading sign-consistent zero bytes,
/// matching the storage form of policy values and balances.
pub(crate) fn int_to_bytes(value: i64) -> Vec<u8> {
    neonova_vm::stack_item::bigint_to_bytes(&num_bigint::BigInt::from(value))
}

pub(crate) fn bytes_to_int(bytes: &[u8]) -> i64 {
    use num_traits::ToPrimitive;
    neonova_vm::stack_item::bytes_to_bigint(bytes)
        .ok()
        .and_then(|v| v.to_i64())
        .unwrap_or(0)
}

/// Reads a stored integer setting, falling back to a default.
pub(crate) fn get_int_setting(dao: &Dao, id: i32, key: &[u8], default: i64) -> i64 {
    match storage_get(dao, id, key) {
        Some(bytes) => bytes_to_int(&bytes),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_order_is_stable() {
        let registry = NativeRegistry::new();
        let names: Vec<&str> = registry.all().iter().map(|c| c.name()).collect();
        assert_eq!(
            names,
            vec![
                "ContractManagement",
                "StdLib",
                "CryptoLib",
                "LedgerContract",
                "NeoToken",
                "GasToken",
                "PolicyContract",
                "RoleManagement",
                "OracleContract",
                "Notary",
            ]
        );
    }

    #[test]
    fn ids_are_negative_and_unique() {
        let registry = NativeRegistry::new();
        let mut ids: Vec<i32> = registry.all().iter().map(|c| c.id()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 10);
        assert!(ids.iter().all(|id| *id < 0));
    }

    #[test]
    fn hashes_resolve_back() {
        let registry = NativeRegistry::new();
        for native in registry.all() {
            let found = registry.by_hash(&native.hash()).unwrap();
            assert_eq!(found.name(), native.name());
        }
    }

    #[test]
    fn generated_state_is_deterministic() {
        let registry = NativeRegistry::new();
        let policy = registry.by_name("PolicyContract").unwrap();
        let a = native_contract_state(policy.as_ref());
        let b = native_contract_state(policy.as_ref());
        assert_eq!(a.to_stored_bytes(), b.to_stored_bytes());
    }
}
