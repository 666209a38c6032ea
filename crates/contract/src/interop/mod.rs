//! The syscall surface.
//!
//! A process-wide table maps 4-byte interop ids (little-endian prefix of the
//! name's SHA-256) to descriptors. Prices are base units, multiplied by the
//! execution fee factor at charge time.

mod contract;
mod crypto;
mod iterator;
mod runtime;
mod storage;

pub use iterator::{FindOptions, StorageIterator};
pub use storage::StorageContext;

use crate::engine::ApplicationEngine;
use neonova_vm::{syscall_id, CallFlags, VmResult};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// One registered syscall.
pub struct InteropDescriptor {
    pub name: &'static str,
    pub handler: fn(&mut ApplicationEngine) -> VmResult<()>,
    pub price: i64,
    pub required_flags: CallFlags,
}

macro_rules! descriptors {
    ($(($name:literal, $handler:path, $price:expr, $flags:expr)),+ $(,)?) => {
        vec![
            $(InteropDescriptor {
                name: $name,
                handler: $handler,
                price: $price,
                required_flags: $flags,
            }),+
        ]
    };
}

static REGISTRY: Lazy<HashMap<u32, InteropDescriptor>> = Lazy::new(|| {
    let list = descriptors![
        // Runtime
        ("System.Runtime.Platform", runtime::platform, 1 << 3, CallFlags::NONE),
        ("System.Runtime.GetNetwork", runtime::get_network, 1 << 3, CallFlags::NONE),
        ("System.Runtime.GetTrigger", runtime::get_trigger, 1 << 3, CallFlags::NONE),
        ("System.Runtime.GetTime", runtime::get_time, 1 << 3, CallFlags::NONE),
        ("System.Runtime.GetScriptContainer", runtime::get_script_container, 1 << 3, CallFlags::NONE),
        ("System.Runtime.GetExecutingScriptHash", runtime::get_executing_script_hash, 1 << 4, CallFlags::NONE),
        ("System.Runtime.GetCallingScriptHash", runtime::get_calling_script_hash, 1 << 4, CallFlags::NONE),
        ("System.Runtime.GetEntryScriptHash", runtime::get_entry_script_hash, 1 << 4, CallFlags::NONE),
        ("System.Runtime.CheckWitness", runtime::check_witness, 1 << 10, CallFlags::NONE),
        ("System.Runtime.GetInvocationCounter", runtime::get_invocation_counter, 1 << 4, CallFlags::NONE),
        ("System.Runtime.GetRandom", runtime::get_random, 1 << 4, CallFlags::NONE),
        ("System.Runtime.Log", runtime::log, 1 << 15, CallFlags::ALLOW_NOTIFY),
        ("System.Runtime.Notify", runtime::notify, 1 << 15, CallFlags::ALLOW_NOTIFY),
        ("System.Runtime.GetNotifications", runtime::get_notifications, 1 << 12, CallFlags::NONE),
        ("System.Runtime.GasLeft", runtime::gas_left, 1 << 4, CallFlags::NONE),
        ("System.Runtime.BurnGas", runtime::burn_gas, 1 << 4, CallFlags::NONE),
        ("System.Runtime.CurrentSigners", runtime::current_signers, 1 << 4, CallFlags::NONE),
        ("System.Runtime.LoadScript", runtime::load_script, 1 << 15, CallFlags::ALLOW_CALL),
        // Contract
        ("System.Contract.Call", contract::call, 1 << 15, CallFlags::READ_STATES.union(CallFlags::ALLOW_CALL)),
        ("System.Contract.CallNative", contract::call_native, 0, CallFlags::NONE),
        ("System.Contract.GetCallFlags", contract::get_call_flags, 1 << 10, CallFlags::NONE),
        ("System.Contract.CreateStandardAccount", contract::create_standard_account, 1 << 8, CallFlags::NONE),
        ("System.Contract.CreateMultisigAccount", contract::create_multisig_account, 1 << 8, CallFlags::NONE),
        ("System.Contract.NativeOnPersist", contract::native_on_persist, 0, CallFlags::STATES),
        ("System.Contract.NativePostPersist", contract::native_post_persist, 0, CallFlags::STATES),
        // Storage
        ("System.Storage.GetContext", storage::get_context, 1 << 4, CallFlags::READ_STATES),
        ("System.Storage.GetReadOnlyContext", storage::get_read_only_context, 1 << 4, CallFlags::READ_STATES),
        ("System.Storage.AsReadOnly", storage::as_read_only, 1 << 4, CallFlags::READ_STATES),
        ("System.Storage.Get", storage::get, 1 << 15, CallFlags::READ_STATES),
        ("System.Storage.Put", storage::put, 1 << 15, CallFlags::WRITE_STATES),
        ("System.Storage.Delete", storage::delete, 1 << 15, CallFlags::WRITE_STATES),
        ("System.Storage.Find", storage::find, 1 << 15, CallFlags::READ_STATES),
        // Crypto
        ("System.Crypto.CheckSig", crypto::check_sig, 1 << 15, CallFlags::NONE),
        ("System.Crypto.CheckMultisig", crypto::check_multisig, 0, CallFlags::NONE),
        // Iterator
        ("System.Iterator.Next", iterator::next, 1 << 15, CallFlags::NONE),
        ("System.Iterator.Value", iterator::value, 1 << 4, CallFlags::NONE),
    ];
    list.into_iter()
        .map(|descriptor| (syscall_id(descriptor.name), descriptor))
        .collect()
});

/// Looks up a descriptor by interop id.
pub fn descriptor(id: u32) -> Option<&'static InteropDescriptor> {
    REGISTRY.get(&id)
}

/// Looks up a descriptor by name (tests and script builders).
pub fn descriptor_by_name(name: &str) -> Option<&'static InteropDescriptor> {
    REGISTRY.get(&syscall_id(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_resolve_to_names() {
        let descriptor = descriptor_by_name("System.Contract.Call").unwrap();
        assert_eq!(descriptor.name, "System.Contract.Call");
        assert!(descriptor.required_flags.contains(CallFlags::ALLOW_CALL));
    }

    #[test]
    fn unknown_id_is_none() {
        assert!(descriptor(0xdead_beef).is_none());
    }

    #[test]
    fn registry_has_no_id_collisions() {
        // Every listed name must survive the id mapping.
        assert!(REGISTRY.len() >= 35);
    }
}
