//! `System.Contract.*` handlers.

use super::runtime::hash_from_bytes;
use crate::engine::{ApplicationEngine, TriggerType};
use crate::native::NativeContract;
use crate::standard;
use neonova_crypto::ECPoint;
use neonova_vm::{CallFlags, StackItem, VmError, VmResult};

pub(super) fn call(engine: &mut ApplicationEngine) -> VmResult<()> {
    let hash = hash_from_bytes(&engine.vm_mut().pop_bytes()?)?;
    let method = engine.vm_mut().pop()?.as_string()?;
    let flag_bits = engine.vm_mut().pop()?.as_i64()?;
    let args_item = engine.vm_mut().pop()?;
    let flags = u8::try_from(flag_bits)
        .ok()
        .and_then(CallFlags::from_bits)
        .ok_or_else(|| VmError::throw("invalid call flags"))?;
    let args = engine.array_arg(&args_item)?;
    engine.call_contract(hash, &method, flags, args, true)
}

/// Dispatch target of the native contract stub scripts.
pub(super) fn call_native(engine: &mut ApplicationEngine) -> VmResult<()> {
    let current = engine.vm().current_context()?.script_hash();
    let natives = engine.natives();
    let native = natives
        .by_hash(&current)
        .ok_or_else(|| VmError::invalid_operation("CallNative outside a native contract"))?;
    if !engine
        .settings()
        .native_active_in(native.name(), engine.block_height())
    {
        return Err(VmError::throw(format!(
            "native contract {} is not active yet",
            native.name()
        )));
    }
    let method = engine.vm_mut().pop()?.as_string()?;
    let args_item = engine.vm_mut().pop()?;
    let args = engine.array_arg(&args_item)?;

    let meta = native
        .methods()
        .iter()
        .find(|m| m.name == method && m.params == args.len())
        .ok_or_else(|| {
            VmError::throw(format!(
                "native method {}/{} not found on {}",
                method,
                args.len(),
                native.name()
            ))
        })?;
    let factor = engine.vm().exec_fee_factor() as i64;
    engine.vm_mut().consume_gas(meta.price.saturating_mul(factor))?;
    let current_flags = engine.vm().current_context()?.call_flags;
    if !current_flags.contains(meta.required_flags) {
        return Err(VmError::invalid_operation(format!(
            "native method {method} requires {:?}",
            meta.required_flags
        )));
    }
    let has_return = meta.has_return;
    let result = native.invoke(engine, &method, args)?;
    if has_return {
        engine.vm_mut().push(result)?;
    }
    Ok(())
}

pub(super) fn get_call_flags(engine: &mut ApplicationEngine) -> VmResult<()> {
    let flags = engine.vm().current_context()?.call_flags;
    engine.vm_mut().push(StackItem::from_int(flags.bits() as i64))
}

pub(super) fn create_standard_account(engine: &mut ApplicationEngine) -> VmResult<()> {
    let key_bytes = engine.vm_mut().pop_bytes()?;
    let key = ECPoint::from_bytes(&key_bytes)
        .map_err(|e| VmError::throw(format!("invalid public key: {e}")))?;
    let script = standard::create_signature_script(&key);
    let hash = neonova_crypto::hash160(&script);
    engine.vm_mut().push(StackItem::from_bytes(hash.to_vec()))
}

pub(super) fn create_multisig_account(engine: &mut ApplicationEngine) -> VmResult<()> {
    let m = engine.vm_mut().pop()?.as_index()?;
    let keys_item = engine.vm_mut().pop()?;
    let keys: Vec<ECPoint> = engine
        .array_arg(&keys_item)?
        .iter()
        .map(|item| {
            let bytes = item.as_bytes()?;
            ECPoint::from_bytes(&bytes).map_err(|e| VmError::throw(format!("invalid key: {e}")))
        })
        .collect::<VmResult<_>>()?;
    let script = standard::create_multisig_script(m, &keys)
        .ok_or_else(|| VmError::throw("invalid multisig parameters"))?;
    let hash = neonova_crypto::hash160(&script);
    engine.vm_mut().push(StackItem::from_bytes(hash.to_vec()))
}

/// Runs every active native's OnPersist hook; invoked by the applicator's
/// system script at the start of a block.
pub(super) fn native_on_persist(engine: &mut ApplicationEngine) -> VmResult<()> {
    if engine.trigger() != TriggerType::OnPersist {
        return Err(VmError::invalid_operation(
            "NativeOnPersist requires the OnPersist trigger",
        ));
    }
    let natives = engine.natives();
    let height = engine.block_height();
    for native in natives.all() {
        if engine.settings().native_active_in(native.name(), height) {
            native.on_persist(engine)?;
        }
    }
    Ok(())
}

/// Runs every active native's PostPersist hook at the end of a block.
pub(super) fn native_post_persist(engine: &mut ApplicationEngine) -> VmResult<()> {
    if engine.trigger() != TriggerType::PostPersist {
        return Err(VmError::invalid_operation(
            "NativePostPersist requires the PostPersist trigger",
        ));
    }
    let natives = engine.natives();
    let height = engine.block_height();
    for native in natives.all() {
        if engine.settings().native_active_in(native.name(), height) {
            native.post_persist(engine)?;
        }
    }
    Ok(())
}
