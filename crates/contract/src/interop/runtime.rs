//! `System.Runtime.*` handlers.

use crate::engine::ApplicationEngine;
use neonova_core::{Signer, UInt160};
use neonova_vm::stack_item::serialize_item;
use neonova_vm::{CallFlags, EvaluationStack, ExecutionContext, Script, StackItem, VmError, VmResult};
use std::cell::RefCell;
use std::rc::Rc;

const MAX_EVENT_NAME: usize = 32;
const MAX_LOG_LENGTH: usize = 1024;

pub(super) fn platform(engine: &mut ApplicationEngine) -> VmResult<()> {
    engine.vm_mut().push(StackItem::from_string("NEO"))
}

pub(super) fn get_network(engine: &mut ApplicationEngine) -> VmResult<()> {
    let network = engine.settings().network;
    engine.vm_mut().push(StackItem::from_int(network as i64))
}

pub(super) fn get_trigger(engine: &mut ApplicationEngine) -> VmResult<()> {
    let trigger = engine.trigger() as u8;
    engine.vm_mut().push(StackItem::from_int(trigger as i64))
}

pub(super) fn get_time(engine: &mut ApplicationEngine) -> VmResult<()> {
    let timestamp = engine
        .persisting_block()
        .map(|b| b.header.timestamp)
        .ok_or_else(|| VmError::invalid_operation("no persisting block for GetTime"))?;
    engine.vm_mut().push(StackItem::from_int(timestamp as i64))
}

/// The transaction as scripts see it: an array of its header fields.
pub(super) fn get_script_container(engine: &mut ApplicationEngine) -> VmResult<()> {
    let Some(tx) = engine.container().cloned() else {
        return engine.vm_mut().push(StackItem::Null);
    };
    let item = transaction_to_item(engine, &tx)?;
    engine.vm_mut().push(item)
}

pub(super) fn get_executing_script_hash(engine: &mut ApplicationEngine) -> VmResult<()> {
    let hash = engine.vm().current_context()?.script_hash();
    engine.vm_mut().push(StackItem::from_bytes(hash.to_vec()))
}

pub(super) fn get_calling_script_hash(engine: &mut ApplicationEngine) -> VmResult<()> {
    let calling = engine.vm().current_context()?.calling_script_hash;
    match calling {
        Some(hash) => engine.vm_mut().push(StackItem::from_bytes(hash.to_vec())),
        None => engine.vm_mut().push(StackItem::Null),
    }
}

pub(super) fn get_entry_script_hash(engine: &mut ApplicationEngine) -> VmResult<()> {
    let hash = engine
        .vm()
        .entry_context()
        .map(|c| c.script_hash())
        .unwrap_or_default();
    engine.vm_mut().push(StackItem::from_bytes(hash.to_vec()))
}

pub(super) fn check_witness(engine: &mut ApplicationEngine) -> VmResult<()> {
    let raw = engine.vm_mut().pop_bytes()?;
    let hash = hash_from_bytes(&raw)?;
    let result = engine.check_witness(&hash)?;
    engine.vm_mut().push(StackItem::Boolean(result))
}

pub(super) fn get_invocation_counter(engine: &mut ApplicationEngine) -> VmResult<()> {
    let hash = engine.vm().current_context()?.script_hash();
    let counter = engine.invocation_counter(&hash).max(1);
    engine.vm_mut().push(StackItem::from_int(counter as i64))
}

pub(super) fn get_random(engine: &mut ApplicationEngine) -> VmResult<()> {
    let value = engine.next_random();
    engine.vm_mut().push(StackItem::from_int(value))
}

pub(super) fn log(engine: &mut ApplicationEngine) -> VmResult<()> {
    let message = engine.vm_mut().pop()?.as_string()?;
    if message.len() > MAX_LOG_LENGTH {
        return Err(VmError::throw("log message too long"));
    }
    let contract = engine.vm().current_context()?.script_hash();
    engine.add_log(contract, message);
    Ok(())
}

pub(super) fn notify(engine: &mut ApplicationEngine) -> VmResult<()> {
    let name = engine.vm_mut().pop()?.as_string()?;
    let state = engine.vm_mut().pop()?;
    if name.len() > MAX_EVENT_NAME {
        return Err(VmError::throw("event name too long"));
    }
    if !matches!(state, StackItem::Array(_)) {
        return Err(VmError::InvalidType {
            operation: "Notify",
            expected: "array state",
        });
    }
    // Notification state must have a canonical byte form.
    let serialized = serialize_item(&state)?;
    let contract = engine.vm().current_context()?.script_hash();
    engine.add_notification(contract, name, serialized);
    Ok(())
}

pub(super) fn get_notifications(engine: &mut ApplicationEngine) -> VmResult<()> {
    let filter_item = engine.vm_mut().pop()?;
    let filter = match &filter_item {
        StackItem::Null => None,
        other => Some(hash_from_bytes(&other.as_bytes()?)?),
    };
    let rc = engine.vm().reference_counter().clone();
    let mut entries = Vec::new();
    for event in engine.notifications_for(filter) {
        let state = neonova_vm::stack_item::deserialize_item(&event.state, &rc)?;
        entries.push(StackItem::new_array(
            &rc,
            vec![
                StackItem::from_bytes(event.contract.to_vec()),
                StackItem::from_string(event.name.clone()),
                state,
            ],
        )?);
    }
    let array = StackItem::new_array(&rc, entries)?;
    engine.vm_mut().push(array)
}

pub(super) fn gas_left(engine: &mut ApplicationEngine) -> VmResult<()> {
    let left = engine.vm().gas_left();
    engine.vm_mut().push(StackItem::from_int(left))
}

pub(super) fn burn_gas(engine: &mut ApplicationEngine) -> VmResult<()> {
    let amount = engine.vm_mut().pop()?.as_i64()?;
    if amount <= 0 {
        return Err(VmError::throw("BurnGas amount must be positive"));
    }
    engine.vm_mut().consume_gas(amount)
}

/// Signers of the current transaction with their scopes, for scripts that
/// inspect authorization.
pub(super) fn current_signers(engine: &mut ApplicationEngine) -> VmResult<()> {
    let rc = engine.vm().reference_counter().clone();
    let Some(tx) = engine.container() else {
        return engine.vm_mut().push(StackItem::Null);
    };
    let signers = tx.signers.clone();
    let mut entries = Vec::with_capacity(signers.len());
    for signer in &signers {
        entries.push(signer_to_item(&rc, signer)?);
    }
    let array = StackItem::new_array(&rc, entries)?;
    engine.vm_mut().push(array)
}

/// Loads a dynamic script with restricted flags.
pub(super) fn load_script(engine: &mut ApplicationEngine) -> VmResult<()> {
    let script_bytes = engine.vm_mut().pop_bytes()?;
    let flag_bits = engine.vm_mut().pop()?.as_i64()?;
    let args = engine.vm_mut().pop()?;
    let flags = CallFlags::from_bits(flag_bits as u8)
        .ok_or_else(|| VmError::throw("invalid call flags"))?;
    let current_flags = engine.vm().current_context()?.call_flags;
    let caller_hash = engine.vm().current_context()?.script_hash();
    let script = Script::new(script_bytes);
    script.validate()?;
    let rc = engine.vm().reference_counter().clone();
    let eval = Rc::new(RefCell::new(EvaluationStack::new(rc)));
    let mut context = ExecutionContext::new(script, 1, eval, current_flags & flags);
    context.set_calling_script_hash(Some(caller_hash));
    context.null_on_unload = false;
    let arguments = engine.array_arg(&args)?;
    let frame = engine.vm_mut().load_context(context)?;
    {
        let mut stack = frame.evaluation_stack().borrow_mut();
        for argument in arguments.into_iter().rev() {
            stack.push(argument)?;
        }
    }
    Ok(())
}

pub(super) fn signer_to_item(
    rc: &neonova_vm::ReferenceCounter,
    signer: &Signer,
) -> VmResult<StackItem> {
    let contracts: Vec<StackItem> = signer
        .allowed_contracts
        .iter()
        .map(|h| StackItem::from_bytes(h.to_vec()))
        .collect();
    let groups: Vec<StackItem> = signer
        .allowed_groups
        .iter()
        .map(|g| StackItem::from_bytes(g.to_vec()))
        .collect();
    StackItem::new_array(
        rc,
        vec![
            StackItem::from_bytes(signer.account.to_vec()),
            StackItem::from_int(signer.scopes.bits() as i64),
            StackItem::new_array(rc, contracts)?,
            StackItem::new_array(rc, groups)?,
            StackItem::from_int(signer.rules.len() as i64),
        ],
    )
}

pub(super) fn transaction_to_item(
    engine: &ApplicationEngine,
    tx: &neonova_core::Transaction,
) -> VmResult<StackItem> {
    let rc = engine.vm().reference_counter().clone();
    StackItem::new_array(
        &rc,
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

pub(super) fn hash_from_bytes(bytes: &[u8]) -> VmResult<UInt160> {
    UInt160::from_slice(bytes).map_err(|_| VmError::throw("expected a 20-byte hash"))
}
