//! `System.Storage.*` handlers.

use super::iterator::{FindOptions, StorageIterator};
use crate::engine::ApplicationEngine;
use crate::native::management;
use neonova_config::{MAX_STORAGE_KEY_SIZE, MAX_STORAGE_VALUE_SIZE};
use neonova_persistence::StorageKey;
use neonova_vm::stack_item::InteropItem;
use neonova_vm::{StackItem, VmError, VmResult};

/// A capability handle over one contract's storage range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageContext {
    pub id: i32,
    pub read_only: bool,
}

fn current_context_value(engine: &mut ApplicationEngine, read_only: bool) -> VmResult<StackItem> {
    let executing = engine.vm().current_context()?.script_hash();
    let contract = management::get_contract(engine.snapshot(), &executing)
        .ok_or_else(|| VmError::throw("no storage context outside a deployed contract"))?;
    Ok(StackItem::Interop(InteropItem::new(
        "StorageContext",
        StorageContext {
            id: contract.id,
            read_only,
        },
    )))
}

fn pop_storage_context(engine: &mut ApplicationEngine) -> VmResult<StorageContext> {
    let item = engine.vm_mut().pop()?;
    let StackItem::Interop(interop) = item else {
        return Err(VmError::InvalidType {
            operation: "storage syscall",
            expected: "StorageContext",
        });
    };
    let object = interop.object().borrow();
    object
        .downcast_ref::<StorageContext>()
        .copied()
        .ok_or(VmError::InvalidType {
            operation: "storage syscall",
            expected: "StorageContext",
        })
}

pub(super) fn get_context(engine: &mut ApplicationEngine) -> VmResult<()> {
    let value = current_context_value(engine, false)?;
    engine.vm_mut().push(value)
}

pub(super) fn get_read_only_context(engine: &mut ApplicationEngine) -> VmResult<()> {
    let value = current_context_value(engine, true)?;
    engine.vm_mut().push(value)
}

pub(super) fn as_read_only(engine: &mut ApplicationEngine) -> VmResult<()> {
    let mut context = pop_storage_context(engine)?;
    context.read_only = true;
    engine.vm_mut().push(StackItem::Interop(InteropItem::new(
        "StorageContext",
        context,
    )))
}

pub(super) fn get(engine: &mut ApplicationEngine) -> VmResult<()> {
    let context = pop_storage_context(engine)?;
    let key = engine.vm_mut().pop_bytes()?;
    let value = engine
        .snapshot()
        .get_storage(&StorageKey::new(context.id, key));
    engine
        .vm_mut()
        .push(neonova_vm::stack_item::option_bytes(value))
}

pub(super) fn put(engine: &mut ApplicationEngine) -> VmResult<()> {
    let context = pop_storage_context(engine)?;
    let key = engine.vm_mut().pop_bytes()?;
    let value = engine.vm_mut().pop_bytes()?;
    if context.read_only {
        return Err(VmError::throw("storage context is read-only"));
    }
    if key.len() > MAX_STORAGE_KEY_SIZE {
        return Err(VmError::throw("storage key too large"));
    }
    if value.len() > MAX_STORAGE_VALUE_SIZE {
        return Err(VmError::throw("storage value too large"));
    }
    // Price: new bytes cost the full storage price, overwritten bytes the
    // difference.
    let storage_key = StorageKey::new(context.id, key.clone());
    let existing = engine.snapshot().get_storage(&storage_key);
    let storage_price = engine.natives().policy().storage_price(engine.snapshot()) as i64;
    let billable = match &existing {
        None => key.len() + value.len(),
        Some(old) => value.len().saturating_sub(old.len()).max(1),
    };
    engine
        .vm_mut()
        .consume_gas((billable as i64).saturating_mul(storage_price))?;
    engine.snapshot().put_storage(&storage_key, value);
    Ok(())
}

pub(super) fn delete(engine: &mut ApplicationEngine) -> VmResult<()> {
    let context = pop_storage_context(engine)?;
    let key = engine.vm_mut().pop_bytes()?;
    if context.read_only {
        return Err(VmError::throw("storage context is read-only"));
    }
    engine
        .snapshot()
        .delete_storage(&StorageKey::new(context.id, key));
    Ok(())
}

pub(super) fn find(engine: &mut ApplicationEngine) -> VmResult<()> {
    let context = pop_storage_context(engine)?;
    let key_prefix = engine.vm_mut().pop_bytes()?;
    let options_bits = engine.vm_mut().pop()?.as_i64()?;
    let options = FindOptions::from_bits(options_bits as u8)
        .ok_or_else(|| VmError::throw("invalid find options"))?;
    let entries = engine.snapshot().find_storage(
        context.id,
        &key_prefix,
        options.contains(FindOptions::BACKWARDS),
    );
    let iterator = StorageIterator::new(entries, key_prefix.len(), options);
    engine.vm_mut().push(StackItem::Interop(InteropItem::new(
        "StorageIterator",
        iterator,
    )))
}
