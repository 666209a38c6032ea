//! Shared NEP-17 transfer plumbing for the token natives.

use crate::engine::ApplicationEngine;
use crate::native::{management, NativeContract};
use neonova_core::UInt160;
use neonova_vm::stack_item::serialize_item;
use neonova_vm::{StackItem, VmError, VmResult};
use num_bigint::BigInt;

/// Emits the standard `Transfer` notification and, when the recipient is a
/// deployed contract, invokes its `onNEP17Payment` hook.
pub(crate) fn post_transfer(
    engine: &mut ApplicationEngine,
    token: UInt160,
    from: Option<UInt160>,
    to: Option<UInt160>,
    amount: &BigInt,
    data: StackItem,
) -> VmResult<()> {
    let rc = engine.vm().reference_counter().clone();
    let state = StackItem::new_array(
        &rc,
        vec![
            hash_or_null(from),
            hash_or_null(to),
            StackItem::Integer(amount.clone()),
        ],
    )?;
    let serialized = serialize_item(&state)?;
    engine.add_notification(token, "Transfer".to_string(), serialized);

    if let Some(recipient) = to {
        let is_deployed = management::get_contract(engine.snapshot(), &recipient)
            .map(|c| c.id >= 0)
            .unwrap_or(false);
        if is_deployed {
            let callee_has_hook = management::get_contract(engine.snapshot(), &recipient)
                .map(|c| c.manifest.method("onNEP17Payment", 3).is_some())
                .unwrap_or(false);
            if !callee_has_hook {
                return Err(VmError::throw(format!(
                    "receiving contract {recipient} does not implement onNEP17Payment"
                )));
            }
            engine.call_from_native(
                recipient,
                "onNEP17Payment",
                vec![
                    hash_or_null(from),
                    StackItem::Integer(amount.clone()),
                    data,
                ],
                false,
            )?;
        } else if engine.natives().by_hash(&recipient).is_some() {
            // Native recipients (Notary deposits) take the hook directly.
            let natives = engine.natives();
            if let Some(native) = natives.by_hash(&recipient) {
                native.invoke(
                    engine,
                    "onNEP17Payment",
                    vec![
                        hash_or_null(from),
                        StackItem::Integer(amount.clone()),
                        data,
                    ],
                )?;
            }
        }
    }
    Ok(())
}

pub(crate) fn hash_or_null(hash: Option<UInt160>) -> StackItem {
    match hash {
        Some(hash) => StackItem::from_bytes(hash.to_vec()),
        None => StackItem::Null,
    }
}
