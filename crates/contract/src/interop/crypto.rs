//! `System.Crypto.*` handlers.

use crate::engine::ApplicationEngine;
use neonova_vm::{StackItem, VmError, VmResult};

/// Fee per signature check, in base units.
pub const CHECK_SIG_PRICE: i64 = 1 << 15;

fn sign_data(engine: &ApplicationEngine) -> VmResult<Vec<u8>> {
    let network = engine.settings().network;
    engine
        .container()
        .map(|tx| tx.sign_data(network))
        .ok_or_else(|| VmError::invalid_operation("no script container to verify against"))
}

pub(super) fn check_sig(engine: &mut ApplicationEngine) -> VmResult<()> {
    let public_key = engine.vm_mut().pop_bytes()?;
    let signature = engine.vm_mut().pop_bytes()?;
    let message = sign_data(engine)?;
    let valid = neonova_crypto::verify_signature(&message, &signature, &public_key);
    engine.vm_mut().push(StackItem::Boolean(valid))
}

/// Pops a signature-element list: either a packed array, or the multisig
/// script form of a count followed by that many loose items. Items come
/// back in their original push order.
fn pop_sig_elements(engine: &mut ApplicationEngine) -> VmResult<Vec<Vec<u8>>> {
    let top = engine.vm_mut().pop()?;
    match &top {
        StackItem::Array(inner) | StackItem::Struct(inner) => inner
            .borrow()
            .items()
            .iter()
            .map(|item| item.as_bytes())
            .collect(),
        StackItem::Integer(_) => {
            let count = top.as_index()?;
            if count == 0 || count > neonova_config::MAX_MULTISIG_KEYS {
                return Err(VmError::throw("invalid signature element count"));
            }
            let mut elements = Vec::with_capacity(count);
            for _ in 0..count {
                elements.push(engine.vm_mut().pop_bytes()?);
            }
            elements.reverse();
            Ok(elements)
        }
        _ => Err(VmError::throw("expected an array or a count")),
    }
}

/// M-of-N signature check. Charged per declared key; both lists must come
/// in matching order since verification is a single forward pass.
pub(super) fn check_multisig(engine: &mut ApplicationEngine) -> VmResult<()> {
    let keys = pop_sig_elements(engine)?;
    let signatures = pop_sig_elements(engine)?;

    if signatures.is_empty() || keys.is_empty() || signatures.len() > keys.len() {
        return Err(VmError::throw("invalid multisig arity"));
    }
    let factor = engine.vm().exec_fee_factor() as i64;
    engine
        .vm_mut()
        .consume_gas(CHECK_SIG_PRICE.saturating_mul(factor).saturating_mul(keys.len() as i64))?;

    let message = sign_data(engine)?;
    let mut key_index = 0usize;
    let mut matched = 0usize;
    for signature in &signatures {
        while key_index < keys.len() {
            if neonova_crypto::verify_signature(&message, signature, &keys[key_index]) {
                matched += 1;
                key_index += 1;
                break;
            }
            key_index += 1;
        }
        if matched + (keys.len() - key_index) < signatures.len() {
            break;
        }
    }
    engine
        .vm_mut()
        .push(StackItem::Boolean(matched == signatures.len()))
}
