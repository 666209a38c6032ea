//! Standard account scripts and contract-hash derivation.

use neonova_core::UInt160;
use neonova_crypto::ECPoint;
use neonova_vm::{OpCode, ScriptBuilder};

/// Single-signature verification script:
/// `PUSHDATA1 33 <key> SYSCALL System.Crypto.CheckSig`.
pub fn create_signature_script(public_key: &ECPoint) -> Vec<u8> {
    let mut builder = ScriptBuilder::new();
    builder.push_bytes(public_key.as_bytes());
    builder.emit_syscall_named("System.Crypto.CheckSig");
    builder.into_bytes()
}

/// M-of-N multi-signature verification script. Keys are sorted by their
/// encoded form so every participant derives the same script.
pub fn create_multisig_script(m: usize, public_keys: &[ECPoint]) -> Option<Vec<u8>> {
    let n = public_keys.len();
    if m == 0 || m > n || n > neonova_config::MAX_MULTISIG_KEYS {
        return None;
    }
    let mut sorted: Vec<&ECPoint> = public_keys.iter().collect();
    sorted.sort();
    let mut builder = ScriptBuilder::new();
    builder.push_int(m as i64);
    for key in sorted {
        builder.push_bytes(key.as_bytes());
    }
    builder.push_int(n as i64);
    builder.emit_syscall_named("System.Crypto.CheckMultisig");
    Some(builder.into_bytes())
}

/// Recognizes the exact single-signature script shape.
pub fn is_signature_script(script: &[u8]) -> bool {
    script.len() == 40
        && script[0] == OpCode::PUSHDATA1 as u8
        && script[1] == 33
        && script[35] == OpCode::SYSCALL as u8
        && script[36..40] == neonova_vm::syscall_id("System.Crypto.CheckSig").to_le_bytes()
}

/// Recognizes a multi-signature script, returning `(m, n)` when it matches.
pub fn is_multisig_script(script: &[u8]) -> Option<(usize, usize)> {
    // Minimal shape: PUSH<m> (PUSHDATA1 33 key)+ PUSH<n> SYSCALL id.
    if script.len() < 42 {
        return None;
    }
    let (m, mut position) = push_int_at(script, 0)?;
    let mut count = 0usize;
    while position + 35 <= script.len()
        && script[position] == OpCode::PUSHDATA1 as u8
        && script[position + 1] == 33
    {
        position += 35;
        count += 1;
    }
    let (n, after_n) = push_int_at(script, position)?;
    position = after_n;
    if count != n || m > n || m == 0 {
        return None;
    }
    if script.len() != position + 5
        || script[position] != OpCode::SYSCALL as u8
        || script[position + 1..position + 5]
            != neonova_vm::syscall_id("System.Crypto.CheckMultisig").to_le_bytes()
    {
        return None;
    }
    Some((m, n))
}

/// Reads a small integer push at `position`, returning the value and the
/// position just past it.
fn push_int_at(script: &[u8], position: usize) -> Option<(usize, usize)> {
    let byte = *script.get(position)?;
    if (OpCode::PUSH1 as u8..=OpCode::PUSH16 as u8).contains(&byte) {
        return Some(((byte - OpCode::PUSH0 as u8) as usize, position + 1));
    }
    if byte == OpCode::PUSHINT8 as u8 {
        let value = *script.get(position + 1)? as usize;
        return Some((value, position + 2));
    }
    if byte == OpCode::PUSHINT16 as u8 {
        let lo = *script.get(position + 1)? as usize;
        let hi = *script.get(position + 2)? as usize;
        return Some((lo | (hi << 8), position + 3));
    }
    None
}

/// Deploy-time contract hash: `hash160(sender ‖ nef checksum ‖ name)`.
/// Native contracts use the zero sender and checksum zero.
pub fn contract_hash(sender: &UInt160, nef_checksum: u32, name: &str) -> UInt160 {
    let mut data = Vec::with_capacity(20 + 4 + name.len());
    data.extend_from_slice(sender.as_bytes());
    data.extend_from_slice(&nef_checksum.to_le_bytes());
    data.extend_from_slice(name.as_bytes());
    UInt160::from_array(neonova_crypto::hash160(&data))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: u8) -> ECPoint {
        neonova_crypto::public_key(&[seed; 32]).unwrap()
    }

    #[test]
    fn signature_script_shape() {
        let script = create_signature_script(&key(1));
        assert_eq!(script.len(), 40);
        assert!(is_signature_script(&script));
        assert!(is_multisig_script(&script).is_none());
    }

    #[test]
    fn multisig_script_shape_and_key_order() {
        let keys = [key(1), key(2), key(3)];
        let script = create_multisig_script(2, &keys).unwrap();
        assert_eq!(is_multisig_script(&script), Some((2, 3)));
        // Key order in the input must not affect the script.
        let shuffled = [key(3), key(1), key(2)];
        assert_eq!(create_multisig_script(2, &shuffled).unwrap(), script);
    }

    #[test]
    fn multisig_rejects_bad_m() {
        assert!(create_multisig_script(0, &[key(1)]).is_none());
        assert!(create_multisig_script(2, &[key(1)]).is_none());
    }

    #[test]
    fn contract_hash_depends_on_all_inputs() {
        let base = contract_hash(&UInt160::zero(), 0, "Token");
        assert_ne!(base, contract_hash(&UInt160::from_array([1; 20]), 0, "Token"));
        assert_ne!(base, contract_hash(&UInt160::zero(), 1, "Token"));
        assert_ne!(base, contract_hash(&UInt160::zero(), 0, "Other"));
    }
}
