//! The CryptoLib native: hashing and signature verification for scripts.

use super::{native_hash, NativeContract, NativeMethodMeta};
use crate::engine::ApplicationEngine;
use neonova_core::UInt160;
use neonova_vm::{StackItem, VmError, VmResult};

const ID: i32 = -3;

/// secp256r1 curve identifier accepted by `verifyWithECDsa`.
const CURVE_SECP256R1: i64 = 23;

pub struct CryptoLib {
    hash: UInt160,
    methods: Vec<NativeMethodMeta>,
}

impl CryptoLib {
    pub fn new() -> Self {
        let methods = vec![
            NativeMethodMeta::pure("sha256", 1, 1 << 15),
            NativeMethodMeta::pure("ripemd160", 1, 1 << 15),
            NativeMethodMeta::pure("murmur32", 2, 1 << 13),
            NativeMethodMeta::pure("verifyWithECDsa", 4, 1 << 15),
        ];
        Self {
            hash: native_hash("CryptoLib"),
            methods,
        }
    }
}

impl Default for CryptoLib {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for CryptoLib {
    fn name(&self) -> &'static str {
        "CryptoLib"
    }

    fn id(&self) -> i32 {
        ID
    }

    fn hash(&self) -> UInt160 {
        self.hash
    }

    fn methods(&self) -> &[NativeMethodMeta] {
        &self.methods
    }

    fn invoke(
        &self,
        _engine: &mut ApplicationEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> VmResult<StackItem> {
        match method {
            "sha256" => {
                let data = args[0].as_bytes()?;
                Ok(StackItem::from_bytes(neonova_crypto::sha256(&data).to_vec()))
            }
            "ripemd160" => {
                let data = args[0].as_bytes()?;
                Ok(StackItem::from_bytes(
                    neonova_crypto::ripemd160(&data).to_vec(),
                ))
            }
            "murmur32" => {
                let data = args[0].as_bytes()?;
                let seed = args[1].as_i64()? as u32;
                Ok(StackItem::from_bytes(
                    murmur32(&data, seed).to_le_bytes().to_vec(),
                ))
            }
            "verifyWithECDsa" => {
                let message = args[0].as_bytes()?;
                let public_key = args[1].as_bytes()?;
                let signature = args[2].as_bytes()?;
                let curve = args[3].as_i64()?;
                if curve != CURVE_SECP256R1 {
                    return Err(VmError::throw("unsupported curve"));
                }
                Ok(StackItem::Boolean(neonova_crypto::verify_signature(
                    &message,
                    &signature,
                    &public_key,
                )))
            }
            _ => Err(VmError::throw(format!("unknown CryptoLib method {method}"))),
        }
    }
}

/// MurmurHash3 32-bit.
fn murmur32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;
    let mut h = seed;
    let chunks = data.chunks_exact(4);
    let tail = chunks.remainder();
    for chunk in chunks {
        let mut k = u32::from_le_bytes(chunk.try_into().unwrap());
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h ^= k;
        h = h.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }
    let mut k = 0u32;
    for (i, byte) in tail.iter().enumerate() {
        k ^= (*byte as u32) << (8 * i);
    }
    if !tail.is_empty() {
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h ^= k;
    }
    h ^= data.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn murmur32_reference_vectors() {
        assert_eq!(murmur32(b"", 0), 0);
        assert_eq!(murmur32(b"", 1), 0x514e_28b7);
        assert_eq!(murmur32(b"hello", 0), 0x248b_fa47);
    }
}
