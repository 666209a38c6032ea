//! Hashing and signature primitives.
//!
//! The core treats cryptography as a set of pure functions: script hashing,
//! transaction hashing and secp256r1 ECDSA verification. Key management and
//! signing workflows belong to the wallet, not here — the only signing helper
//! exported is what the test fixtures need.

mod ecdsa;
mod hash;

pub use ecdsa::{public_key, sign, verify_signature, ECPoint};
pub use hash::{hash160, hash256, ripemd160, sha256};

use thiserror::Error;

/// Errors surfaced by signature handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key encoding: {0}")]
    InvalidPublicKey(String),

    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),

    #[error("invalid private key")]
    InvalidPrivateKey,
}

pub type CryptoResult<T> = std::result::Result<T, CryptoError>;
