//! Chain data model: hashes, transactions, signers, witnesses and blocks.
//!
//! Everything here is a value type with a canonical wire encoding; the
//! executable semantics (witness evaluation, fee accounting) live in the
//! contract and ledger crates.

use thiserror::Error;

mod attribute;
mod block;
mod merkle;
mod signer;
mod transaction;
mod uint160;
mod uint256;
mod witness;
mod witness_rule;

pub use attribute::{OracleResponseCode, TransactionAttribute};
pub use block::{Block, Header};
pub use merkle::merkle_root;
pub use signer::{Signer, WitnessScope};
pub use transaction::Transaction;
pub use uint160::UInt160;
pub use uint256::UInt256;
pub use witness::Witness;
pub use witness_rule::{WitnessCondition, WitnessRule, WitnessRuleAction};

/// Errors raised by the data model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error(transparent)]
    Io(#[from] neonova_io::IoError),

    #[error("invalid {what}: {reason}")]
    InvalidFormat { what: &'static str, reason: String },

    #[error("invalid hash string: {0}")]
    InvalidHash(String),
}

impl CoreError {
    pub fn format(what: &'static str, reason: impl Into<String>) -> Self {
        CoreError::InvalidFormat {
            what,
            reason: reason.into(),
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
