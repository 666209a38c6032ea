//! Binary serialization primitives shared by every neonova crate.
//!
//! The wire encoding is little-endian with var-int length prefixes, matching
//! the network format consumed and produced by the rest of the node.

use thiserror::Error;

mod binary_writer;
mod memory_reader;
mod serializable;

pub use binary_writer::BinaryWriter;
pub use memory_reader::MemoryReader;
pub use serializable::{var_size, var_size_of_bytes, Serializable};

/// Errors produced while encoding or decoding wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IoError {
    /// The reader ran out of input before the value was complete.
    #[error("unexpected end of stream while reading {context}")]
    EndOfStream { context: &'static str },

    /// The input decoded, but the value violates a format rule.
    #[error("invalid data for {context}: {reason}")]
    InvalidData { context: &'static str, reason: String },

    /// A length prefix exceeds the limit imposed by the caller.
    #[error("{context} length {length} exceeds limit {limit}")]
    LengthExceeded {
        context: &'static str,
        length: u64,
        limit: u64,
    },
}

impl IoError {
    pub fn invalid_data(context: &'static str, reason: impl Into<String>) -> Self {
        IoError::InvalidData {
            context,
            reason: reason.into(),
        }
    }
}

/// Result alias for serialization routines.
pub type IoResult<T> = std::result::Result<T, IoError>;
