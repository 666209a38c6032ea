//! Protocol settings and hard limits.
//!
//! Everything the state-transition function treats as a constant of the
//! protocol lives here: VM limits, fee units, and the per-network
//! [`ProtocolSettings`] record loaded from configuration.

mod limits;
mod settings;

pub use limits::*;
pub use settings::{NativeActivation, ProtocolSettings};

use thiserror::Error;

/// Errors raised while loading or validating settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid protocol settings: {0}")]
    Invalid(String),

    #[error("malformed settings document: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
