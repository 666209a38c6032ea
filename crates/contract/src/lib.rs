//! Contract execution layer: the application engine binding the VM to chain
//! state, the interop syscall surface, and the native contracts.

use thiserror::Error;

pub mod dao;
mod contract_state;
pub mod engine;
pub mod interop;
pub mod manifest;
pub mod native;
mod standard;

pub use contract_state::{ContractState, MethodToken, NefFile};
pub use dao::Dao;
pub use engine::{
    ApplicationEngine, LogEvent, NotificationEvent, TriggerType, VmResultItem,
};
pub use standard::{
    contract_hash, create_multisig_script, create_signature_script, is_multisig_script,
    is_signature_script,
};

/// Errors from contract-layer value handling (state and manifest parsing).
/// Execution-time failures travel as [`neonova_vm::VmError`] so the engine's
/// fault machinery applies uniformly.
#[derive(Error, Debug)]
pub enum ContractError {
    #[error(transparent)]
    Io(#[from] neonova_io::IoError),

    #[error("invalid NEF file: {0}")]
    InvalidNef(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("manifest is not valid JSON: {0}")]
    ManifestJson(#[from] serde_json::Error),
}

pub type ContractResult<T> = std::result::Result<T, ContractError>;
