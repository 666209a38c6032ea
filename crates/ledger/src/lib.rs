//! The chain ledger: transaction verification, the memory pool and the
//! single-writer block applicator.

use thiserror::Error;

mod blockchain;
mod events;
mod mempool;
mod results;
mod verification;

pub use blockchain::Blockchain;
pub use events::Subscriptions;
pub use mempool::MemPool;
pub use results::AppExecResult;

/// Why a transaction was rejected. Each variant is a distinct kind callers
/// can match on; `InvalidAttribute` carries the offending attribute kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("transaction expired")]
    Expired,

    #[error("transaction exceeds the size limit")]
    TooBig,

    #[error("network fee too small: needs {required}, declared {declared}")]
    SmallNetworkFee { required: i64, declared: i64 },

    #[error("transaction script is malformed")]
    InvalidScript,

    #[error("signer {0} is blocked by policy")]
    PolicyBlocked(neonova_core::UInt160),

    #[error("sender cannot cover fees")]
    InsufficientFunds,

    #[error("invalid {kind} attribute: {reason}")]
    InvalidAttribute { kind: &'static str, reason: String },

    #[error("conflicts with the memory pool")]
    MemPoolConflict,

    #[error("transaction conflicts with an on-chain transaction")]
    HasConflicts,

    #[error("transaction already exists")]
    AlreadyExists,

    #[error("memory pool is full")]
    OutOfMemory,

    #[error("invocation script is not push-only")]
    InvalidInvocation,

    #[error("verification script hash does not match the signer")]
    WitnessHashMismatch,

    #[error("witness verification failed: {0}")]
    VerificationFailed(String),

    #[error("no contract deployed at verification account {0}")]
    UnknownVerificationContract(neonova_core::UInt160),

    #[error("verification contract has no usable verify method")]
    InvalidVerificationContract,

    #[error("native contract witnesses cannot be customized")]
    NativeContractWitness,
}

/// Why a block was rejected or the store failed to initialize.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockchainError {
    #[error("block {index} does not link to the current chain tip")]
    HeaderLinkage { index: u32 },

    #[error("block timestamp does not increase")]
    HeaderTimestamp,

    #[error("block merkle root mismatch")]
    HeaderMerkleRoot,

    #[error("block witness is not the expected consensus witness")]
    HeaderWitness,

    #[error("header carries a state root but the protocol disables them")]
    HdrStateRootSetting,

    #[error("header state root does not match the local root")]
    HdrInvalidStateRoot,

    #[error("node is shutting down")]
    ShuttingDown,

    #[error("transaction rejected: {0}")]
    Tx(#[from] VerifyError),

    #[error("system invocation faulted: {0}")]
    SystemFault(String),

    #[error("state trie failure: {0}")]
    Mpt(String),
}

/// Startup validation failures; each is fatal and names the broken record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("storage version mismatch: stored {stored}, running {running}")]
    VersionMismatch { stored: String, running: String },

    #[error("{flag} setting mismatch")]
    FlagMismatch { flag: &'static str },

    #[error("header hash list batch {batch} is missing or short")]
    HeaderHashListGap { batch: u32 },

    #[error("current block pointer does not resolve")]
    MissingCurrentBlock,

    #[error("current header pointer does not resolve")]
    MissingCurrentHeader,

    #[error("state root for height {height} is missing")]
    MissingStateRoot { height: u32 },

    #[error("native contract {name} has no stored state")]
    MissingNativeState { name: String },

    #[error("stored state of native contract {name} diverges from its schema")]
    NativeStateMismatch { name: String },
}

pub type VerifyResult<T> = std::result::Result<T, VerifyError>;
