//! The neonova virtual machine.
//!
//! A stack-based interpreter with reference-counted stack items, nested call
//! frames, structured exception handling and gas metering. The VM itself is
//! host-agnostic: syscalls and call tokens surface as [`VmError::SyscallNeedsHost`]
//! unless an embedding engine intercepts them first.

use thiserror::Error;

mod call_flags;
mod evaluation_stack;
mod exception_handling;
mod execution_context;
mod execution_engine;
mod handlers;
mod instruction;
mod limits;
mod op_code;
mod reference_counter;
mod script;
mod script_builder;
mod slot;
pub mod stack_item;
mod vm_state;

pub use call_flags::CallFlags;
pub use evaluation_stack::EvaluationStack;
pub use exception_handling::{TryContext, TryState};
pub use execution_context::ExecutionContext;
pub use execution_engine::ExecutionEngine;
pub use instruction::Instruction;
pub use limits::ExecutionEngineLimits;
pub use op_code::OpCode;
pub use reference_counter::ReferenceCounter;
pub use script::Script;
pub use script_builder::{syscall_id, ScriptBuilder};
pub use stack_item::{StackItem, StackItemType};
pub use vm_state::VmState;

/// Errors raised during execution.
///
/// `Throw` is the only script-catchable variant; everything else transitions
/// the engine to FAULT unconditionally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VmError {
    /// A script-visible exception, catchable by TRY.
    #[error("exception: {0}")]
    Throw(String),

    #[error("invalid opcode {opcode:#04x} at position {position}")]
    InvalidOpcode { opcode: u8, position: usize },

    #[error("malformed script: {0}")]
    InvalidScript(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("stack underflow")]
    StackUnderflow,

    #[error("invalid type for {operation}: expected {expected}")]
    InvalidType {
        operation: &'static str,
        expected: &'static str,
    },

    #[error("integer exceeds 32-byte bound")]
    IntegerOverflow,

    #[error("item size limit exceeded")]
    ItemTooLarge,

    #[error("reference limit exceeded")]
    ReferenceLimit,

    #[error("invocation stack limit exceeded")]
    InvocationStackOverflow,

    #[error("try nesting limit exceeded")]
    TryNestingTooDeep,

    #[error("gas limit exceeded")]
    GasLimitExceeded,

    #[error("ABORT executed: {0}")]
    Abort(String),

    #[error("ASSERT failed: {0}")]
    AssertFailed(String),

    #[error("SYSCALL {0:#010x} requires a hosting engine")]
    SyscallNeedsHost(u32),

    #[error("CALLT requires a hosting engine")]
    CallTokenNeedsHost,
}

impl VmError {
    /// Whether a TRY scope may intercept this error.
    pub fn is_catchable(&self) -> bool {
        matches!(self, VmError::Throw(_))
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        VmError::InvalidOperation(message.into())
    }

    pub fn throw(message: impl Into<String>) -> Self {
        VmError::Throw(message.into())
    }
}

pub type VmResult<T> = std::result::Result<T, VmError>;
