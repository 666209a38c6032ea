//! Execution results surfaced to subscribers and RPC.

use neonova_contract::{NotificationEvent, TriggerType, VmResultItem};
use neonova_core::UInt256;
use neonova_vm::VmState;

/// Outcome of one top-level invocation: a transaction script or a persist
/// hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppExecResult {
    /// Transaction hash, or the block hash for persist triggers.
    pub container: UInt256,
    pub trigger: TriggerType,
    pub vm_state: VmState,
    pub gas_consumed: i64,
    /// Result stack, serialized; `None` marks unserializable items.
    pub stack: Vec<VmResultItem>,
    pub notifications: Vec<NotificationEvent>,
    /// Uncaught exception text when `vm_state` is FAULT.
    pub exception: Option<String>,
}

impl AppExecResult {
    pub fn faulted(&self) -> bool {
        self.vm_state == VmState::Fault
    }
}
