//! The application engine: one VM run bound to a snapshot of chain state.

mod call;
mod witness;

use crate::dao::Dao;
use crate::native::NativeRegistry;
use neonova_config::ProtocolSettings;
use neonova_core::{Block, Transaction, UInt160};
use neonova_vm::stack_item::serialize_item;
use neonova_vm::{
    CallFlags, ExecutionEngine, OpCode, Script, StackItem, VmError, VmResult, VmState,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// What kind of invocation this engine performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TriggerType {
    OnPersist = 0x01,
    PostPersist = 0x02,
    Verification = 0x20,
    Application = 0x40,
}

/// A `System.Runtime.Notify` emission, in canonical serialized form so it
/// can cross thread boundaries into subscriber channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub contract: UInt160,
    pub name: String,
    /// Canonical bytes of the state array.
    pub state: Vec<u8>,
}

/// A `System.Runtime.Log` emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub contract: UInt160,
    pub message: String,
}

/// One item of the final result stack; `None` when the item has no
/// canonical serialization (pointers, iterators).
pub type VmResultItem = Option<Vec<u8>>;

/// Binds a VM run to a DAO snapshot, a trigger and a script container, and
/// mediates every syscall.
pub struct ApplicationEngine {
    pub(crate) vm: ExecutionEngine,
    trigger: TriggerType,
    container: Option<Transaction>,
    persisting_block: Option<Block>,
    dao: Dao,
    settings: Arc<ProtocolSettings>,
    natives: Arc<NativeRegistry>,
    notifications: Vec<NotificationEvent>,
    logs: Vec<LogEvent>,
    invocation_counters: HashMap<UInt160, u32>,
    pub(crate) initialized_contracts: HashSet<UInt160>,
    random_counter: u32,
}

impl ApplicationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trigger: TriggerType,
        container: Option<Transaction>,
        dao: Dao,
        persisting_block: Option<Block>,
        settings: Arc<ProtocolSettings>,
        natives: Arc<NativeRegistry>,
        gas_limit: i64,
    ) -> Self {
        let mut vm = ExecutionEngine::new();
        vm.set_gas_limit(gas_limit);
        vm.set_exec_fee_factor(natives.policy().exec_fee_factor(&dao));
        Self {
            vm,
            trigger,
            container,
            persisting_block,
            dao,
            settings,
            natives,
            notifications: Vec::new(),
            logs: Vec::new(),
            invocation_counters: HashMap::new(),
            initialized_contracts: HashSet::new(),
            random_counter: 0,
        }
    }

    // ---- accessors -------------------------------------------------------

    pub fn trigger(&self) -> TriggerType {
        self.trigger
    }

    pub fn container(&self) -> Option<&Transaction> {
        self.container.as_ref()
    }

    pub fn persisting_block(&self) -> Option<&Block> {
        self.persisting_block.as_ref()
    }

    pub fn snapshot(&self) -> &Dao {
        &self.dao
    }

    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    pub fn natives(&self) -> Arc<NativeRegistry> {
        self.natives.clone()
    }

    pub fn vm(&self) -> &ExecutionEngine {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut ExecutionEngine {
        &mut self.vm
    }

    pub fn notifications(&self) -> &[NotificationEvent] {
        &self.notifications
    }

    pub fn logs(&self) -> &[LogEvent] {
        &self.logs
    }

    pub fn gas_consumed(&self) -> i64 {
        self.vm.gas_consumed()
    }

    /// Height the engine operates at: the persisting block during persist
    /// triggers, the committed chain height otherwise.
    pub fn block_height(&self) -> u32 {
        match &self.persisting_block {
            Some(block) => block.index(),
            None => self.dao.height().unwrap_or(0),
        }
    }

    pub fn invocation_counter(&self, hash: &UInt160) -> u32 {
        self.invocation_counters.get(hash).copied().unwrap_or(0)
    }

    pub(crate) fn bump_invocation_counter(&mut self, hash: UInt160) {
        *self.invocation_counters.entry(hash).or_insert(0) += 1;
    }

    /// Deterministic per-invocation randomness: a hash chain over network
    /// magic, block nonce, container hash and a local counter.
    pub fn next_random(&mut self) -> u64 {
        let mut seed = Vec::with_capacity(48);
        seed.extend_from_slice(&self.settings.network.to_le_bytes());
        if let Some(block) = &self.persisting_block {
            seed.extend_from_slice(&block.header.nonce.to_le_bytes());
        }
        if let Some(tx) = &self.container {
            seed.extend_from_slice(tx.hash().as_bytes());
        }
        seed.extend_from_slice(&self.random_counter.to_le_bytes());
        self.random_counter += 1;
        let digest = neonova_crypto::sha256(&seed);
        u64::from_le_bytes(digest[..8].try_into().expect("digest width"))
    }

    pub fn add_log(&mut self, contract: UInt160, message: String) {
        tracing::debug!(contract = %contract, message, "contract log");
        self.logs.push(LogEvent { contract, message });
    }

    pub fn add_notification(&mut self, contract: UInt160, name: String, state: Vec<u8>) {
        self.notifications.push(NotificationEvent {
            contract,
            name,
            state,
        });
    }

    /// Notifications visible to scripts, optionally filtered by contract.
    pub fn notifications_for(&self, filter: Option<UInt160>) -> Vec<&NotificationEvent> {
        self.notifications
            .iter()
            .filter(|n| filter.map(|f| n.contract == f).unwrap_or(true))
            .collect()
    }

    // ---- script loading --------------------------------------------------

    /// Loads the top-level script (a transaction script or a verification
    /// script) with full flags.
    pub fn load_entry_script(&mut self, script: Vec<u8>, flags: CallFlags) -> VmResult<()> {
        self.vm.load_script(Script::new(script), -1, flags)?;
        Ok(())
    }

    // ---- run loop --------------------------------------------------------

    /// Runs to HALT or FAULT.
    pub fn execute(&mut self) -> VmState {
        if self.vm.state() == VmState::Break {
            self.vm.set_state(VmState::None);
        }
        while self.vm.state() != VmState::Halt && self.vm.state() != VmState::Fault {
            self.step();
        }
        self.vm.state()
    }

    /// Executes one instruction, intercepting the host-bound opcodes.
    pub(crate) fn step(&mut self) {
        let instruction = match self.vm.current_instruction() {
            Ok(instruction) => instruction,
            Err(error) => {
                self.vm.fail_or_throw(error);
                return;
            }
        };
        let Some(instruction) = instruction else {
            self.vm.step();
            return;
        };
        match instruction.opcode {
            OpCode::SYSCALL => {
                let frame = self.vm.begin_instruction();
                let id = instruction.operand_as_u32();
                match self.dispatch_syscall(id) {
                    Ok(()) => {
                        self.vm.finish_instruction(frame, &instruction);
                        if let Err(error) = self.vm.check_reference_limit() {
                            self.vm.fail_or_throw(error);
                        }
                    }
                    Err(error) => self.vm.fail_or_throw(error),
                }
            }
            OpCode::CALLT => {
                let frame = self.vm.begin_instruction();
                let charged = match self.vm.charge_for(OpCode::CALLT) {
                    Ok(()) => self.call_token(instruction.operand_as_u16()),
                    Err(error) => Err(error),
                };
                match charged {
                    Ok(()) => {
                        self.vm.finish_instruction(frame, &instruction);
                        if let Err(error) = self.vm.check_reference_limit() {
                            self.vm.fail_or_throw(error);
                        }
                    }
                    Err(error) => self.vm.fail_or_throw(error),
                }
            }
            _ => self.vm.step(),
        }
    }

    fn dispatch_syscall(&mut self, id: u32) -> VmResult<()> {
        let descriptor = crate::interop::descriptor(id)
            .ok_or_else(|| VmError::invalid_operation(format!("unknown syscall {id:#010x}")))?;
        let factor = self.vm.exec_fee_factor() as i64;
        self.vm
            .consume_gas(descriptor.price.saturating_mul(factor))?;
        let current_flags = self.vm.current_context()?.call_flags;
        if !current_flags.contains(descriptor.required_flags) {
            return Err(VmError::invalid_operation(format!(
                "syscall {} requires flags {:?}, frame has {:?}",
                descriptor.name, descriptor.required_flags, current_flags
            )));
        }
        (descriptor.handler)(self)
    }

    // ---- result extraction ----------------------------------------------

    /// Serializes the result stack bottom-to-top; unserializable items
    /// surface as `None`.
    pub fn result_stack_items(&self) -> Vec<VmResultItem> {
        self.vm
            .result_stack()
            .items()
            .iter()
            .map(|item| serialize_item(item).ok())
            .collect()
    }

    /// The uncaught exception rendered as text, when the run faulted.
    pub fn exception_message(&self) -> Option<String> {
        self.vm
            .uncaught_exception()
            .map(|item| item.as_string().unwrap_or_else(|_| "<non-text exception>".into()))
    }

    /// Consumes the engine, returning the collected notifications and logs.
    pub fn into_events(self) -> (Vec<NotificationEvent>, Vec<LogEvent>) {
        (self.notifications, self.logs)
    }

    // ---- misc host services ---------------------------------------------

    /// Pops `n` items off the current frame for an interop handler.
    pub(crate) fn pop_args(&mut self, n: usize) -> VmResult<Vec<StackItem>> {
        let mut args = Vec::with_capacity(n);
        for _ in 0..n {
            args.push(self.vm.pop()?);
        }
        Ok(args)
    }

    /// Flattens a VM array argument into a vector.
    pub(crate) fn array_arg(&self, item: &StackItem) -> VmResult<Vec<StackItem>> {
        match item {
            StackItem::Array(inner) | StackItem::Struct(inner) => {
                Ok(inner.borrow().items().to_vec())
            }
            StackItem::Null => Ok(Vec::new()),
            _ => Err(VmError::InvalidType {
                operation: "argument list",
                expected: "array",
            }),
        }
    }
}
