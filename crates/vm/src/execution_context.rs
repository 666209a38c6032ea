//! A call frame.

use crate::call_flags::CallFlags;
use crate::evaluation_stack::EvaluationStack;
use crate::exception_handling::TryContext;
use crate::instruction::Instruction;
use crate::script::Script;
use crate::slot::Slot;
use crate::{VmError, VmResult};
use neonova_core::UInt160;
use std::cell::RefCell;
use std::rc::Rc;

/// One entry of the invocation stack.
///
/// The evaluation stack and static-field slot are shared handles: a CALL
/// within the same script aliases its caller's stack and statics, while a
/// cross-contract call gets a fresh stack.
pub struct ExecutionContext {
    script: Script,
    instruction_pointer: usize,
    /// Number of values returned to the caller; -1 shares the whole stack.
    rvcount: i32,
    eval: Rc<RefCell<EvaluationStack>>,
    /// Shared with forks of this frame, so statics initialized by an
    /// `_initialize` sub-frame are visible to the method frame.
    pub static_fields: Rc<RefCell<Option<Slot>>>,
    pub local_variables: Option<Slot>,
    pub arguments: Option<Slot>,
    pub try_stack: Vec<TryContext>,
    pub call_flags: CallFlags,
    script_hash: UInt160,
    pub calling_script_hash: Option<UInt160>,
    /// Push Null to the caller when this frame unloads; set for calls into
    /// void methods whose callers still expect a placeholder result.
    pub null_on_unload: bool,
}

impl ExecutionContext {
    pub fn new(
        script: Script,
        rvcount: i32,
        eval: Rc<RefCell<EvaluationStack>>,
        call_flags: CallFlags,
    ) -> Self {
        let script_hash = script.hash();
        Self {
            script,
            instruction_pointer: 0,
            rvcount,
            eval,
            static_fields: Rc::new(RefCell::new(None)),
            local_variables: None,
            arguments: None,
            try_stack: Vec::new(),
            call_flags,
            script_hash,
            calling_script_hash: None,
            null_on_unload: false,
        }
    }

    /// A frame running the same script at a different position, sharing the
    /// stack and statics (CALL / CALLA semantics).
    pub fn fork(&self, position: usize) -> Self {
        Self {
            script: self.script.clone(),
            instruction_pointer: position,
            rvcount: -1,
            eval: self.eval.clone(),
            static_fields: self.static_fields.clone(),
            local_variables: None,
            arguments: None,
            try_stack: Vec::new(),
            call_flags: self.call_flags,
            script_hash: self.script_hash,
            calling_script_hash: self.calling_script_hash,
            null_on_unload: false,
        }
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn script_hash(&self) -> UInt160 {
        self.script_hash
    }

    /// Overrides the frame identity; used when the loaded script belongs to
    /// a deployed contract whose hash is not derived from its bytes.
    pub fn set_script_hash(&mut self, hash: UInt160) {
        self.script_hash = hash;
    }

    pub fn instruction_pointer(&self) -> usize {
        self.instruction_pointer
    }

    /// Moves the instruction pointer, which must stay within the script.
    pub fn jump(&mut self, target: usize) -> VmResult<()> {
        if target > self.script.len() {
            return Err(VmError::InvalidScript(format!(
                "jump to {target} beyond script end"
            )));
        }
        self.instruction_pointer = target;
        Ok(())
    }

    /// Advances past the given instruction.
    pub fn advance(&mut self, instruction: &Instruction) {
        self.instruction_pointer = instruction.pointer + instruction.size();
    }

    /// Decodes the instruction at the pointer; `None` at end of script.
    pub fn current_instruction(&self) -> VmResult<Option<Rc<Instruction>>> {
        if self.instruction_pointer >= self.script.len() {
            return Ok(None);
        }
        self.script.instruction_at(self.instruction_pointer).map(Some)
    }

    pub fn rvcount(&self) -> i32 {
        self.rvcount
    }

    pub fn evaluation_stack(&self) -> &Rc<RefCell<EvaluationStack>> {
        &self.eval
    }

    /// Whether this frame shares its evaluation stack with `other`.
    pub fn shares_stack_with(&self, other: &ExecutionContext) -> bool {
        Rc::ptr_eq(&self.eval, &other.eval)
    }

    pub fn set_calling_script_hash(&mut self, hash: Option<UInt160>) {
        self.calling_script_hash = hash;
    }
}
