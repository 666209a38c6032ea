//! The interpreter loop, frame management and exception unwinding.

use crate::call_flags::CallFlags;
use crate::evaluation_stack::EvaluationStack;
use crate::exception_handling::TryState;
use crate::execution_context::ExecutionContext;
use crate::instruction::Instruction;
use crate::limits::ExecutionEngineLimits;
use crate::op_code::OpCode;
use crate::reference_counter::ReferenceCounter;
use crate::script::Script;
use crate::stack_item::StackItem;
use crate::vm_state::VmState;
use crate::{VmError, VmResult};
use num_bigint::BigInt;
use std::cell::RefCell;
use std::rc::Rc;

/// The virtual machine.
///
/// Runs loaded scripts to HALT or FAULT. Syscalls and call tokens are not
/// resolved here; a hosting engine watches for them via
/// [`ExecutionEngine::current_instruction`] and executes them itself, using
/// the public frame and stack accessors.
pub struct ExecutionEngine {
    state: VmState,
    limits: ExecutionEngineLimits,
    rc: ReferenceCounter,
    invocation_stack: Vec<ExecutionContext>,
    result_stack: EvaluationStack,
    uncaught_exception: Option<StackItem>,
    gas_limit: i64,
    gas_consumed: i64,
    exec_fee_factor: u32,
    /// Set by any instruction that moved the instruction pointer itself.
    jumping: bool,
}

impl ExecutionEngine {
    pub fn new() -> Self {
        Self::with_limits(ExecutionEngineLimits::default())
    }

    pub fn with_limits(limits: ExecutionEngineLimits) -> Self {
        let rc = ReferenceCounter::new(limits.max_stack_size);
        Self {
            state: VmState::Break,
            limits,
            rc: rc.clone(),
            invocation_stack: Vec::new(),
            result_stack: EvaluationStack::new(rc),
            uncaught_exception: None,
            gas_limit: i64::MAX,
            gas_consumed: 0,
            exec_fee_factor: 1,
            jumping: false,
        }
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    pub fn set_state(&mut self, state: VmState) {
        self.state = state;
    }

    pub fn limits(&self) -> &ExecutionEngineLimits {
        &self.limits
    }

    pub fn reference_counter(&self) -> &ReferenceCounter {
        &self.rc
    }

    pub fn result_stack(&self) -> &EvaluationStack {
        &self.result_stack
    }

    pub fn result_stack_mut(&mut self) -> &mut EvaluationStack {
        &mut self.result_stack
    }

    pub fn uncaught_exception(&self) -> Option<&StackItem> {
        self.uncaught_exception.as_ref()
    }

    // ---- gas -------------------------------------------------------------

    pub fn set_gas_limit(&mut self, limit: i64) {
        self.gas_limit = limit;
    }

    pub fn set_exec_fee_factor(&mut self, factor: u32) {
        self.exec_fee_factor = factor;
    }

    pub fn exec_fee_factor(&self) -> u32 {
        self.exec_fee_factor
    }

    pub fn gas_consumed(&self) -> i64 {
        self.gas_consumed
    }

    pub fn gas_left(&self) -> i64 {
        self.gas_limit.saturating_sub(self.gas_consumed)
    }

    /// Charges an absolute amount of gas (already fee-factor scaled).
    pub fn consume_gas(&mut self, amount: i64) -> VmResult<()> {
        self.gas_consumed = self.gas_consumed.saturating_add(amount.max(0));
        if self.gas_consumed > self.gas_limit {
            return Err(VmError::GasLimitExceeded);
        }
        Ok(())
    }

    fn charge_opcode(&mut self, opcode: OpCode) -> VmResult<()> {
        self.consume_gas(opcode.price().saturating_mul(self.exec_fee_factor as i64))
    }

    // ---- frames ----------------------------------------------------------

    pub fn invocation_depth(&self) -> usize {
        self.invocation_stack.len()
    }

    pub fn current_context(&self) -> VmResult<&ExecutionContext> {
        self.invocation_stack
            .last()
            .ok_or_else(|| VmError::invalid_operation("no execution context"))
    }

    pub fn current_context_mut(&mut self) -> VmResult<&mut ExecutionContext> {
        self.invocation_stack
            .last_mut()
            .ok_or_else(|| VmError::invalid_operation("no execution context"))
    }

    pub fn entry_context(&self) -> Option<&ExecutionContext> {
        self.invocation_stack.first()
    }

    pub fn contexts(&self) -> &[ExecutionContext] {
        &self.invocation_stack
    }

    /// Loads a top-level or cross-contract frame with a fresh stack.
    pub fn load_script(
        &mut self,
        script: Script,
        rvcount: i32,
        call_flags: CallFlags,
    ) -> VmResult<&mut ExecutionContext> {
        let eval = Rc::new(RefCell::new(EvaluationStack::new(self.rc.clone())));
        let context = ExecutionContext::new(script, rvcount, eval, call_flags);
        self.load_context(context)
    }

    /// Pushes a prepared frame onto the invocation stack. The frame that
    /// loaded it still advances past its own instruction afterwards, so a
    /// returning callee resumes the caller correctly.
    pub fn load_context(&mut self, context: ExecutionContext) -> VmResult<&mut ExecutionContext> {
        if self.invocation_stack.len() >= self.limits.max_invocation_stack_size {
            return Err(VmError::InvocationStackOverflow);
        }
        self.invocation_stack.push(context);
        Ok(self.invocation_stack.last_mut().expect("just pushed"))
    }

    /// Pops the current frame, transferring return values.
    pub fn unload_context(&mut self) -> VmResult<()> {
        let frame = self
            .invocation_stack
            .pop()
            .ok_or_else(|| VmError::invalid_operation("no context to unload"))?;
        let shares = self
            .invocation_stack
            .last()
            .map(|caller| frame.shares_stack_with(caller))
            .unwrap_or(false);
        if !shares {
            let items = frame.evaluation_stack().borrow_mut().drain();
            let rvcount = frame.rvcount();
            if rvcount >= 0 && items.len() != rvcount as usize {
                return Err(VmError::invalid_operation(format!(
                    "expected {rvcount} return values, stack holds {}",
                    items.len()
                )));
            }
            match self.invocation_stack.last() {
                Some(caller) => {
                    let mut stack = caller.evaluation_stack().borrow_mut();
                    for item in items {
                        stack.push(item)?;
                    }
                    if frame.null_on_unload {
                        stack.push(StackItem::Null)?;
                    }
                }
                None => {
                    for item in items {
                        self.result_stack.push(item)?;
                    }
                    if frame.null_on_unload {
                        self.result_stack.push(StackItem::Null)?;
                    }
                }
            }
        }
        if self.invocation_stack.is_empty() {
            self.state = VmState::Halt;
        }
        Ok(())
    }

    // ---- stack helpers ---------------------------------------------------

    pub fn push(&mut self, item: StackItem) -> VmResult<()> {
        self.current_context()?.evaluation_stack().borrow_mut().push(item)
    }

    pub fn pop(&mut self) -> VmResult<StackItem> {
        self.current_context()?.evaluation_stack().borrow_mut().pop()
    }

    pub fn pop_int(&mut self) -> VmResult<BigInt> {
        self.pop()?.as_int()
    }

    pub fn pop_bool(&mut self) -> VmResult<bool> {
        self.pop()?.to_bool()
    }

    pub fn pop_bytes(&mut self) -> VmResult<Vec<u8>> {
        self.pop()?.as_bytes()
    }

    pub fn pop_index(&mut self) -> VmResult<usize> {
        self.pop()?.as_index()
    }

    pub fn peek(&self, depth: usize) -> VmResult<StackItem> {
        Ok(self
            .current_context()?
            .evaluation_stack()
            .borrow()
            .peek(depth)?
            .clone())
    }

    pub fn stack_depth(&self) -> VmResult<usize> {
        Ok(self.current_context()?.evaluation_stack().borrow().len())
    }

    // ---- run loop --------------------------------------------------------

    /// Runs until HALT or FAULT and reports the final state.
    pub fn execute(&mut self) -> VmState {
        if self.state == VmState::Break {
            self.state = VmState::None;
        }
        while self.state != VmState::Halt && self.state != VmState::Fault {
            self.step();
        }
        self.state
    }

    /// Executes a single instruction (or the implicit RET at end of script),
    /// converting errors into throws or faults.
    pub fn step(&mut self) {
        if let Err(error) = self.execute_next() {
            self.fail_or_throw(error);
        }
    }

    fn execute_next(&mut self) -> VmResult<()> {
        if self.invocation_stack.is_empty() {
            self.state = VmState::Halt;
            return Ok(());
        }
        let Some(instruction) = self.current_context()?.current_instruction()? else {
            // Implicit RET when the pointer walks off the script.
            self.unload_context()?;
            return self.rc.check_limit();
        };
        self.charge_opcode(instruction.opcode)?;
        let frame = self.begin_instruction();
        self.execute_instruction(&instruction)?;
        self.finish_instruction(frame, &instruction);
        // The post-instruction boundary is the one point where no compound
        // is mid-mutation, so the limit check (and its cycle traverse) runs
        // here rather than inside the counter updates.
        self.rc.check_limit()
    }

    /// Marks the start of one instruction; returns a token identifying the
    /// executing frame, to be passed to [`ExecutionEngine::finish_instruction`].
    pub fn begin_instruction(&mut self) -> usize {
        self.jumping = false;
        self.invocation_stack.len().saturating_sub(1)
    }

    /// Advances the frame that executed the instruction, unless it jumped or
    /// was unloaded in the meantime.
    pub fn finish_instruction(&mut self, frame: usize, instruction: &Instruction) {
        if !self.jumping {
            if let Some(context) = self.invocation_stack.get_mut(frame) {
                context.advance(instruction);
            }
        }
        self.jumping = false;
    }

    /// Converts an error into either a script-visible exception or a FAULT.
    /// Hosts route interop failures through here as well.
    pub fn fail_or_throw(&mut self, error: VmError) {
        if let VmError::Throw(message) = &error {
            let item = StackItem::from_string(message.clone());
            if let Err(fatal) = self.throw_item(item) {
                self.fault(fatal);
            }
        } else {
            self.fault(error);
        }
    }

    fn fault(&mut self, error: VmError) {
        if self.uncaught_exception.is_none() {
            self.uncaught_exception = Some(StackItem::from_string(error.to_string()));
        }
        self.state = VmState::Fault;
    }

    /// The instruction the engine will execute next; `None` at end of script
    /// or when nothing is loaded. Hosts use this to intercept SYSCALL/CALLT.
    pub fn current_instruction(&self) -> VmResult<Option<Rc<Instruction>>> {
        match self.invocation_stack.last() {
            Some(context) => context.current_instruction(),
            None => Ok(None),
        }
    }

    /// Charges the opcode fee for an intercepted instruction.
    pub fn charge_for(&mut self, opcode: OpCode) -> VmResult<()> {
        self.charge_opcode(opcode)
    }

    /// Runs the reference-limit check (including its cycle traverse) after a
    /// host-executed instruction.
    pub fn check_reference_limit(&self) -> VmResult<()> {
        self.rc.check_limit()
    }

    pub(crate) fn set_jumping(&mut self) {
        self.jumping = true;
    }

    // ---- exceptions ------------------------------------------------------

    /// Raises `item` as a script exception, unwinding to the nearest
    /// catch or finally scope; faults when none exists.
    pub fn throw_item(&mut self, item: StackItem) -> VmResult<()> {
        self.uncaught_exception = Some(item);
        self.handle_exception()
    }

    fn handle_exception(&mut self) -> VmResult<()> {
        let mut target: Option<(usize, usize, bool)> = None; // (frame, try, is_catch)
        'search: for frame_index in (0..self.invocation_stack.len()).rev() {
            let frame = &self.invocation_stack[frame_index];
            for try_index in (0..frame.try_stack.len()).rev() {
                let scope = &frame.try_stack[try_index];
                if scope.state == TryState::Finally {
                    // An exception inside a finally block propagates outward.
                    continue;
                }
                if scope.state == TryState::Try && scope.has_catch() {
                    target = Some((frame_index, try_index, true));
                    break 'search;
                }
                if scope.has_finally() {
                    target = Some((frame_index, try_index, false));
                    break 'search;
                }
            }
        }

        let Some((frame_index, try_index, is_catch)) = target else {
            self.state = VmState::Fault;
            return Ok(());
        };

        self.invocation_stack.truncate(frame_index + 1);
        let frame = self
            .invocation_stack
            .last_mut()
            .expect("frame retained by truncate");
        frame.try_stack.truncate(try_index + 1);
        let scope = frame.try_stack.last_mut().expect("scope retained");

        if is_catch {
            scope.state = TryState::Catch;
            let catch_pointer = scope.catch_pointer.expect("catch checked");
            frame.jump(catch_pointer)?;
            let exception = self
                .uncaught_exception
                .take()
                .expect("exception set by thrower");
            self.current_context()?
                .evaluation_stack()
                .borrow_mut()
                .push(exception)?;
        } else {
            scope.state = TryState::Finally;
            let finally_pointer = scope.finally_pointer.expect("finally checked");
            frame.jump(finally_pointer)?;
        }
        self.jumping = true;
        Ok(())
    }

    /// Re-enters exception propagation from ENDFINALLY with a pending
    /// exception.
    pub(crate) fn continue_unwind(&mut self) -> VmResult<()> {
        self.handle_exception()
    }

    pub(crate) fn has_uncaught(&self) -> bool {
        self.uncaught_exception.is_some()
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}
