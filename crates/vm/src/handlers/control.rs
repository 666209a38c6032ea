//! Flow-control instructions: jumps, calls and structured exceptions.

use crate::exception_handling::{TryContext, TryState};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};
use std::cmp::Ordering;

impl ExecutionEngine {
    /// Resolves a jump operand (short or long form) into an absolute target.
    fn jump_target(&self, instruction: &Instruction) -> VmResult<usize> {
        let offset = if instruction.operand.len() == 1 {
            instruction.operand_as_i8() as isize
        } else {
            instruction.operand_as_i32() as isize
        };
        let target = instruction.pointer as isize + offset;
        self.current_context()?.script().check_jump(target)
    }

    fn jump_to(&mut self, target: usize) -> VmResult<()> {
        self.current_context_mut()?.jump(target)?;
        self.set_jumping();
        Ok(())
    }

    pub(super) fn op_jmp(&mut self, instruction: &Instruction) -> VmResult<()> {
        let target = self.jump_target(instruction)?;
        self.jump_to(target)
    }

    pub(super) fn op_jmp_if(&mut self, instruction: &Instruction, when: bool) -> VmResult<()> {
        let target = self.jump_target(instruction)?;
        if self.pop_bool()? == when {
            self.jump_to(target)?;
        }
        Ok(())
    }

    pub(super) fn op_jmp_equal(&mut self, instruction: &Instruction, when: bool) -> VmResult<()> {
        let target = self.jump_target(instruction)?;
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        if (a == b) == when {
            self.jump_to(target)?;
        }
        Ok(())
    }

    pub(super) fn op_jmp_cmp(
        &mut self,
        instruction: &Instruction,
        pred: fn(Ordering) -> bool,
    ) -> VmResult<()> {
        let target = self.jump_target(instruction)?;
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        if pred(a.cmp(&b)) {
            self.jump_to(target)?;
        }
        Ok(())
    }

    pub(super) fn op_call(&mut self, instruction: &Instruction) -> VmResult<()> {
        let target = self.jump_target(instruction)?;
        let frame = self.current_context()?.fork(target);
        self.load_context(frame)?;
        Ok(())
    }

    pub(super) fn op_call_a(&mut self) -> VmResult<()> {
        let item = self.pop()?;
        let StackItem::Pointer(pointer) = item else {
            return Err(VmError::InvalidType {
                operation: "CALLA",
                expected: "pointer",
            });
        };
        let context = self.current_context()?;
        if !pointer.script.ptr_eq(context.script()) {
            return Err(VmError::invalid_operation(
                "CALLA pointer belongs to another script",
            ));
        }
        let frame = context.fork(pointer.position);
        self.load_context(frame)?;
        Ok(())
    }

    pub(super) fn op_abort(&mut self, message: Option<String>) -> VmResult<()> {
        Err(VmError::Abort(
            message.unwrap_or_else(|| "ABORT instruction".into()),
        ))
    }

    pub(super) fn op_abort_msg(&mut self) -> VmResult<()> {
        let message = self.pop()?.as_string().unwrap_or_default();
        self.op_abort(Some(message))
    }

    pub(super) fn op_assert(&mut self, message: Option<String>) -> VmResult<()> {
        if self.pop_bool()? {
            Ok(())
        } else {
            Err(VmError::AssertFailed(
                message.unwrap_or_else(|| "ASSERT instruction".into()),
            ))
        }
    }

    pub(super) fn op_assert_msg(&mut self) -> VmResult<()> {
        let message = self.pop()?.as_string().unwrap_or_default();
        self.op_assert(Some(message))
    }

    pub(super) fn op_throw(&mut self) -> VmResult<()> {
        let item = self.pop()?;
        self.throw_item(item)
    }

    pub(super) fn op_try(&mut self, instruction: &Instruction) -> VmResult<()> {
        let (catch_offset, finally_offset) = if instruction.operand.len() == 2 {
            let (c, f) = instruction.operand_as_i8_pair();
            (c as isize, f as isize)
        } else {
            let (c, f) = instruction.operand_as_i32_pair();
            (c as isize, f as isize)
        };
        if catch_offset == 0 && finally_offset == 0 {
            return Err(VmError::InvalidScript(
                "TRY without catch or finally".into(),
            ));
        }
        let max_depth = self.limits().max_try_nesting_depth;
        let context = self.current_context_mut()?;
        if context.try_stack.len() >= max_depth {
            return Err(VmError::TryNestingTooDeep);
        }
        let base = instruction.pointer as isize;
        let catch_pointer = if catch_offset == 0 {
            None
        } else {
            Some(context.script().check_jump(base + catch_offset)?)
        };
        let finally_pointer = if finally_offset == 0 {
            None
        } else {
            Some(context.script().check_jump(base + finally_offset)?)
        };
        context
            .try_stack
            .push(TryContext::new(catch_pointer, finally_pointer));
        Ok(())
    }

    pub(super) fn op_end_try(&mut self, instruction: &Instruction) -> VmResult<()> {
        let end_target = self.jump_target(instruction)?;
        let pending_finally = {
            let context = self.current_context_mut()?;
            let scope = context
                .try_stack
                .last_mut()
                .ok_or_else(|| VmError::invalid_operation("ENDTRY outside of try"))?;
            if scope.state == TryState::Finally {
                return Err(VmError::invalid_operation("ENDTRY inside finally"));
            }
            if scope.has_finally() {
                scope.state = TryState::Finally;
                scope.end_pointer = end_target;
                scope.finally_pointer
            } else {
                context.try_stack.pop();
                None
            }
        };
        match pending_finally {
            Some(finally_pointer) => self.jump_to(finally_pointer),
            None => self.jump_to(end_target),
        }
    }

    pub(super) fn op_end_finally(&mut self) -> VmResult<()> {
        let context = self.current_context_mut()?;
        let scope = context
            .try_stack
            .pop()
            .ok_or_else(|| VmError::invalid_operation("ENDFINALLY outside of try"))?;
        if scope.state != TryState::Finally {
            return Err(VmError::invalid_operation("ENDFINALLY outside finally"));
        }
        if self.has_uncaught() {
            // A pending exception resumes its unwind once finally completes.
            self.set_jumping();
            self.continue_unwind()
        } else {
            self.jump_to(scope.end_pointer)
        }
    }
}
