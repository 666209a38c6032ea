//! Static, local and argument slot instructions.

use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::slot::Slot;
use crate::{VmError, VmResult};

impl ExecutionEngine {
    pub(super) fn op_init_static_slot(&mut self, instruction: &Instruction) -> VmResult<()> {
        let count = instruction.operand_as_u8() as usize;
        if count == 0 {
            return Err(VmError::InvalidScript("INITSSLOT with zero fields".into()));
        }
        let rc = self.reference_counter().clone();
        let context = self.current_context_mut()?;
        if context.static_fields.borrow().is_some() {
            return Err(VmError::invalid_operation("static slot already initialized"));
        }
        *context.static_fields.borrow_mut() = Some(Slot::new(count, rc)?);
        Ok(())
    }

    pub(super) fn op_init_slot(&mut self, instruction: &Instruction) -> VmResult<()> {
        let local_count = instruction.operand[0] as usize;
        let arg_count = instruction.operand[1] as usize;
        if local_count == 0 && arg_count == 0 {
            return Err(VmError::InvalidScript("INITSLOT with empty counts".into()));
        }
        if self.current_context()?.local_variables.is_some()
            || self.current_context()?.arguments.is_some()
        {
            return Err(VmError::invalid_operation("slots already initialized"));
        }
        let rc = self.reference_counter().clone();
        let locals = if local_count > 0 {
            Some(Slot::new(local_count, rc.clone())?)
        } else {
            None
        };
        let args = if arg_count > 0 {
            let mut items = Vec::with_capacity(arg_count);
            for _ in 0..arg_count {
                items.push(self.pop()?);
            }
            Some(Slot::with_items(items, rc)?)
        } else {
            None
        };
        let context = self.current_context_mut()?;
        context.local_variables = locals;
        context.arguments = args;
        Ok(())
    }

    pub(super) fn op_load_static(&mut self, index: usize) -> VmResult<()> {
        let item = {
            let context = self.current_context()?;
            let fields = context.static_fields.borrow();
            let slot = fields
                .as_ref()
                .ok_or_else(|| VmError::invalid_operation("static slot not initialized"))?;
            slot.get(index)?.clone()
        };
        self.push(item)
    }

    pub(super) fn op_store_static(&mut self, index: usize) -> VmResult<()> {
        let item = self.pop()?;
        let context = self.current_context()?;
        let mut fields = context.static_fields.borrow_mut();
        let slot = fields
            .as_mut()
            .ok_or_else(|| VmError::invalid_operation("static slot not initialized"))?;
        slot.set(index, item)
    }

    pub(super) fn op_load_local(&mut self, index: usize) -> VmResult<()> {
        let item = {
            let context = self.current_context()?;
            let slot = context
                .local_variables
                .as_ref()
                .ok_or_else(|| VmError::invalid_operation("local slot not initialized"))?;
            slot.get(index)?.clone()
        };
        self.push(item)
    }

    pub(super) fn op_store_local(&mut self, index: usize) -> VmResult<()> {
        let item = self.pop()?;
        let context = self.current_context_mut()?;
        let slot = context
            .local_variables
            .as_mut()
            .ok_or_else(|| VmError::invalid_operation("local slot not initialized"))?;
        slot.set(index, item)
    }

    pub(super) fn op_load_arg(&mut self, index: usize) -> VmResult<()> {
        let item = {
            let context = self.current_context()?;
            let slot = context
                .arguments
                .as_ref()
                .ok_or_else(|| VmError::invalid_operation("argument slot not initialized"))?;
            slot.get(index)?.clone()
        };
        self.push(item)
    }

    pub(super) fn op_store_arg(&mut self, index: usize) -> VmResult<()> {
        let item = self.pop()?;
        let context = self.current_context_mut()?;
        let slot = context
            .arguments
            .as_mut()
            .ok_or_else(|| VmError::invalid_operation("argument slot not initialized"))?;
        slot.set(index, item)
    }
}
