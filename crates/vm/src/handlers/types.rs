//! Type introspection and conversion instructions.

use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::stack_item::{StackItem, StackItemType};
use crate::{VmError, VmResult};

impl ExecutionEngine {
    pub(super) fn op_is_null(&mut self) -> VmResult<()> {
        let item = self.pop()?;
        self.push(StackItem::Boolean(item.is_null()))
    }

    fn operand_type(instruction: &Instruction) -> VmResult<StackItemType> {
        let byte = instruction.operand_as_u8();
        StackItemType::from_byte(byte)
            .ok_or_else(|| VmError::InvalidScript(format!("unknown item type {byte:#04x}")))
    }

    pub(super) fn op_is_type(&mut self, instruction: &Instruction) -> VmResult<()> {
        let target = Self::operand_type(instruction)?;
        if target == StackItemType::Any {
            return Err(VmError::InvalidScript("ISTYPE with Any".into()));
        }
        let item = self.pop()?;
        self.push(StackItem::Boolean(item.item_type() == target))
    }

    pub(super) fn op_convert(&mut self, instruction: &Instruction) -> VmResult<()> {
        let target = Self::operand_type(instruction)?;
        if target == StackItemType::Any {
            return Err(VmError::InvalidScript("CONVERT to Any".into()));
        }
        let item = self.pop()?;
        let rc = self.reference_counter().clone();
        let converted = item
            .convert_to(target, &rc)
            .map_err(|e| match e {
                // Conversion failures are script-visible exceptions.
                VmError::InvalidOperation(msg) => VmError::Throw(msg),
                other => other,
            })?;
        self.push(converted)
    }
}
