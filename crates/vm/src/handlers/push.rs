//! Constant-pushing instructions.

use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;
use crate::stack_item::{PointerItem, StackItem};
use crate::{VmError, VmResult};
use num_bigint::BigInt;

impl ExecutionEngine {
    pub(super) fn op_push_int(&mut self, instruction: &Instruction) -> VmResult<()> {
        let value = BigInt::from_signed_bytes_le(&instruction.operand);
        self.push(StackItem::Integer(value))
    }

    pub(super) fn op_push_bool(&mut self, value: bool) -> VmResult<()> {
        self.push(StackItem::Boolean(value))
    }

    pub(super) fn op_push_null(&mut self) -> VmResult<()> {
        self.push(StackItem::Null)
    }

    pub(super) fn op_push_a(&mut self, instruction: &Instruction) -> VmResult<()> {
        let context = self.current_context()?;
        let target = instruction.pointer as isize + instruction.operand_as_i32() as isize;
        let position = context.script().check_jump(target)?;
        let pointer = PointerItem {
            script: context.script().clone(),
            position,
        };
        self.push(StackItem::Pointer(pointer))
    }

    pub(super) fn op_push_data(&mut self, instruction: &Instruction) -> VmResult<()> {
        if instruction.operand.len() > self.limits().max_item_size {
            return Err(VmError::ItemTooLarge);
        }
        self.push(StackItem::from_bytes(instruction.operand.clone()))
    }

    pub(super) fn op_push_small(&mut self, instruction: &Instruction) -> VmResult<()> {
        let value = instruction.opcode as i64 - OpCode::PUSH0 as i64;
        self.push(StackItem::from_int(value))
    }
}
