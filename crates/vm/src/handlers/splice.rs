//! Byte-manipulation instructions.

use crate::execution_engine::ExecutionEngine;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};

impl ExecutionEngine {
    fn check_item_size(&self, size: usize) -> VmResult<()> {
        if size > self.limits().max_item_size {
            return Err(VmError::ItemTooLarge);
        }
        Ok(())
    }

    pub(super) fn op_new_buffer(&mut self) -> VmResult<()> {
        let size = self.pop_index()?;
        self.check_item_size(size)?;
        self.push(StackItem::new_buffer(vec![0u8; size]))
    }

    pub(super) fn op_memcpy(&mut self) -> VmResult<()> {
        let count = self.pop_index()?;
        let source_index = self.pop_index()?;
        let source = self.pop_bytes()?;
        let dest_index = self.pop_index()?;
        let dest = self.pop()?;
        let StackItem::Buffer(buffer) = dest else {
            return Err(VmError::InvalidType {
                operation: "MEMCPY",
                expected: "buffer",
            });
        };
        if source_index + count > source.len() {
            return Err(VmError::throw("MEMCPY source range out of bounds"));
        }
        let mut target = buffer.borrow_mut();
        if dest_index + count > target.len() {
            return Err(VmError::throw("MEMCPY destination range out of bounds"));
        }
        target[dest_index..dest_index + count]
            .copy_from_slice(&source[source_index..source_index + count]);
        Ok(())
    }

    pub(super) fn op_cat(&mut self) -> VmResult<()> {
        let b = self.pop_bytes()?;
        let a = self.pop_bytes()?;
        self.check_item_size(a.len() + b.len())?;
        let mut joined = a;
        joined.extend_from_slice(&b);
        self.push(StackItem::new_buffer(joined))
    }

    pub(super) fn op_substr(&mut self) -> VmResult<()> {
        let count = self.pop_index()?;
        let index = self.pop_index()?;
        let source = self.pop_bytes()?;
        if index + count > source.len() {
            return Err(VmError::throw("SUBSTR range out of bounds"));
        }
        self.push(StackItem::new_buffer(source[index..index + count].to_vec()))
    }

    pub(super) fn op_left(&mut self) -> VmResult<()> {
        let count = self.pop_index()?;
        let source = self.pop_bytes()?;
        if count > source.len() {
            return Err(VmError::throw("LEFT count out of bounds"));
        }
        self.push(StackItem::new_buffer(source[..count].to_vec()))
    }

    pub(super) fn op_right(&mut self) -> VmResult<()> {
        let count = self.pop_index()?;
        let source = self.pop_bytes()?;
        if count > source.len() {
            return Err(VmError::throw("RIGHT count out of bounds"));
        }
        self.push(StackItem::new_buffer(source[source.len() - count..].to_vec()))
    }
}
