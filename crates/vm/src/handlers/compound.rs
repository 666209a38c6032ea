//! Array, struct and map instructions.

use crate::execution_engine::ExecutionEngine;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};
use num_traits::ToPrimitive;

impl ExecutionEngine {
    fn pop_count(&mut self) -> VmResult<usize> {
        let count = self.pop_int()?;
        count
            .to_usize()
            .filter(|c| *c <= self.limits().max_stack_size)
            .ok_or_else(|| VmError::throw("invalid element count"))
    }

    pub(super) fn op_pack_map(&mut self) -> VmResult<()> {
        let count = self.pop_count()?;
        let rc = self.reference_counter().clone();
        let map = StackItem::new_map(&rc);
        if let StackItem::Map(inner) = &map {
            for _ in 0..count {
                let key = self.pop()?;
                let value = self.pop()?;
                inner.borrow_mut().set(key, value)?;
            }
        }
        self.push(map)
    }

    pub(super) fn op_pack(&mut self, as_struct: bool) -> VmResult<()> {
        let count = self.pop_count()?;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(self.pop()?);
        }
        let rc = self.reference_counter().clone();
        let compound = if as_struct {
            StackItem::new_struct(&rc, items)?
        } else {
            StackItem::new_array(&rc, items)?
        };
        self.push(compound)
    }

    pub(super) fn op_unpack(&mut self) -> VmResult<()> {
        let item = self.pop()?;
        match item {
            StackItem::Array(inner) | StackItem::Struct(inner) => {
                let items: Vec<StackItem> = inner.borrow().items().to_vec();
                for element in items.iter().rev() {
                    self.push(element.clone())?;
                }
                self.push(StackItem::from_int(items.len() as i64))
            }
            StackItem::Map(inner) => {
                let entries: Vec<(StackItem, StackItem)> = inner
                    .borrow()
                    .entries()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                for (key, value) in entries.iter().rev() {
                    self.push(value.clone())?;
                    self.push(key.clone())?;
                }
                self.push(StackItem::from_int(entries.len() as i64))
            }
            _ => Err(VmError::InvalidType {
                operation: "UNPACK",
                expected: "array, struct or map",
            }),
        }
    }

    pub(super) fn op_new_array(&mut self, as_array: bool, size: Option<usize>) -> VmResult<()> {
        let count = match size {
            Some(n) => n,
            None => self.pop_count()?,
        };
        let items = vec![StackItem::Null; count];
        let rc = self.reference_counter().clone();
        let compound = if as_array {
            StackItem::new_array(&rc, items)?
        } else {
            StackItem::new_struct(&rc, items)?
        };
        self.push(compound)
    }

    pub(super) fn op_new_map(&mut self) -> VmResult<()> {
        let rc = self.reference_counter().clone();
        self.push(StackItem::new_map(&rc))
    }

    pub(super) fn op_size(&mut self) -> VmResult<()> {
        let item = self.pop()?;
        let size = match &item {
            StackItem::Array(inner) | StackItem::Struct(inner) => inner.borrow().len(),
            StackItem::Map(inner) => inner.borrow().len(),
            StackItem::ByteString(bytes) => bytes.len(),
            StackItem::Buffer(bytes) => bytes.borrow().len(),
            StackItem::Boolean(_) | StackItem::Integer(_) => item.as_bytes()?.len(),
            _ => {
                return Err(VmError::InvalidType {
                    operation: "SIZE",
                    expected: "collection or bytes",
                })
            }
        };
        self.push(StackItem::from_int(size as i64))
    }

    pub(super) fn op_has_key(&mut self) -> VmResult<()> {
        let key = self.pop()?;
        let collection = self.pop()?;
        let found = match &collection {
            StackItem::Array(inner) | StackItem::Struct(inner) => {
                let index = key.as_index()?;
                index < inner.borrow().len()
            }
            StackItem::Map(inner) => inner.borrow().contains_key(&key)?,
            StackItem::ByteString(bytes) => key.as_index()? < bytes.len(),
            StackItem::Buffer(bytes) => key.as_index()? < bytes.borrow().len(),
            _ => {
                return Err(VmError::InvalidType {
                    operation: "HASKEY",
                    expected: "collection",
                })
            }
        };
        self.push(StackItem::Boolean(found))
    }

    pub(super) fn op_keys(&mut self) -> VmResult<()> {
        let item = self.pop()?;
        let StackItem::Map(inner) = item else {
            return Err(VmError::InvalidType {
                operation: "KEYS",
                expected: "map",
            });
        };
        let keys: Vec<StackItem> = inner.borrow().entries().map(|(k, _)| k.clone()).collect();
        let rc = self.reference_counter().clone();
        let array = StackItem::new_array(&rc, keys)?;
        self.push(array)
    }

    pub(super) fn op_values(&mut self) -> VmResult<()> {
        let item = self.pop()?;
        let rc = self.reference_counter().clone();
        let values = match &item {
            StackItem::Array(inner) | StackItem::Struct(inner) => {
                let borrowed = inner.borrow();
                let mut out = Vec::with_capacity(borrowed.len());
                for child in borrowed.items() {
                    out.push(child.copy_for_assignment(&rc)?);
                }
                out
            }
            StackItem::Map(inner) => {
                let borrowed = inner.borrow();
                let mut out = Vec::with_capacity(borrowed.len());
                for (_, value) in borrowed.entries() {
                    out.push(value.copy_for_assignment(&rc)?);
                }
                out
            }
            _ => {
                return Err(VmError::InvalidType {
                    operation: "VALUES",
                    expected: "map, array or struct",
                })
            }
        };
        let array = StackItem::new_array(&rc, values)?;
        self.push(array)
    }

    pub(super) fn op_pick_item(&mut self) -> VmResult<()> {
        let key = self.pop()?;
        let collection = self.pop()?;
        let picked = match &collection {
            StackItem::Array(inner) | StackItem::Struct(inner) => {
                let index = key.as_index()?;
                inner
                    .borrow()
                    .get(index)
                    .cloned()
                    .ok_or_else(|| VmError::throw("index out of range"))?
            }
            StackItem::Map(inner) => inner
                .borrow()
                .get(&key)?
                .cloned()
                .ok_or_else(|| VmError::throw("key not found in map"))?,
            StackItem::ByteString(bytes) => {
                let index = key.as_index()?;
                let byte = *bytes
                    .get(index)
                    .ok_or_else(|| VmError::throw("index out of range"))?;
                StackItem::from_int(byte as i64)
            }
            StackItem::Buffer(bytes) => {
                let index = key.as_index()?;
                let byte = *bytes
                    .borrow()
                    .get(index)
                    .ok_or_else(|| VmError::throw("index out of range"))?;
                StackItem::from_int(byte as i64)
            }
            _ => {
                return Err(VmError::InvalidType {
                    operation: "PICKITEM",
                    expected: "collection",
                })
            }
        };
        self.push(picked)
    }

    pub(super) fn op_append(&mut self) -> VmResult<()> {
        let value = self.pop()?;
        let target = self.pop()?;
        let rc = self.reference_counter().clone();
        match &target {
            StackItem::Array(inner) | StackItem::Struct(inner) => {
                let value = value.copy_for_assignment(&rc)?;
                inner.borrow_mut().push(value)
            }
            _ => Err(VmError::InvalidType {
                operation: "APPEND",
                expected: "array or struct",
            }),
        }
    }

    pub(super) fn op_set_item(&mut self) -> VmResult<()> {
        let value = self.pop()?;
        let key = self.pop()?;
        let target = self.pop()?;
        let rc = self.reference_counter().clone();
        match &target {
            StackItem::Array(inner) | StackItem::Struct(inner) => {
                let index = key.as_index()?;
                let value = value.copy_for_assignment(&rc)?;
                inner.borrow_mut().set(index, value)
            }
            StackItem::Map(inner) => {
                let value = value.copy_for_assignment(&rc)?;
                inner.borrow_mut().set(key, value)
            }
            StackItem::Buffer(bytes) => {
                let index = key.as_index()?;
                let byte = value
                    .as_int()?
                    .to_u8()
                    .ok_or_else(|| VmError::throw("byte value out of range"))?;
                let mut borrowed = bytes.borrow_mut();
                if index >= borrowed.len() {
                    return Err(VmError::throw("index out of range"));
                }
                borrowed[index] = byte;
                Ok(())
            }
            _ => Err(VmError::InvalidType {
                operation: "SETITEM",
                expected: "array, struct, map or buffer",
            }),
        }
    }

    pub(super) fn op_reverse_items(&mut self) -> VmResult<()> {
        let item = self.pop()?;
        match &item {
            StackItem::Array(inner) | StackItem::Struct(inner) => {
                inner.borrow_mut().reverse();
                Ok(())
            }
            StackItem::Buffer(bytes) => {
                bytes.borrow_mut().reverse();
                Ok(())
            }
            _ => Err(VmError::InvalidType {
                operation: "REVERSEITEMS",
                expected: "array, struct or buffer",
            }),
        }
    }

    pub(super) fn op_remove(&mut self) -> VmResult<()> {
        let key = self.pop()?;
        let target = self.pop()?;
        match &target {
            StackItem::Array(inner) | StackItem::Struct(inner) => {
                let index = key.as_index()?;
                inner.borrow_mut().remove(index)?;
                Ok(())
            }
            StackItem::Map(inner) => {
                inner.borrow_mut().remove(&key)?;
                Ok(())
            }
            _ => Err(VmError::InvalidType {
                operation: "REMOVE",
                expected: "array, struct or map",
            }),
        }
    }

    pub(super) fn op_clear_items(&mut self) -> VmResult<()> {
        let item = self.pop()?;
        match &item {
            StackItem::Array(inner) | StackItem::Struct(inner) => {
                inner.borrow_mut().clear();
                Ok(())
            }
            StackItem::Map(inner) => {
                inner.borrow_mut().clear();
                Ok(())
            }
            _ => Err(VmError::InvalidType {
                operation: "CLEARITEMS",
                expected: "compound",
            }),
        }
    }

    pub(super) fn op_pop_item(&mut self) -> VmResult<()> {
        let item = self.pop()?;
        let popped = match &item {
            StackItem::Array(inner) | StackItem::Struct(inner) => inner.borrow_mut().pop()?,
            _ => {
                return Err(VmError::InvalidType {
                    operation: "POPITEM",
                    expected: "array or struct",
                })
            }
        };
        self.push(popped)
    }
}
