//! `System.Iterator.*` handlers and the storage iterator object.

use crate::engine::ApplicationEngine;
use bitflags::bitflags;
use neonova_vm::stack_item::deserialize_item;
use neonova_vm::{StackItem, VmError, VmResult};

bitflags! {
    /// Options shaping what `System.Storage.Find` yields.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FindOptions: u8 {
        const NONE = 0;
        const KEYS_ONLY = 0x01;
        const REMOVE_PREFIX = 0x02;
        const VALUES_ONLY = 0x04;
        const DESERIALIZE_VALUES = 0x08;
        const PICK_FIELD0 = 0x10;
        const PICK_FIELD1 = 0x20;
        const BACKWARDS = 0x80;
    }
}

/// An in-flight storage scan handed to scripts as an interop item.
#[derive(Debug)]
pub struct StorageIterator {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    position: Option<usize>,
    prefix_length: usize,
    options: FindOptions,
}

impl StorageIterator {
    pub fn new(entries: Vec<(Vec<u8>, Vec<u8>)>, prefix_length: usize, options: FindOptions) -> Self {
        Self {
            entries,
            position: None,
            prefix_length,
            options,
        }
    }

    pub fn advance(&mut self) -> bool {
        let next = self.position.map(|p| p + 1).unwrap_or(0);
        if next < self.entries.len() {
            self.position = Some(next);
            true
        } else {
            self.position = Some(self.entries.len());
            false
        }
    }

    pub fn current(
        &self,
        rc: &neonova_vm::ReferenceCounter,
    ) -> VmResult<StackItem> {
        let position = self
            .position
            .filter(|p| *p < self.entries.len())
            .ok_or_else(|| VmError::throw("iterator has no current element"))?;
        let (key, value) = &self.entries[position];
        let mut key = key.clone();
        if self.options.contains(FindOptions::REMOVE_PREFIX) {
            key.drain(..self.prefix_length.min(key.len()));
        }
        let value_item = if self.options.contains(FindOptions::DESERIALIZE_VALUES) {
            let item = deserialize_item(value, rc)?;
            if self.options.contains(FindOptions::PICK_FIELD0)
                || self.options.contains(FindOptions::PICK_FIELD1)
            {
                let index = usize::from(self.options.contains(FindOptions::PICK_FIELD1));
                match &item {
                    StackItem::Array(inner) | StackItem::Struct(inner) => inner
                        .borrow()
                        .get(index)
                        .cloned()
                        .ok_or_else(|| VmError::throw("picked field out of range"))?,
                    _ => return Err(VmError::throw("PickField requires a deserialized array")),
                }
            } else {
                item
            }
        } else {
            StackItem::from_bytes(value.clone())
        };
        if self.options.contains(FindOptions::KEYS_ONLY) {
            return Ok(StackItem::from_bytes(key));
        }
        if self.options.contains(FindOptions::VALUES_ONLY) {
            return Ok(value_item);
        }
        StackItem::new_struct(rc, vec![StackItem::from_bytes(key), value_item])
    }
}

fn with_iterator<R>(
    engine: &mut ApplicationEngine,
    f: impl FnOnce(&mut StorageIterator, &neonova_vm::ReferenceCounter) -> VmResult<R>,
) -> VmResult<R> {
    let item = engine.vm_mut().pop()?;
    let StackItem::Interop(interop) = item else {
        return Err(VmError::InvalidType {
            operation: "iterator syscall",
            expected: "iterator",
        });
    };
    let rc = engine.vm().reference_counter().clone();
    let mut object = interop.object().borrow_mut();
    let iterator = object
        .downcast_mut::<StorageIterator>()
        .ok_or(VmError::InvalidType {
            operation: "iterator syscall",
            expected: "iterator",
        })?;
    f(iterator, &rc)
}

pub(super) fn next(engine: &mut ApplicationEngine) -> VmResult<()> {
    let advanced = with_iterator(engine, |iterator, _| Ok(iterator.advance()))?;
    engine.vm_mut().push(StackItem::Boolean(advanced))
}

pub(super) fn value(engine: &mut ApplicationEngine) -> VmResult<()> {
    let item = with_iterator(engine, |iterator, rc| iterator.current(rc))?;
    engine.vm_mut().push(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use neonova_vm::ReferenceCounter;

    #[test]
    fn iterates_and_applies_options() {
        let rc = ReferenceCounter::new(2048);
        let entries = vec![
            (vec![0x01, 0xaa], vec![1]),
            (vec![0x01, 0xbb], vec![2]),
        ];
        let mut iterator = StorageIterator::new(
            entries,
            1,
            FindOptions::KEYS_ONLY | FindOptions::REMOVE_PREFIX,
        );
        assert!(iterator.current(&rc).is_err());
        assert!(iterator.advance());
        assert_eq!(
            iterator.current(&rc).unwrap().as_bytes().unwrap(),
            vec![0xaa]
        );
        assert!(iterator.advance());
        assert!(!iterator.advance());
        assert!(iterator.current(&rc).is_err());
    }

    #[test]
    fn default_yields_key_value_struct() {
        let rc = ReferenceCounter::new(2048);
        let mut iterator =
            StorageIterator::new(vec![(vec![9], vec![7])], 0, FindOptions::NONE);
        iterator.advance();
        let item = iterator.current(&rc).unwrap();
        let StackItem::Struct(inner) = item else {
            panic!("expected struct");
        };
        assert_eq!(inner.borrow().len(), 2);
    }
}
