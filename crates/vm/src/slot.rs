//! Variable slots: static fields, locals and arguments.

use crate::reference_counter::ReferenceCounter;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};

/// A fixed-size array of variables, initialized to `Null`.
#[derive(Debug)]
pub struct Slot {
    items: Vec<StackItem>,
    rc: ReferenceCounter,
}

impl Slot {
    /// Creates a slot of `count` null entries.
    pub fn new(count: usize, rc: ReferenceCounter) -> VmResult<Self> {
        rc.add(count);
        Ok(Self {
            items: vec![StackItem::Null; count],
            rc,
        })
    }

    /// Creates a slot seeded from `items` (used for arguments).
    pub fn with_items(items: Vec<StackItem>, rc: ReferenceCounter) -> VmResult<Self> {
        rc.add(items.len());
        Ok(Self { items, rc })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> VmResult<&StackItem> {
        self.items
            .get(index)
            .ok_or_else(|| VmError::invalid_operation(format!("slot index {index} out of range")))
    }

    pub fn set(&mut self, index: usize, item: StackItem) -> VmResult<()> {
        if index >= self.items.len() {
            return Err(VmError::invalid_operation(format!(
                "slot index {index} out of range"
            )));
        }
        self.items[index] = item;
        Ok(())
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.rc.remove(self.items.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialized_to_null() {
        let rc = ReferenceCounter::new(2048);
        let slot = Slot::new(3, rc.clone()).unwrap();
        assert_eq!(slot.len(), 3);
        assert!(slot.get(0).unwrap().is_null());
        assert!(slot.get(3).is_err());
        assert_eq!(rc.count(), 3);
        drop(slot);
        assert_eq!(rc.count(), 0);
    }

    #[test]
    fn set_replaces_in_place() {
        let rc = ReferenceCounter::new(2048);
        let mut slot = Slot::new(2, rc.clone()).unwrap();
        slot.set(1, StackItem::from_int(5)).unwrap();
        assert_eq!(slot.get(1).unwrap().as_i64().unwrap(), 5);
        assert_eq!(rc.count(), 2);
        assert!(slot.set(2, StackItem::Null).is_err());
    }
}
