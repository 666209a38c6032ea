//! Canonical binary form of stack items.
//!
//! The encoding is deterministic: map entries are emitted in canonical key
//! order, and cyclic object graphs are rejected. Both directions enforce the
//! item-size cap.

use super::{bigint_to_bytes, bytes_to_bigint, StackItem, StackItemType};
use crate::reference_counter::ReferenceCounter;
use crate::{VmError, VmResult};
use neonova_config::{MAX_ITEM_SIZE, MAX_STACK_SIZE};
use neonova_io::{BinaryWriter, MemoryReader};
use std::collections::HashSet;

enum Task {
    Emit(StackItem),
    Leave(usize),
}

/// Serializes an item to its canonical bytes.
///
/// Pointers and interop interfaces have no wire form; cycles through
/// compound items are detected and rejected.
pub fn serialize_item(item: &StackItem) -> VmResult<Vec<u8>> {
    let mut writer = BinaryWriter::new();
    let mut work = vec![Task::Emit(item.clone())];
    let mut path: HashSet<usize> = HashSet::new();

    while let Some(task) = work.pop() {
        match task {
            Task::Leave(id) => {
                path.remove(&id);
            }
            Task::Emit(item) => {
                match &item {
                    StackItem::Null => writer.write_u8(StackItemType::Any as u8),
                    StackItem::Boolean(b) => {
                        writer.write_u8(StackItemType::Boolean as u8);
                        writer.write_bool(*b);
                    }
                    StackItem::Integer(value) => {
                        writer.write_u8(StackItemType::Integer as u8);
                        writer.write_var_bytes(&bigint_to_bytes(value));
                    }
                    StackItem::ByteString(bytes) => {
                        writer.write_u8(StackItemType::ByteString as u8);
                        writer.write_var_bytes(bytes);
                    }
                    StackItem::Buffer(bytes) => {
                        writer.write_u8(StackItemType::Buffer as u8);
                        writer.write_var_bytes(&bytes.borrow());
                    }
                    StackItem::Array(inner) | StackItem::Struct(inner) => {
                        let id = inner.as_ptr() as usize;
                        if !path.insert(id) {
                            return Err(VmError::invalid_operation(
                                "cyclic item cannot be serialized",
                            ));
                        }
                        writer.write_u8(item.item_type() as u8);
                        let borrowed = inner.borrow();
                        writer.write_var_int(borrowed.len() as u64);
                        work.push(Task::Leave(id));
                        for child in borrowed.items().iter().rev() {
                            work.push(Task::Emit(child.clone()));
                        }
                    }
                    StackItem::Map(inner) => {
                        let id = inner.as_ptr() as usize;
                        if !path.insert(id) {
                            return Err(VmError::invalid_operation(
                                "cyclic item cannot be serialized",
                            ));
                        }
                        writer.write_u8(StackItemType::Map as u8);
                        let borrowed = inner.borrow();
                        writer.write_var_int(borrowed.len() as u64);
                        work.push(Task::Leave(id));
                        let entries: Vec<(StackItem, StackItem)> = borrowed
                            .entries()
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect();
                        for (key, value) in entries.into_iter().rev() {
                            work.push(Task::Emit(value));
                            work.push(Task::Emit(key));
                        }
                    }
                    StackItem::Pointer(_) | StackItem::Interop(_) => {
                        return Err(VmError::invalid_operation(format!(
                            "type {:?} is not serializable",
                            item.item_type()
                        )))
                    }
                }
                if writer.len() > MAX_ITEM_SIZE {
                    return Err(VmError::ItemTooLarge);
                }
            }
        }
    }
    Ok(writer.into_bytes())
}

/// Reverses [`serialize_item`].
pub fn deserialize_item(bytes: &[u8], rc: &ReferenceCounter) -> VmResult<StackItem> {
    if bytes.len() > MAX_ITEM_SIZE {
        return Err(VmError::ItemTooLarge);
    }
    let mut reader = MemoryReader::new(bytes);
    let mut budget = MAX_STACK_SIZE;
    let item = read_item(&mut reader, rc, &mut budget)?;
    if !reader.is_exhausted() {
        return Err(VmError::invalid_operation("trailing bytes after item"));
    }
    Ok(item)
}

fn read_item(
    reader: &mut MemoryReader<'_>,
    rc: &ReferenceCounter,
    budget: &mut usize,
) -> VmResult<StackItem> {
    if *budget == 0 {
        return Err(VmError::ReferenceLimit);
    }
    *budget -= 1;

    let io = |e: neonova_io::IoError| VmError::invalid_operation(e.to_string());
    let type_byte = reader.read_u8().map_err(io)?;
    let item_type = StackItemType::from_byte(type_byte)
        .ok_or_else(|| VmError::invalid_operation(format!("unknown item type {type_byte:#04x}")))?;

    Ok(match item_type {
        StackItemType::Any => StackItem::Null,
        StackItemType::Boolean => StackItem::Boolean(reader.read_bool().map_err(io)?),
        StackItemType::Integer => {
            let bytes = reader.read_var_bytes(MAX_ITEM_SIZE).map_err(io)?;
            StackItem::Integer(bytes_to_bigint(&bytes)?)
        }
        StackItemType::ByteString => {
            StackItem::from_bytes(reader.read_var_bytes(MAX_ITEM_SIZE).map_err(io)?)
        }
        StackItemType::Buffer => {
            StackItem::new_buffer(reader.read_var_bytes(MAX_ITEM_SIZE).map_err(io)?)
        }
        StackItemType::Array | StackItemType::Struct => {
            let count = reader.read_var_int(MAX_STACK_SIZE as u64).map_err(io)? as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(read_item(reader, rc, budget)?);
            }
            if item_type == StackItemType::Array {
                StackItem::new_array(rc, items)?
            } else {
                StackItem::new_struct(rc, items)?
            }
        }
        StackItemType::Map => {
            let count = reader.read_var_int(MAX_STACK_SIZE as u64).map_err(io)? as usize;
            let map = StackItem::new_map(rc);
            if let StackItem::Map(inner) = &map {
                for _ in 0..count {
                    let key = read_item(reader, rc, budget)?;
                    let value = read_item(reader, rc, budget)?;
                    inner.borrow_mut().set(key, value)?;
                }
            }
            map
        }
        StackItemType::Pointer | StackItemType::InteropInterface => {
            return Err(VmError::invalid_operation(format!(
                "type {item_type:?} is not deserializable"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> ReferenceCounter {
        ReferenceCounter::new(MAX_STACK_SIZE)
    }

    #[test]
    fn identity_on_acyclic_graph() {
        let rc = counter();
        let map = StackItem::new_map(&rc);
        if let StackItem::Map(inner) = &map {
            inner
                .borrow_mut()
                .set(StackItem::from_bytes(b"b".to_vec()), StackItem::from_int(2))
                .unwrap();
            inner
                .borrow_mut()
                .set(StackItem::from_bytes(b"a".to_vec()), StackItem::from_int(1))
                .unwrap();
        }
        let item = StackItem::new_array(
            &rc,
            vec![
                StackItem::Null,
                StackItem::Boolean(true),
                StackItem::from_int(-7),
                StackItem::from_bytes(b"neo".to_vec()),
                map,
            ],
        )
        .unwrap();
        let bytes = serialize_item(&item).unwrap();
        let decoded = deserialize_item(&bytes, &rc).unwrap();
        // Re-serializing the decoded graph yields identical bytes.
        assert_eq!(serialize_item(&decoded).unwrap(), bytes);
    }

    #[test]
    fn map_keys_serialized_in_canonical_order() {
        let rc = counter();
        let build = |keys: &[&[u8]]| {
            let map = StackItem::new_map(&rc);
            if let StackItem::Map(inner) = &map {
                for key in keys {
                    inner
                        .borrow_mut()
                        .set(StackItem::from_bytes(key.to_vec()), StackItem::from_int(0))
                        .unwrap();
                }
            }
            map
        };
        let forward = build(&[b"a", b"x"]);
        let backward = build(&[b"x", b"a"]);
        assert_eq!(
            serialize_item(&forward).unwrap(),
            serialize_item(&backward).unwrap()
        );
    }

    #[test]
    fn rejects_cycles() {
        let rc = counter();
        let array = StackItem::new_array(&rc, vec![]).unwrap();
        if let StackItem::Array(inner) = &array {
            inner.borrow_mut().push(array.clone()).unwrap();
        }
        assert!(matches!(
            serialize_item(&array),
            Err(VmError::InvalidOperation(_))
        ));
    }

    #[test]
    fn rejects_pointers() {
        let item = StackItem::Pointer(crate::stack_item::PointerItem {
            script: crate::Script::new(vec![0x40]),
            position: 0,
        });
        assert!(serialize_item(&item).is_err());
    }

    #[test]
    fn sibling_sharing_is_not_a_cycle() {
        let rc = counter();
        let shared = StackItem::new_array(&rc, vec![StackItem::from_int(1)]).unwrap();
        let parent = StackItem::new_array(&rc, vec![shared.clone(), shared]).unwrap();
        assert!(serialize_item(&parent).is_ok());
    }
}
