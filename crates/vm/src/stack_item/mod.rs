//! Typed, reference-counted values passed on the evaluation stack.
//!
//! Compound items (`Array`, `Struct`, `Map`) and buffers are shared handles:
//! cloning a `StackItem` aliases the same underlying storage, matching the
//! aliasing semantics scripts observe. Every child a compound holds is
//! registered with the shared [`ReferenceCounter`], which bounds total
//! liveness across the run.

mod serialization;

pub use serialization::{deserialize_item, serialize_item};

use crate::reference_counter::ReferenceCounter;
use crate::script::Script;
use crate::{VmError, VmResult};
use neonova_config::{MAX_COMPARABLE_SIZE, MAX_INTEGER_SIZE, MAX_MAP_KEY_SIZE};
use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Wire discriminants of the item types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StackItemType {
    Any = 0x00,
    Pointer = 0x10,
    Boolean = 0x20,
    Integer = 0x21,
    ByteString = 0x28,
    Buffer = 0x30,
    Array = 0x40,
    Struct = 0x41,
    Map = 0x48,
    InteropInterface = 0x60,
}

impl StackItemType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Any),
            0x10 => Some(Self::Pointer),
            0x20 => Some(Self::Boolean),
            0x21 => Some(Self::Integer),
            0x28 => Some(Self::ByteString),
            0x30 => Some(Self::Buffer),
            0x40 => Some(Self::Array),
            0x41 => Some(Self::Struct),
            0x48 => Some(Self::Map),
            0x60 => Some(Self::InteropInterface),
            _ => None,
        }
    }

    pub fn is_primitive(self) -> bool {
        matches!(self, Self::Boolean | Self::Integer | Self::ByteString)
    }
}

/// Ordered sequence backing `Array` and `Struct`.
#[derive(Debug)]
pub struct ArrayInner {
    items: Vec<StackItem>,
    rc: ReferenceCounter,
}

impl ArrayInner {
    pub fn items(&self) -> &[StackItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&StackItem> {
        self.items.get(index)
    }

    pub fn push(&mut self, item: StackItem) -> VmResult<()> {
        self.rc.add(1);
        self.items.push(item);
        Ok(())
    }

    pub fn set(&mut self, index: usize, item: StackItem) -> VmResult<()> {
        if index >= self.items.len() {
            return Err(VmError::throw("array index out of range"));
        }
        self.items[index] = item;
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> VmResult<StackItem> {
        if index >= self.items.len() {
            return Err(VmError::throw("array index out of range"));
        }
        let item = self.items.remove(index);
        self.rc.remove(1);
        Ok(item)
    }

    pub fn pop(&mut self) -> VmResult<StackItem> {
        let item = self
            .items
            .pop()
            .ok_or_else(|| VmError::throw("pop from empty array"))?;
        self.rc.remove(1);
        Ok(item)
    }

    pub fn clear(&mut self) {
        self.rc.remove(self.items.len());
        self.items.clear();
    }

    pub fn reverse(&mut self) {
        self.items.reverse();
    }
}

impl Drop for ArrayInner {
    fn drop(&mut self) {
        self.rc.remove(self.items.len());
    }
}

/// Ordered map backing `Map`. Keys are canonical primitive bytes, iterated
/// byte-lexicographically wherever scripts can observe the order.
#[derive(Debug)]
pub struct MapInner {
    entries: BTreeMap<Vec<u8>, (StackItem, StackItem)>,
    rc: ReferenceCounter,
}

impl MapInner {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&StackItem, &StackItem)> {
        self.entries.values().map(|(k, v)| (k, v))
    }

    pub fn get(&self, key: &StackItem) -> VmResult<Option<&StackItem>> {
        let bytes = map_key_bytes(key)?;
        Ok(self.entries.get(&bytes).map(|(_, v)| v))
    }

    pub fn contains_key(&self, key: &StackItem) -> VmResult<bool> {
        Ok(self.entries.contains_key(&map_key_bytes(key)?))
    }

    pub fn set(&mut self, key: StackItem, value: StackItem) -> VmResult<()> {
        let bytes = map_key_bytes(&key)?;
        if !self.entries.contains_key(&bytes) {
            self.rc.add(2);
        }
        self.entries.insert(bytes, (key, value));
        Ok(())
    }

    pub fn remove(&mut self, key: &StackItem) -> VmResult<bool> {
        let bytes = map_key_bytes(key)?;
        if self.entries.remove(&bytes).is_some() {
            self.rc.remove(2);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn clear(&mut self) {
        self.rc.remove(2 * self.entries.len());
        self.entries.clear();
    }
}

impl Drop for MapInner {
    fn drop(&mut self) {
        self.rc.remove(2 * self.entries.len());
    }
}

/// Canonical map-key form of a primitive item.
pub fn map_key_bytes(key: &StackItem) -> VmResult<Vec<u8>> {
    let bytes = match key {
        StackItem::Boolean(b) => vec![u8::from(*b)],
        StackItem::Integer(value) => bigint_to_bytes(value),
        StackItem::ByteString(bytes) => bytes.as_ref().clone(),
        _ => {
            return Err(VmError::InvalidType {
                operation: "map key",
                expected: "primitive",
            })
        }
    };
    if bytes.len() > MAX_MAP_KEY_SIZE {
        return Err(VmError::throw("map key too large"));
    }
    Ok(bytes)
}

/// A code pointer into a specific script.
#[derive(Debug, Clone)]
pub struct PointerItem {
    pub script: Script,
    pub position: usize,
}

/// Opaque host object handed to scripts (iterators and the like).
#[derive(Clone)]
pub struct InteropItem {
    type_name: &'static str,
    object: Rc<RefCell<dyn Any>>,
}

impl InteropItem {
    pub fn new<T: Any>(type_name: &'static str, value: T) -> Self {
        Self {
            type_name,
            object: Rc::new(RefCell::new(value)),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn object(&self) -> &Rc<RefCell<dyn Any>> {
        &self.object
    }

    pub fn ptr_eq(&self, other: &InteropItem) -> bool {
        Rc::ptr_eq(&self.object, &other.object)
    }
}

impl std::fmt::Debug for InteropItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InteropInterface<{}>", self.type_name)
    }
}

/// A value on the evaluation stack.
#[derive(Debug, Clone)]
pub enum StackItem {
    Null,
    Boolean(bool),
    Integer(BigInt),
    ByteString(Rc<Vec<u8>>),
    Buffer(Rc<RefCell<Vec<u8>>>),
    Array(Rc<RefCell<ArrayInner>>),
    Struct(Rc<RefCell<ArrayInner>>),
    Map(Rc<RefCell<MapInner>>),
    Pointer(PointerItem),
    Interop(InteropItem),
}

impl StackItem {
    pub fn item_type(&self) -> StackItemType {
        match self {
            StackItem::Null => StackItemType::Any,
            StackItem::Boolean(_) => StackItemType::Boolean,
            StackItem::Integer(_) => StackItemType::Integer,
            StackItem::ByteString(_) => StackItemType::ByteString,
            StackItem::Buffer(_) => StackItemType::Buffer,
            StackItem::Array(_) => StackItemType::Array,
            StackItem::Struct(_) => StackItemType::Struct,
            StackItem::Map(_) => StackItemType::Map,
            StackItem::Pointer(_) => StackItemType::Pointer,
            StackItem::Interop(_) => StackItemType::InteropInterface,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StackItem::Null)
    }

    pub fn from_int(value: impl Into<BigInt>) -> Self {
        StackItem::Integer(value.into())
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        StackItem::ByteString(Rc::new(bytes.into()))
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        StackItem::ByteString(Rc::new(value.into().into_bytes()))
    }

    pub fn new_buffer(bytes: Vec<u8>) -> Self {
        StackItem::Buffer(Rc::new(RefCell::new(bytes)))
    }

    /// Builds an array, registering it and its children with the counter.
    pub fn new_array(rc: &ReferenceCounter, items: Vec<StackItem>) -> VmResult<Self> {
        let len = items.len();
        let inner = Rc::new(RefCell::new(ArrayInner {
            items,
            rc: rc.clone(),
        }));
        rc.add(len);
        rc.track_array(&inner);
        Ok(StackItem::Array(inner))
    }

    /// Builds a struct, registering it and its children with the counter.
    pub fn new_struct(rc: &ReferenceCounter, items: Vec<StackItem>) -> VmResult<Self> {
        let len = items.len();
        let inner = Rc::new(RefCell::new(ArrayInner {
            items,
            rc: rc.clone(),
        }));
        rc.add(len);
        rc.track_array(&inner);
        Ok(StackItem::Struct(inner))
    }

    pub fn new_map(rc: &ReferenceCounter) -> Self {
        let inner = Rc::new(RefCell::new(MapInner {
            entries: BTreeMap::new(),
            rc: rc.clone(),
        }));
        rc.track_map(&inner);
        StackItem::Map(inner)
    }

    /// Truthiness per the conversion rules.
    pub fn to_bool(&self) -> VmResult<bool> {
        Ok(match self {
            StackItem::Null => false,
            StackItem::Boolean(b) => *b,
            StackItem::Integer(value) => !value.is_zero(),
            StackItem::ByteString(bytes) => byteish_to_bool(bytes)?,
            StackItem::Buffer(bytes) => byteish_to_bool(&bytes.borrow())?,
            _ => true,
        })
    }

    /// Numeric value, for primitives only.
    pub fn as_int(&self) -> VmResult<BigInt> {
        match self {
            StackItem::Boolean(b) => Ok(BigInt::from(u8::from(*b))),
            StackItem::Integer(value) => Ok(value.clone()),
            StackItem::ByteString(bytes) => bytes_to_bigint(bytes),
            StackItem::Buffer(bytes) => bytes_to_bigint(&bytes.borrow()),
            _ => Err(VmError::InvalidType {
                operation: "integer conversion",
                expected: "primitive",
            }),
        }
    }

    /// `as_int` narrowed to i64.
    pub fn as_i64(&self) -> VmResult<i64> {
        self.as_int()?
            .to_i64()
            .ok_or(VmError::IntegerOverflow)
    }

    /// `as_int` narrowed to a non-negative usize.
    pub fn as_index(&self) -> VmResult<usize> {
        self.as_int()?
            .to_usize()
            .ok_or_else(|| VmError::throw("negative or oversized index"))
    }

    /// Byte form, for primitives and buffers.
    pub fn as_bytes(&self) -> VmResult<Vec<u8>> {
        match self {
            StackItem::Boolean(b) => Ok(vec![u8::from(*b)]),
            StackItem::Integer(value) => Ok(bigint_to_bytes(value)),
            StackItem::ByteString(bytes) => Ok(bytes.as_ref().clone()),
            StackItem::Buffer(bytes) => Ok(bytes.borrow().clone()),
            _ => Err(VmError::InvalidType {
                operation: "byte conversion",
                expected: "primitive or buffer",
            }),
        }
    }

    /// UTF-8 string view of the byte form.
    pub fn as_string(&self) -> VmResult<String> {
        String::from_utf8(self.as_bytes()?)
            .map_err(|_| VmError::throw("invalid UTF-8 in string conversion"))
    }

    /// Structural equality with the bounded-comparison rules: primitives by
    /// canonical bytes, buffers/arrays/maps/interops by identity, structs by
    /// bounded element recursion.
    pub fn equals(&self, other: &StackItem) -> VmResult<bool> {
        let mut budget = MAX_COMPARABLE_SIZE;
        self.equals_inner(other, &mut budget)
    }

    fn equals_inner(&self, other: &StackItem, budget: &mut usize) -> VmResult<bool> {
        if *budget == 0 {
            return Err(VmError::throw("comparison limit exceeded"));
        }
        *budget -= 1;
        Ok(match (self, other) {
            (StackItem::Null, StackItem::Null) => true,
            (StackItem::Null, _) | (_, StackItem::Null) => false,
            (StackItem::Buffer(a), StackItem::Buffer(b)) => Rc::ptr_eq(a, b),
            (StackItem::Array(a), StackItem::Array(b)) => Rc::ptr_eq(a, b),
            (StackItem::Map(a), StackItem::Map(b)) => Rc::ptr_eq(a, b),
            (StackItem::Interop(a), StackItem::Interop(b)) => a.ptr_eq(b),
            (StackItem::Pointer(a), StackItem::Pointer(b)) => {
                a.script.ptr_eq(&b.script) && a.position == b.position
            }
            (StackItem::Struct(a), StackItem::Struct(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let a = a.borrow();
                let b = b.borrow();
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.items().iter().zip(b.items().iter()) {
                    if !x.equals_inner(y, budget)? {
                        return Ok(false);
                    }
                }
                true
            }
            (a, b) if a.item_type().is_primitive() && b.item_type().is_primitive() => {
                let left = a.as_bytes()?;
                let right = b.as_bytes()?;
                if left.len() > MAX_COMPARABLE_SIZE || right.len() > MAX_COMPARABLE_SIZE {
                    return Err(VmError::throw("comparison limit exceeded"));
                }
                left == right
            }
            _ => false,
        })
    }

    /// Clones a struct value for store-into-compound semantics: nested
    /// structs are copied recursively, everything else stays shared.
    pub fn copy_for_assignment(&self, rc: &ReferenceCounter) -> VmResult<StackItem> {
        match self {
            StackItem::Struct(inner) => {
                let children = {
                    let borrowed = inner.borrow();
                    let mut out = Vec::with_capacity(borrowed.len());
                    for child in borrowed.items() {
                        out.push(child.copy_for_assignment(rc)?);
                    }
                    out
                };
                StackItem::new_struct(rc, children)
            }
            other => Ok(other.clone()),
        }
    }

    /// Type conversion implementing CONVERT.
    pub fn convert_to(&self, target: StackItemType, rc: &ReferenceCounter) -> VmResult<StackItem> {
        if self.item_type() == target {
            return Ok(self.clone());
        }
        match (self, target) {
            (StackItem::Null, StackItemType::Any) => Ok(StackItem::Null),
            (_, StackItemType::Boolean) => Ok(StackItem::Boolean(self.to_bool()?)),
            (_, StackItemType::Integer) => {
                let value = self.as_int()?;
                require_integer_bounds(&value)?;
                Ok(StackItem::Integer(value))
            }
            (_, StackItemType::ByteString)
                if matches!(
                    self,
                    StackItem::Boolean(_) | StackItem::Integer(_) | StackItem::Buffer(_)
                ) =>
            {
                Ok(StackItem::from_bytes(self.as_bytes()?))
            }
            (_, StackItemType::Buffer)
                if matches!(
                    self,
                    StackItem::Boolean(_) | StackItem::Integer(_) | StackItem::ByteString(_)
                ) =>
            {
                Ok(StackItem::new_buffer(self.as_bytes()?))
            }
            (StackItem::Array(inner), StackItemType::Struct) => {
                StackItem::new_struct(rc, inner.borrow().items().to_vec())
            }
            (StackItem::Struct(inner), StackItemType::Array) => {
                StackItem::new_array(rc, inner.borrow().items().to_vec())
            }
            _ => Err(VmError::invalid_operation(format!(
                "cannot convert {:?} to {target:?}",
                self.item_type()
            ))),
        }
    }
}

fn byteish_to_bool(bytes: &[u8]) -> VmResult<bool> {
    if bytes.len() > MAX_INTEGER_SIZE {
        return Err(VmError::IntegerOverflow);
    }
    Ok(bytes.iter().any(|b| *b != 0))
}

/// Minimal signed little-endian encoding; zero is the empty string.
pub fn bigint_to_bytes(value: &BigInt) -> Vec<u8> {
    if value.is_zero() {
        Vec::new()
    } else {
        value.to_signed_bytes_le()
    }
}

/// Decodes a signed little-endian integer, bounded at 32 bytes.
pub fn bytes_to_bigint(bytes: &[u8]) -> VmResult<BigInt> {
    if bytes.len() > MAX_INTEGER_SIZE {
        return Err(VmError::IntegerOverflow);
    }
    Ok(BigInt::from_signed_bytes_le(bytes))
}

/// Enforces the 32-byte two's-complement bound.
pub fn require_integer_bounds(value: &BigInt) -> VmResult<()> {
    if value.is_zero() {
        return Ok(());
    }
    if value.to_signed_bytes_le().len() > MAX_INTEGER_SIZE {
        return Err(VmError::IntegerOverflow);
    }
    Ok(())
}

/// Shorthand used by interop handlers returning optional data.
pub fn option_bytes(value: Option<Vec<u8>>) -> StackItem {
    match value {
        Some(bytes) => StackItem::from_bytes(bytes),
        None => StackItem::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> ReferenceCounter {
        ReferenceCounter::new(2048)
    }

    #[test]
    fn integer_zero_is_empty_bytes() {
        assert!(bigint_to_bytes(&BigInt::zero()).is_empty());
        assert_eq!(bytes_to_bigint(&[]).unwrap(), BigInt::zero());
        assert_eq!(bigint_to_bytes(&BigInt::from(-1)), vec![0xff]);
    }

    #[test]
    fn oversized_integer_rejected() {
        let value = BigInt::from(1) << 256;
        assert!(require_integer_bounds(&value).is_err());
        let value = (BigInt::from(1) << 255) - 1;
        assert!(require_integer_bounds(&value).is_ok());
    }

    #[test]
    fn array_aliases_share_mutations() {
        let rc = counter();
        let array = StackItem::new_array(&rc, vec![StackItem::from_int(1)]).unwrap();
        let alias = array.clone();
        if let StackItem::Array(inner) = &array {
            inner.borrow_mut().push(StackItem::from_int(2)).unwrap();
        }
        if let StackItem::Array(inner) = &alias {
            assert_eq!(inner.borrow().len(), 2);
        }
        assert_eq!(rc.count(), 2);
    }

    #[test]
    fn dropping_compound_releases_children() {
        let rc = counter();
        {
            let _array = StackItem::new_array(
                &rc,
                vec![StackItem::from_int(1), StackItem::from_int(2)],
            )
            .unwrap();
            assert_eq!(rc.count(), 2);
        }
        assert_eq!(rc.count(), 0);
    }

    #[test]
    fn struct_equality_is_structural() {
        let rc = counter();
        let a = StackItem::new_struct(&rc, vec![StackItem::from_int(1), StackItem::from_bytes(b"x".to_vec())])
            .unwrap();
        let b = StackItem::new_struct(&rc, vec![StackItem::from_int(1), StackItem::from_bytes(b"x".to_vec())])
            .unwrap();
        assert!(a.equals(&b).unwrap());
        let c = StackItem::new_struct(&rc, vec![StackItem::from_int(2)]).unwrap();
        assert!(!a.equals(&c).unwrap());
    }

    #[test]
    fn primitive_equality_by_bytes() {
        assert!(StackItem::from_int(1)
            .equals(&StackItem::from_bytes(vec![1]))
            .unwrap());
        assert!(StackItem::Boolean(false)
            .equals(&StackItem::from_bytes(vec![0]))
            .unwrap());
        assert!(!StackItem::Null.equals(&StackItem::from_int(0)).unwrap());
    }

    #[test]
    fn array_equality_by_reference() {
        let rc = counter();
        let a = StackItem::new_array(&rc, vec![]).unwrap();
        let b = StackItem::new_array(&rc, vec![]).unwrap();
        assert!(a.equals(&a.clone()).unwrap());
        assert!(!a.equals(&b).unwrap());
    }

    #[test]
    fn map_keys_are_canonical() {
        let rc = counter();
        let map = StackItem::new_map(&rc);
        if let StackItem::Map(inner) = &map {
            inner
                .borrow_mut()
                .set(StackItem::from_int(1), StackItem::from_int(100))
                .unwrap();
            // ByteString [0x01] is the same canonical key as Integer 1.
            let found = inner.borrow().get(&StackItem::from_bytes(vec![1])).unwrap().cloned();
            assert!(found.unwrap().equals(&StackItem::from_int(100)).unwrap());
            assert_eq!(rc.count(), 2);
        }
    }

    #[test]
    fn map_rejects_compound_keys() {
        let rc = counter();
        let key = StackItem::new_array(&rc, vec![]).unwrap();
        assert!(map_key_bytes(&key).is_err());
    }

    #[test]
    fn convert_array_to_struct_copies_members() {
        let rc = counter();
        let array = StackItem::new_array(&rc, vec![StackItem::from_int(5)]).unwrap();
        let converted = array.convert_to(StackItemType::Struct, &rc).unwrap();
        assert_eq!(converted.item_type(), StackItemType::Struct);
        assert_eq!(rc.count(), 2);
    }

    #[test]
    fn struct_copy_is_deep_for_structs_only() {
        let rc = counter();
        let shared_buffer = StackItem::new_buffer(vec![1, 2]);
        let nested = StackItem::new_struct(&rc, vec![shared_buffer.clone()]).unwrap();
        let outer = StackItem::new_struct(&rc, vec![nested]).unwrap();
        let copy = outer.copy_for_assignment(&rc).unwrap();
        let (StackItem::Struct(a), StackItem::Struct(b)) = (&outer, &copy) else {
            panic!("expected structs");
        };
        assert!(!Rc::ptr_eq(a, b));
        // The buffer inside is still shared.
        let inner_a = a.borrow().get(0).unwrap().clone();
        let inner_b = b.borrow().get(0).unwrap().clone();
        let (StackItem::Struct(sa), StackItem::Struct(sb)) = (&inner_a, &inner_b) else {
            panic!("expected nested structs");
        };
        assert!(!Rc::ptr_eq(sa, sb));
        let (StackItem::Buffer(ba), StackItem::Buffer(bb)) = (
            sa.borrow().get(0).unwrap().clone(),
            sb.borrow().get(0).unwrap().clone(),
        ) else {
            panic!("expected buffers");
        };
        assert!(Rc::ptr_eq(&ba, &bb));
    }
}
