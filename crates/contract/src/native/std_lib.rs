//! The StdLib native: serialization, encodings and string utilities.

use super::{native_hash, NativeContract, NativeMethodMeta};
use crate::engine::ApplicationEngine;
use base64::Engine as _;
use neonova_core::UInt160;
use neonova_vm::stack_item::{deserialize_item, serialize_item};
use neonova_vm::{ReferenceCounter, StackItem, VmError, VmResult};
use num_bigint::BigInt;
use num_traits::{Num, ToPrimitive};

const ID: i32 = -2;

const MAX_INPUT_LENGTH: usize = 1024;

pub struct StdLib {
    hash: UInt160,
    methods: Vec<NativeMethodMeta>,
}

impl StdLib {
    pub fn new() -> Self {
        let methods = vec![
            NativeMethodMeta::pure("serialize", 1, 1 << 12),
            NativeMethodMeta::pure("deserialize", 1, 1 << 14),
            NativeMethodMeta::pure("jsonSerialize", 1, 1 << 12),
            NativeMethodMeta::pure("jsonDeserialize", 1, 1 << 14),
            NativeMethodMeta::pure("itoa", 1, 1 << 12),
            NativeMethodMeta::pure("itoa", 2, 1 << 12),
            NativeMethodMeta::pure("atoi", 1, 1 << 6),
            NativeMethodMeta::pure("atoi", 2, 1 << 6),
            NativeMethodMeta::pure("base64Encode", 1, 1 << 5),
            NativeMethodMeta::pure("base64Decode", 1, 1 << 5),
            NativeMethodMeta::pure("base58Encode", 1, 1 << 13),
            NativeMethodMeta::pure("base58Decode", 1, 1 << 10),
            NativeMethodMeta::pure("base58CheckEncode", 1, 1 << 16),
            NativeMethodMeta::pure("base58CheckDecode", 1, 1 << 16),
            NativeMethodMeta::pure("memoryCompare", 2, 1 << 5),
            NativeMethodMeta::pure("memorySearch", 2, 1 << 6),
            NativeMethodMeta::pure("memorySearch", 3, 1 << 6),
            NativeMethodMeta::pure("memorySearch", 4, 1 << 6),
            NativeMethodMeta::pure("stringSplit", 2, 1 << 8),
            NativeMethodMeta::pure("stringSplit", 3, 1 << 8),
            NativeMethodMeta::pure("strLen", 1, 1 << 8),
        ];
        Self {
            hash: native_hash("StdLib"),
            methods,
        }
    }
}

impl Default for StdLib {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for StdLib {
    fn name(&self) -> &'static str {
        "StdLib"
    }

    fn id(&self) -> i32 {
        ID
    }

    fn hash(&self) -> UInt160 {
        self.hash
    }

    fn methods(&self) -> &[NativeMethodMeta] {
        &self.methods
    }

    fn invoke(
        &self,
        engine: &mut ApplicationEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> VmResult<StackItem> {
        let rc = engine.vm().reference_counter().clone();
        match (method, args.len()) {
            ("serialize", 1) => Ok(StackItem::from_bytes(serialize_item(&args[0])?)),
            ("deserialize", 1) => {
                let bytes = args[0].as_bytes()?;
                deserialize_item(&bytes, &rc)
            }
            ("jsonSerialize", 1) => {
                let value = item_to_json(&args[0])?;
                let text = serde_json::to_string(&value)
                    .map_err(|e| VmError::throw(format!("json serialization failed: {e}")))?;
                Ok(StackItem::from_bytes(text.into_bytes()))
            }
            ("jsonDeserialize", 1) => {
                let bytes = args[0].as_bytes()?;
                let value: serde_json::Value = serde_json::from_slice(&bytes)
                    .map_err(|e| VmError::throw(format!("invalid json: {e}")))?;
                json_to_item(&value, &rc)
            }
            ("itoa", 1) => Ok(StackItem::from_string(args[0].as_int()?.to_string())),
            ("itoa", 2) => {
                let value = args[0].as_int()?;
                match args[1].as_i64()? {
                    10 => Ok(StackItem::from_string(value.to_string())),
                    16 => Ok(StackItem::from_string(value.to_str_radix(16))),
                    other => Err(VmError::throw(format!("invalid base {other}"))),
                }
            }
            ("atoi", 1) => parse_int(&args[0].as_string()?, 10),
            ("atoi", 2) => {
                let base = args[1].as_i64()?;
                if base != 10 && base != 16 {
                    return Err(VmError::throw(format!("invalid base {base}")));
                }
                parse_int(&args[0].as_string()?, base as u32)
            }
            ("base64Encode", 1) => {
                let data = args[0].as_bytes()?;
                Ok(StackItem::from_string(
                    base64::engine::general_purpose::STANDARD.encode(data),
                ))
            }
            ("base64Decode", 1) => {
                let text = args[0].as_string()?;
                let data = base64::engine::general_purpose::STANDARD
                    .decode(text.trim())
                    .map_err(|e| VmError::throw(format!("invalid base64: {e}")))?;
                Ok(StackItem::from_bytes(data))
            }
            ("base58Encode", 1) => {
                let data = args[0].as_bytes()?;
                Ok(StackItem::from_string(bs58::encode(data).into_string()))
            }
            ("base58Decode", 1) => {
                let text = args[0].as_string()?;
                let data = bs58::decode(text.trim())
                    .into_vec()
                    .map_err(|e| VmError::throw(format!("invalid base58: {e}")))?;
                Ok(StackItem::from_bytes(data))
            }
            ("base58CheckEncode", 1) => {
                let mut data = args[0].as_bytes()?;
                let checksum = neonova_crypto::hash256(&data);
                data.extend_from_slice(&checksum[..4]);
                Ok(StackItem::from_string(bs58::encode(data).into_string()))
            }
            ("base58CheckDecode", 1) => {
                let text = args[0].as_string()?;
                let data = bs58::decode(text.trim())
                    .into_vec()
                    .map_err(|e| VmError::throw(format!("invalid base58: {e}")))?;
                if data.len() < 4 {
                    return Err(VmError::throw("base58check payload too short"));
                }
                let (payload, checksum) = data.split_at(data.len() - 4);
                if neonova_crypto::hash256(payload)[..4] != *checksum {
                    return Err(VmError::throw("base58check checksum mismatch"));
                }
                Ok(StackItem::from_bytes(payload.to_vec()))
            }
            ("memoryCompare", 2) => {
                let a = args[0].as_bytes()?;
                let b = args[1].as_bytes()?;
                let ordering = a.cmp(&b) as i8;
                Ok(StackItem::from_int(ordering as i64))
            }
            ("memorySearch", n @ 2..=4) => {
                let haystack = args[0].as_bytes()?;
                let needle = args[1].as_bytes()?;
                let start = if n >= 3 { args[2].as_index()? } else { 0 };
                let backward = if n == 4 { args[3].to_bool()? } else { false };
                Ok(StackItem::from_int(memory_search(
                    &haystack, &needle, start, backward,
                )))
            }
            ("stringSplit", n @ 2..=3) => {
                let text = args[0].as_string()?;
                let separator = args[1].as_string()?;
                if separator.is_empty() {
                    return Err(VmError::throw("empty separator"));
                }
                let remove_empty = if n == 3 { args[2].to_bool()? } else { false };
                let parts: Vec<StackItem> = text
                    .split(separator.as_str())
                    .filter(|part| !remove_empty || !part.is_empty())
                    .map(StackItem::from_string)
                    .collect();
                StackItem::new_array(&rc, parts)
            }
            ("strLen", 1) => {
                let text = args[0].as_string()?;
                Ok(StackItem::from_int(text.chars().count() as i64))
            }
            _ => Err(VmError::throw(format!(
                "unknown StdLib method {method}/{}",
                args.len()
            ))),
        }
    }
}

fn parse_int(text: &str, radix: u32) -> VmResult<StackItem> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_INPUT_LENGTH {
        return Err(VmError::throw("invalid integer string"));
    }
    let value = BigInt::from_str_radix(trimmed, radix)
        .map_err(|e| VmError::throw(format!("invalid integer: {e}")))?;
    neonova_vm::stack_item::require_integer_bounds(&value)?;
    Ok(StackItem::Integer(value))
}

fn memory_search(haystack: &[u8], needle: &[u8], start: usize, backward: bool) -> i64 {
    if needle.is_empty() || haystack.is_empty() || needle.len() > haystack.len() {
        return -1;
    }
    if backward {
        let end = start.min(haystack.len());
        for index in (0..=end.saturating_sub(needle.len())).rev() {
            if haystack[index..].starts_with(needle) {
                return index as i64;
            }
        }
    } else {
        for index in start..=haystack.len().saturating_sub(needle.len()) {
            if haystack[index..].starts_with(needle) {
                return index as i64;
            }
        }
    }
    -1
}

fn item_to_json(item: &StackItem) -> VmResult<serde_json::Value> {
    Ok(match item {
        StackItem::Null => serde_json::Value::Null,
        StackItem::Boolean(b) => serde_json::Value::Bool(*b),
        StackItem::Integer(value) => {
            let number = value
                .to_i64()
                .ok_or_else(|| VmError::throw("integer too large for json"))?;
            serde_json::Value::Number(number.into())
        }
        StackItem::ByteString(_) | StackItem::Buffer(_) => {
            serde_json::Value::String(item.as_string()?)
        }
        StackItem::Array(inner) | StackItem::Struct(inner) => {
            let borrowed = inner.borrow();
            let mut values = Vec::with_capacity(borrowed.len());
            for child in borrowed.items() {
                values.push(item_to_json(child)?);
            }
            serde_json::Value::Array(values)
        }
        StackItem::Map(inner) => {
            let borrowed = inner.borrow();
            let mut object = serde_json::Map::new();
            for (key, value) in borrowed.entries() {
                object.insert(key.as_string()?, item_to_json(value)?);
            }
            serde_json::Value::Object(object)
        }
        _ => return Err(VmError::throw("type has no json form")),
    })
}

fn json_to_item(value: &serde_json::Value, rc: &ReferenceCounter) -> VmResult<StackItem> {
    Ok(match value {
        serde_json::Value::Null => StackItem::Null,
        serde_json::Value::Bool(b) => StackItem::Boolean(*b),
        serde_json::Value::Number(number) => {
            let value = number
                .as_i64()
                .ok_or_else(|| VmError::throw("non-integer json number"))?;
            StackItem::from_int(value)
        }
        serde_json::Value::String(text) => StackItem::from_string(text.clone()),
        serde_json::Value::Array(values) => {
            let mut items = Vec::with_capacity(values.len());
            for value in values {
                items.push(json_to_item(value, rc)?);
            }
            StackItem::new_array(rc, items)?
        }
        serde_json::Value::Object(object) => {
            let map = StackItem::new_map(rc);
            if let StackItem::Map(inner) = &map {
                for (key, value) in object {
                    inner
                        .borrow_mut()
                        .set(StackItem::from_string(key.clone()), json_to_item(value, rc)?)?;
                }
            }
            map
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_search_directions() {
        assert_eq!(memory_search(b"hello world", b"o", 0, false), 4);
        assert_eq!(memory_search(b"hello world", b"o", 11, true), 7);
        assert_eq!(memory_search(b"hello", b"x", 0, false), -1);
    }

    #[test]
    fn base58_check_round_trip_manually() {
        let payload = b"payload".to_vec();
        let mut data = payload.clone();
        let checksum = neonova_crypto::hash256(&data);
        data.extend_from_slice(&checksum[..4]);
        let encoded = bs58::encode(&data).into_string();
        let decoded = bs58::decode(&encoded).into_vec().unwrap();
        assert_eq!(&decoded[..payload.len()], payload.as_slice());
    }
}
