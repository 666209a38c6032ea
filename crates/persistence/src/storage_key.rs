//! Contract storage addressing.

use crate::prefix;

/// Addresses one contract storage entry: `(contract id, user key)`.
///
/// The byte form is `0x70 ‖ id:LE32 ‖ key`, which groups a contract's
/// entries into one contiguous, seekable range.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey {
    pub id: i32,
    pub key: Vec<u8>,
}

impl StorageKey {
    pub fn new(id: i32, key: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            key: key.into(),
        }
    }

    pub fn to_store_key(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(5 + self.key.len());
        bytes.push(prefix::ST_STORAGE);
        bytes.extend_from_slice(&self.id.to_le_bytes());
        bytes.extend_from_slice(&self.key);
        bytes
    }

    /// The seek prefix covering every key of a contract.
    pub fn contract_prefix(id: i32) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(5);
        bytes.push(prefix::ST_STORAGE);
        bytes.extend_from_slice(&id.to_le_bytes());
        bytes
    }

    /// Parses a store key back into `(id, key)`.
    pub fn from_store_key(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 5 || bytes[0] != prefix::ST_STORAGE {
            return None;
        }
        let id = i32::from_le_bytes(bytes[1..5].try_into().ok()?);
        Some(Self {
            id,
            key: bytes[5..].to_vec(),
        })
    }
}

/// A stored value; the core imposes no schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageItem(pub Vec<u8>);

impl StorageItem {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self(value.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key = StorageKey::new(-5, vec![0xaa, 0xbb]);
        let bytes = key.to_store_key();
        assert_eq!(bytes[0], prefix::ST_STORAGE);
        assert_eq!(StorageKey::from_store_key(&bytes).unwrap(), key);
    }

    #[test]
    fn contract_prefix_covers_keys() {
        let key = StorageKey::new(3, vec![1, 2]);
        assert!(key
            .to_store_key()
            .starts_with(&StorageKey::contract_prefix(3)));
    }
}
