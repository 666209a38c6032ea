//! 256-bit hash, the block/transaction/state-root identifier type.

use crate::CoreError;
use neonova_io::{BinaryWriter, IoResult, MemoryReader, Serializable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 256-bit little-endian hash, displayed big-endian with a `0x` prefix.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UInt256([u8; 32]);

impl UInt256 {
    pub const SIZE: usize = 32;

    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    pub const fn from_array(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::format("UInt256", format!("{} bytes", bytes.len())))?;
        Ok(Self(arr))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl Ord for UInt256 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.iter().rev().cmp(other.0.iter().rev())
    }
}

impl PartialOrd for UInt256 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for UInt256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "0x{}", hex::encode(reversed))
    }
}

impl fmt::Debug for UInt256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for UInt256 {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes =
            hex::decode(trimmed).map_err(|e| CoreError::InvalidHash(e.to_string()))?;
        if bytes.len() != Self::SIZE {
            return Err(CoreError::InvalidHash(format!("{} hex bytes", bytes.len())));
        }
        bytes.reverse();
        Self::from_slice(&bytes)
    }
}

impl TryFrom<String> for UInt256 {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UInt256> for String {
    fn from(value: UInt256) -> Self {
        value.to_string()
    }
}

impl Serializable for UInt256 {
    fn size(&self) -> usize {
        Self::SIZE
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_bytes(&self.0);
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self(reader.read_array::<32>()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        let value = UInt256::from_array([0x42; 32]);
        assert_eq!(value.to_string().parse::<UInt256>().unwrap(), value);
    }

    #[test]
    fn rejects_bad_lengths() {
        assert!("0x1234".parse::<UInt256>().is_err());
        assert!(UInt256::from_slice(&[0u8; 31]).is_err());
    }
}
