//! 160-bit hash, the address and script-hash type.

use crate::CoreError;
use neonova_io::{BinaryWriter, IoResult, MemoryReader, Serializable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 160-bit little-endian hash.
///
/// Displayed big-endian with a `0x` prefix, as the ecosystem expects.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UInt160([u8; 20]);

impl UInt160 {
    pub const SIZE: usize = 20;

    pub const fn zero() -> Self {
        Self([0u8; 20])
    }

    pub const fn from_array(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| CoreError::format("UInt160", format!("{} bytes", bytes.len())))?;
        Ok(Self(arr))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl Ord for UInt160 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Numeric order over the little-endian representation.
        self.0.iter().rev().cmp(other.0.iter().rev())
    }
}

impl PartialOrd for UInt160 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for UInt160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "0x{}", hex::encode(reversed))
    }
}

impl fmt::Debug for UInt160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for UInt160 {
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

impl TryFrom<String> for UInt160 {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UInt160> for String {
    fn from(value: UInt160) -> Self {
        value.to_string()
    }
}

impl Serializable for UInt160 {
    fn size(&self) -> usize {
        Self::SIZE
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_bytes(&self.0);
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self(reader.read_array::<20>()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_reverses_bytes() {
        let mut bytes = [0u8; 20];
        bytes[0] = 0x01;
        bytes[19] = 0xff;
        let value = UInt160::from_array(bytes);
        assert_eq!(
            value.to_string(),
            "0xff0000000000000000000000000000000000000001"
        );
        assert_eq!(value.to_string().parse::<UInt160>().unwrap(), value);
    }

    #[test]
    fn ordering_is_numeric() {
        let mut low = [0u8; 20];
        low[0] = 0xff; // least significant byte
        let mut high = [0u8; 20];
        high[19] = 0x01; // most significant byte
        assert!(UInt160::from_array(low) < UInt160::from_array(high));
    }

    #[test]
    fn serializable_round_trip() {
        let value = UInt160::from_array([0xab; 20]);
        assert_eq!(UInt160::from_bytes(&value.to_bytes()).unwrap(), value);
    }
}
