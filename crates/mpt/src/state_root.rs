//! The per-block state root record.

use neonova_core::UInt256;
use neonova_io::{BinaryWriter, IoResult, MemoryReader, Serializable};

/// Commitment to the storage state as of one block height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRoot {
    pub version: u8,
    pub index: u32,
    pub root: UInt256,
}

impl StateRoot {
    pub const CURRENT_VERSION: u8 = 0;

    pub fn new(index: u32, root: UInt256) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            index,
            root,
        }
    }
}

impl Serializable for StateRoot {
    fn size(&self) -> usize {
        1 + 4 + UInt256::SIZE
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.version);
        writer.write_u32(self.index);
        self.root.serialize(writer)
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            version: reader.read_u8()?,
            index: reader.read_u32()?,
            root: UInt256::deserialize(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let record = StateRoot::new(42, UInt256::from_array([9; 32]));
        assert_eq!(
            StateRoot::from_bytes(&record.to_bytes()).unwrap(),
            record
        );
    }
}
