//! The [`Serializable`] trait and var-int size helpers.

use crate::{BinaryWriter, IoResult, MemoryReader};

/// Types with a canonical wire encoding.
pub trait Serializable: Sized {
    /// The exact number of bytes `serialize` will produce.
    fn size(&self) -> usize;

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()>;

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self>;

    /// Serializes into a fresh buffer.
    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        self.serialize(&mut writer)
            .expect("in-memory serialization cannot fail");
        writer.into_bytes()
    }

    /// Deserializes from a byte slice, requiring the input to be fully
    /// consumed.
    fn from_bytes(bytes: &[u8]) -> IoResult<Self> {
        let mut reader = MemoryReader::new(bytes);
        let value = Self::deserialize(&mut reader)?;
        if !reader.is_exhausted() {
            return Err(crate::IoError::invalid_data(
                "trailing",
                format!("{} unread bytes", reader.remaining()),
            ));
        }
        Ok(value)
    }
}

/// Number of bytes the var-int encoding of `value` occupies.
pub fn var_size(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Size of a var-bytes field: prefix plus payload.
pub fn var_size_of_bytes(bytes: &[u8]) -> usize {
    var_size(bytes.len() as u64) + bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_size_matches_encoding() {
        use crate::BinaryWriter;
        for v in [0u64, 0xfc, 0xfd, 0xffff, 0x1_0000, u64::MAX] {
            let mut w = BinaryWriter::new();
            w.write_var_int(v);
            assert_eq!(w.len(), var_size(v), "value {v:#x}");
        }
    }
}
