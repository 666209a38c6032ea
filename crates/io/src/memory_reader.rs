//! Bounds-checked reader over an in-memory byte slice.

use crate::{IoError, IoResult};

/// Reads little-endian values from a borrowed byte slice.
///
/// Every read is bounds-checked; running past the end yields
/// [`IoError::EndOfStream`] rather than a panic.
pub struct MemoryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MemoryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// True when every byte of the input has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.pos == self.data.len()
    }

    fn take(&mut self, n: usize, context: &'static str) -> IoResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(IoError::EndOfStream { context });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> IoResult<u8> {
        Ok(self.take(1, "u8")?[0])
    }

    pub fn read_bool(&mut self) -> IoResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(IoError::invalid_data("bool", format!("byte {other:#04x}"))),
        }
    }

    pub fn read_u16(&mut self) -> IoResult<u16> {
        let b = self.take(2, "u16")?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> IoResult<u32> {
        let b = self.take(4, "u32")?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> IoResult<u64> {
        let b = self.take(8, "u64")?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_i32(&mut self) -> IoResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_i64(&mut self) -> IoResult<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// Reads exactly `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> IoResult<Vec<u8>> {
        Ok(self.take(n, "bytes")?.to_vec())
    }

    /// Reads exactly `N` bytes into a fixed array.
    pub fn read_array<const N: usize>(&mut self) -> IoResult<[u8; N]> {
        let slice = self.take(N, "array")?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    /// Reads a var-int, rejecting non-canonical encodings and values above
    /// `max`.
    pub fn read_var_int(&mut self, max: u64) -> IoResult<u64> {
        let first = self.read_u8()?;
        let value = match first {
            0xfd => {
                let v = self.read_u16()? as u64;
                if v < 0xfd {
                    return Err(IoError::invalid_data("var_int", "non-canonical u16 form"));
                }
                v
            }
            0xfe => {
                let v = self.read_u32()? as u64;
                if v <= 0xffff {
                    return Err(IoError::invalid_data("var_int", "non-canonical u32 form"));
                }
                v
            }
            0xff => {
                let v = self.read_u64()?;
                if v <= 0xffff_ffff {
                    return Err(IoError::invalid_data("var_int", "non-canonical u64 form"));
                }
                v
            }
            b => b as u64,
        };
        if value > max {
            return Err(IoError::LengthExceeded {
                context: "var_int",
                length: value,
                limit: max,
            });
        }
        Ok(value)
    }

    /// Reads a var-int length prefix followed by that many bytes.
    pub fn read_var_bytes(&mut self, max: usize) -> IoResult<Vec<u8>> {
        let len = self.read_var_int(max as u64)? as usize;
        self.read_bytes(len)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_var_string(&mut self, max: usize) -> IoResult<String> {
        let bytes = self.read_var_bytes(max)?;
        String::from_utf8(bytes).map_err(|e| IoError::invalid_data("string", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BinaryWriter;

    #[test]
    fn round_trip_var_int() {
        let mut w = BinaryWriter::new();
        for v in [0u64, 1, 0xfc, 0xfd, 0xffff, 0x1_0000, u64::MAX] {
            w.write_var_int(v);
        }
        let bytes = w.into_bytes();
        let mut r = MemoryReader::new(&bytes);
        for v in [0u64, 1, 0xfc, 0xfd, 0xffff, 0x1_0000, u64::MAX] {
            assert_eq!(r.read_var_int(u64::MAX).unwrap(), v);
        }
        assert!(r.is_exhausted());
    }

    #[test]
    fn rejects_non_canonical_var_int() {
        // 0xfd prefix carrying a value that fits in one byte.
        let mut r = MemoryReader::new(&[0xfd, 0x01, 0x00]);
        assert!(r.read_var_int(u64::MAX).is_err());
    }

    #[test]
    fn end_of_stream() {
        let mut r = MemoryReader::new(&[0x01]);
        assert!(r.read_u32().is_err());
    }

    #[test]
    fn var_int_limit_enforced() {
        let mut r = MemoryReader::new(&[0xfd, 0x00, 0x10]);
        assert!(matches!(
            r.read_var_int(0xfff),
            Err(IoError::LengthExceeded { .. })
        ));
    }
}
