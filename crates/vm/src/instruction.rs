//! Instruction decoding.

use crate::op_code::{OpCode, OperandSize};
use crate::{VmError, VmResult};

/// One decoded instruction: opcode plus its immediate operand bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub pointer: usize,
    pub opcode: OpCode,
    pub operand: Vec<u8>,
    /// Extra bytes occupied by a PUSHDATA length prefix.
    prefix_size: usize,
}

impl Instruction {
    /// Decodes the instruction starting at `position`.
    pub fn decode(script: &[u8], position: usize) -> VmResult<Self> {
        let byte = *script
            .get(position)
            .ok_or_else(|| VmError::InvalidScript("instruction pointer out of range".into()))?;
        let opcode = OpCode::from_byte(byte).ok_or(VmError::InvalidOpcode {
            opcode: byte,
            position,
        })?;

        let operand_start = position + 1;
        let (operand, prefix_size) = match opcode.operand_size() {
            OperandSize::None => (Vec::new(), 0),
            OperandSize::Fixed(n) => {
                let end = operand_start + n;
                if end > script.len() {
                    return Err(VmError::InvalidScript(format!(
                        "{opcode:?} operand truncated at {position}"
                    )));
                }
                (script[operand_start..end].to_vec(), 0)
            }
            OperandSize::Prefix(width) => {
                let prefix_end = operand_start + width;
                if prefix_end > script.len() {
                    return Err(VmError::InvalidScript(format!(
                        "{opcode:?} length prefix truncated at {position}"
                    )));
                }
                let mut len = 0usize;
                for (i, b) in script[operand_start..prefix_end].iter().enumerate() {
                    len |= (*b as usize) << (8 * i);
                }
                let end = prefix_end + len;
                if end > script.len() {
                    return Err(VmError::InvalidScript(format!(
                        "{opcode:?} data truncated at {position}"
                    )));
                }
                (script[prefix_end..end].to_vec(), width)
            }
        };

        Ok(Instruction {
            pointer: position,
            opcode,
            operand,
            prefix_size,
        })
    }

    /// Total encoded length, including opcode and any prefix.
    pub fn size(&self) -> usize {
        1 + self.prefix_size + self.operand.len()
    }

    pub fn operand_as_i8(&self) -> i8 {
        self.operand[0] as i8
    }

    pub fn operand_as_u8(&self) -> u8 {
        self.operand[0]
    }

    pub fn operand_as_i32(&self) -> i32 {
        i32::from_le_bytes(self.operand[..4].try_into().expect("4-byte operand"))
    }

    pub fn operand_as_u16(&self) -> u16 {
        u16::from_le_bytes(self.operand[..2].try_into().expect("2-byte operand"))
    }

    pub fn operand_as_u32(&self) -> u32 {
        u32::from_le_bytes(self.operand[..4].try_into().expect("4-byte operand"))
    }

    /// First and second signed byte of a two-byte operand (TRY).
    pub fn operand_as_i8_pair(&self) -> (i8, i8) {
        (self.operand[0] as i8, self.operand[1] as i8)
    }

    /// First and second signed word of an eight-byte operand (TRY_L).
    pub fn operand_as_i32_pair(&self) -> (i32, i32) {
        (
            i32::from_le_bytes(self.operand[..4].try_into().expect("8-byte operand")),
            i32::from_le_bytes(self.operand[4..8].try_into().expect("8-byte operand")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_pushdata() {
        let script = [0x0c, 0x03, 0xaa, 0xbb, 0xcc, 0x40];
        let instr = Instruction::decode(&script, 0).unwrap();
        assert_eq!(instr.opcode, OpCode::PUSHDATA1);
        assert_eq!(instr.operand, vec![0xaa, 0xbb, 0xcc]);
        assert_eq!(instr.size(), 5);
        let ret = Instruction::decode(&script, 5).unwrap();
        assert_eq!(ret.opcode, OpCode::RET);
        assert_eq!(ret.size(), 1);
    }

    #[test]
    fn rejects_truncated_operand() {
        assert!(Instruction::decode(&[0x02, 0x01], 0).is_err()); // PUSHINT32 needs 4
        assert!(Instruction::decode(&[0x0c, 0x05, 0x01], 0).is_err());
    }

    #[test]
    fn rejects_unassigned_opcode() {
        assert!(matches!(
            Instruction::decode(&[0x42], 0),
            Err(VmError::InvalidOpcode { opcode: 0x42, .. })
        ));
    }

    #[test]
    fn try_operand_pairs() {
        let script = [0x3b, 0x05, 0xfb];
        let instr = Instruction::decode(&script, 0).unwrap();
        assert_eq!(instr.operand_as_i8_pair(), (5, -5));
    }
}
