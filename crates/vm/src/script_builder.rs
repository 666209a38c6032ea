//! Programmatic script construction with minimal encodings.

use crate::op_code::OpCode;
use crate::script::Script;
use crate::stack_item::bigint_to_bytes;
use num_bigint::BigInt;

/// Interop identifier of a syscall name: the first four bytes of its
/// SHA-256, read little-endian.
pub fn syscall_id(name: &str) -> u32 {
    let digest = neonova_crypto::sha256(name.as_bytes());
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Emits bytecode, always choosing the shortest encoding for pushes.
#[derive(Default)]
pub struct ScriptBuilder {
    bytes: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn emit(&mut self, opcode: OpCode) -> &mut Self {
        self.bytes.push(opcode as u8);
        self
    }

    pub fn emit_with(&mut self, opcode: OpCode, operand: &[u8]) -> &mut Self {
        self.bytes.push(opcode as u8);
        self.bytes.extend_from_slice(operand);
        self
    }

    pub fn emit_syscall(&mut self, id: u32) -> &mut Self {
        self.emit_with(OpCode::SYSCALL, &id.to_le_bytes())
    }

    pub fn emit_syscall_named(&mut self, name: &str) -> &mut Self {
        self.emit_syscall(syscall_id(name))
    }

    pub fn push_bool(&mut self, value: bool) -> &mut Self {
        self.emit(if value { OpCode::PUSHT } else { OpCode::PUSHF })
    }

    pub fn push_null(&mut self) -> &mut Self {
        self.emit(OpCode::PUSHNULL)
    }

    pub fn push_int(&mut self, value: impl Into<BigInt>) -> &mut Self {
        let value: BigInt = value.into();
        if let Ok(small) = i8::try_from(&value) {
            if (-1..=16).contains(&(small as i16)) {
                let opcode = if small == -1 {
                    OpCode::PUSHM1 as u8
                } else {
                    OpCode::PUSH0 as u8 + small as u8
                };
                self.bytes.push(opcode);
                return self;
            }
        }
        let bytes = bigint_to_bytes(&value);
        let (opcode, width) = match bytes.len() {
            0..=1 => (OpCode::PUSHINT8, 1),
            2 => (OpCode::PUSHINT16, 2),
            3..=4 => (OpCode::PUSHINT32, 4),
            5..=8 => (OpCode::PUSHINT64, 8),
            9..=16 => (OpCode::PUSHINT128, 16),
            _ => (OpCode::PUSHINT256, 32),
        };
        let mut operand = bytes;
        let fill = if value.sign() == num_bigint::Sign::Minus {
            0xff
        } else {
            0x00
        };
        operand.resize(width, fill);
        self.emit_with(opcode, &operand)
    }

    pub fn push_bytes(&mut self, data: &[u8]) -> &mut Self {
        if data.len() <= u8::MAX as usize {
            self.bytes.push(OpCode::PUSHDATA1 as u8);
            self.bytes.push(data.len() as u8);
        } else if data.len() <= u16::MAX as usize {
            self.bytes.push(OpCode::PUSHDATA2 as u8);
            self.bytes.extend_from_slice(&(data.len() as u16).to_le_bytes());
        } else {
            self.bytes.push(OpCode::PUSHDATA4 as u8);
            self.bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        }
        self.bytes.extend_from_slice(data);
        self
    }

    pub fn push_string(&mut self, value: &str) -> &mut Self {
        self.push_bytes(value.as_bytes())
    }

    /// Emits a `System.Contract.Call` invocation with no arguments beyond
    /// the packed `args` pushes the caller already emitted. The caller is
    /// expected to have packed the argument array on the stack first.
    pub fn emit_contract_call(
        &mut self,
        hash: &neonova_core::UInt160,
        method: &str,
        call_flags: u8,
    ) -> &mut Self {
        self.push_int(call_flags as i64);
        self.push_string(method);
        self.push_bytes(hash.as_bytes());
        self.emit_syscall_named("System.Contract.Call")
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn into_script(self) -> Script {
        Script::new(self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_ints_use_single_byte() {
        let mut b = ScriptBuilder::new();
        b.push_int(-1).push_int(0).push_int(16);
        assert_eq!(b.to_bytes(), vec![0x0f, 0x10, 0x20]);
    }

    #[test]
    fn wider_ints_pick_minimal_width() {
        let mut b = ScriptBuilder::new();
        b.push_int(200);
        assert_eq!(b.to_bytes()[0], OpCode::PUSHINT16 as u8);
        let mut b = ScriptBuilder::new();
        b.push_int(-2i64);
        assert_eq!(b.to_bytes(), vec![0x00, 0xfe]);
        let mut b = ScriptBuilder::new();
        b.push_int(1i64 << 40);
        assert_eq!(b.to_bytes()[0], OpCode::PUSHINT64 as u8);
    }

    #[test]
    fn negative_sign_extension() {
        let mut b = ScriptBuilder::new();
        b.push_int(-300);
        let bytes = b.to_bytes();
        assert_eq!(bytes[0], OpCode::PUSHINT16 as u8);
        assert_eq!(i16::from_le_bytes([bytes[1], bytes[2]]), -300);
    }

    #[test]
    fn pushdata_prefix_selection() {
        let mut b = ScriptBuilder::new();
        b.push_bytes(&[0xaa; 3]);
        assert_eq!(&b.to_bytes()[..2], &[0x0c, 3]);
        let mut b = ScriptBuilder::new();
        b.push_bytes(&vec![0u8; 300]);
        assert_eq!(b.to_bytes()[0], OpCode::PUSHDATA2 as u8);
    }

    #[test]
    fn syscall_id_is_sha_prefix() {
        let id = syscall_id("System.Runtime.Platform");
        let digest = neonova_crypto::sha256(b"System.Runtime.Platform");
        assert_eq!(id.to_le_bytes(), digest[..4]);
    }
}
