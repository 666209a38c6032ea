//! Immutable script wrapper with a lazy instruction index.

use crate::{Instruction, VmError, VmResult};
use neonova_core::UInt160;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// An immutable byte script shared between call frames.
///
/// Decoded instructions are cached by offset on first touch, so the hot path
/// re-executing a loop decodes each instruction once.
#[derive(Debug, Clone)]
pub struct Script {
    bytes: Rc<Vec<u8>>,
    cache: Rc<RefCell<HashMap<usize, Rc<Instruction>>>>,
}

impl Script {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Rc::new(bytes),
            cache: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The script identity: RIPEMD160(SHA256(bytes)).
    pub fn hash(&self) -> UInt160 {
        UInt160::from_array(neonova_crypto::hash160(&self.bytes))
    }

    /// Two scripts are the same iff they share storage.
    pub fn ptr_eq(&self, other: &Script) -> bool {
        Rc::ptr_eq(&self.bytes, &other.bytes)
    }

    /// Decodes (or retrieves from cache) the instruction at `position`.
    pub fn instruction_at(&self, position: usize) -> VmResult<Rc<Instruction>> {
        if let Some(cached) = self.cache.borrow().get(&position) {
            return Ok(cached.clone());
        }
        let instruction = Rc::new(Instruction::decode(&self.bytes, position)?);
        self.cache
            .borrow_mut()
            .insert(position, instruction.clone());
        Ok(instruction)
    }

    /// Validates that a jump target lies within the script.
    pub fn check_jump(&self, target: isize) -> VmResult<usize> {
        if target < 0 || target as usize > self.bytes.len() {
            return Err(VmError::InvalidScript(format!(
                "jump target {target} outside script of length {}",
                self.bytes.len()
            )));
        }
        Ok(target as usize)
    }

    /// Walks the whole script, verifying every instruction decodes. Used by
    /// transaction verification to reject malformed scripts up front.
    pub fn validate(&self) -> VmResult<()> {
        let mut position = 0;
        while position < self.bytes.len() {
            let instruction = self.instruction_at(position)?;
            position += instruction.size();
        }
        Ok(())
    }
}

impl From<Vec<u8>> for Script {
    fn from(bytes: Vec<u8>) -> Self {
        Script::new(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OpCode;

    #[test]
    fn caches_decoded_instructions() {
        let script = Script::new(vec![0x11, 0x12, 0x9e]); // PUSH1 PUSH2 ADD
        let a = script.instruction_at(0).unwrap();
        let b = script.instruction_at(0).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(script.instruction_at(2).unwrap().opcode, OpCode::ADD);
    }

    #[test]
    fn validate_rejects_truncation() {
        // PUSHDATA1 claiming 9 bytes with 1 present.
        let script = Script::new(vec![0x0c, 0x09, 0x01]);
        assert!(script.validate().is_err());
        assert!(Script::new(vec![0x11, 0x40]).validate().is_ok());
    }

    #[test]
    fn jump_bounds() {
        let script = Script::new(vec![0x11, 0x40]);
        assert!(script.check_jump(-1).is_err());
        assert!(script.check_jump(3).is_err());
        assert_eq!(script.check_jump(2).unwrap(), 2);
    }

    #[test]
    fn hash_matches_manual() {
        let bytes = vec![0x11, 0x40];
        let script = Script::new(bytes.clone());
        assert_eq!(
            script.hash(),
            UInt160::from_array(neonova_crypto::hash160(&bytes))
        );
    }
}
