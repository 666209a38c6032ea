//! Witness: the invocation/verification script pair gating a signer.

use crate::UInt160;
use neonova_config::{MAX_INVOCATION_SCRIPT, MAX_VERIFICATION_SCRIPT};
use neonova_io::{var_size_of_bytes, BinaryWriter, IoResult, MemoryReader, Serializable};

/// A signer's proof: the invocation script pushes arguments (typically
/// signatures), the verification script consumes them and must leave a single
/// truthy item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Witness {
    pub invocation_script: Vec<u8>,
    pub verification_script: Vec<u8>,
}

impl Witness {
    pub fn new(invocation_script: Vec<u8>, verification_script: Vec<u8>) -> Self {
        Self {
            invocation_script,
            verification_script,
        }
    }

    /// Hash of the verification script; must equal the signer's account.
    /// Empty verification scripts identify contract signers and have no
    /// intrinsic hash.
    pub fn script_hash(&self) -> UInt160 {
        UInt160::from_array(neonova_crypto::hash160(&self.verification_script))
    }

    /// Whether this witness defers to a deployed contract's `verify` method.
    pub fn is_contract_witness(&self) -> bool {
        self.verification_script.is_empty()
    }
}

impl Serializable for Witness {
    fn size(&self) -> usize {
        var_size_of_bytes(&self.invocation_script) + var_size_of_bytes(&self.verification_script)
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_var_bytes(&self.invocation_script);
        writer.write_var_bytes(&self.verification_script);
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        Ok(Self {
            invocation_script: reader.read_var_bytes(MAX_INVOCATION_SCRIPT)?,
            verification_script: reader.read_var_bytes(MAX_VERIFICATION_SCRIPT)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let witness = Witness::new(vec![0x0c, 0x40], vec![0x41, 0x56, 0xe7, 0xb3, 0x27]);
        let bytes = witness.to_bytes();
        assert_eq!(bytes.len(), witness.size());
        assert_eq!(Witness::from_bytes(&bytes).unwrap(), witness);
    }

    #[test]
    fn oversized_scripts_rejected() {
        let mut writer = BinaryWriter::new();
        writer.write_var_bytes(&vec![0u8; MAX_INVOCATION_SCRIPT + 1]);
        writer.write_var_bytes(&[]);
        let bytes = writer.into_bytes();
        assert!(Witness::from_bytes(&bytes).is_err());
    }

    #[test]
    fn contract_witness_detection() {
        assert!(Witness::new(vec![1], vec![]).is_contract_witness());
        assert!(!Witness::new(vec![], vec![1]).is_contract_witness());
    }
}
