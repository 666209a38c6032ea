//! Deployed contract state: NEF executable plus manifest.

use crate::manifest::ContractManifest;
use crate::{ContractError, ContractResult};
use neonova_config::MAX_SCRIPT_LENGTH;
use neonova_core::UInt160;
use neonova_io::{
    var_size, var_size_of_bytes, BinaryWriter, IoError, IoResult, MemoryReader, Serializable,
};

/// `NEF3` little-endian.
const NEF_MAGIC: u32 = 0x3346_454e;
const MAX_TOKENS: usize = 128;

/// A static call-token of a NEF file, resolved by CALLT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodToken {
    pub hash: UInt160,
    pub method: String,
    pub parameters_count: u16,
    pub has_return_value: bool,
    pub call_flags: u8,
}

impl Serializable for MethodToken {
    fn size(&self) -> usize {
        UInt160::SIZE + var_size_of_bytes(self.method.as_bytes()) + 2 + 1 + 1
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.hash.serialize(writer)?;
        writer.write_var_string(&self.method, 32)?;
        writer.write_u16(self.parameters_count);
        writer.write_bool(self.has_return_value);
        writer.write_u8(self.call_flags);
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let hash = UInt160::deserialize(reader)?;
        let method = reader.read_var_string(32)?;
        if method.starts_with('_') {
            return Err(IoError::invalid_data("method token", "reserved method name"));
        }
        Ok(Self {
            hash,
            method,
            parameters_count: reader.read_u16()?,
            has_return_value: reader.read_bool()?,
            call_flags: reader.read_u8()?,
        })
    }
}

/// The executable container: compiler tag, call tokens, script, checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NefFile {
    pub compiler: String,
    pub source: String,
    pub tokens: Vec<MethodToken>,
    pub script: Vec<u8>,
    pub checksum: u32,
}

impl NefFile {
    /// Builds a NEF around a script, computing the checksum.
    pub fn new(compiler: impl Into<String>, script: Vec<u8>) -> Self {
        let mut nef = Self {
            compiler: compiler.into(),
            source: String::new(),
            tokens: Vec::new(),
            script,
            checksum: 0,
        };
        nef.checksum = nef.compute_checksum();
        nef
    }

    /// First four bytes of the double-SHA256 of the header-and-body bytes.
    pub fn compute_checksum(&self) -> u32 {
        let bytes = self.to_bytes();
        // Checksum field occupies the trailing four bytes.
        let digest = neonova_crypto::hash256(&bytes[..bytes.len() - 4]);
        u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
    }

    pub fn validate(&self) -> ContractResult<()> {
        if self.script.is_empty() {
            return Err(ContractError::InvalidNef("empty script".into()));
        }
        if self.checksum != self.compute_checksum() {
            return Err(ContractError::InvalidNef("checksum mismatch".into()));
        }
        Ok(())
    }
}

impl Serializable for NefFile {
    fn size(&self) -> usize {
        let compiler_field = 64; // fixed-width, zero-padded
        4 + compiler_field
            + var_size_of_bytes(self.source.as_bytes())
            + 1
            + var_size(self.tokens.len() as u64)
            + self.tokens.iter().map(Serializable::size).sum::<usize>()
            + 2
            + var_size_of_bytes(&self.script)
            + 4
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u32(NEF_MAGIC);
        let mut compiler = self.compiler.clone().into_bytes();
        if compiler.len() > 64 {
            return Err(IoError::invalid_data("nef compiler", "name too long"));
        }
        compiler.resize(64, 0);
        writer.write_bytes(&compiler);
        writer.write_var_bytes(self.source.as_bytes());
        writer.write_u8(0); // reserved
        writer.write_var_int(self.tokens.len() as u64);
        for token in &self.tokens {
            token.serialize(writer)?;
        }
        writer.write_u16(0); // reserved
        writer.write_var_bytes(&self.script);
        writer.write_u32(self.checksum);
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        if reader.read_u32()? != NEF_MAGIC {
            return Err(IoError::invalid_data("nef", "bad magic"));
        }
        let compiler_raw = reader.read_bytes(64)?;
        let compiler = String::from_utf8(
            compiler_raw.iter().copied().take_while(|b| *b != 0).collect(),
        )
        .map_err(|e| IoError::invalid_data("nef compiler", e.to_string()))?;
        let source = reader.read_var_string(256)?;
        if reader.read_u8()? != 0 {
            return Err(IoError::invalid_data("nef", "reserved byte set"));
        }
        let token_count = reader.read_var_int(MAX_TOKENS as u64)? as usize;
        let mut tokens = Vec::with_capacity(token_count);
        for _ in 0..token_count {
            tokens.push(MethodToken::deserialize(reader)?);
        }
        if reader.read_u16()? != 0 {
            return Err(IoError::invalid_data("nef", "reserved word set"));
        }
        let script = reader.read_var_bytes(MAX_SCRIPT_LENGTH)?;
        if script.is_empty() {
            return Err(IoError::invalid_data("nef", "empty script"));
        }
        let checksum = reader.read_u32()?;
        Ok(Self {
            compiler,
            source,
            tokens,
            script,
            checksum,
        })
    }
}

/// A deployed contract as persisted by Management.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractState {
    /// Sequential id; negative ids are reserved for natives.
    pub id: i32,
    pub update_counter: u16,
    pub hash: UInt160,
    pub nef: NefFile,
    pub manifest: ContractManifest,
}

impl ContractState {
    pub fn to_stored_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        writer.write_i32(self.id);
        writer.write_u16(self.update_counter);
        self.hash.serialize(&mut writer).expect("fixed width");
        let nef = self.nef.to_bytes();
        writer.write_var_bytes(&nef);
        let manifest = self.manifest.to_json_bytes();
        writer.write_var_bytes(&manifest);
        writer.into_bytes()
    }

    pub fn from_stored_bytes(bytes: &[u8]) -> ContractResult<Self> {
        let mut reader = MemoryReader::new(bytes);
        let id = reader.read_i32()?;
        let update_counter = reader.read_u16()?;
        let hash = UInt160::deserialize(&mut reader)?;
        let nef_bytes = reader.read_var_bytes(MAX_SCRIPT_LENGTH * 2)?;
        let nef = NefFile::from_bytes(&nef_bytes)?;
        let manifest_bytes = reader.read_var_bytes(u16::MAX as usize)?;
        let manifest = ContractManifest::from_json_bytes(&manifest_bytes)?;
        Ok(Self {
            id,
            update_counter,
            hash,
            nef,
            manifest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nef_round_trip_and_checksum() {
        let nef = NefFile::new("neonova-test", vec![0x11, 0x40]);
        nef.validate().unwrap();
        let decoded = NefFile::from_bytes(&nef.to_bytes()).unwrap();
        assert_eq!(decoded, nef);
        let mut tampered = nef.clone();
        tampered.script = vec![0x12, 0x40];
        assert!(tampered.validate().is_err());
    }

    #[test]
    fn method_token_rejects_reserved_names() {
        let token = MethodToken {
            hash: UInt160::zero(),
            method: "_deploy".into(),
            parameters_count: 0,
            has_return_value: false,
            call_flags: 0,
        };
        assert!(MethodToken::from_bytes(&token.to_bytes()).is_err());
    }

    #[test]
    fn contract_state_round_trip() {
        let state = ContractState {
            id: 7,
            update_counter: 2,
            hash: UInt160::from_array([3; 20]),
            nef: NefFile::new("compiler", vec![0x40]),
            manifest: ContractManifest::minimal("Example"),
        };
        let decoded = ContractState::from_stored_bytes(&state.to_stored_bytes()).unwrap();
        assert_eq!(decoded.id, state.id);
        assert_eq!(decoded.hash, state.hash);
        assert_eq!(decoded.manifest.name, "Example");
    }
}
