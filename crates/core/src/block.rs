//! Block and header records.

use crate::{merkle_root, Transaction, UInt160, UInt256, Witness};
use neonova_io::{var_size, BinaryWriter, IoError, IoResult, MemoryReader, Serializable};

/// Block header. When the network runs with `StateRootInHeader`, the
/// previous block's state root is appended to the signed portion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub prev_hash: UInt256,
    pub merkle_root: UInt256,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub nonce: u64,
    pub index: u32,
    pub primary_index: u8,
    pub next_consensus: UInt160,
    pub witness: Witness,
    /// Present iff the protocol runs with `StateRootInHeader`.
    pub prev_state_root: Option<UInt256>,
}

impl Header {
    pub fn hash(&self) -> UInt256 {
        UInt256::from_array(neonova_crypto::hash256(&self.unsigned_bytes()))
    }

    /// The data the consensus witness signs.
    pub fn sign_data(&self, network: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + UInt256::SIZE);
        data.extend_from_slice(&network.to_le_bytes());
        data.extend_from_slice(self.hash().as_bytes());
        data
    }

    fn unsigned_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        self.write_unsigned(&mut writer);
        writer.into_bytes()
    }

    fn write_unsigned(&self, writer: &mut BinaryWriter) {
        writer.write_u32(self.version);
        writer.write_bytes(self.prev_hash.as_bytes());
        writer.write_bytes(self.merkle_root.as_bytes());
        writer.write_u64(self.timestamp);
        writer.write_u64(self.nonce);
        writer.write_u32(self.index);
        writer.write_u8(self.primary_index);
        writer.write_bytes(self.next_consensus.as_bytes());
        if let Some(root) = &self.prev_state_root {
            writer.write_bytes(root.as_bytes());
        }
    }

    fn serialize_with_witness(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.write_unsigned(writer);
        writer.write_u8(1); // witness count, fixed at one
        self.witness.serialize(writer)
    }

    fn deserialize_inner(
        reader: &mut MemoryReader<'_>,
        state_root_in_header: bool,
    ) -> IoResult<Self> {
        let version = reader.read_u32()?;
        if version != 0 {
            return Err(IoError::invalid_data("header version", format!("{version}")));
        }
        let prev_hash = UInt256::deserialize(reader)?;
        let merkle_root = UInt256::deserialize(reader)?;
        let timestamp = reader.read_u64()?;
        let nonce = reader.read_u64()?;
        let index = reader.read_u32()?;
        let primary_index = reader.read_u8()?;
        let next_consensus = UInt160::deserialize(reader)?;
        let prev_state_root = if state_root_in_header {
            Some(UInt256::deserialize(reader)?)
        } else {
            None
        };
        let witness_count = reader.read_u8()?;
        if witness_count != 1 {
            return Err(IoError::invalid_data(
                "header",
                format!("witness count {witness_count}"),
            ));
        }
        let witness = Witness::deserialize(reader)?;
        Ok(Header {
            version,
            prev_hash,
            merkle_root,
            timestamp,
            nonce,
            index,
            primary_index,
            next_consensus,
            witness,
            prev_state_root,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        self.serialize_with_witness(&mut writer)
            .expect("header encoding cannot fail");
        writer.into_bytes()
    }

    pub fn from_bytes(bytes: &[u8], state_root_in_header: bool) -> IoResult<Self> {
        let mut reader = MemoryReader::new(bytes);
        let header = Self::deserialize_inner(&mut reader, state_root_in_header)?;
        if !reader.is_exhausted() {
            return Err(IoError::invalid_data("header", "trailing bytes"));
        }
        Ok(header)
    }
}

/// A header plus its transactions, in manifest order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> UInt256 {
        self.header.hash()
    }

    pub fn index(&self) -> u32 {
        self.header.index
    }

    /// Recomputes the merkle root from the carried transactions.
    pub fn computed_merkle_root(&self) -> UInt256 {
        let hashes: Vec<UInt256> = self.transactions.iter().map(Transaction::hash).collect();
        merkle_root(&hashes)
    }

    pub fn size(&self) -> usize {
        self.to_bytes_internal().len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_bytes_internal()
    }

    fn to_bytes_internal(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        self.header
            .serialize_with_witness(&mut writer)
            .expect("block encoding cannot fail");
        writer.write_var_int(self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.serialize(&mut writer).expect("block encoding cannot fail");
        }
        writer.into_bytes()
    }

    pub fn from_bytes(
        bytes: &[u8],
        state_root_in_header: bool,
        max_transactions: usize,
    ) -> IoResult<Self> {
        let mut reader = MemoryReader::new(bytes);
        let header = Header::deserialize_inner(&mut reader, state_root_in_header)?;
        let count = reader.read_var_int(max_transactions as u64)? as usize;
        let mut transactions = Vec::with_capacity(count);
        for _ in 0..count {
            transactions.push(Transaction::deserialize(&mut reader)?);
        }
        if !reader.is_exhausted() {
            return Err(IoError::invalid_data("block", "trailing bytes"));
        }
        let block = Block {
            header,
            transactions,
        };
        if block.computed_merkle_root() != block.header.merkle_root {
            return Err(IoError::invalid_data("block", "merkle root mismatch"));
        }
        Ok(block)
    }

    /// Var-int-prefixed size accounting used by fee checks.
    pub fn wire_size(&self) -> usize {
        self.header.to_bytes().len()
            + var_size(self.transactions.len() as u64)
            + self
                .transactions
                .iter()
                .map(Serializable::size)
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Signer;

    fn sample_block(state_root: Option<UInt256>) -> Block {
        let tx = Transaction {
            version: 0,
            nonce: 1,
            system_fee: 0,
            network_fee: 0,
            valid_until_block: 10,
            signers: vec![Signer::called_by_entry(UInt160::from_array([1; 20]))],
            attributes: vec![],
            script: vec![0x11],
            witnesses: vec![Witness::default()],
        };
        let mut header = Header {
            version: 0,
            prev_hash: UInt256::from_array([9; 32]),
            merkle_root: UInt256::zero(),
            timestamp: 1_700_000_000_000,
            nonce: 42,
            index: 1,
            primary_index: 0,
            next_consensus: UInt160::from_array([2; 20]),
            witness: Witness::new(vec![0x01], vec![0x51]),
            prev_state_root: state_root,
        };
        let block = Block {
            header: header.clone(),
            transactions: vec![tx],
        };
        header.merkle_root = block.computed_merkle_root();
        Block {
            header,
            transactions: block.transactions,
        }
    }

    #[test]
    fn round_trip_without_state_root() {
        let block = sample_block(None);
        let decoded = Block::from_bytes(&block.to_bytes(), false, 512).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn round_trip_with_state_root() {
        let block = sample_block(Some(UInt256::from_array([7; 32])));
        let decoded = Block::from_bytes(&block.to_bytes(), true, 512).unwrap();
        assert_eq!(decoded, block);
        assert_ne!(decoded.hash(), sample_block(None).hash());
    }

    #[test]
    fn merkle_mismatch_rejected() {
        let mut block = sample_block(None);
        block.header.merkle_root = UInt256::from_array([0xaa; 32]);
        assert!(Block::from_bytes(&block.to_bytes(), false, 512).is_err());
    }
}
