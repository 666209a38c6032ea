//! The transaction record and its canonical encoding.

use crate::{Signer, TransactionAttribute, UInt160, UInt256, Witness};
use neonova_config::{
    MAX_TRANSACTION_ATTRIBUTES, MAX_TRANSACTION_SIGNERS, MAX_TRANSACTION_SIZE,
};
use neonova_io::{var_size, var_size_of_bytes, BinaryWriter, IoError, IoResult, MemoryReader, Serializable};

/// Fixed-size portion of the wire encoding: version, nonce, fees and
/// valid-until-block.
pub const TRANSACTION_HEADER_SIZE: usize = 1 + 4 + 8 + 8 + 4;

/// A signed state transition request.
///
/// The hash covers everything except the witnesses, so witnesses can be
/// attached after signing without perturbing identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u8,
    pub nonce: u32,
    /// Gas consumed by script execution, in datoshi.
    pub system_fee: i64,
    /// Gas paying for size and verification, in datoshi.
    pub network_fee: i64,
    pub valid_until_block: u32,
    pub signers: Vec<Signer>,
    pub attributes: Vec<TransactionAttribute>,
    pub script: Vec<u8>,
    pub witnesses: Vec<Witness>,
}

impl Transaction {
    /// The account that pays fees: the first signer.
    pub fn sender(&self) -> UInt160 {
        self.signers.first().map(|s| s.account).unwrap_or_default()
    }

    /// Hash over the unsigned encoding.
    pub fn hash(&self) -> UInt256 {
        UInt256::from_array(neonova_crypto::hash256(&self.unsigned_bytes()))
    }

    /// The data witnesses sign: network magic followed by the tx hash.
    pub fn sign_data(&self, network: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + UInt256::SIZE);
        data.extend_from_slice(&network.to_le_bytes());
        data.extend_from_slice(self.hash().as_bytes());
        data
    }

    /// All attributes of one kind.
    pub fn attributes_of(&self, attr_type: u8) -> impl Iterator<Item = &TransactionAttribute> {
        self.attributes
            .iter()
            .filter(move |a| a.attr_type() == attr_type)
    }

    /// Total fee per byte, the mempool ordering key.
    pub fn fee_per_byte(&self) -> i64 {
        let size = self.size() as i64;
        if size == 0 {
            0
        } else {
            self.network_fee / size
        }
    }

    fn unsigned_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        self.write_unsigned(&mut writer)
            .expect("unsigned encoding cannot fail");
        writer.into_bytes()
    }

    fn write_unsigned(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.version);
        writer.write_u32(self.nonce);
        writer.write_i64(self.system_fee);
        writer.write_i64(self.network_fee);
        writer.write_u32(self.valid_until_block);
        writer.write_var_int(self.signers.len() as u64);
        for signer in &self.signers {
            signer.serialize(writer)?;
        }
        writer.write_var_int(self.attributes.len() as u64);
        for attribute in &self.attributes {
            attribute.serialize(writer)?;
        }
        writer.write_var_bytes(&self.script);
        Ok(())
    }
}

impl Serializable for Transaction {
    fn size(&self) -> usize {
        TRANSACTION_HEADER_SIZE
            + var_size(self.signers.len() as u64)
            + self.signers.iter().map(Serializable::size).sum::<usize>()
            + var_size(self.attributes.len() as u64)
            + self.attributes.iter().map(Serializable::size).sum::<usize>()
            + var_size_of_bytes(&self.script)
            + var_size(self.witnesses.len() as u64)
            + self.witnesses.iter().map(Serializable::size).sum::<usize>()
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.write_unsigned(writer)?;
        writer.write_var_int(self.witnesses.len() as u64);
        for witness in &self.witnesses {
            witness.serialize(writer)?;
        }
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let version = reader.read_u8()?;
        if version != 0 {
            return Err(IoError::invalid_data(
                "transaction version",
                format!("{version}"),
            ));
        }
        let nonce = reader.read_u32()?;
        let system_fee = reader.read_i64()?;
        let network_fee = reader.read_i64()?;
        if system_fee < 0 || network_fee < 0 {
            return Err(IoError::invalid_data("transaction fee", "negative"));
        }
        if system_fee.checked_add(network_fee).is_none() {
            return Err(IoError::invalid_data("transaction fee", "overflow"));
        }
        let valid_until_block = reader.read_u32()?;

        let signer_count = reader.read_var_int(MAX_TRANSACTION_SIGNERS as u64)? as usize;
        if signer_count == 0 {
            return Err(IoError::invalid_data("transaction", "no signers"));
        }
        let mut signers = Vec::with_capacity(signer_count);
        for _ in 0..signer_count {
            let signer = Signer::deserialize(reader)?;
            if signers.iter().any(|s: &Signer| s.account == signer.account) {
                return Err(IoError::invalid_data("transaction", "duplicate signer"));
            }
            signers.push(signer);
        }

        let attr_count = reader.read_var_int(MAX_TRANSACTION_ATTRIBUTES as u64)? as usize;
        let mut attributes = Vec::with_capacity(attr_count);
        for _ in 0..attr_count {
            let attribute = TransactionAttribute::deserialize(reader)?;
            if !attribute.allow_multiple()
                && attributes
                    .iter()
                    .any(|a: &TransactionAttribute| a.attr_type() == attribute.attr_type())
            {
                return Err(IoError::invalid_data(
                    "transaction",
                    "duplicate single-use attribute",
                ));
            }
            attributes.push(attribute);
        }

        let script = reader.read_var_bytes(MAX_TRANSACTION_SIZE)?;
        if script.is_empty() {
            return Err(IoError::invalid_data("transaction", "empty script"));
        }

        let witness_count = reader.read_var_int(MAX_TRANSACTION_SIGNERS as u64)? as usize;
        if witness_count != signer_count {
            return Err(IoError::invalid_data(
                "transaction",
                format!("{witness_count} witnesses for {signer_count} signers"),
            ));
        }
        let mut witnesses = Vec::with_capacity(witness_count);
        for _ in 0..witness_count {
            witnesses.push(Witness::deserialize(reader)?);
        }

        Ok(Transaction {
            version,
            nonce,
            system_fee,
            network_fee,
            valid_until_block,
            signers,
            attributes,
            script,
            witnesses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WitnessScope;

    fn sample_tx() -> Transaction {
        Transaction {
            version: 0,
            nonce: 0x1234_5678,
            system_fee: 9_000_000,
            network_fee: 1_200_000,
            valid_until_block: 42,
            signers: vec![Signer::called_by_entry(UInt160::from_array([7; 20]))],
            attributes: vec![TransactionAttribute::HighPriority],
            script: vec![0x11, 0x12, 0x9e],
            witnesses: vec![Witness::new(vec![0x01], vec![0x02])],
        }
    }

    #[test]
    fn round_trip_preserves_witness_order() {
        let mut tx = sample_tx();
        tx.signers.push(Signer {
            account: UInt160::from_array([8; 20]),
            scopes: WitnessScope::NONE,
            allowed_contracts: vec![],
            allowed_groups: vec![],
            rules: vec![],
        });
        tx.witnesses.push(Witness::new(vec![0x03], vec![0x04]));
        let bytes = tx.to_bytes();
        assert_eq!(bytes.len(), tx.size());
        let decoded = Transaction::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.witnesses[1].invocation_script, vec![0x03]);
    }

    #[test]
    fn hash_excludes_witnesses() {
        let mut tx = sample_tx();
        let before = tx.hash();
        tx.witnesses[0].invocation_script = vec![0xff; 8];
        assert_eq!(tx.hash(), before);
        tx.nonce += 1;
        assert_ne!(tx.hash(), before);
    }

    #[test]
    fn rejects_duplicate_signers() {
        let mut tx = sample_tx();
        tx.signers.push(tx.signers[0].clone());
        tx.witnesses.push(Witness::default());
        assert!(Transaction::from_bytes(&tx.to_bytes()).is_err());
    }

    #[test]
    fn rejects_witness_count_mismatch() {
        let mut tx = sample_tx();
        tx.witnesses.push(Witness::default());
        assert!(Transaction::from_bytes(&tx.to_bytes()).is_err());
    }

    #[test]
    fn sign_data_prefixes_network() {
        let tx = sample_tx();
        let data = tx.sign_data(0x4e454f33);
        assert_eq!(&data[..4], &0x4e454f33u32.to_le_bytes());
        assert_eq!(&data[4..], tx.hash().as_bytes());
    }
}
