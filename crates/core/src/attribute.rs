//! Transaction attributes.

use crate::UInt256;
use neonova_config::MAX_ORACLE_RESULT_SIZE;
use neonova_io::{var_size, var_size_of_bytes, BinaryWriter, IoError, IoResult, MemoryReader, Serializable};

/// Outcome of an oracle request, carried inside an `OracleResponse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OracleResponseCode {
    Success = 0x00,
    ProtocolNotSupported = 0x10,
    ConsensusUnreachable = 0x12,
    NotFound = 0x14,
    Timeout = 0x16,
    Forbidden = 0x18,
    ResponseTooLarge = 0x1a,
    InsufficientFunds = 0x1c,
    ContentTypeNotSupported = 0x1f,
    Error = 0xff,
}

impl TryFrom<u8> for OracleResponseCode {
    type Error = IoError;

    fn try_from(value: u8) -> Result<Self, IoError> {
        Ok(match value {
            0x00 => Self::Success,
            0x10 => Self::ProtocolNotSupported,
            0x12 => Self::ConsensusUnreachable,
            0x14 => Self::NotFound,
            0x16 => Self::Timeout,
            0x18 => Self::Forbidden,
            0x1a => Self::ResponseTooLarge,
            0x1c => Self::InsufficientFunds,
            0x1f => Self::ContentTypeNotSupported,
            0xff => Self::Error,
            other => {
                return Err(IoError::invalid_data(
                    "oracle response code",
                    format!("{other:#04x}"),
                ))
            }
        })
    }
}

/// Typed transaction attribute.
///
/// The `Reserved` variant carries forward-compatible payloads from the
/// reserved type range when the network enables them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionAttribute {
    /// Committee-signed transactions that jump the mempool fee queue.
    HighPriority,
    /// The oracle service's answer to a pending request.
    OracleResponse {
        id: u64,
        code: OracleResponseCode,
        result: Vec<u8>,
    },
    /// The transaction is invalid before this height.
    NotValidBefore { height: u32 },
    /// This transaction cannot coexist with the named one.
    Conflicts { hash: UInt256 },
    /// Notary-assisted transaction with `n_keys` co-signers.
    NotaryAssisted { n_keys: u8 },
    /// Opaque reserved-range attribute.
    Reserved { attr_type: u8, data: Vec<u8> },
}

impl TransactionAttribute {
    pub const HIGH_PRIORITY: u8 = 0x01;
    pub const ORACLE_RESPONSE: u8 = 0x11;
    pub const NOT_VALID_BEFORE: u8 = 0x20;
    pub const CONFLICTS: u8 = 0x21;
    pub const NOTARY_ASSISTED: u8 = 0x22;
    pub const RESERVED_LOWEST: u8 = 0xe0;

    pub fn attr_type(&self) -> u8 {
        match self {
            TransactionAttribute::HighPriority => Self::HIGH_PRIORITY,
            TransactionAttribute::OracleResponse { .. } => Self::ORACLE_RESPONSE,
            TransactionAttribute::NotValidBefore { .. } => Self::NOT_VALID_BEFORE,
            TransactionAttribute::Conflicts { .. } => Self::CONFLICTS,
            TransactionAttribute::NotaryAssisted { .. } => Self::NOTARY_ASSISTED,
            TransactionAttribute::Reserved { attr_type, .. } => *attr_type,
        }
    }

    /// Whether several attributes of this kind may coexist in one
    /// transaction.
    pub fn allow_multiple(&self) -> bool {
        matches!(
            self,
            TransactionAttribute::Conflicts { .. } | TransactionAttribute::Reserved { .. }
        )
    }
}

impl Serializable for TransactionAttribute {
    fn size(&self) -> usize {
        1 + match self {
            TransactionAttribute::HighPriority => 0,
            TransactionAttribute::OracleResponse { result, .. } => {
                8 + 1 + var_size_of_bytes(result)
            }
            TransactionAttribute::NotValidBefore { .. } => 4,
            TransactionAttribute::Conflicts { .. } => UInt256::SIZE,
            TransactionAttribute::NotaryAssisted { .. } => 1,
            TransactionAttribute::Reserved { data, .. } => {
                var_size(data.len() as u64) + data.len()
            }
        }
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.attr_type());
        match self {
            TransactionAttribute::HighPriority => {}
            TransactionAttribute::OracleResponse { id, code, result } => {
                writer.write_u64(*id);
                writer.write_u8(*code as u8);
                writer.write_var_bytes(result);
            }
            TransactionAttribute::NotValidBefore { height } => writer.write_u32(*height),
            TransactionAttribute::Conflicts { hash } => hash.serialize(writer)?,
            TransactionAttribute::NotaryAssisted { n_keys } => writer.write_u8(*n_keys),
            TransactionAttribute::Reserved { data, .. } => writer.write_var_bytes(data),
        }
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let attr_type = reader.read_u8()?;
        Ok(match attr_type {
            Self::HIGH_PRIORITY => TransactionAttribute::HighPriority,
            Self::ORACLE_RESPONSE => {
                let id = reader.read_u64()?;
                let code = OracleResponseCode::try_from(reader.read_u8()?)?;
                let result = reader.read_var_bytes(MAX_ORACLE_RESULT_SIZE)?;
                if code != OracleResponseCode::Success && !result.is_empty() {
                    return Err(IoError::invalid_data(
                        "oracle response",
                        "non-success response carries a result",
                    ));
                }
                TransactionAttribute::OracleResponse { id, code, result }
            }
            Self::NOT_VALID_BEFORE => TransactionAttribute::NotValidBefore {
                height: reader.read_u32()?,
            },
            Self::CONFLICTS => TransactionAttribute::Conflicts {
                hash: UInt256::deserialize(reader)?,
            },
            Self::NOTARY_ASSISTED => TransactionAttribute::NotaryAssisted {
                n_keys: reader.read_u8()?,
            },
            t if t >= Self::RESERVED_LOWEST => TransactionAttribute::Reserved {
                attr_type: t,
                data: reader.read_var_bytes(MAX_ORACLE_RESULT_SIZE)?,
            },
            other => {
                return Err(IoError::invalid_data(
                    "transaction attribute",
                    format!("unknown type {other:#04x}"),
                ))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_kinds() {
        let attrs = [
            TransactionAttribute::HighPriority,
            TransactionAttribute::OracleResponse {
                id: 7,
                code: OracleResponseCode::Success,
                result: vec![1, 2, 3],
            },
            TransactionAttribute::NotValidBefore { height: 1000 },
            TransactionAttribute::Conflicts {
                hash: UInt256::from_array([5; 32]),
            },
            TransactionAttribute::NotaryAssisted { n_keys: 4 },
            TransactionAttribute::Reserved {
                attr_type: 0xe1,
                data: vec![0xde, 0xad],
            },
        ];
        for attr in attrs {
            let bytes = attr.to_bytes();
            assert_eq!(bytes.len(), attr.size(), "{attr:?}");
            assert_eq!(TransactionAttribute::from_bytes(&bytes).unwrap(), attr);
        }
    }

    #[test]
    fn failed_oracle_response_must_be_empty() {
        let attr = TransactionAttribute::OracleResponse {
            id: 1,
            code: OracleResponseCode::Timeout,
            result: vec![1],
        };
        assert!(TransactionAttribute::from_bytes(&attr.to_bytes()).is_err());
    }

    #[test]
    fn conflicts_allows_multiple() {
        assert!(TransactionAttribute::Conflicts {
            hash: UInt256::zero()
        }
        .allow_multiple());
        assert!(!TransactionAttribute::HighPriority.allow_multiple());
    }
}
