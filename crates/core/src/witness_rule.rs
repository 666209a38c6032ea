//! Witness rules: programmable conditions restricting signature scope.

use crate::UInt160;
use neonova_config::{MAX_RULE_NESTING_DEPTH, MAX_SUB_ITEMS};
use neonova_crypto::ECPoint;
use neonova_io::{var_size, BinaryWriter, IoError, IoResult, MemoryReader, Serializable};

/// Whether a matching rule admits or rejects the witness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WitnessRuleAction {
    Deny = 0,
    Allow = 1,
}

/// A predicate over the current execution context.
///
/// Nesting of `Not`/`And`/`Or` is capped at two levels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WitnessCondition {
    Boolean(bool),
    Not(Box<WitnessCondition>),
    And(Vec<WitnessCondition>),
    Or(Vec<WitnessCondition>),
    ScriptHash(UInt160),
    Group(ECPoint),
    CalledByEntry,
    CalledByContract(UInt160),
    CalledByGroup(ECPoint),
}

impl WitnessCondition {
    const BOOLEAN: u8 = 0x00;
    const NOT: u8 = 0x01;
    const AND: u8 = 0x02;
    const OR: u8 = 0x03;
    const SCRIPT_HASH: u8 = 0x18;
    const GROUP: u8 = 0x19;
    const CALLED_BY_ENTRY: u8 = 0x20;
    const CALLED_BY_CONTRACT: u8 = 0x28;
    const CALLED_BY_GROUP: u8 = 0x29;

    fn type_byte(&self) -> u8 {
        match self {
            WitnessCondition::Boolean(_) => Self::BOOLEAN,
            WitnessCondition::Not(_) => Self::NOT,
            WitnessCondition::And(_) => Self::AND,
            WitnessCondition::Or(_) => Self::OR,
            WitnessCondition::ScriptHash(_) => Self::SCRIPT_HASH,
            WitnessCondition::Group(_) => Self::GROUP,
            WitnessCondition::CalledByEntry => Self::CALLED_BY_ENTRY,
            WitnessCondition::CalledByContract(_) => Self::CALLED_BY_CONTRACT,
            WitnessCondition::CalledByGroup(_) => Self::CALLED_BY_GROUP,
        }
    }

    fn encoded_size(&self) -> usize {
        1 + match self {
            WitnessCondition::Boolean(_) => 1,
            WitnessCondition::Not(inner) => inner.encoded_size(),
            WitnessCondition::And(items) | WitnessCondition::Or(items) => {
                var_size(items.len() as u64)
                    + items.iter().map(Self::encoded_size).sum::<usize>()
            }
            WitnessCondition::ScriptHash(_) | WitnessCondition::CalledByContract(_) => {
                UInt160::SIZE
            }
            WitnessCondition::Group(_) | WitnessCondition::CalledByGroup(_) => 33,
            WitnessCondition::CalledByEntry => 0,
        }
    }

    fn write(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.type_byte());
        match self {
            WitnessCondition::Boolean(value) => writer.write_bool(*value),
            WitnessCondition::Not(inner) => inner.write(writer)?,
            WitnessCondition::And(items) | WitnessCondition::Or(items) => {
                writer.write_var_int(items.len() as u64);
                for item in items {
                    item.write(writer)?;
                }
            }
            WitnessCondition::ScriptHash(hash) | WitnessCondition::CalledByContract(hash) => {
                hash.serialize(writer)?
            }
            WitnessCondition::Group(point) | WitnessCondition::CalledByGroup(point) => {
                writer.write_bytes(point.as_bytes())
            }
            WitnessCondition::CalledByEntry => {}
        }
        Ok(())
    }

    fn read(reader: &mut MemoryReader<'_>, depth: usize) -> IoResult<Self> {
        let kind = reader.read_u8()?;
        let nested = || -> IoResult<usize> {
            if depth == 0 {
                return Err(IoError::invalid_data(
                    "witness condition",
                    "nesting too deep",
                ));
            }
            Ok(depth - 1)
        };
        let read_point = |reader: &mut MemoryReader<'_>| -> IoResult<ECPoint> {
            let bytes = reader.read_bytes(33)?;
            ECPoint::from_bytes(&bytes)
                .map_err(|e| IoError::invalid_data("witness condition group", e.to_string()))
        };
        Ok(match kind {
            Self::BOOLEAN => WitnessCondition::Boolean(reader.read_bool()?),
            Self::NOT => WitnessCondition::Not(Box::new(Self::read(reader, nested()?)?)),
            Self::AND | Self::OR => {
                let inner_depth = nested()?;
                let count = reader.read_var_int(MAX_SUB_ITEMS as u64)? as usize;
                if count == 0 {
                    return Err(IoError::invalid_data("witness condition", "empty junction"));
                }
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(Self::read(reader, inner_depth)?);
                }
                if kind == Self::AND {
                    WitnessCondition::And(items)
                } else {
                    WitnessCondition::Or(items)
                }
            }
            Self::SCRIPT_HASH => WitnessCondition::ScriptHash(UInt160::deserialize(reader)?),
            Self::GROUP => WitnessCondition::Group(read_point(reader)?),
            Self::CALLED_BY_ENTRY => WitnessCondition::CalledByEntry,
            Self::CALLED_BY_CONTRACT => {
                WitnessCondition::CalledByContract(UInt160::deserialize(reader)?)
            }
            Self::CALLED_BY_GROUP => WitnessCondition::CalledByGroup(read_point(reader)?),
            other => {
                return Err(IoError::invalid_data(
                    "witness condition",
                    format!("unknown type {other:#04x}"),
                ))
            }
        })
    }
}

/// One scoped-witness rule: an action applied when the condition matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessRule {
    pub action: WitnessRuleAction,
    pub condition: WitnessCondition,
}

impl Serializable for WitnessRule {
    fn size(&self) -> usize {
        1 + self.condition.encoded_size()
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        writer.write_u8(self.action as u8);
        self.condition.write(writer)
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let action = match reader.read_u8()? {
            0 => WitnessRuleAction::Deny,
            1 => WitnessRuleAction::Allow,
            other => {
                return Err(IoError::invalid_data(
                    "witness rule action",
                    format!("{other:#04x}"),
                ))
            }
        };
        Ok(Self {
            action,
            condition: WitnessCondition::read(reader, MAX_RULE_NESTING_DEPTH)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_nested() {
        let rule = WitnessRule {
            action: WitnessRuleAction::Allow,
            condition: WitnessCondition::Or(vec![
                WitnessCondition::CalledByEntry,
                WitnessCondition::Not(Box::new(WitnessCondition::ScriptHash(
                    UInt160::from_array([9; 20]),
                ))),
            ]),
        };
        let bytes = rule.to_bytes();
        assert_eq!(bytes.len(), rule.size());
        assert_eq!(WitnessRule::from_bytes(&bytes).unwrap(), rule);
    }

    #[test]
    fn rejects_over_deep_nesting() {
        // Or(Not(Not(bool))) exceeds the 2-level wire bound.
        let rule = WitnessRule {
            action: WitnessRuleAction::Deny,
            condition: WitnessCondition::Or(vec![WitnessCondition::Not(Box::new(
                WitnessCondition::Not(Box::new(WitnessCondition::Boolean(true))),
            ))]),
        };
        assert!(WitnessRule::from_bytes(&rule.to_bytes()).is_err());
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(WitnessRule::from_bytes(&[1, 0x7f]).is_err());
    }
}
