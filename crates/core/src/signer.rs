//! Transaction signers and witness scopes.

use crate::{UInt160, WitnessRule};
use bitflags::bitflags;
use neonova_config::MAX_SUB_ITEMS;
use neonova_crypto::ECPoint;
use neonova_io::{var_size, BinaryWriter, IoError, IoResult, MemoryReader, Serializable};

bitflags! {
    /// Restricts which contract calls may observe this signer as present.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WitnessScope: u8 {
        /// Witness only valid for fee payment; no contract sees it.
        const NONE = 0x00;
        /// Valid when the callee was invoked directly by the entry script.
        const CALLED_BY_ENTRY = 0x01;
        /// Valid only inside contracts from the allowed list.
        const CUSTOM_CONTRACTS = 0x10;
        /// Valid only inside contracts belonging to an allowed group.
        const CUSTOM_GROUPS = 0x20;
        /// Valid when the attached witness rules evaluate to Allow.
        const RULES = 0x40;
        /// Valid everywhere. Mutually exclusive with every other scope.
        const GLOBAL = 0x80;
    }
}

/// One authorizing account of a transaction, index-aligned with its witness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signer {
    pub account: UInt160,
    pub scopes: WitnessScope,
    pub allowed_contracts: Vec<UInt160>,
    pub allowed_groups: Vec<ECPoint>,
    pub rules: Vec<WitnessRule>,
}

impl Signer {
    /// A signer restricted to entry-level calls, the common default.
    pub fn called_by_entry(account: UInt160) -> Self {
        Self {
            account,
            scopes: WitnessScope::CALLED_BY_ENTRY,
            allowed_contracts: Vec::new(),
            allowed_groups: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// A fee-only signer that no contract can observe.
    pub fn none(account: UInt160) -> Self {
        Self {
            account,
            scopes: WitnessScope::NONE,
            allowed_contracts: Vec::new(),
            allowed_groups: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn global(account: UInt160) -> Self {
        Self {
            account,
            scopes: WitnessScope::GLOBAL,
            allowed_contracts: Vec::new(),
            allowed_groups: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// Scope-consistency rules: GLOBAL excludes everything else, and the
    /// sub-lists must match their scope bits.
    fn check_scopes(&self) -> IoResult<()> {
        if self.scopes.contains(WitnessScope::GLOBAL) && self.scopes != WitnessScope::GLOBAL {
            return Err(IoError::invalid_data(
                "signer",
                "Global scope cannot be combined",
            ));
        }
        if !self.scopes.contains(WitnessScope::CUSTOM_CONTRACTS) && !self.allowed_contracts.is_empty()
        {
            return Err(IoError::invalid_data(
                "signer",
                "allowed contracts without CustomContracts scope",
            ));
        }
        if !self.scopes.contains(WitnessScope::CUSTOM_GROUPS) && !self.allowed_groups.is_empty() {
            return Err(IoError::invalid_data(
                "signer",
                "allowed groups without CustomGroups scope",
            ));
        }
        if !self.scopes.contains(WitnessScope::RULES) && !self.rules.is_empty() {
            return Err(IoError::invalid_data("signer", "rules without Rules scope"));
        }
        Ok(())
    }
}

impl Serializable for Signer {
    fn size(&self) -> usize {
        let mut size = UInt160::SIZE + 1;
        if self.scopes.contains(WitnessScope::CUSTOM_CONTRACTS) {
            size += var_size(self.allowed_contracts.len() as u64)
                + self.allowed_contracts.len() * UInt160::SIZE;
        }
        if self.scopes.contains(WitnessScope::CUSTOM_GROUPS) {
            size += var_size(self.allowed_groups.len() as u64) + self.allowed_groups.len() * 33;
        }
        if self.scopes.contains(WitnessScope::RULES) {
            size += var_size(self.rules.len() as u64)
                + self.rules.iter().map(Serializable::size).sum::<usize>();
        }
        size
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> IoResult<()> {
        self.check_scopes()?;
        self.account.serialize(writer)?;
        writer.write_u8(self.scopes.bits());
        if self.scopes.contains(WitnessScope::CUSTOM_CONTRACTS) {
            writer.write_var_int(self.allowed_contracts.len() as u64);
            for hash in &self.allowed_contracts {
                hash.serialize(writer)?;
            }
        }
        if self.scopes.contains(WitnessScope::CUSTOM_GROUPS) {
            writer.write_var_int(self.allowed_groups.len() as u64);
            for group in &self.allowed_groups {
                writer.write_bytes(group.as_bytes());
            }
        }
        if self.scopes.contains(WitnessScope::RULES) {
            writer.write_var_int(self.rules.len() as u64);
            for rule in &self.rules {
                rule.serialize(writer)?;
            }
        }
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let account = UInt160::deserialize(reader)?;
        let bits = reader.read_u8()?;
        let scopes = WitnessScope::from_bits(bits)
            .ok_or_else(|| IoError::invalid_data("signer", format!("scope bits {bits:#04x}")))?;

        let mut signer = Signer {
            account,
            scopes,
            allowed_contracts: Vec::new(),
            allowed_groups: Vec::new(),
            rules: Vec::new(),
        };
        if scopes.contains(WitnessScope::CUSTOM_CONTRACTS) {
            let count = reader.read_var_int(MAX_SUB_ITEMS as u64)? as usize;
            for _ in 0..count {
                signer.allowed_contracts.push(UInt160::deserialize(reader)?);
            }
        }
        if scopes.contains(WitnessScope::CUSTOM_GROUPS) {
            let count = reader.read_var_int(MAX_SUB_ITEMS as u64)? as usize;
            for _ in 0..count {
                let bytes = reader.read_bytes(33)?;
                signer.allowed_groups.push(
                    ECPoint::from_bytes(&bytes)
                        .map_err(|e| IoError::invalid_data("signer group", e.to_string()))?,
                );
            }
        }
        if scopes.contains(WitnessScope::RULES) {
            let count = reader.read_var_int(MAX_SUB_ITEMS as u64)? as usize;
            for _ in 0..count {
                signer.rules.push(WitnessRule::deserialize(reader)?);
            }
        }
        signer.check_scopes()?;
        Ok(signer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{WitnessCondition, WitnessRuleAction};

    #[test]
    fn round_trip_with_sub_lists() {
        let signer = Signer {
            account: UInt160::from_array([1; 20]),
            scopes: WitnessScope::CUSTOM_CONTRACTS | WitnessScope::RULES,
            allowed_contracts: vec![UInt160::from_array([2; 20]), UInt160::from_array([3; 20])],
            allowed_groups: Vec::new(),
            rules: vec![WitnessRule {
                action: WitnessRuleAction::Allow,
                condition: WitnessCondition::CalledByEntry,
            }],
        };
        let bytes = signer.to_bytes();
        assert_eq!(bytes.len(), signer.size());
        assert_eq!(Signer::from_bytes(&bytes).unwrap(), signer);
    }

    #[test]
    fn global_scope_is_exclusive() {
        let mut bytes = Signer::global(UInt160::zero()).to_bytes();
        // Flip in CalledByEntry next to Global.
        *bytes.last_mut().unwrap() = 0x81;
        assert!(Signer::from_bytes(&bytes).is_err());
    }

    #[test]
    fn rejects_unknown_scope_bits() {
        let mut bytes = Signer::none(UInt160::zero()).to_bytes();
        *bytes.last_mut().unwrap() = 0x02;
        assert!(Signer::from_bytes(&bytes).is_err());
    }
}
