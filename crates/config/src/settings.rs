//! Per-network protocol settings.

use crate::{ConfigError, ConfigResult, PUBLIC_KEY_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Activation history of one native contract: the block heights at which its
/// state schema was introduced or migrated, sorted ascending.
pub type NativeActivation = Vec<u32>;

/// Immutable chain parameters.
///
/// Two nodes disagree on state iff they disagree on any field here, so the
/// record is persisted alongside the store and re-validated on startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ProtocolSettings {
    /// Network magic mixed into every signature.
    pub network: u32,
    /// Target milliseconds between blocks.
    pub ms_per_block: u32,
    /// Number of consensus validators.
    pub validators_count: usize,
    /// Compressed public keys of the standby committee, hex-encoded.
    pub standby_committee: Vec<String>,
    /// Window of history a node must be able to serve.
    pub max_traceable_blocks: u32,
    /// Upper bound on `valid_until_block - current_height`.
    pub max_valid_until_block_increment: u32,
    /// Cap on transactions per block.
    pub max_transactions_per_block: u16,
    /// Whether headers embed the previous state root.
    pub state_root_in_header: bool,
    /// Enables NotValidBefore, Conflicts and NotaryAssisted attributes.
    pub p2p_sig_extensions: bool,
    /// Enables state-exchange storage layout.
    pub p2p_state_exchange_extensions: bool,
    /// Keep only the latest MPT state instead of full history.
    pub keep_only_latest_state: bool,
    /// Delete blocks and transactions that fall outside the traceable window.
    pub remove_untraceable_blocks: bool,
    /// Ceiling for the NotValidBefore delta.
    pub max_not_valid_before_delta: u32,
    /// Accept reserved-range transaction attributes as opaque payloads.
    pub reserved_attributes: bool,
    /// Native contract activation histories keyed by contract name.
    pub native_update_histories: BTreeMap<String, NativeActivation>,
    /// Initial GAS distributed to the committee address at genesis.
    pub initial_gas_distribution: i64,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        let natives = [
            "ContractManagement",
            "StdLib",
            "CryptoLib",
            "LedgerContract",
            "NeoToken",
            "GasToken",
            "PolicyContract",
            "RoleManagement",
            "OracleContract",
            "Notary",
        ];
        Self {
            network: 0x334f_454e,
            ms_per_block: 15_000,
            validators_count: 1,
            standby_committee: Vec::new(),
            max_traceable_blocks: 2_102_400,
            max_valid_until_block_increment: 5760,
            max_transactions_per_block: 512,
            state_root_in_header: false,
            p2p_sig_extensions: false,
            p2p_state_exchange_extensions: false,
            keep_only_latest_state: false,
            remove_untraceable_blocks: false,
            max_not_valid_before_delta: 140,
            reserved_attributes: false,
            native_update_histories: natives
                .iter()
                .map(|n| (n.to_string(), vec![0]))
                .collect(),
            initial_gas_distribution: 52_000_000 * crate::GAS_FACTOR,
        }
    }
}

impl ProtocolSettings {
    /// Parses settings from a JSON document.
    pub fn from_json(doc: &str) -> ConfigResult<Self> {
        let settings: Self = serde_json::from_str(doc)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Sanity-checks field relationships.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.validators_count == 0 {
            return Err(ConfigError::Invalid("validators_count must be positive".into()));
        }
        if !self.standby_committee.is_empty() && self.standby_committee.len() < self.validators_count
        {
            return Err(ConfigError::Invalid(
                "standby committee smaller than validator count".into(),
            ));
        }
        for key in &self.standby_committee {
            let bytes = hex::decode(key)
                .map_err(|e| ConfigError::Invalid(format!("committee key {key}: {e}")))?;
            if bytes.len() != PUBLIC_KEY_SIZE {
                return Err(ConfigError::Invalid(format!(
                    "committee key {key}: expected {PUBLIC_KEY_SIZE} bytes"
                )));
            }
        }
        if self.max_valid_until_block_increment == 0 {
            return Err(ConfigError::Invalid(
                "max_valid_until_block_increment must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Size of the committee; equals the standby list length, or the
    /// validator count on networks configured without one.
    pub fn committee_size(&self) -> usize {
        if self.standby_committee.is_empty() {
            self.validators_count
        } else {
            self.standby_committee.len()
        }
    }

    /// Decoded standby committee keys.
    pub fn committee_keys(&self) -> Vec<Vec<u8>> {
        self.standby_committee
            .iter()
            .filter_map(|k| hex::decode(k).ok())
            .collect()
    }

    /// Whether a native named `name` is active at `height` per its history.
    pub fn native_active_in(&self, name: &str, height: u32) -> bool {
        match self.native_update_histories.get(name) {
            Some(history) => history.first().is_some_and(|h| *h <= height),
            // Unlisted natives activate at genesis.
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate() {
        ProtocolSettings::default().validate().unwrap();
    }

    #[test]
    fn rejects_undersized_committee() {
        let settings = ProtocolSettings {
            validators_count: 4,
            standby_committee: vec!["02".repeat(33)],
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn json_round_trip() {
        let settings = ProtocolSettings::default();
        let doc = serde_json::to_string(&settings).unwrap();
        assert_eq!(ProtocolSettings::from_json(&doc).unwrap(), settings);
    }

    #[test]
    fn native_history_gate() {
        let mut settings = ProtocolSettings::default();
        settings
            .native_update_histories
            .insert("Notary".into(), vec![100]);
        assert!(!settings.native_active_in("Notary", 99));
        assert!(settings.native_active_in("Notary", 100));
        assert!(settings.native_active_in("NeoToken", 0));
    }
}
