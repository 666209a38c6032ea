//! Call permissions.

use super::ContractGroup;
use neonova_core::UInt160;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What a permission entry names: anything, one contract, or one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionTarget {
    Wildcard,
    Contract(UInt160),
    /// Hex-encoded compressed public key of a group.
    Group(String),
}

/// One entry of `manifest.permissions`: which contract(s) and methods the
/// declaring contract may call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractPermission {
    #[serde(with = "target_serde")]
    pub contract: PermissionTarget,
    #[serde(with = "methods_serde")]
    pub methods: Option<Vec<String>>,
}

impl ContractPermission {
    pub fn wildcard() -> Self {
        Self {
            contract: PermissionTarget::Wildcard,
            methods: None,
        }
    }

    pub fn allows(&self, target: &UInt160, target_groups: &[ContractGroup], method: &str) -> bool {
        let contract_ok = match &self.contract {
            PermissionTarget::Wildcard => true,
            PermissionTarget::Contract(hash) => hash == target,
            PermissionTarget::Group(key) => target_groups
                .iter()
                .any(|g| g.public_key.eq_ignore_ascii_case(key)),
        };
        if !contract_ok {
            return false;
        }
        match &self.methods {
            None => true,
            Some(methods) => methods.iter().any(|m| m == method),
        }
    }
}

/// `"*"`, a `0x…` contract hash, or a hex public key.
mod target_serde {
    use super::*;
    use serde::de::Error;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        target: &PermissionTarget,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match target {
            PermissionTarget::Wildcard => serializer.serialize_str("*"),
            PermissionTarget::Contract(hash) => serializer.serialize_str(&hash.to_string()),
            PermissionTarget::Group(key) => serializer.serialize_str(key),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<PermissionTarget, D::Error> {
        let raw: String = serde::Deserialize::deserialize(deserializer)?;
        if raw == "*" {
            return Ok(PermissionTarget::Wildcard);
        }
        if raw.len() == 42 || raw.len() == 40 {
            let hash = UInt160::from_str(&raw).map_err(D::Error::custom)?;
            return Ok(PermissionTarget::Contract(hash));
        }
        if raw.len() == 66 {
            return Ok(PermissionTarget::Group(raw));
        }
        Err(D::Error::custom(format!("invalid permission target {raw}")))
    }
}

/// `"*"` or an explicit method list.
mod methods_serde {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        methods: &Option<Vec<String>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match methods {
            None => serializer.serialize_str("*"),
            Some(list) => serializer.collect_seq(list),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<String>>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Star(String),
            List(Vec<String>),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Star(s) if s == "*" => Ok(None),
            Raw::Star(other) => Err(D::Error::custom(format!("invalid methods value {other}"))),
            Raw::List(list) => Ok(Some(list)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_allows_everything() {
        let permission = ContractPermission::wildcard();
        assert!(permission.allows(&UInt160::from_array([1; 20]), &[], "anything"));
    }

    #[test]
    fn contract_target_restricts_hash() {
        let target = UInt160::from_array([2; 20]);
        let permission = ContractPermission {
            contract: PermissionTarget::Contract(target),
            methods: Some(vec!["transfer".into()]),
        };
        assert!(permission.allows(&target, &[], "transfer"));
        assert!(!permission.allows(&target, &[], "mint"));
        assert!(!permission.allows(&UInt160::zero(), &[], "transfer"));
    }

    #[test]
    fn json_forms() {
        let json = r#"{"contract": "*", "methods": "*"}"#;
        let permission: ContractPermission = serde_json::from_str(json).unwrap();
        assert_eq!(permission, ContractPermission::wildcard());

        let json = r#"{"contract": "0x0202020202020202020202020202020202020202", "methods": ["a"]}"#;
        let permission: ContractPermission = serde_json::from_str(json).unwrap();
        assert!(matches!(
            permission.contract,
            PermissionTarget::Contract(h) if h == UInt160::from_array([2; 20])
        ));
    }
}
