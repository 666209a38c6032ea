//! Contract manifests: ABI, groups, permissions and trusts.
//!
//! Manifests travel as JSON, exactly as wallets and deploy tooling produce
//! them, so the model is a serde mapping rather than a binary codec.

mod permission;

pub use permission::{ContractPermission, PermissionTarget};

use crate::{ContractError, ContractResult};
use neonova_core::UInt160;
use serde::{Deserialize, Serialize};

/// Maximum serialized manifest size accepted on deploy.
pub const MAX_MANIFEST_SIZE: usize = u16::MAX as usize;

/// Declared parameter of an ABI method or event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
}

/// One callable method of the ABI. Overloads are permitted: lookup is by
/// `(name, parameter count)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMethod {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ContractParameter>,
    #[serde(rename = "returntype")]
    pub return_type: String,
    pub offset: u32,
    #[serde(default)]
    pub safe: bool,
}

impl ContractMethod {
    pub fn has_return_value(&self) -> bool {
        self.return_type != "Void"
    }
}

/// One event the contract may notify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ContractParameter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAbi {
    #[serde(default)]
    pub methods: Vec<ContractMethod>,
    #[serde(default)]
    pub events: Vec<ContractEvent>,
}

/// A group a contract belongs to: a public key plus a signature of the
/// contract hash proving membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractGroup {
    #[serde(rename = "pubkey")]
    pub public_key: String,
    pub signature: String,
}

impl ContractGroup {
    /// Verifies the membership signature over the contract hash.
    pub fn is_valid(&self, contract_hash: &UInt160) -> bool {
        let Ok(key) = hex::decode(&self.public_key) else {
            return false;
        };
        use base64::Engine;
        let Ok(signature) = base64::engine::general_purpose::STANDARD.decode(&self.signature)
        else {
            return false;
        };
        neonova_crypto::verify_signature(contract_hash.as_bytes(), &signature, &key)
    }
}

/// The full manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractManifest {
    pub name: String,
    #[serde(default)]
    pub groups: Vec<ContractGroup>,
    #[serde(default, rename = "supportedstandards")]
    pub supported_standards: Vec<String>,
    pub abi: ContractAbi,
    #[serde(default)]
    pub permissions: Vec<ContractPermission>,
    /// `null` in JSON means wildcard trust.
    #[serde(default)]
    pub trusts: Option<Vec<String>>,
    #[serde(default)]
    pub extra: Option<serde_json::Value>,
}

impl ContractManifest {
    /// A manifest with no methods and full permissions, for tests and
    /// native bootstrap.
    pub fn minimal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
            supported_standards: Vec::new(),
            abi: ContractAbi::default(),
            permissions: vec![ContractPermission::wildcard()],
            trusts: None,
            extra: None,
        }
    }

    pub fn to_json_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("manifest is always serializable")
    }

    pub fn from_json_bytes(bytes: &[u8]) -> ContractResult<Self> {
        if bytes.len() > MAX_MANIFEST_SIZE {
            return Err(ContractError::InvalidManifest("manifest too large".into()));
        }
        let manifest: Self = serde_json::from_slice(bytes)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> ContractResult<()> {
        if self.name.is_empty() {
            return Err(ContractError::InvalidManifest("empty name".into()));
        }
        let mut seen: Vec<(&str, usize)> = Vec::new();
        for method in &self.abi.methods {
            let key = (method.name.as_str(), method.parameters.len());
            if seen.contains(&key) {
                return Err(ContractError::InvalidManifest(format!(
                    "duplicate method {}/{}",
                    method.name,
                    method.parameters.len()
                )));
            }
            seen.push(key);
        }
        Ok(())
    }

    /// Looks up a method by name and arity.
    pub fn method(&self, name: &str, parameter_count: usize) -> Option<&ContractMethod> {
        self.abi
            .methods
            .iter()
            .find(|m| m.name == name && m.parameters.len() == parameter_count)
    }

    /// Looks up a method by name alone (any arity); used by `hasMethod`
    /// style queries with a -1 count.
    pub fn method_any_arity(&self, name: &str) -> Option<&ContractMethod> {
        self.abi.methods.iter().find(|m| m.name == name)
    }

    /// Whether a contract carrying this manifest may call
    /// `(target, target_groups, method)`.
    pub fn can_call(
        &self,
        target: &UInt160,
        target_groups: &[ContractGroup],
        method: &str,
    ) -> bool {
        self.permissions
            .iter()
            .any(|p| p.allows(target, target_groups, method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "name": "Token",
        "groups": [],
        "supportedstandards": ["NEP-17"],
        "abi": {
            "methods": [
                {"name": "transfer", "parameters": [
                    {"name": "from", "type": "Hash160"},
                    {"name": "to", "type": "Hash160"},
                    {"name": "amount", "type": "Integer"},
                    {"name": "data", "type": "Any"}
                ], "returntype": "Boolean", "offset": 0, "safe": false},
                {"name": "balanceOf", "parameters": [
                    {"name": "account", "type": "Hash160"}
                ], "returntype": "Integer", "offset": 30, "safe": true}
            ],
            "events": [
                {"name": "Transfer", "parameters": [
                    {"name": "from", "type": "Hash160"},
                    {"name": "to", "type": "Hash160"},
                    {"name": "amount", "type": "Integer"}
                ]}
            ]
        },
        "permissions": [{"contract": "*", "methods": "*"}],
        "trusts": [],
        "extra": null
    }"#;

    #[test]
    fn parses_standard_manifest() {
        let manifest = ContractManifest::from_json_bytes(SAMPLE.as_bytes()).unwrap();
        assert_eq!(manifest.name, "Token");
        assert!(manifest.method("transfer", 4).is_some());
        assert!(manifest.method("transfer", 2).is_none());
        assert!(manifest.method("balanceOf", 1).unwrap().safe);
        assert_eq!(manifest.abi.events[0].name, "Transfer");
    }

    #[test]
    fn rejects_duplicate_overloads() {
        let mut manifest = ContractManifest::minimal("X");
        for _ in 0..2 {
            manifest.abi.methods.push(ContractMethod {
                name: "run".into(),
                parameters: vec![],
                return_type: "Void".into(),
                offset: 0,
                safe: false,
            });
        }
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn json_round_trip() {
        let manifest = ContractManifest::from_json_bytes(SAMPLE.as_bytes()).unwrap();
        let bytes = manifest.to_json_bytes();
        assert_eq!(ContractManifest::from_json_bytes(&bytes).unwrap(), manifest);
    }
}
