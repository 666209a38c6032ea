//! Witness presence checks and scope evaluation.

use super::ApplicationEngine;
use neonova_core::{Signer, UInt160, WitnessCondition, WitnessRule, WitnessRuleAction, WitnessScope};
use neonova_vm::{CallFlags, VmError, VmResult};

impl ApplicationEngine {
    /// Whether `hash` has authorized the current execution: either it is the
    /// immediate caller, or it is a transaction signer whose scope admits the
    /// current call chain.
    pub fn check_witness(&self, hash: &UInt160) -> VmResult<bool> {
        if let Ok(context) = self.vm.current_context() {
            if context.calling_script_hash == Some(*hash) {
                return Ok(true);
            }
        }
        let Some(tx) = &self.container else {
            return Ok(false);
        };
        let Some(signer) = tx.signers.iter().find(|s| s.account == *hash) else {
            // Unknown hashes can only be witnesses through state lookups,
            // which demand read permission.
            let flags = self.vm.current_context()?.call_flags;
            if !flags.contains(CallFlags::READ_STATES) {
                return Err(VmError::invalid_operation(
                    "CheckWitness for non-signer requires ReadStates",
                ));
            }
            return Ok(false);
        };
        self.check_signer_scope(signer)
    }

    fn check_signer_scope(&self, signer: &Signer) -> VmResult<bool> {
        let scopes = signer.scopes;
        if scopes.contains(WitnessScope::GLOBAL) {
            return Ok(true);
        }
        if scopes == WitnessScope::NONE {
            return Ok(false);
        }
        if scopes.contains(WitnessScope::CALLED_BY_ENTRY) && self.called_by_entry()? {
            return Ok(true);
        }
        if scopes.contains(WitnessScope::CUSTOM_CONTRACTS) {
            let executing = self.vm.current_context()?.script_hash();
            if signer.allowed_contracts.contains(&executing) {
                return Ok(true);
            }
        }
        if scopes.contains(WitnessScope::CUSTOM_GROUPS) {
            let executing = self.vm.current_context()?.script_hash();
            if let Some(contract) = self.contract_by_hash(&executing) {
                let member = contract.manifest.groups.iter().any(|g| {
                    signer
                        .allowed_groups
                        .iter()
                        .any(|allowed| g.public_key.eq_ignore_ascii_case(&allowed.to_string()))
                });
                if member {
                    return Ok(true);
                }
            }
        }
        if scopes.contains(WitnessScope::RULES) {
            for rule in &signer.rules {
                if self.rule_matches(rule)? {
                    return Ok(rule.action == WitnessRuleAction::Allow);
                }
            }
        }
        Ok(false)
    }

    fn called_by_entry(&self) -> VmResult<bool> {
        let context = self.vm.current_context()?;
        let entry_hash = self
            .vm
            .entry_context()
            .map(|c| c.script_hash())
            .unwrap_or_default();
        Ok(match context.calling_script_hash {
            None => true,
            Some(calling) => calling == entry_hash,
        })
    }

    fn rule_matches(&self, rule: &WitnessRule) -> VmResult<bool> {
        self.condition_holds(&rule.condition)
    }

    fn condition_holds(&self, condition: &WitnessCondition) -> VmResult<bool> {
        Ok(match condition {
            WitnessCondition::Boolean(value) => *value,
            WitnessCondition::Not(inner) => !self.condition_holds(inner)?,
            WitnessCondition::And(items) => {
                for item in items {
                    if !self.condition_holds(item)? {
                        return Ok(false);
                    }
                }
                true
            }
            WitnessCondition::Or(items) => {
                for item in items {
                    if self.condition_holds(item)? {
                        return Ok(true);
                    }
                }
                false
            }
            WitnessCondition::ScriptHash(hash) => {
                self.vm.current_context()?.script_hash() == *hash
            }
            WitnessCondition::Group(group) => {
                let executing = self.vm.current_context()?.script_hash();
                match self.contract_by_hash(&executing) {
                    Some(contract) => contract
                        .manifest
                        .groups
                        .iter()
                        .any(|g| g.public_key.eq_ignore_ascii_case(&group.to_string())),
                    None => false,
                }
            }
            WitnessCondition::CalledByEntry => self.called_by_entry()?,
            WitnessCondition::CalledByContract(hash) => {
                self.vm.current_context()?.calling_script_hash == Some(*hash)
            }
            WitnessCondition::CalledByGroup(group) => {
                match self.vm.current_context()?.calling_script_hash {
                    Some(calling) => match self.contract_by_hash(&calling) {
                        Some(contract) => contract
                            .manifest
                            .groups
                            .iter()
                            .any(|g| g.public_key.eq_ignore_ascii_case(&group.to_string())),
                        None => false,
                    },
                    None => false,
                }
            }
        })
    }

    /// Whether the transaction carries the committee's witness; gates every
    /// committee-controlled native setter.
    pub fn check_committee(&self) -> VmResult<bool> {
        let committee_address = self.natives.neo().committee_address(&self.dao, &self.settings);
        self.check_witness(&committee_address)
    }
}
