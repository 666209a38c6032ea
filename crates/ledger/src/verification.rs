//! `VerifyTx`: the gate every transaction passes before a block or the
//! memory pool accepts it.

use crate::{Blockchain, VerifyError, VerifyResult};
use neonova_config::{MAX_TRANSACTION_SIZE, MAX_VERIFICATION_GAS};
use neonova_contract::native::NativeContract;
use neonova_contract::{ApplicationEngine, Dao, TriggerType};
use neonova_core::{
    Signer, Transaction, TransactionAttribute, UInt160, Witness, WitnessScope,
};
use neonova_io::Serializable;
use neonova_persistence::{MemCachedStore, Store};
use neonova_vm::{CallFlags, OpCode, Script, StackItem, VmState};
use std::sync::Arc;

impl Blockchain {
    /// Full verification against committed state.
    pub fn verify_tx(&self, tx: &Transaction) -> VerifyResult<()> {
        self.verify_tx_stateful(&self.dao(), tx)
    }

    /// Verifies and admits a transaction into the memory pool.
    pub fn pool_tx(&self, tx: Transaction) -> VerifyResult<()> {
        let dao = self.dao();
        if self.mempool().contains(&tx.hash()) {
            return Err(VerifyError::AlreadyExists);
        }
        self.verify_tx_stateful(&dao, &tx)?;
        let balance = self
            .natives()
            .gas()
            .balance_of(&dao, &tx.sender());
        self.mempool().try_add(tx, &balance)
    }

    /// The ordered check pipeline; cross-transaction pool checks happen on
    /// pool admission instead.
    pub(crate) fn verify_tx_stateful(&self, dao: &Dao, tx: &Transaction) -> VerifyResult<()> {
        let height = dao.height().unwrap_or(0);
        let settings = self.settings();
        let natives = self.natives();

        // 1. Structural.
        if tx.size() > MAX_TRANSACTION_SIZE {
            return Err(VerifyError::TooBig);
        }
        if tx.script.is_empty() || Script::new(tx.script.clone()).validate().is_err() {
            return Err(VerifyError::InvalidScript);
        }
        if tx.valid_until_block <= height
            || tx.valid_until_block > height + settings.max_valid_until_block_increment
        {
            return Err(VerifyError::Expired);
        }

        // 2. Policy.
        for signer in &tx.signers {
            if natives.policy().is_blocked(dao, &signer.account) {
                return Err(VerifyError::PolicyBlocked(signer.account));
            }
        }

        // 3. Attributes.
        self.verify_attributes(dao, tx, height)?;

        // 4. Fees: the network fee covers size, attribute surcharges and
        // witness execution.
        let fee_per_byte = natives.policy().fee_per_byte(dao);
        let size_fee = tx.size() as i64 * fee_per_byte;
        let mut surcharge = 0i64;
        for attr in &tx.attributes {
            surcharge += natives.policy().attribute_fee(dao, attr.attr_type()) as i64;
            if let TransactionAttribute::NotaryAssisted { n_keys } = attr {
                surcharge +=
                    (*n_keys as i64 + 1) * natives.notary().service_fee_per_key(dao);
            }
        }
        let mut remaining = tx.network_fee - size_fee - surcharge;
        if remaining < 0 {
            return Err(VerifyError::SmallNetworkFee {
                required: size_fee + surcharge,
                declared: tx.network_fee,
            });
        }

        // 5. Balance.
        let balance = natives.gas().balance_of(dao, &tx.sender());
        let total_fee = num_bigint::BigInt::from(tx.system_fee) + tx.network_fee;
        if balance < total_fee {
            return Err(VerifyError::InsufficientFunds);
        }

        // 6. Duplicates and conflicts.
        if dao.contains_transaction(&tx.hash()) {
            return Err(VerifyError::AlreadyExists);
        }
        if let Some((_, record_signers)) = dao.get_conflict_record(&tx.hash()) {
            // Only a conflict declared by an overlapping fee payer counts;
            // anyone else declaring it would be a free-of-charge denial.
            let overlaps = record_signers
                .iter()
                .any(|account| tx.signers.iter().any(|s| s.account == *account));
            if overlaps {
                return Err(VerifyError::HasConflicts);
            }
        }
        for attr in tx.attributes_of(TransactionAttribute::CONFLICTS) {
            if let TransactionAttribute::Conflicts { hash } = attr {
                if dao.contains_transaction(hash) {
                    return Err(VerifyError::HasConflicts);
                }
            }
        }
        // 7. Witnesses, each with its own slice of the fee budget.
        for (index, signer) in tx.signers.iter().enumerate() {
            let witness = &tx.witnesses[index];
            let budget = remaining.min(MAX_VERIFICATION_GAS);
            let consumed = self.verify_witness(dao, tx, signer, witness, budget)?;
            remaining -= consumed;
        }
        Ok(())
    }

    // ---- attributes -------------------------------------------------------

    fn verify_attributes(
        &self,
        dao: &Dao,
        tx: &Transaction,
        height: u32,
    ) -> VerifyResult<()> {
        let settings = self.settings();
        let natives = self.natives();
        let mut conflict_targets: Vec<&neonova_core::UInt256> = Vec::new();
        for attr in &tx.attributes {
            match attr {
                TransactionAttribute::HighPriority => {
                    let committee = natives.neo().committee_address(dao, settings);
                    if !tx.signers.iter().any(|s| s.account == committee) {
                        return Err(VerifyError::InvalidAttribute {
                            kind: "HighPriority",
                            reason: "committee is not a signer".into(),
                        });
                    }
                }
                TransactionAttribute::OracleResponse { id, .. } => {
                    self.verify_oracle_response(dao, tx, *id)?;
                }
                TransactionAttribute::NotValidBefore { height: nvb } => {
                    if !settings.p2p_sig_extensions {
                        return Err(VerifyError::InvalidAttribute {
                            kind: "NotValidBefore",
                            reason: "P2PSigExtensions disabled".into(),
                        });
                    }
                    if height < *nvb {
                        return Err(VerifyError::InvalidAttribute {
                            kind: "NotValidBefore",
                            reason: format!("valid from {nvb}, current height {height}"),
                        });
                    }
                    let max_delta = natives.notary().max_not_valid_before_delta(dao);
                    if *nvb > height + max_delta {
                        return Err(VerifyError::InvalidAttribute {
                            kind: "NotValidBefore",
                            reason: "height delta too large".into(),
                        });
                    }
                }
                TransactionAttribute::Conflicts { hash } => {
                    if !settings.p2p_sig_extensions {
                        return Err(VerifyError::InvalidAttribute {
                            kind: "Conflicts",
                            reason: "P2PSigExtensions disabled".into(),
                        });
                    }
                    if conflict_targets.contains(&hash) {
                        return Err(VerifyError::InvalidAttribute {
                            kind: "Conflicts",
                            reason: "duplicate conflict hash".into(),
                        });
                    }
                    if *hash == tx.hash() {
                        return Err(VerifyError::InvalidAttribute {
                            kind: "Conflicts",
                            reason: "transaction conflicts with itself".into(),
                        });
                    }
                    conflict_targets.push(hash);
                }
                TransactionAttribute::NotaryAssisted { .. } => {
                    if !settings.p2p_sig_extensions {
                        return Err(VerifyError::InvalidAttribute {
                            kind: "NotaryAssisted",
                            reason: "P2PSigExtensions disabled".into(),
                        });
                    }
                    let notary = natives.notary().hash();
                    let has_notary_signer = tx
                        .signers
                        .iter()
                        .any(|s| s.account == notary && s.scopes == WitnessScope::NONE);
                    if !has_notary_signer {
                        return Err(VerifyError::InvalidAttribute {
                            kind: "NotaryAssisted",
                            reason: "Notary is not a fee-only signer".into(),
                        });
                    }
                }
                TransactionAttribute::Reserved { attr_type, .. } => {
                    if !settings.reserved_attributes {
                        return Err(VerifyError::InvalidAttribute {
                            kind: "Reserved",
                            reason: format!("type {attr_type:#04x} not enabled"),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn verify_oracle_response(
        &self,
        dao: &Dao,
        tx: &Transaction,
        id: u64,
    ) -> VerifyResult<()> {
        let natives = self.natives();
        let oracle = natives.oracle();
        if tx.script != oracle.response_script() {
            return Err(VerifyError::InvalidAttribute {
                kind: "OracleResponse",
                reason: "script is not the canonical response script".into(),
            });
        }
        let request = oracle.get_request(dao, id).ok_or(VerifyError::InvalidAttribute {
            kind: "OracleResponse",
            reason: format!("unknown request id {id}"),
        })?;
        if tx.system_fee + tx.network_fee != request.gas_for_response {
            return Err(VerifyError::InvalidAttribute {
                kind: "OracleResponse",
                reason: "fees do not match the requester's response gas".into(),
            });
        }
        // The first signer must be the designated oracle multisig with a
        // fee-only scope.
        let nodes = natives.role_management().designated_by_role(
            dao,
            neonova_contract::native::role_management::Role::Oracle,
            dao.height().unwrap_or(0) + 1,
        );
        if nodes.is_empty() {
            return Err(VerifyError::InvalidAttribute {
                kind: "OracleResponse",
                reason: "no oracle nodes designated".into(),
            });
        }
        let m = nodes.len() - (nodes.len() - 1) / 3;
        let oracle_account = neonova_contract::create_multisig_script(m, &nodes)
            .map(|script| UInt160::from_array(neonova_crypto::hash160(&script)))
            .unwrap_or_default();
        let first_ok = tx
            .signers
            .first()
            .map(|s| s.account == oracle_account && s.scopes == WitnessScope::NONE)
            .unwrap_or(false);
        if !first_ok {
            return Err(VerifyError::InvalidAttribute {
                kind: "OracleResponse",
                reason: "first signer is not the oracle committee".into(),
            });
        }
        Ok(())
    }

    // ---- witnesses --------------------------------------------------------

    /// Runs one witness in an isolated verification engine; returns the gas
    /// it consumed.
    fn verify_witness(
        &self,
        dao: &Dao,
        tx: &Transaction,
        signer: &Signer,
        witness: &Witness,
        gas_budget: i64,
    ) -> VerifyResult<i64> {
        if !invocation_is_push_only(&witness.invocation_script) {
            return Err(VerifyError::InvalidInvocation);
        }
        // Verification runs against a throwaway overlay so even a buggy
        // handler cannot leak writes.
        let overlay = Arc::new(MemCachedStore::new(dao.store().clone()));
        let scratch = Dao::new(overlay as Arc<dyn Store>);
        let mut engine = ApplicationEngine::new(
            TriggerType::Verification,
            Some(tx.clone()),
            scratch,
            None,
            self.settings_arc(),
            self.natives(),
            gas_budget,
        );

        if witness.is_contract_witness() {
            let is_native = self.natives().by_hash(&signer.account).is_some();
            if is_native {
                let has_verify = self
                    .natives()
                    .by_hash(&signer.account)
                    .map(|n| n.methods().iter().any(|m| m.name == "verify"))
                    .unwrap_or(false);
                if !has_verify {
                    return Err(VerifyError::NativeContractWitness);
                }
            }
            let contract = engine
                .contract_by_hash(&signer.account)
                .ok_or(VerifyError::UnknownVerificationContract(signer.account))?;
            if contract.manifest.method_any_arity("verify").is_none() {
                return Err(VerifyError::InvalidVerificationContract);
            }
            // The invocation script produces the verify arguments.
            let args = if witness.invocation_script.is_empty() {
                Vec::new()
            } else {
                engine
                    .load_entry_script(witness.invocation_script.clone(), CallFlags::NONE)
                    .map_err(|e| VerifyError::VerificationFailed(e.to_string()))?;
                if engine.execute() != VmState::Halt {
                    return Err(VerifyError::VerificationFailed(
                        "invocation script faulted".into(),
                    ));
                }
                let mut args: Vec<StackItem> = Vec::new();
                while !engine.vm().result_stack().is_empty() {
                    args.push(
                        engine
                            .vm_mut()
                            .result_stack_mut()
                            .pop()
                            .map_err(|e| VerifyError::VerificationFailed(e.to_string()))?,
                    );
                }
                args.reverse();
                engine.vm_mut().set_state(VmState::Break);
                args
            };
            engine
                .load_verify_frame(signer.account, args)
                .map_err(|_| VerifyError::InvalidVerificationContract)?;
        } else {
            if witness.script_hash() != signer.account {
                return Err(VerifyError::WitnessHashMismatch);
            }
            if Script::new(witness.verification_script.clone())
                .validate()
                .is_err()
            {
                return Err(VerifyError::VerificationFailed(
                    "malformed verification script".into(),
                ));
            }
            // Verification first, invocation on top: the invocation frame
            // returns its pushes onto the verification stack.
            engine
                .load_entry_script(witness.verification_script.clone(), CallFlags::READ_ONLY)
                .map_err(|e| VerifyError::VerificationFailed(e.to_string()))?;
            engine
                .load_entry_script(witness.invocation_script.clone(), CallFlags::NONE)
                .map_err(|e| VerifyError::VerificationFailed(e.to_string()))?;
        }

        let state = engine.execute();
        if state != VmState::Halt {
            return Err(VerifyError::VerificationFailed(
                engine
                    .exception_message()
                    .unwrap_or_else(|| "witness execution faulted".into()),
            ));
        }
        let results = engine.vm().result_stack().items();
        if results.len() != 1 {
            return Err(VerifyError::VerificationFailed(format!(
                "verification left {} results",
                results.len()
            )));
        }
        let truthy = results[0]
            .to_bool()
            .map_err(|e| VerifyError::VerificationFailed(e.to_string()))?;
        if !truthy {
            return Err(VerifyError::VerificationFailed(
                "verification returned false".into(),
            ));
        }
        Ok(engine.gas_consumed())
    }
}

/// Invocation scripts may only push data.
fn invocation_is_push_only(script: &[u8]) -> bool {
    let parsed = Script::new(script.to_vec());
    let mut position = 0usize;
    while position < script.len() {
        let Ok(instruction) = parsed.instruction_at(position) else {
            return false;
        };
        if instruction.opcode as u8 > OpCode::PUSH16 as u8 {
            return false;
        }
        position += instruction.size();
    }
    true
}
