//! The GAS utility token.

use super::nep17::post_transfer;
use super::{native_hash, storage_delete, storage_get, storage_put, NativeContract, NativeMethodMeta};
use crate::dao::Dao;
use crate::engine::ApplicationEngine;
use neonova_core::{TransactionAttribute, UInt160};
use neonova_vm::stack_item::{bigint_to_bytes, bytes_to_bigint};
use neonova_vm::{StackItem, VmError, VmResult};
use num_bigint::BigInt;
use num_traits::{Signed, Zero};

const ID: i32 = -6;

const PREFIX_BALANCE: u8 = 20;
const KEY_TOTAL_SUPPLY: &[u8] = &[11];

pub const DECIMALS: u32 = 8;

pub struct GasToken {
    hash: UInt160,
    methods: Vec<NativeMethodMeta>,
}

impl GasToken {
    pub fn new() -> Self {
        let methods = vec![
            NativeMethodMeta::pure("symbol", 0, 0),
            NativeMethodMeta::pure("decimals", 0, 0),
            NativeMethodMeta::safe("totalSupply", 0, 1 << 15),
            NativeMethodMeta::safe("balanceOf", 1, 1 << 15),
            NativeMethodMeta::write("transfer", 4, 1 << 17),
        ];
        Self {
            hash: native_hash("GasToken"),
            methods,
        }
    }

    pub fn balance_of(&self, dao: &Dao, account: &UInt160) -> BigInt {
        storage_get(dao, ID, &balance_key(account))
            .and_then(|bytes| bytes_to_bigint(&bytes).ok())
            .unwrap_or_else(BigInt::zero)
    }

    pub fn total_supply(&self, dao: &Dao) -> BigInt {
        storage_get(dao, ID, KEY_TOTAL_SUPPLY)
            .and_then(|bytes| bytes_to_bigint(&bytes).ok())
            .unwrap_or_else(BigInt::zero)
    }

    fn set_balance(&self, dao: &Dao, account: &UInt160, balance: &BigInt) {
        if balance.is_zero() {
            storage_delete(dao, ID, &balance_key(account));
        } else {
            storage_put(dao, ID, &balance_key(account), bigint_to_bytes(balance));
        }
    }

    fn adjust_total_supply(&self, dao: &Dao, delta: &BigInt) {
        let supply = self.total_supply(dao) + delta;
        storage_put(dao, ID, KEY_TOTAL_SUPPLY, bigint_to_bytes(&supply));
    }

    /// Creates GAS out of thin air; fee distribution and genesis only.
    pub fn mint(
        &self,
        engine: &mut ApplicationEngine,
        account: &UInt160,
        amount: &BigInt,
        call_on_payment: bool,
    ) -> VmResult<()> {
        if amount.is_negative() {
            return Err(VmError::throw("mint amount cannot be negative"));
        }
        if amount.is_zero() {
            return Ok(());
        }
        let balance = self.balance_of(engine.snapshot(), account) + amount;
        self.set_balance(engine.snapshot(), account, &balance);
        self.adjust_total_supply(engine.snapshot(), amount);
        if call_on_payment {
            post_transfer(engine, self.hash, None, Some(*account), amount, StackItem::Null)
        } else {
            // Fee credits skip the payment hook but keep the Transfer
            // notification observable.
            let rc = engine.vm().reference_counter().clone();
            let state = StackItem::new_array(
                &rc,
                vec![
                    StackItem::Null,
                    StackItem::from_bytes(account.to_vec()),
                    StackItem::Integer(amount.clone()),
                ],
            )?;
            let serialized = neonova_vm::stack_item::serialize_item(&state)?;
            engine.add_notification(self.hash, "Transfer".to_string(), serialized);
            Ok(())
        }
    }

    /// Destroys GAS from an account; fee payment.
    pub fn burn(
        &self,
        engine: &mut ApplicationEngine,
        account: &UInt160,
        amount: &BigInt,
    ) -> VmResult<()> {
        if amount.is_negative() {
            return Err(VmError::throw("burn amount cannot be negative"));
        }
        if amount.is_zero() {
            return Ok(());
        }
        let balance = self.balance_of(engine.snapshot(), account);
        if balance < *amount {
            return Err(VmError::throw(format!(
                "insufficient GAS balance in {account}"
            )));
        }
        let remaining = balance - amount;
        self.set_balance(engine.snapshot(), account, &remaining);
        self.adjust_total_supply(engine.snapshot(), &-amount.clone());
        let rc = engine.vm().reference_counter().clone();
        let state = StackItem::new_array(
            &rc,
            vec![
                StackItem::from_bytes(account.to_vec()),
                StackItem::Null,
                StackItem::Integer(amount.clone()),
            ],
        )?;
        let serialized = neonova_vm::stack_item::serialize_item(&state)?;
        engine.add_notification(self.hash, "Transfer".to_string(), serialized);
        Ok(())
    }

    /// Moves GAS out of a native-controlled account without a witness
    /// check; used by natives paying out funds they already hold.
    pub fn transfer_for_native(
        &self,
        engine: &mut ApplicationEngine,
        from: UInt160,
        to: UInt160,
        amount: &BigInt,
    ) -> VmResult<bool> {
        let from_balance = self.balance_of(engine.snapshot(), &from);
        if from_balance < *amount || amount.is_negative() {
            return Ok(false);
        }
        self.set_balance(engine.snapshot(), &from, &(&from_balance - amount));
        let to_balance = self.balance_of(engine.snapshot(), &to) + amount;
        self.set_balance(engine.snapshot(), &to, &to_balance);
        post_transfer(engine, self.hash, Some(from), Some(to), amount, StackItem::Null)?;
        Ok(true)
    }

    fn transfer_internal(
        &self,
        engine: &mut ApplicationEngine,
        from: UInt160,
        to: UInt160,
        amount: BigInt,
        data: StackItem,
    ) -> VmResult<bool> {
        if amount.is_negative() {
            return Err(VmError::throw("transfer amount cannot be negative"));
        }
        if !engine.check_witness(&from)? {
            return Ok(false);
        }
        let from_balance = self.balance_of(engine.snapshot(), &from);
        if from_balance < amount {
            return Ok(false);
        }
        if from != to && !amount.is_zero() {
            self.set_balance(engine.snapshot(), &from, &(&from_balance - &amount));
            let to_balance = self.balance_of(engine.snapshot(), &to) + &amount;
            self.set_balance(engine.snapshot(), &to, &to_balance);
        }
        post_transfer(engine, self.hash, Some(from), Some(to), &amount, data)?;
        Ok(true)
    }
}

impl Default for GasToken {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for GasToken {
    fn name(&self) -> &'static str {
        "GasToken"
    }

    fn id(&self) -> i32 {
        ID
    }

    fn hash(&self) -> UInt160 {
        self.hash
    }

    fn methods(&self) -> &[NativeMethodMeta] {
        &self.methods
    }

    fn initialize(&self, engine: &mut ApplicationEngine) -> VmResult<()> {
        let committee = engine
            .natives()
            .neo()
            .committee_address(engine.snapshot(), engine.settings());
        let initial = BigInt::from(engine.settings().initial_gas_distribution);
        self.mint(engine, &committee, &initial, false)
    }

    /// Burns each transaction's fees from its sender.
    fn on_persist(&self, engine: &mut ApplicationEngine) -> VmResult<()> {
        let Some(block) = engine.persisting_block().cloned() else {
            return Err(VmError::invalid_operation("GAS OnPersist without block"));
        };
        for tx in &block.transactions {
            let total = BigInt::from(tx.system_fee) + BigInt::from(tx.network_fee);
            self.burn(engine, &tx.sender(), &total)?;
        }
        Ok(())
    }

    /// Credits the block's network fees to the primary validator.
    fn post_persist(&self, engine: &mut ApplicationEngine) -> VmResult<()> {
        let Some(block) = engine.persisting_block().cloned() else {
            return Err(VmError::invalid_operation("GAS PostPersist without block"));
        };
        let notary_fee_per_key = engine
            .natives()
            .notary()
            .service_fee_per_key(engine.snapshot());
        let mut net_fee: BigInt = BigInt::zero();
        for tx in &block.transactions {
            let mut fee = BigInt::from(tx.network_fee);
            if engine.settings().p2p_sig_extensions {
                for attr in tx.attributes_of(TransactionAttribute::NOTARY_ASSISTED) {
                    if let TransactionAttribute::NotaryAssisted { n_keys } = attr {
                        // The notary share is paid out by the Notary native.
                        fee -= BigInt::from((*n_keys as i64 + 1) * notary_fee_per_key);
                    }
                }
            }
            net_fee += fee;
        }
        let primary = engine
            .natives()
            .neo()
            .primary_validator_account(engine.snapshot(), engine.settings(), &block);
        self.mint(engine, &primary, &net_fee, false)
    }

    fn invoke(
        &self,
        engine: &mut ApplicationEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> VmResult<StackItem> {
        match method {
            "symbol" => Ok(StackItem::from_string("GAS")),
            "decimals" => Ok(StackItem::from_int(DECIMALS as i64)),
            "totalSupply" => Ok(StackItem::Integer(self.total_supply(engine.snapshot()))),
            "balanceOf" => {
                let account = super::policy::account_arg(&args[0])?;
                Ok(StackItem::Integer(
                    self.balance_of(engine.snapshot(), &account),
                ))
            }
            "transfer" => {
                let from = super::policy::account_arg(&args[0])?;
                let to = super::policy::account_arg(&args[1])?;
                let amount = args[2].as_int()?;
                let data = args[3].clone();
                let ok = self.transfer_internal(engine, from, to, amount, data)?;
                Ok(StackItem::Boolean(ok))
            }
            _ => Err(VmError::throw(format!("unknown GAS method {method}"))),
        }
    }
}

fn balance_key(account: &UInt160) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(PREFIX_BALANCE);
    key.extend_from_slice(account.as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_key_layout() {
        let key = balance_key(&UInt160::from_array([7; 20]));
        assert_eq!(key[0], PREFIX_BALANCE);
        assert_eq!(key.len(), 21);
    }
}
