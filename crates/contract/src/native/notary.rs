//! The Notary native: GAS deposits funding notary-assisted transactions.

use super::role_management::Role;
use super::{
    get_int_setting, int_to_bytes, native_hash, storage_delete, storage_get, storage_put,
    NativeContract, NativeMethodMeta,
};
use crate::dao::Dao;
use crate::engine::ApplicationEngine;
use neonova_config::GAS_FACTOR;
use neonova_core::{TransactionAttribute, UInt160, WitnessScope};
use neonova_io::{BinaryWriter, MemoryReader};
use neonova_vm::stack_item::{bigint_to_bytes, bytes_to_bigint};
use neonova_vm::{StackItem, VmError, VmResult};
use num_bigint::BigInt;
use num_traits::{Signed, Zero};

const ID: i32 = -10;

const PREFIX_DEPOSIT: u8 = 1;
const KEY_MAX_NVB_DELTA: &[u8] = &[10];

const DEFAULT_MAX_NVB_DELTA: i64 = 140;
/// Fee charged per notary key, in datoshi.
pub const DEFAULT_SERVICE_FEE_PER_KEY: i64 = GAS_FACTOR / 10;

#[derive(Debug, Clone, Default)]
struct Deposit {
    amount: BigInt,
    till: u32,
}

impl Deposit {
    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        writer.write_var_bytes(&bigint_to_bytes(&self.amount));
        writer.write_u32(self.till);
        writer.into_bytes()
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let mut reader = MemoryReader::new(bytes);
        let amount = bytes_to_bigint(&reader.read_var_bytes(33).ok()?).ok()?;
        let till = reader.read_u32().ok()?;
        Some(Self { amount, till })
    }
}

pub struct Notary {
    hash: UInt160,
    methods: Vec<NativeMethodMeta>,
}

impl Notary {
    pub fn new() -> Self {
        let methods = vec![
            NativeMethodMeta::safe("expirationOf", 1, 1 << 15),
            NativeMethodMeta::safe("balanceOf", 1, 1 << 15),
            NativeMethodMeta::write("lockDepositUntil", 2, 1 << 15),
            NativeMethodMeta::write("withdraw", 2, 1 << 15),
            NativeMethodMeta::safe("getMaxNotValidBeforeDelta", 0, 1 << 15),
            NativeMethodMeta::write_void("setMaxNotValidBeforeDelta", 1, 1 << 15),
            NativeMethodMeta::write_void("onNEP17Payment", 3, 1 << 15),
            NativeMethodMeta::safe("verify", 1, 1 << 15),
        ];
        Self {
            hash: native_hash("Notary"),
            methods,
        }
    }

    pub fn service_fee_per_key(&self, _dao: &Dao) -> i64 {
        DEFAULT_SERVICE_FEE_PER_KEY
    }

    pub fn max_not_valid_before_delta(&self, dao: &Dao) -> u32 {
        get_int_setting(dao, ID, KEY_MAX_NVB_DELTA, DEFAULT_MAX_NVB_DELTA) as u32
    }

    pub fn deposit_of(&self, dao: &Dao, account: &UInt160) -> (BigInt, u32) {
        storage_get(dao, ID, &deposit_key(account))
            .and_then(|b| Deposit::from_bytes(&b))
            .map(|d| (d.amount, d.till))
            .unwrap_or((BigInt::zero(), 0))
    }

    fn put_deposit(&self, dao: &Dao, account: &UInt160, deposit: &Deposit) {
        if deposit.amount.is_zero() {
            storage_delete(dao, ID, &deposit_key(account));
        } else {
            storage_put(dao, ID, &deposit_key(account), deposit.to_bytes());
        }
    }

    /// Whether the given hash is a currently designated notary node account.
    fn is_notary_node(&self, engine: &ApplicationEngine, account: &UInt160) -> bool {
        let nodes = engine.natives().role_management().designated_by_role(
            engine.snapshot(),
            Role::P2pNotary,
            engine.block_height(),
        );
        nodes.iter().any(|key| {
            let script = crate::standard::create_signature_script(key);
            UInt160::from_array(neonova_crypto::hash160(&script)) == *account
        })
    }
}

impl Default for Notary {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for Notary {
    fn name(&self) -> &'static str {
        "Notary"
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

    /// Debits depositor accounts for each notary-assisted transaction in the
    /// persisting block and pays the designated notary nodes.
    fn on_persist(&self, engine: &mut ApplicationEngine) -> VmResult<()> {
        if !engine.settings().p2p_sig_extensions {
            return Ok(());
        }
        let Some(block) = engine.persisting_block().cloned() else {
            return Ok(());
        };
        let fee_per_key = self.service_fee_per_key(engine.snapshot());
        let mut total: BigInt = BigInt::zero();
        for tx in &block.transactions {
            for attr in tx.attributes_of(TransactionAttribute::NOTARY_ASSISTED) {
                if let TransactionAttribute::NotaryAssisted { n_keys } = attr {
                    let fee = BigInt::from((*n_keys as i64 + 1) * fee_per_key);
                    let payer = tx.sender();
                    let (amount, till) = self.deposit_of(engine.snapshot(), &payer);
                    let remaining = amount - &fee;
                    if remaining.is_negative() {
                        continue;
                    }
                    self.put_deposit(
                        engine.snapshot(),
                        &payer,
                        &Deposit {
                            amount: remaining,
                            till,
                        },
                    );
                    total += fee;
                }
            }
        }
        if total.is_positive() {
            let nodes = engine.natives().role_management().designated_by_role(
                engine.snapshot(),
                Role::P2pNotary,
                engine.block_height(),
            );
            if let Some(node) = nodes.first() {
                let script = crate::standard::create_signature_script(node);
                let account = UInt160::from_array(neonova_crypto::hash160(&script));
                let gas = engine.natives().gas();
                gas.mint(engine, &account, &total, false)?;
            }
        }
        Ok(())
    }

    fn invoke(
        &self,
        engine: &mut ApplicationEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> VmResult<StackItem> {
        match method {
            "expirationOf" => {
                let account = super::policy::account_arg(&args[0])?;
                let (_, till) = self.deposit_of(engine.snapshot(), &account);
                Ok(StackItem::from_int(till as i64))
            }
            "balanceOf" => {
                let account = super::policy::account_arg(&args[0])?;
                let (amount, _) = self.deposit_of(engine.snapshot(), &account);
                Ok(StackItem::Integer(amount))
            }
            "lockDepositUntil" => {
                let account = super::policy::account_arg(&args[0])?;
                let till = args[1].as_i64()? as u32;
                if !engine.check_witness(&account)? {
                    return Ok(StackItem::Boolean(false));
                }
                let (amount, current_till) = self.deposit_of(engine.snapshot(), &account);
                if amount.is_zero() || till < current_till || till <= engine.block_height() {
                    return Ok(StackItem::Boolean(false));
                }
                self.put_deposit(engine.snapshot(), &account, &Deposit { amount, till });
                Ok(StackItem::Boolean(true))
            }
            "withdraw" => {
                let from = super::policy::account_arg(&args[0])?;
                let to = super::policy::account_arg(&args[1])?;
                if !engine.check_witness(&from)? {
                    return Ok(StackItem::Boolean(false));
                }
                let (amount, till) = self.deposit_of(engine.snapshot(), &from);
                if amount.is_zero() || till > engine.block_height() {
                    return Ok(StackItem::Boolean(false));
                }
                self.put_deposit(
                    engine.snapshot(),
                    &from,
                    &Deposit {
                        amount: BigInt::zero(),
                        till: 0,
                    },
                )
                ;
                // The locked GAS sits on the Notary account; hand it back.
                let gas = engine.natives().gas();
                let notary_hash = self.hash;
                let moved = gas.transfer_for_native(engine, notary_hash, to, &amount)?;
                Ok(StackItem::Boolean(moved))
            }
            "getMaxNotValidBeforeDelta" => Ok(StackItem::from_int(
                self.max_not_valid_before_delta(engine.snapshot()) as i64,
            )),
            "setMaxNotValidBeforeDelta" => {
                let value = args[0].as_i64()?;
                if value <= 0 || value > u32::MAX as i64 {
                    return Err(VmError::throw("invalid MaxNotValidBeforeDelta"));
                }
                if !engine.check_committee()? {
                    return Err(VmError::throw("invalid committee signature"));
                }
                storage_put(engine.snapshot(), ID, KEY_MAX_NVB_DELTA, int_to_bytes(value));
                Ok(StackItem::Null)
            }
            "onNEP17Payment" => {
                // Deposits arrive exclusively as GAS transfers carrying
                // `[account, till]` data.
                let gas_hash = engine.natives().gas().hash();
                let caller = engine.vm().current_context()?.script_hash();
                if caller != gas_hash {
                    return Err(VmError::throw("notary deposits accept GAS only"));
                }
                let amount = args[1].as_int()?;
                let data = engine.array_arg(&args[2])?;
                if data.len() != 2 {
                    return Err(VmError::throw("deposit data must be [account, till]"));
                }
                let account = if data[0].is_null() {
                    super::policy::account_arg(&args[0])?
                } else {
                    super::policy::account_arg(&data[0])?
                };
                let till = data[1].as_i64()? as u32;
                if till <= engine.block_height() {
                    return Err(VmError::throw("deposit lock height already passed"));
                }
                let (current, current_till) = self.deposit_of(engine.snapshot(), &account);
                if current.is_zero() && amount < BigInt::from(2 * DEFAULT_SERVICE_FEE_PER_KEY) {
                    return Err(VmError::throw("first deposit too small"));
                }
                let till = till.max(current_till);
                self.put_deposit(
                    engine.snapshot(),
                    &account,
                    &Deposit {
                        amount: current + amount,
                        till,
                    },
                );
                Ok(StackItem::Null)
            }
            "verify" => {
                // A notary witness is a single signature by any designated
                // notary node over a notary-assisted transaction.
                let signature = args[0].as_bytes()?;
                let Some(tx) = engine.container().cloned() else {
                    return Ok(StackItem::Boolean(false));
                };
                let has_attr = tx
                    .attributes_of(TransactionAttribute::NOTARY_ASSISTED)
                    .next()
                    .is_some();
                if !has_attr {
                    return Ok(StackItem::Boolean(false));
                }
                let notary_signer_ok = tx
                    .signers
                    .iter()
                    .any(|s| s.account == self.hash && s.scopes == WitnessScope::NONE);
                if !notary_signer_ok {
                    return Ok(StackItem::Boolean(false));
                }
                let message = tx.sign_data(engine.settings().network);
                let nodes = engine.natives().role_management().designated_by_role(
                    engine.snapshot(),
                    Role::P2pNotary,
                    engine.block_height(),
                );
                let valid = nodes.iter().any(|key| {
                    neonova_crypto::verify_signature(&message, &signature, key.as_bytes())
                });
                Ok(StackItem::Boolean(valid))
            }
            _ => Err(VmError::throw(format!("unknown Notary method {method}"))),
        }
    }
}

fn deposit_key(account: &UInt160) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(PREFIX_DEPOSIT);
    key.extend_from_slice(account.as_bytes());
    key
}
