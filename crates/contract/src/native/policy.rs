//! The Policy native contract: chain-wide fee parameters and the blocked
//! account list.

use super::{
    get_int_setting, int_to_bytes, native_hash, storage_delete, storage_get, storage_put,
    NativeContract, NativeMethodMeta,
};
use crate::dao::Dao;
use crate::engine::ApplicationEngine;
use neonova_core::UInt160;
use neonova_vm::{StackItem, VmError, VmResult};
use parking_lot::RwLock;

const ID: i32 = -7;

const KEY_FEE_PER_BYTE: &[u8] = &[10];
const KEY_EXEC_FEE_FACTOR: &[u8] = &[18];
const KEY_STORAGE_PRICE: &[u8] = &[19];
const PREFIX_ATTRIBUTE_FEE: u8 = 20;
const PREFIX_BLOCKED_ACCOUNT: u8 = 15;

pub const DEFAULT_FEE_PER_BYTE: i64 = 1000;
pub const DEFAULT_EXEC_FEE_FACTOR: u32 = 30;
pub const DEFAULT_STORAGE_PRICE: u32 = 100_000;
pub const DEFAULT_ATTRIBUTE_FEE: u32 = 0;

const MAX_FEE_PER_BYTE: i64 = 100_000_000;
const MAX_EXEC_FEE_FACTOR: u32 = 100;
const MAX_STORAGE_PRICE: u32 = 10_000_000;
const MAX_ATTRIBUTE_FEE: u32 = 10_0000_0000;

/// Hot values mirrored from storage. When `is_valid` is set they equal the
/// values derivable from the committed DAO at the last PostPersist; any
/// in-block mutation clears the flag and readers fall through to storage.
#[derive(Default)]
struct PolicyCache {
    is_valid: bool,
    fee_per_byte: i64,
    exec_fee_factor: u32,
    storage_price: u32,
    /// Sorted for binary search.
    blocked_accounts: Vec<UInt160>,
}

pub struct PolicyContract {
    hash: UInt160,
    methods: Vec<NativeMethodMeta>,
    cache: RwLock<PolicyCache>,
}

impl PolicyContract {
    pub fn new() -> Self {
        let methods = vec![
            NativeMethodMeta::safe("getFeePerByte", 0, 1 << 15),
            NativeMethodMeta::safe("getExecFeeFactor", 0, 1 << 15),
            NativeMethodMeta::safe("getStoragePrice", 0, 1 << 15),
            NativeMethodMeta::safe("getAttributeFee", 1, 1 << 15),
            NativeMethodMeta::safe("isBlocked", 1, 1 << 15),
            NativeMethodMeta::write_void("setFeePerByte", 1, 1 << 15),
            NativeMethodMeta::write_void("setExecFeeFactor", 1, 1 << 15),
            NativeMethodMeta::write_void("setStoragePrice", 1, 1 << 15),
            NativeMethodMeta::write_void("setAttributeFee", 2, 1 << 15),
            NativeMethodMeta::write("blockAccount", 1, 1 << 15),
            NativeMethodMeta::write("unblockAccount", 1, 1 << 15),
        ];
        Self {
            hash: native_hash("PolicyContract"),
            methods,
            cache: RwLock::new(PolicyCache::default()),
        }
    }

    // ---- internal readers (cache-aware) ---------------------------------

    pub fn fee_per_byte(&self, dao: &Dao) -> i64 {
        let cache = self.cache.read();
        if cache.is_valid {
            return cache.fee_per_byte;
        }
        get_int_setting(dao, ID, KEY_FEE_PER_BYTE, DEFAULT_FEE_PER_BYTE)
    }

    pub fn exec_fee_factor(&self, dao: &Dao) -> u32 {
        let cache = self.cache.read();
        if cache.is_valid {
            return cache.exec_fee_factor;
        }
        get_int_setting(dao, ID, KEY_EXEC_FEE_FACTOR, DEFAULT_EXEC_FEE_FACTOR as i64) as u32
    }

    pub fn storage_price(&self, dao: &Dao) -> u32 {
        let cache = self.cache.read();
        if cache.is_valid {
            return cache.storage_price;
        }
        get_int_setting(dao, ID, KEY_STORAGE_PRICE, DEFAULT_STORAGE_PRICE as i64) as u32
    }

    pub fn attribute_fee(&self, dao: &Dao, attr_type: u8) -> u32 {
        get_int_setting(
            dao,
            ID,
            &[PREFIX_ATTRIBUTE_FEE, attr_type],
            DEFAULT_ATTRIBUTE_FEE as i64,
        ) as u32
    }

    pub fn is_blocked(&self, dao: &Dao, account: &UInt160) -> bool {
        let cache = self.cache.read();
        if cache.is_valid {
            return cache.blocked_accounts.binary_search(account).is_ok();
        }
        storage_get(dao, ID, &blocked_key(account)).is_some()
    }

    fn invalidate(&self) {
        self.cache.write().is_valid = false;
    }

    fn require_committee(&self, engine: &mut ApplicationEngine) -> VmResult<()> {
        if !engine.check_committee()? {
            return Err(VmError::throw("invalid committee signature"));
        }
        Ok(())
    }
}

impl Default for PolicyContract {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for PolicyContract {
    fn name(&self) -> &'static str {
        "PolicyContract"
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
        let dao = engine.snapshot();
        storage_put(dao, ID, KEY_FEE_PER_BYTE, int_to_bytes(DEFAULT_FEE_PER_BYTE));
        storage_put(
            dao,
            ID,
            KEY_EXEC_FEE_FACTOR,
            int_to_bytes(DEFAULT_EXEC_FEE_FACTOR as i64),
        );
        storage_put(
            dao,
            ID,
            KEY_STORAGE_PRICE,
            int_to_bytes(DEFAULT_STORAGE_PRICE as i64),
        );
        let mut cache = self.cache.write();
        *cache = PolicyCache {
            is_valid: true,
            fee_per_byte: DEFAULT_FEE_PER_BYTE,
            exec_fee_factor: DEFAULT_EXEC_FEE_FACTOR,
            storage_price: DEFAULT_STORAGE_PRICE,
            blocked_accounts: Vec::new(),
        };
        Ok(())
    }

    fn post_persist(&self, engine: &mut ApplicationEngine) -> VmResult<()> {
        let mut cache = self.cache.write();
        if cache.is_valid {
            return Ok(());
        }
        let dao = engine.snapshot();
        cache.fee_per_byte = get_int_setting(dao, ID, KEY_FEE_PER_BYTE, DEFAULT_FEE_PER_BYTE);
        cache.exec_fee_factor =
            get_int_setting(dao, ID, KEY_EXEC_FEE_FACTOR, DEFAULT_EXEC_FEE_FACTOR as i64) as u32;
        cache.storage_price =
            get_int_setting(dao, ID, KEY_STORAGE_PRICE, DEFAULT_STORAGE_PRICE as i64) as u32;
        let mut blocked = Vec::new();
        for (key, _) in dao.find_storage(ID, &[PREFIX_BLOCKED_ACCOUNT], false) {
            if let Ok(account) = UInt160::from_slice(&key[1..]) {
                blocked.push(account);
            }
        }
        blocked.sort();
        cache.blocked_accounts = blocked;
        cache.is_valid = true;
        Ok(())
    }

    fn invoke(
        &self,
        engine: &mut ApplicationEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> VmResult<StackItem> {
        match method {
            "getFeePerByte" => Ok(StackItem::from_int(self.fee_per_byte(engine.snapshot()))),
            "getExecFeeFactor" => Ok(StackItem::from_int(
                self.exec_fee_factor(engine.snapshot()) as i64,
            )),
            "getStoragePrice" => Ok(StackItem::from_int(
                self.storage_price(engine.snapshot()) as i64,
            )),
            "getAttributeFee" => {
                let attr_type = args[0].as_i64()?;
                let attr_type = u8::try_from(attr_type)
                    .map_err(|_| VmError::throw("invalid attribute type"))?;
                Ok(StackItem::from_int(
                    self.attribute_fee(engine.snapshot(), attr_type) as i64,
                ))
            }
            "isBlocked" => {
                let account = account_arg(&args[0])?;
                Ok(StackItem::Boolean(
                    self.is_blocked(engine.snapshot(), &account),
                ))
            }
            "setFeePerByte" => {
                let value = args[0].as_i64()?;
                if !(0..=MAX_FEE_PER_BYTE).contains(&value) {
                    return Err(VmError::throw(format!(
                        "FeePerByte shouldn't be negative or greater than {MAX_FEE_PER_BYTE}"
                    )));
                }
                self.require_committee(engine)?;
                storage_put(engine.snapshot(), ID, KEY_FEE_PER_BYTE, int_to_bytes(value));
                self.invalidate();
                Ok(StackItem::Null)
            }
            "setExecFeeFactor" => {
                let value = args[0].as_i64()?;
                if value <= 0 || value > MAX_EXEC_FEE_FACTOR as i64 {
                    return Err(VmError::throw(format!(
                        "ExecFeeFactor must be between 0 and {MAX_EXEC_FEE_FACTOR}"
                    )));
                }
                self.require_committee(engine)?;
                storage_put(engine.snapshot(), ID, KEY_EXEC_FEE_FACTOR, int_to_bytes(value));
                self.invalidate();
                Ok(StackItem::Null)
            }
            "setStoragePrice" => {
                let value = args[0].as_i64()?;
                if value <= 0 || value > MAX_STORAGE_PRICE as i64 {
                    return Err(VmError::throw(format!(
                        "StoragePrice must be between 0 and {MAX_STORAGE_PRICE}"
                    )));
                }
                self.require_committee(engine)?;
                storage_put(engine.snapshot(), ID, KEY_STORAGE_PRICE, int_to_bytes(value));
                self.invalidate();
                Ok(StackItem::Null)
            }
            "setAttributeFee" => {
                let attr_type = u8::try_from(args[0].as_i64()?)
                    .map_err(|_| VmError::throw("invalid attribute type"))?;
                let value = args[1].as_i64()?;
                if value < 0 || value > MAX_ATTRIBUTE_FEE as i64 {
                    return Err(VmError::throw("attribute fee out of range"));
                }
                self.require_committee(engine)?;
                storage_put(
                    engine.snapshot(),
                    ID,
                    &[PREFIX_ATTRIBUTE_FEE, attr_type],
                    int_to_bytes(value),
                );
                self.invalidate();
                Ok(StackItem::Null)
            }
            "blockAccount" => {
                self.require_committee(engine)?;
                let account = account_arg(&args[0])?;
                if engine.natives().by_hash(&account).is_some() {
                    return Err(VmError::throw("cannot block native contract"));
                }
                if self.is_blocked(engine.snapshot(), &account) {
                    return Ok(StackItem::Boolean(false));
                }
                storage_put(engine.snapshot(), ID, &blocked_key(&account), Vec::new());
                self.invalidate();
                Ok(StackItem::Boolean(true))
            }
            "unblockAccount" => {
                self.require_committee(engine)?;
                let account = account_arg(&args[0])?;
                if !self.is_blocked(engine.snapshot(), &account) {
                    return Ok(StackItem::Boolean(false));
                }
                storage_delete(engine.snapshot(), ID, &blocked_key(&account));
                self.invalidate();
                Ok(StackItem::Boolean(true))
            }
            _ => Err(VmError::throw(format!("unknown Policy method {method}"))),
        }
    }
}

fn blocked_key(account: &UInt160) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(PREFIX_BLOCKED_ACCOUNT);
    key.extend_from_slice(account.as_bytes());
    key
}

pub(crate) fn account_arg(item: &StackItem) -> VmResult<UInt160> {
    let bytes = item.as_bytes()?;
    UInt160::from_slice(&bytes).map_err(|_| VmError::throw("expected a 20-byte account hash"))
}
