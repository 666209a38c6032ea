//! The Oracle native: request queue and response dispatch.

use super::{get_int_setting, int_to_bytes, native_hash, storage_delete, storage_get, storage_put, NativeContract, NativeMethodMeta};
use crate::dao::Dao;
use crate::engine::ApplicationEngine;
use neonova_config::{GAS_FACTOR, MAX_ORACLE_RESULT_SIZE};
use neonova_core::{OracleResponseCode, TransactionAttribute, UInt160, UInt256};
use neonova_io::{BinaryWriter, MemoryReader, Serializable};
use neonova_vm::stack_item::{deserialize_item, serialize_item};
use neonova_vm::{CallFlags, ScriptBuilder, StackItem, VmError, VmResult};

const ID: i32 = -9;

const PREFIX_REQUEST: u8 = 7;
const PREFIX_ID_LIST: u8 = 6;
const KEY_REQUEST_ID: &[u8] = &[9];
const KEY_PRICE: &[u8] = &[5];

const DEFAULT_PRICE: i64 = GAS_FACTOR / 2;
const MIN_RESPONSE_GAS: i64 = 10_000_000;
const MAX_URL_LENGTH: usize = 256;
const MAX_FILTER_LENGTH: usize = 128;
const MAX_CALLBACK_LENGTH: usize = 32;

/// A pending oracle request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequest {
    pub original_tx: UInt256,
    pub gas_for_response: i64,
    pub url: String,
    pub filter: Option<String>,
    pub callback_contract: UInt160,
    pub callback_method: String,
    pub user_data: Vec<u8>,
}

impl OracleRequest {
    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        self.original_tx.serialize(&mut writer).expect("fixed width");
        writer.write_i64(self.gas_for_response);
        writer.write_var_bytes(self.url.as_bytes());
        match &self.filter {
            Some(filter) => {
                writer.write_u8(1);
                writer.write_var_bytes(filter.as_bytes());
            }
            None => writer.write_u8(0),
        }
        self.callback_contract.serialize(&mut writer).expect("fixed width");
        writer.write_var_bytes(self.callback_method.as_bytes());
        writer.write_var_bytes(&self.user_data);
        writer.into_bytes()
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let mut reader = MemoryReader::new(bytes);
        let original_tx = UInt256::deserialize(&mut reader).ok()?;
        let gas_for_response = reader.read_i64().ok()?;
        let url = reader.read_var_string(MAX_URL_LENGTH).ok()?;
        let filter = match reader.read_u8().ok()? {
            0 => None,
            _ => Some(reader.read_var_string(MAX_FILTER_LENGTH).ok()?),
        };
        let callback_contract = UInt160::deserialize(&mut reader).ok()?;
        let callback_method = reader.read_var_string(MAX_CALLBACK_LENGTH).ok()?;
        let user_data = reader.read_var_bytes(u16::MAX as usize).ok()?;
        Some(Self {
            original_tx,
            gas_for_response,
            url,
            filter,
            callback_contract,
            callback_method,
            user_data,
        })
    }
}

pub struct OracleContract {
    hash: UInt160,
    methods: Vec<NativeMethodMeta>,
}

impl OracleContract {
    pub fn new() -> Self {
        let methods = vec![
            NativeMethodMeta::safe("getPrice", 0, 1 << 15),
            NativeMethodMeta::write_void("setPrice", 1, 1 << 15),
            NativeMethodMeta {
                name: "request",
                params: 5,
                price: 0,
                required_flags: CallFlags::STATES.union(CallFlags::ALLOW_NOTIFY),
                safe: false,
                has_return: false,
            },
            NativeMethodMeta {
                name: "finish",
                params: 0,
                price: 0,
                required_flags: CallFlags::STATES
                    .union(CallFlags::ALLOW_CALL)
                    .union(CallFlags::ALLOW_NOTIFY),
                safe: false,
                has_return: false,
            },
            NativeMethodMeta::safe("verify", 0, 1 << 15),
        ];
        Self {
            hash: native_hash("OracleContract"),
            methods,
        }
    }

    pub fn price(&self, dao: &Dao) -> i64 {
        get_int_setting(dao, ID, KEY_PRICE, DEFAULT_PRICE)
    }

    pub fn get_request(&self, dao: &Dao, id: u64) -> Option<OracleRequest> {
        storage_get(dao, ID, &request_key(id)).and_then(|b| OracleRequest::from_bytes(&b))
    }

    /// The canonical script every oracle response transaction must carry:
    /// a bare call to `finish`.
    pub fn response_script(&self) -> Vec<u8> {
        let mut builder = ScriptBuilder::new();
        builder.emit(neonova_vm::OpCode::NEWARRAY0);
        builder.push_int(CallFlags::ALL.bits() as i64);
        builder.push_string("finish");
        builder.push_bytes(self.hash.as_bytes());
        builder.emit_syscall_named("System.Contract.Call");
        builder.into_bytes()
    }

    fn request_internal(
        &self,
        engine: &mut ApplicationEngine,
        url: String,
        filter: Option<String>,
        callback: String,
        user_data: StackItem,
        gas_for_response: i64,
    ) -> VmResult<()> {
        if url.len() > MAX_URL_LENGTH {
            return Err(VmError::throw("oracle request URL too long"));
        }
        if filter.as_ref().map(|f| f.len() > MAX_FILTER_LENGTH).unwrap_or(false) {
            return Err(VmError::throw("oracle filter too long"));
        }
        if callback.len() > MAX_CALLBACK_LENGTH {
            return Err(VmError::throw("oracle callback name too long"));
        }
        if callback.starts_with('_') {
            return Err(VmError::throw("oracle callback cannot be reserved"));
        }
        if gas_for_response < MIN_RESPONSE_GAS {
            return Err(VmError::throw("not enough gas for oracle response"));
        }
        let price = self.price(engine.snapshot());
        engine.vm_mut().consume_gas(price + gas_for_response)?;

        let caller = engine.vm().current_context()?.calling_script_hash
            .ok_or_else(|| VmError::throw("oracle request needs a calling contract"))?;
        let original_tx = engine
            .container()
            .map(|tx| tx.hash())
            .ok_or_else(|| VmError::throw("oracle request needs a transaction"))?;

        let id = self.next_request_id(engine.snapshot());
        let request = OracleRequest {
            original_tx,
            gas_for_response,
            url: url.clone(),
            filter,
            callback_contract: caller,
            callback_method: callback,
            user_data: serialize_item(&user_data)?,
        };
        storage_put(engine.snapshot(), ID, &request_key(id), request.to_bytes());
        self.append_id_to_list(engine.snapshot(), &url, id);

        let rc = engine.vm().reference_counter().clone();
        let state = StackItem::new_array(
            &rc,
            vec![
                StackItem::from_int(id as i64),
                StackItem::from_bytes(caller.to_vec()),
                StackItem::from_string(url),
                match &request.filter {
                    Some(filter) => StackItem::from_string(filter.clone()),
                    None => StackItem::Null,
                },
            ],
        )?;
        let serialized = serialize_item(&state)?;
        engine.add_notification(self.hash, "OracleRequest".to_string(), serialized);
        Ok(())
    }

    fn finish_internal(&self, engine: &mut ApplicationEngine) -> VmResult<()> {
        let tx = engine
            .container()
            .cloned()
            .ok_or_else(|| VmError::throw("oracle finish outside a transaction"))?;
        let response = tx
            .attributes_of(TransactionAttribute::ORACLE_RESPONSE)
            .next()
            .cloned()
            .ok_or_else(|| VmError::throw("oracle response attribute missing"))?;
        let TransactionAttribute::OracleResponse { id, code, result } = response else {
            return Err(VmError::throw("oracle response attribute missing"));
        };
        let request = self
            .get_request(engine.snapshot(), id)
            .ok_or_else(|| VmError::throw(format!("unknown oracle request {id}")))?;

        // The request is consumed before the callback runs.
        storage_delete(engine.snapshot(), ID, &request_key(id));
        self.remove_id_from_list(engine.snapshot(), &request.url, id);

        let rc = engine.vm().reference_counter().clone();
        let state = StackItem::new_array(
            &rc,
            vec![
                StackItem::from_int(id as i64),
                StackItem::from_bytes(request.original_tx.to_vec()),
            ],
        )?;
        engine.add_notification(
            self.hash,
            "OracleResponse".to_string(),
            serialize_item(&state)?,
        );

        let user_data = deserialize_item(&request.user_data, &rc)?;
        engine.call_from_native(
            request.callback_contract,
            &request.callback_method,
            vec![
                StackItem::from_string(request.url),
                user_data,
                StackItem::from_int(code as u8 as i64),
                StackItem::from_bytes(result),
            ],
            false,
        )?;
        Ok(())
    }

    fn next_request_id(&self, dao: &Dao) -> u64 {
        let id = get_int_setting(dao, ID, KEY_REQUEST_ID, 0) as u64;
        storage_put(dao, ID, KEY_REQUEST_ID, int_to_bytes(id as i64 + 1));
        id
    }

    fn append_id_to_list(&self, dao: &Dao, url: &str, id: u64) {
        let key = id_list_key(url);
        let mut value = storage_get(dao, ID, &key).unwrap_or_default();
        value.extend_from_slice(&id.to_le_bytes());
        storage_put(dao, ID, &key, value);
    }

    fn remove_id_from_list(&self, dao: &Dao, url: &str, id: u64) {
        let key = id_list_key(url);
        let Some(value) = storage_get(dao, ID, &key) else {
            return;
        };
        let mut ids: Vec<u64> = value
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        ids.retain(|existing| *existing != id);
        if ids.is_empty() {
            storage_delete(dao, ID, &key);
        } else {
            let mut encoded = Vec::with_capacity(ids.len() * 8);
            for id in ids {
                encoded.extend_from_slice(&id.to_le_bytes());
            }
            storage_put(dao, ID, &key, encoded);
        }
    }
}

impl Default for OracleContract {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for OracleContract {
    fn name(&self) -> &'static str {
        "OracleContract"
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
        storage_put(engine.snapshot(), ID, KEY_REQUEST_ID, int_to_bytes(0));
        storage_put(engine.snapshot(), ID, KEY_PRICE, int_to_bytes(DEFAULT_PRICE));
        Ok(())
    }

    fn invoke(
        &self,
        engine: &mut ApplicationEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> VmResult<StackItem> {
        match method {
            "getPrice" => Ok(StackItem::from_int(self.price(engine.snapshot()))),
            "setPrice" => {
                let value = args[0].as_i64()?;
                if value <= 0 {
                    return Err(VmError::throw("oracle price must be positive"));
                }
                if !engine.check_committee()? {
                    return Err(VmError::throw("invalid committee signature"));
                }
                storage_put(engine.snapshot(), ID, KEY_PRICE, int_to_bytes(value));
                Ok(StackItem::Null)
            }
            "request" => {
                let url = args[0].as_string()?;
                let filter = if args[1].is_null() {
                    None
                } else {
                    Some(args[1].as_string()?)
                };
                let callback = args[2].as_string()?;
                let user_data = args[3].clone();
                let gas_for_response = args[4].as_i64()?;
                self.request_internal(engine, url, filter, callback, user_data, gas_for_response)?;
                Ok(StackItem::Null)
            }
            "finish" => {
                self.finish_internal(engine)?;
                Ok(StackItem::Null)
            }
            "verify" => {
                // An oracle-signed witness is only valid on a response tx.
                let has_response = engine
                    .container()
                    .map(|tx| {
                        tx.attributes_of(TransactionAttribute::ORACLE_RESPONSE)
                            .next()
                            .is_some()
                    })
                    .unwrap_or(false);
                Ok(StackItem::Boolean(has_response))
            }
            _ => Err(VmError::throw(format!("unknown Oracle method {method}"))),
        }
    }
}

fn request_key(id: u64) -> Vec<u8> {
    let mut key = vec![PREFIX_REQUEST];
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn id_list_key(url: &str) -> Vec<u8> {
    let mut key = vec![PREFIX_ID_LIST];
    key.extend_from_slice(&neonova_crypto::hash160(url.as_bytes()));
    key
}

/// Result payloads above the cap are truncated to a `ResponseTooLarge`
/// failure by the oracle service; the core only validates the bound.
pub fn response_size_ok(code: OracleResponseCode, result: &[u8]) -> bool {
    code != OracleResponseCode::Success || result.len() <= MAX_ORACLE_RESULT_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_record_round_trip() {
        let request = OracleRequest {
            original_tx: UInt256::from_array([1; 32]),
            gas_for_response: 1_000_000_000,
            url: "https://example.org/data".into(),
            filter: Some("$.price".into()),
            callback_contract: UInt160::from_array([2; 20]),
            callback_method: "callback".into(),
            user_data: vec![0x00],
        };
        assert_eq!(OracleRequest::from_bytes(&request.to_bytes()).unwrap(), request);
    }

    #[test]
    fn response_script_is_deterministic() {
        let oracle = OracleContract::new();
        assert_eq!(oracle.response_script(), oracle.response_script());
    }
}
