//! The ContractManagement native: deploys, updates and destroys contracts,
//! and owns the contract registry storage.

use super::{
    get_int_setting, int_to_bytes, native_contract_state, native_hash, storage_delete,
    storage_get, storage_put, NativeContract, NativeMethodMeta,
};
use crate::dao::Dao;
use crate::engine::{ApplicationEngine, TriggerType};
use crate::manifest::ContractManifest;
use crate::{standard, ContractState, NefFile};
use neonova_config::GAS_FACTOR;
use neonova_core::UInt160;
use neonova_io::Serializable;
use neonova_vm::{ReferenceCounter, StackItem, VmError, VmResult};

const ID: i32 = -1;

const PREFIX_CONTRACT: u8 = 8;
const PREFIX_CONTRACT_HASH: u8 = 12;
const KEY_NEXT_ID: &[u8] = &[15];
const KEY_MIN_DEPLOY_FEE: &[u8] = &[20];

const DEFAULT_MIN_DEPLOY_FEE: i64 = 10 * GAS_FACTOR;

pub struct ContractManagement {
    hash: UInt160,
    methods: Vec<NativeMethodMeta>,
}

impl ContractManagement {
    pub fn new() -> Self {
        let methods = vec![
            NativeMethodMeta::safe("getContract", 1, 1 << 15),
            NativeMethodMeta::safe("getContractById", 1, 1 << 15),
            NativeMethodMeta::safe("getContractHashes", 0, 1 << 15),
            NativeMethodMeta::safe("hasMethod", 3, 1 << 15),
            NativeMethodMeta::safe("getMinimumDeploymentFee", 0, 1 << 15),
            NativeMethodMeta::write_void("setMinimumDeploymentFee", 1, 1 << 15),
            NativeMethodMeta::write("deploy", 2, 0),
            NativeMethodMeta::write("deploy", 3, 0),
            NativeMethodMeta::write_void("update", 2, 0),
            NativeMethodMeta::write_void("update", 3, 0),
            NativeMethodMeta::write_void("destroy", 0, 1 << 15),
        ];
        Self {
            hash: native_hash("ContractManagement"),
            methods,
        }
    }

    pub fn minimum_deployment_fee(&self, dao: &Dao) -> i64 {
        get_int_setting(dao, ID, KEY_MIN_DEPLOY_FEE, DEFAULT_MIN_DEPLOY_FEE)
    }

    fn next_available_id(&self, dao: &Dao) -> i32 {
        let id = get_int_setting(dao, ID, KEY_NEXT_ID, 1) as i32;
        storage_put(dao, ID, KEY_NEXT_ID, int_to_bytes(id as i64 + 1));
        id
    }

    /// Persists a contract under both the hash key and the id index.
    pub(crate) fn put_contract(&self, dao: &Dao, contract: &ContractState) {
        storage_put(
            dao,
            ID,
            &contract_key(&contract.hash),
            contract.to_stored_bytes(),
        );
        let mut id_key = vec![PREFIX_CONTRACT_HASH];
        id_key.extend_from_slice(&contract.id.to_be_bytes());
        storage_put(dao, ID, &id_key, contract.hash.to_vec());
    }

    fn deploy_internal(
        &self,
        engine: &mut ApplicationEngine,
        nef_bytes: Vec<u8>,
        manifest_bytes: Vec<u8>,
        data: StackItem,
    ) -> VmResult<StackItem> {
        let tx_sender = engine
            .container()
            .map(|tx| tx.sender())
            .ok_or_else(|| VmError::throw("deploy requires a transaction"))?;

        let nef = NefFile::from_bytes(&nef_bytes)
            .map_err(|e| VmError::throw(format!("invalid NEF: {e}")))?;
        nef.validate()
            .map_err(|e| VmError::throw(format!("invalid NEF: {e}")))?;
        let manifest = ContractManifest::from_json_bytes(&manifest_bytes)
            .map_err(|e| VmError::throw(format!("invalid manifest: {e}")))?;

        let fee = self
            .minimum_deployment_fee(engine.snapshot())
            .max(engine.natives().policy().storage_price(engine.snapshot()) as i64
                * (nef_bytes.len() + manifest_bytes.len()) as i64);
        engine.vm_mut().consume_gas(fee)?;

        let hash = standard::contract_hash(&tx_sender, nef.checksum, &manifest.name);
        if get_contract(engine.snapshot(), &hash).is_some() {
            return Err(VmError::throw(format!("contract {hash} already exists")));
        }
        let contract = ContractState {
            id: self.next_available_id(engine.snapshot()),
            update_counter: 0,
            hash,
            nef,
            manifest,
        };
        self.put_contract(engine.snapshot(), &contract);
        self.notify_contract_event(engine, "Deploy", &hash)?;

        if contract.manifest.method_any_arity("_deploy").is_some() {
            engine.call_from_native(
                hash,
                "_deploy",
                vec![data, StackItem::Boolean(false)],
                false,
            )?;
        }
        let rc = engine.vm().reference_counter().clone();
        contract_to_item(&rc, &contract)
    }

    fn update_internal(
        &self,
        engine: &mut ApplicationEngine,
        nef_bytes: Option<Vec<u8>>,
        manifest_bytes: Option<Vec<u8>>,
        data: StackItem,
    ) -> VmResult<StackItem> {
        let caller = engine.vm().current_context()?.calling_script_hash
            .ok_or_else(|| VmError::throw("update must be called by a contract"))?;
        let mut contract = get_contract(engine.snapshot(), &caller)
            .ok_or_else(|| VmError::throw("updating contract is not deployed"))?;
        if contract.id < 0 {
            return Err(VmError::throw("native contracts cannot be updated"));
        }
        if nef_bytes.is_none() && manifest_bytes.is_none() {
            return Err(VmError::throw("update requires a new NEF or manifest"));
        }
        if let Some(bytes) = nef_bytes {
            let nef = NefFile::from_bytes(&bytes)
                .map_err(|e| VmError::throw(format!("invalid NEF: {e}")))?;
            nef.validate()
                .map_err(|e| VmError::throw(format!("invalid NEF: {e}")))?;
            contract.nef = nef;
        }
        if let Some(bytes) = manifest_bytes {
            let manifest = ContractManifest::from_json_bytes(&bytes)
                .map_err(|e| VmError::throw(format!("invalid manifest: {e}")))?;
            if manifest.name != contract.manifest.name {
                return Err(VmError::throw("manifest name cannot change on update"));
            }
            contract.manifest = manifest;
        }
        contract.update_counter += 1;
        self.put_contract(engine.snapshot(), &contract);
        self.notify_contract_event(engine, "Update", &contract.hash)?;
        if contract.manifest.method_any_arity("_deploy").is_some() {
            engine.call_from_native(
                contract.hash,
                "_deploy",
                vec![data, StackItem::Boolean(true)],
                false,
            )?;
        }
        Ok(StackItem::Null)
    }

    fn destroy_internal(&self, engine: &mut ApplicationEngine) -> VmResult<StackItem> {
        let caller = engine.vm().current_context()?.calling_script_hash
            .ok_or_else(|| VmError::throw("destroy must be called by a contract"))?;
        let Some(contract) = get_contract(engine.snapshot(), &caller) else {
            return Ok(StackItem::Null);
        };
        if contract.id < 0 {
            return Err(VmError::throw("native contracts cannot be destroyed"));
        }
        let dao = engine.snapshot();
        storage_delete(dao, ID, &contract_key(&contract.hash));
        let mut id_key = vec![PREFIX_CONTRACT_HASH];
        id_key.extend_from_slice(&contract.id.to_be_bytes());
        storage_delete(dao, ID, &id_key);
        // The contract's whole storage range goes with it.
        for (key, _) in dao.find_storage(contract.id, &[], false) {
            dao.delete_storage(&neonova_persistence::StorageKey::new(contract.id, key));
        }
        self.notify_contract_event(engine, "Destroy", &contract.hash)?;
        Ok(StackItem::Null)
    }

    fn notify_contract_event(
        &self,
        engine: &mut ApplicationEngine,
        name: &str,
        hash: &UInt160,
    ) -> VmResult<()> {
        let rc = engine.vm().reference_counter().clone();
        let state = StackItem::new_array(&rc, vec![StackItem::from_bytes(hash.to_vec())])?;
        let serialized = neonova_vm::stack_item::serialize_item(&state)?;
        engine.add_notification(self.hash, name.to_string(), serialized);
        Ok(())
    }
}

impl Default for ContractManagement {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for ContractManagement {
    fn name(&self) -> &'static str {
        "ContractManagement"
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
        storage_put(dao, ID, KEY_NEXT_ID, int_to_bytes(1));
        storage_put(dao, ID, KEY_MIN_DEPLOY_FEE, int_to_bytes(DEFAULT_MIN_DEPLOY_FEE));
        Ok(())
    }

    /// Deploys natives whose activation history begins at this block.
    fn on_persist(&self, engine: &mut ApplicationEngine) -> VmResult<()> {
        if engine.trigger() != TriggerType::OnPersist {
            return Err(VmError::invalid_operation("Management OnPersist trigger"));
        }
        let height = engine.block_height();
        let natives = engine.natives();
        for native in natives.all() {
            let activation = engine
                .settings()
                .native_update_histories
                .get(native.name())
                .and_then(|h| h.first().copied())
                .unwrap_or(0);
            if activation == height {
                let state = native_contract_state(native.as_ref());
                self.put_contract(engine.snapshot(), &state);
                native.initialize(engine)?;
                tracing::debug!(native = native.name(), height, "native contract deployed");
            }
        }
        Ok(())
    }

    fn invoke(
        &self,
        engine: &mut ApplicationEngine,
        method: &str,
        mut args: Vec<StackItem>,
    ) -> VmResult<StackItem> {
        let rc = engine.vm().reference_counter().clone();
        match (method, args.len()) {
            ("getContract", 1) => {
                let hash = super::policy::account_arg(&args[0])?;
                match get_contract(engine.snapshot(), &hash) {
                    Some(contract) => contract_to_item(&rc, &contract),
                    None => Ok(StackItem::Null),
                }
            }
            ("getContractById", 1) => {
                let id = args[0].as_i64()? as i32;
                match self.get_contract_by_id(engine.snapshot(), id) {
                    Some(contract) => contract_to_item(&rc, &contract),
                    None => Ok(StackItem::Null),
                }
            }
            ("getContractHashes", 0) => {
                let mut hashes = Vec::new();
                for (key, value) in engine
                    .snapshot()
                    .find_storage(ID, &[PREFIX_CONTRACT_HASH], false)
                {
                    // Only positive ids appear in the listing.
                    if key.len() == 5 && key[1] < 0x80 {
                        hashes.push(StackItem::new_struct(
                            &rc,
                            vec![
                                StackItem::from_bytes(key[1..].to_vec()),
                                StackItem::from_bytes(value),
                            ],
                        )?);
                    }
                }
                StackItem::new_array(&rc, hashes)
            }
            ("hasMethod", 3) => {
                let hash = super::policy::account_arg(&args[0])?;
                let name = args[1].as_string()?;
                let param_count = args[2].as_i64()?;
                let found = get_contract(engine.snapshot(), &hash)
                    .map(|c| {
                        if param_count < 0 {
                            c.manifest.method_any_arity(&name).is_some()
                        } else {
                            c.manifest.method(&name, param_count as usize).is_some()
                        }
                    })
                    .unwrap_or(false);
                Ok(StackItem::Boolean(found))
            }
            ("getMinimumDeploymentFee", 0) => Ok(StackItem::from_int(
                self.minimum_deployment_fee(engine.snapshot()),
            )),
            ("setMinimumDeploymentFee", 1) => {
                let value = args[0].as_i64()?;
                if value < 0 {
                    return Err(VmError::throw("deployment fee cannot be negative"));
                }
                if !engine.check_committee()? {
                    return Err(VmError::throw("invalid committee signature"));
                }
                storage_put(engine.snapshot(), ID, KEY_MIN_DEPLOY_FEE, int_to_bytes(value));
                Ok(StackItem::Null)
            }
            ("deploy", 2) => {
                let manifest = args.pop().expect("arity checked").as_bytes()?;
                let nef = args.pop().expect("arity checked").as_bytes()?;
                self.deploy_internal(engine, nef, manifest, StackItem::Null)
            }
            ("deploy", 3) => {
                let data = args.pop().expect("arity checked");
                let manifest = args.pop().expect("arity checked").as_bytes()?;
                let nef = args.pop().expect("arity checked").as_bytes()?;
                self.deploy_internal(engine, nef, manifest, data)
            }
            ("update", 2) => {
                let manifest = optional_bytes(&args[1])?;
                let nef = optional_bytes(&args[0])?;
                self.update_internal(engine, nef, manifest, StackItem::Null)
            }
            ("update", 3) => {
                let data = args.pop().expect("arity checked");
                let manifest = optional_bytes(&args[1])?;
                let nef = optional_bytes(&args[0])?;
                self.update_internal(engine, nef, manifest, data)
            }
            ("destroy", 0) => self.destroy_internal(engine),
            _ => Err(VmError::throw(format!(
                "unknown Management method {method}/{}",
                args.len()
            ))),
        }
    }
}

impl ContractManagement {
    pub fn get_contract_by_id(&self, dao: &Dao, id: i32) -> Option<ContractState> {
        let mut id_key = vec![PREFIX_CONTRACT_HASH];
        id_key.extend_from_slice(&id.to_be_bytes());
        let hash_bytes = storage_get(dao, ID, &id_key)?;
        let hash = UInt160::from_slice(&hash_bytes).ok()?;
        get_contract(dao, &hash)
    }
}

/// Resolves a contract (native or deployed) from the registry storage.
pub fn get_contract(dao: &Dao, hash: &UInt160) -> Option<ContractState> {
    let bytes = storage_get(dao, ID, &contract_key(hash))?;
    ContractState::from_stored_bytes(&bytes).ok()
}

fn contract_key(hash: &UInt160) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(PREFIX_CONTRACT);
    key.extend_from_slice(hash.as_bytes());
    key
}

/// The stack form of a contract: `[id, updateCounter, hash, nef, manifest]`.
fn contract_to_item(rc: &ReferenceCounter, contract: &ContractState) -> VmResult<StackItem> {
    StackItem::new_array(
        rc,
        vec![
            StackItem::from_int(contract.id as i64),
            StackItem::from_int(contract.update_counter as i64),
            StackItem::from_bytes(contract.hash.to_vec()),
            StackItem::from_bytes(contract.nef.to_bytes()),
            StackItem::from_bytes(contract.manifest.to_json_bytes()),
        ],
    )
}

fn optional_bytes(item: &StackItem) -> VmResult<Option<Vec<u8>>> {
    if item.is_null() {
        Ok(None)
    } else {
        Ok(Some(item.as_bytes()?))
    }
}
