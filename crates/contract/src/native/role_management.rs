//! The RoleManagement native: designation of node roles per block height.

use super::{native_hash, storage_get, storage_put, NativeContract, NativeMethodMeta};
use crate::dao::Dao;
use crate::engine::ApplicationEngine;
use neonova_core::UInt160;
use neonova_crypto::ECPoint;
use neonova_io::{BinaryWriter, MemoryReader};
use neonova_vm::{StackItem, VmError, VmResult};

const ID: i32 = -8;

/// Designated node roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Role {
    StateValidator = 4,
    Oracle = 8,
    NeoFsAlphabet = 16,
    P2pNotary = 32,
}

impl Role {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            4 => Some(Role::StateValidator),
            8 => Some(Role::Oracle),
            16 => Some(Role::NeoFsAlphabet),
            32 => Some(Role::P2pNotary),
            _ => None,
        }
    }
}

pub struct RoleManagement {
    hash: UInt160,
    methods: Vec<NativeMethodMeta>,
}

impl RoleManagement {
    pub fn new() -> Self {
        let methods = vec![
            NativeMethodMeta::safe("getDesignatedByRole", 2, 1 << 15),
            NativeMethodMeta::write_void("designateAsRole", 2, 1 << 15),
        ];
        Self {
            hash: native_hash("RoleManagement"),
            methods,
        }
    }

    /// Nodes designated for `role` effective at block `index`: the most
    /// recent designation recorded at or before that height.
    pub fn designated_by_role(&self, dao: &Dao, role: Role, index: u32) -> Vec<ECPoint> {
        let mut best: Option<(u32, Vec<ECPoint>)> = None;
        for (key, value) in dao.find_storage(ID, &[role as u8], false) {
            if key.len() != 5 {
                continue;
            }
            let start = u32::from_be_bytes(key[1..5].try_into().unwrap());
            if start <= index && best.as_ref().map(|(s, _)| start >= *s).unwrap_or(true) {
                if let Some(nodes) = decode_nodes(&value) {
                    best = Some((start, nodes));
                }
            }
        }
        best.map(|(_, nodes)| nodes).unwrap_or_default()
    }
}

impl Default for RoleManagement {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for RoleManagement {
    fn name(&self) -> &'static str {
        "RoleManagement"
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

    fn invoke(
        &self,
        engine: &mut ApplicationEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> VmResult<StackItem> {
        match method {
            "getDesignatedByRole" => {
                let role = role_arg(&args[0])?;
                let index = args[1].as_i64()?;
                let index = u32::try_from(index)
                    .map_err(|_| VmError::throw("invalid block index"))?;
                if index > engine.block_height() + 1 {
                    return Err(VmError::throw("cannot query future designations"));
                }
                let nodes = self.designated_by_role(engine.snapshot(), role, index);
                let rc = engine.vm().reference_counter().clone();
                let items = nodes
                    .into_iter()
                    .map(|k| StackItem::from_bytes(k.to_vec()))
                    .collect();
                StackItem::new_array(&rc, items)
            }
            "designateAsRole" => {
                let role = role_arg(&args[0])?;
                let nodes: Vec<ECPoint> = engine
                    .array_arg(&args[1])?
                    .iter()
                    .map(|item| {
                        let bytes = item.as_bytes()?;
                        ECPoint::from_bytes(&bytes)
                            .map_err(|e| VmError::throw(format!("invalid node key: {e}")))
                    })
                    .collect::<VmResult<_>>()?;
                if nodes.is_empty() || nodes.len() > 32 {
                    return Err(VmError::throw("designation needs between 1 and 32 nodes"));
                }
                if !engine.check_committee()? {
                    return Err(VmError::throw("invalid committee signature"));
                }
                // Effective from the next block.
                let index = engine.block_height() + 1;
                let mut key = vec![role as u8];
                key.extend_from_slice(&index.to_be_bytes());
                if storage_get(engine.snapshot(), ID, &key).is_some() {
                    return Err(VmError::throw("role already designated at this height"));
                }
                let mut sorted = nodes;
                sorted.sort();
                storage_put(engine.snapshot(), ID, &key, encode_nodes(&sorted));
                let rc = engine.vm().reference_counter().clone();
                let state = StackItem::new_array(
                    &rc,
                    vec![
                        StackItem::from_int(role as u8 as i64),
                        StackItem::from_int(engine.block_height() as i64),
                    ],
                )?;
                let serialized = neonova_vm::stack_item::serialize_item(&state)?;
                engine.add_notification(self.hash, "Designation".to_string(), serialized);
                Ok(StackItem::Null)
            }
            _ => Err(VmError::throw(format!(
                "unknown RoleManagement method {method}"
            ))),
        }
    }
}

fn role_arg(item: &StackItem) -> VmResult<Role> {
    let value = item.as_i64()?;
    u8::try_from(value)
        .ok()
        .and_then(Role::from_byte)
        .ok_or_else(|| VmError::throw("invalid role"))
}

fn encode_nodes(nodes: &[ECPoint]) -> Vec<u8> {
    let mut writer = BinaryWriter::new();
    writer.write_var_int(nodes.len() as u64);
    for node in nodes {
        writer.write_bytes(node.as_bytes());
    }
    writer.into_bytes()
}

fn decode_nodes(bytes: &[u8]) -> Option<Vec<ECPoint>> {
    let mut reader = MemoryReader::new(bytes);
    let count = reader.read_var_int(32).ok()? as usize;
    let mut nodes = Vec::with_capacity(count);
    for _ in 0..count {
        let raw = reader.read_bytes(33).ok()?;
        nodes.push(ECPoint::from_bytes(&raw).ok()?);
    }
    Some(nodes)
}
