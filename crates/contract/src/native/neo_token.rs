//! The NEO governance token: voting, committee selection and GAS
//! distribution.

use super::nep17::post_transfer;
use super::{
    get_int_setting, int_to_bytes, native_hash, storage_delete, storage_get, storage_put,
    NativeContract, NativeMethodMeta,
};
use crate::dao::Dao;
use crate::engine::ApplicationEngine;
use crate::standard;
use neonova_config::{ProtocolSettings, GAS_FACTOR};
use neonova_core::{Block, UInt160};
use neonova_crypto::ECPoint;
use neonova_io::{BinaryWriter, MemoryReader};
use neonova_vm::stack_item::{bigint_to_bytes, bytes_to_bigint};
use neonova_vm::{StackItem, VmError, VmResult};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use parking_lot::RwLock;

const ID: i32 = -5;

const PREFIX_BALANCE: u8 = 20;
const PREFIX_CANDIDATE: u8 = 33;
const PREFIX_GAS_PER_BLOCK: u8 = 29;
const PREFIX_VOTER_REWARD: u8 = 23;
const KEY_VOTERS_COUNT: &[u8] = &[1];
const KEY_COMMITTEE: &[u8] = &[14];
const KEY_REGISTER_PRICE: &[u8] = &[13];

pub const TOTAL_SUPPLY: i64 = 100_000_000;
const DEFAULT_GAS_PER_BLOCK: i64 = 5 * GAS_FACTOR;
const DEFAULT_REGISTER_PRICE: i64 = 1000 * GAS_FACTOR;
/// Share of each block's GAS going to the round-robin committee member.
const COMMITTEE_REWARD_RATIO: i64 = 10;
/// Share going to voters of committee candidates.
const VOTER_REWARD_RATIO: i64 = 80;
/// Share going to plain holders.
const HOLDER_REWARD_RATIO: i64 = 10;

/// Fixed-point scale of the per-vote reward accumulators.
fn reward_scale() -> BigInt {
    BigInt::from(10u64).pow(18)
}

/// Stored per-account state.
#[derive(Debug, Clone, Default)]
pub struct NeoAccountState {
    pub balance: BigInt,
    pub balance_height: u32,
    pub vote_to: Option<ECPoint>,
    pub last_gas_per_vote: BigInt,
}

impl NeoAccountState {
    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        writer.write_var_bytes(&bigint_to_bytes(&self.balance));
        writer.write_u32(self.balance_height);
        match &self.vote_to {
            Some(key) => {
                writer.write_u8(1);
                writer.write_bytes(key.as_bytes());
            }
            None => writer.write_u8(0),
        }
        writer.write_var_bytes(&bigint_to_bytes(&self.last_gas_per_vote));
        writer.into_bytes()
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let mut reader = MemoryReader::new(bytes);
        let balance = bytes_to_bigint(&reader.read_var_bytes(33).ok()?).ok()?;
        let balance_height = reader.read_u32().ok()?;
        let vote_to = match reader.read_u8().ok()? {
            0 => None,
            _ => {
                let raw = reader.read_bytes(33).ok()?;
                Some(ECPoint::from_bytes(&raw).ok()?)
            }
        };
        let last_gas_per_vote = bytes_to_bigint(&reader.read_var_bytes(64).ok()?).ok()?;
        Some(Self {
            balance,
            balance_height,
            vote_to,
            last_gas_per_vote,
        })
    }
}

#[derive(Debug, Clone, Default)]
struct CandidateState {
    registered: bool,
    votes: BigInt,
}

impl CandidateState {
    fn to_bytes(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        writer.write_bool(self.registered);
        writer.write_var_bytes(&bigint_to_bytes(&self.votes));
        writer.into_bytes()
    }

    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let mut reader = MemoryReader::new(bytes);
        let registered = reader.read_bool().ok()?;
        let votes = bytes_to_bigint(&reader.read_var_bytes(33).ok()?).ok()?;
        Some(Self { registered, votes })
    }
}

pub struct NeoToken {
    hash: UInt160,
    methods: Vec<NativeMethodMeta>,
    /// Committee (key, votes) as of the last PostPersist, mirroring storage.
    committee_cache: RwLock<Option<Vec<(ECPoint, BigInt)>>>,
}

impl NeoToken {
    pub fn new() -> Self {
        let methods = vec![
            NativeMethodMeta::pure("symbol", 0, 0),
            NativeMethodMeta::pure("decimals", 0, 0),
            NativeMethodMeta::safe("totalSupply", 0, 1 << 15),
            NativeMethodMeta::safe("balanceOf", 1, 1 << 15),
            NativeMethodMeta::write("transfer", 4, 1 << 17),
            NativeMethodMeta::safe("unclaimedGas", 2, 1 << 17),
            NativeMethodMeta::write("registerCandidate", 1, 0),
            NativeMethodMeta::write("unregisterCandidate", 1, 1 << 16),
            NativeMethodMeta::write("vote", 2, 1 << 16),
            NativeMethodMeta::safe("getCandidates", 0, 1 << 22),
            NativeMethodMeta::safe("getCandidateVote", 1, 1 << 15),
            NativeMethodMeta::safe("getCommittee", 0, 1 << 16),
            NativeMethodMeta::safe("getNextBlockValidators", 0, 1 << 16),
            NativeMethodMeta::safe("getGasPerBlock", 0, 1 << 15),
            NativeMethodMeta::write_void("setGasPerBlock", 1, 1 << 15),
            NativeMethodMeta::safe("getRegisterPrice", 0, 1 << 15),
            NativeMethodMeta::write_void("setRegisterPrice", 1, 1 << 15),
            NativeMethodMeta::safe("getAccountState", 1, 1 << 15),
        ];
        Self {
            hash: native_hash("NeoToken"),
            methods,
            committee_cache: RwLock::new(None),
        }
    }

    // ---- account & candidate storage ------------------------------------

    fn account_state(&self, dao: &Dao, account: &UInt160) -> Option<NeoAccountState> {
        storage_get(dao, ID, &balance_key(account)).and_then(|b| NeoAccountState::from_bytes(&b))
    }

    fn put_account_state(&self, dao: &Dao, account: &UInt160, state: &NeoAccountState) {
        if state.balance.is_zero() && state.vote_to.is_none() {
            storage_delete(dao, ID, &balance_key(account));
        } else {
            storage_put(dao, ID, &balance_key(account), state.to_bytes());
        }
    }

    fn candidate_state(&self, dao: &Dao, key: &ECPoint) -> CandidateState {
        storage_get(dao, ID, &candidate_key(key))
            .and_then(|b| CandidateState::from_bytes(&b))
            .unwrap_or_default()
    }

    fn put_candidate_state(&self, dao: &Dao, key: &ECPoint, state: &CandidateState) {
        if !state.registered && state.votes.is_zero() {
            storage_delete(dao, ID, &candidate_key(key));
        } else {
            storage_put(dao, ID, &candidate_key(key), state.to_bytes());
        }
    }

    pub fn balance_of(&self, dao: &Dao, account: &UInt160) -> BigInt {
        self.account_state(dao, account)
            .map(|s| s.balance)
            .unwrap_or_else(BigInt::zero)
    }

    // ---- committee -------------------------------------------------------

    /// Current committee with votes; falls back to the standby committee.
    pub fn committee(&self, dao: &Dao, settings: &ProtocolSettings) -> Vec<(ECPoint, BigInt)> {
        if let Some(cached) = self.committee_cache.read().as_ref() {
            return cached.clone();
        }
        self.committee_from_storage(dao)
            .unwrap_or_else(|| standby_committee(settings))
    }

    fn committee_from_storage(&self, dao: &Dao) -> Option<Vec<(ECPoint, BigInt)>> {
        let bytes = storage_get(dao, ID, KEY_COMMITTEE)?;
        let mut reader = MemoryReader::new(&bytes);
        let count = reader.read_var_int(1024).ok()? as usize;
        let mut committee = Vec::with_capacity(count);
        for _ in 0..count {
            let raw = reader.read_bytes(33).ok()?;
            let key = ECPoint::from_bytes(&raw).ok()?;
            let votes = bytes_to_bigint(&reader.read_var_bytes(33).ok()?).ok()?;
            committee.push((key, votes));
        }
        Some(committee)
    }

    fn store_committee(&self, dao: &Dao, committee: &[(ECPoint, BigInt)]) {
        let mut writer = BinaryWriter::new();
        writer.write_var_int(committee.len() as u64);
        for (key, votes) in committee {
            writer.write_bytes(key.as_bytes());
            writer.write_var_bytes(&bigint_to_bytes(votes));
        }
        storage_put(dao, ID, KEY_COMMITTEE, writer.into_bytes());
        *self.committee_cache.write() = None;
    }

    /// Elects the committee: registered candidates by vote count, padded
    /// from the standby list when participation is too low.
    fn compute_committee(
        &self,
        dao: &Dao,
        settings: &ProtocolSettings,
    ) -> Vec<(ECPoint, BigInt)> {
        let size = settings.committee_size();
        let mut candidates: Vec<(ECPoint, BigInt)> = dao
            .find_storage(ID, &[PREFIX_CANDIDATE], false)
            .into_iter()
            .filter_map(|(key, value)| {
                let point = ECPoint::from_bytes(&key[1..]).ok()?;
                let state = CandidateState::from_bytes(&value)?;
                state.registered.then_some((point, state.votes))
            })
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if candidates.len() < size {
            let mut seen: Vec<ECPoint> = candidates.iter().map(|(k, _)| *k).collect();
            for (key, votes) in standby_committee(settings) {
                if candidates.len() >= size {
                    break;
                }
                if !seen.contains(&key) {
                    seen.push(key);
                    candidates.push((key, votes));
                }
            }
        }
        candidates.truncate(size);
        candidates
    }

    /// Majority multisig address of the committee.
    pub fn committee_address(&self, dao: &Dao, settings: &ProtocolSettings) -> UInt160 {
        let committee = self.committee(dao, settings);
        let keys: Vec<ECPoint> = committee.iter().map(|(k, _)| *k).collect();
        if keys.is_empty() {
            return UInt160::zero();
        }
        let m = keys.len() / 2 + 1;
        match standard::create_multisig_script(m, &keys) {
            Some(script) => UInt160::from_array(neonova_crypto::hash160(&script)),
            None => UInt160::zero(),
        }
    }

    /// Validators for the next block: the best-voted committee members.
    pub fn next_block_validators(
        &self,
        dao: &Dao,
        settings: &ProtocolSettings,
    ) -> Vec<ECPoint> {
        let mut committee = self.committee(dao, settings);
        committee.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        committee
            .into_iter()
            .take(settings.validators_count)
            .map(|(k, _)| k)
            .collect()
    }

    /// Account credited with a block's network fees.
    pub fn primary_validator_account(
        &self,
        dao: &Dao,
        settings: &ProtocolSettings,
        block: &Block,
    ) -> UInt160 {
        let validators = self.next_block_validators(dao, settings);
        let primary = validators
            .get(block.header.primary_index as usize)
            .or_else(|| validators.first());
        match primary {
            Some(key) => {
                UInt160::from_array(neonova_crypto::hash160(&standard::create_signature_script(key)))
            }
            None => UInt160::zero(),
        }
    }

    // ---- gas distribution -------------------------------------------------

    pub fn gas_per_block(&self, dao: &Dao, height: u32) -> i64 {
        // Latest record at or below the height.
        let mut best: Option<(u32, i64)> = None;
        for (key, value) in dao.find_storage(ID, &[PREFIX_GAS_PER_BLOCK], false) {
            if key.len() == 5 {
                let start = u32::from_be_bytes(key[1..5].try_into().unwrap());
                if start <= height && best.map(|(s, _)| start >= s).unwrap_or(true) {
                    best = Some((start, super::bytes_to_int(&value)));
                }
            }
        }
        best.map(|(_, v)| v).unwrap_or(DEFAULT_GAS_PER_BLOCK)
    }

    pub fn register_price(&self, dao: &Dao) -> i64 {
        get_int_setting(dao, ID, KEY_REGISTER_PRICE, DEFAULT_REGISTER_PRICE)
    }

    fn voter_reward(&self, dao: &Dao, candidate: &ECPoint) -> BigInt {
        storage_get(dao, ID, &voter_reward_key(candidate))
            .and_then(|b| bytes_to_bigint(&b).ok())
            .unwrap_or_else(BigInt::zero)
    }

    /// Unclaimed GAS of an account up to block `end`: the holder share plus
    /// the voter share accrued since the balance last changed.
    pub fn unclaimed_gas(&self, dao: &Dao, account: &UInt160, end: u32) -> BigInt {
        let Some(state) = self.account_state(dao, account) else {
            return BigInt::zero();
        };
        self.unclaimed_for_state(dao, &state, end)
    }

    fn unclaimed_for_state(&self, dao: &Dao, state: &NeoAccountState, end: u32) -> BigInt {
        if state.balance.is_zero() || end <= state.balance_height {
            return BigInt::zero();
        }
        // Holder share: 10% of each block's emission, pro rata.
        let mut emitted = BigInt::zero();
        for height in state.balance_height..end {
            emitted += BigInt::from(self.gas_per_block(dao, height));
        }
        let holder = emitted * &state.balance * HOLDER_REWARD_RATIO
            / 100
            / BigInt::from(TOTAL_SUPPLY);
        // Voter share: accumulated per-vote reward delta.
        let voter = match &state.vote_to {
            Some(candidate) => {
                let delta = self.voter_reward(dao, candidate) - &state.last_gas_per_vote;
                delta * &state.balance / reward_scale()
            }
            None => BigInt::zero(),
        };
        holder + voter
    }

    /// Mints accrued GAS and rebases the account's reward counters.
    fn distribute_gas(
        &self,
        engine: &mut ApplicationEngine,
        account: &UInt160,
        state: &mut NeoAccountState,
    ) -> VmResult<()> {
        let height = engine.block_height();
        let claim = self.unclaimed_for_state(engine.snapshot(), state, height);
        state.balance_height = height;
        if let Some(candidate) = &state.vote_to {
            state.last_gas_per_vote = self.voter_reward(engine.snapshot(), candidate);
        }
        if claim.is_positive() {
            let gas = engine.natives().gas();
            gas.mint(engine, account, &claim, true)?;
        }
        Ok(())
    }

    // ---- votes ------------------------------------------------------------

    fn adjust_candidate_votes(&self, dao: &Dao, candidate: &ECPoint, delta: &BigInt) {
        let mut state = self.candidate_state(dao, candidate);
        state.votes += delta;
        self.put_candidate_state(dao, candidate, &state);
    }

    fn adjust_voters_count(&self, dao: &Dao, delta: &BigInt) {
        let current = storage_get(dao, ID, KEY_VOTERS_COUNT)
            .and_then(|b| bytes_to_bigint(&b).ok())
            .unwrap_or_else(BigInt::zero);
        storage_put(dao, ID, KEY_VOTERS_COUNT, bigint_to_bytes(&(current + delta)));
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
        let mut from_state = self.account_state(engine.snapshot(), &from).unwrap_or_default();
        if from_state.balance < amount {
            return Ok(false);
        }
        // Both sides claim their accrued GAS before balances move.
        self.distribute_gas(engine, &from, &mut from_state)?;
        if from == to {
            self.put_account_state(engine.snapshot(), &from, &from_state);
        } else if !amount.is_zero() {
            if let Some(candidate) = from_state.vote_to {
                self.adjust_candidate_votes(engine.snapshot(), &candidate, &-amount.clone());
                self.adjust_voters_count(engine.snapshot(), &-amount.clone());
            }
            from_state.balance -= &amount;
            if from_state.balance.is_zero() && from_state.vote_to.is_some() {
                from_state.vote_to = None;
            }
            self.put_account_state(engine.snapshot(), &from, &from_state);

            let mut to_state = self.account_state(engine.snapshot(), &to).unwrap_or_default();
            self.distribute_gas(engine, &to, &mut to_state)?;
            to_state.balance += &amount;
            if let Some(candidate) = to_state.vote_to {
                self.adjust_candidate_votes(engine.snapshot(), &candidate, &amount);
                self.adjust_voters_count(engine.snapshot(), &amount);
            }
            self.put_account_state(engine.snapshot(), &to, &to_state);
        } else {
            self.put_account_state(engine.snapshot(), &from, &from_state);
        }
        post_transfer(engine, self.hash, Some(from), Some(to), &amount, data)?;
        Ok(true)
    }

    fn vote_internal(
        &self,
        engine: &mut ApplicationEngine,
        account: UInt160,
        candidate: Option<ECPoint>,
    ) -> VmResult<bool> {
        if !engine.check_witness(&account)? {
            return Ok(false);
        }
        let Some(mut state) = self.account_state(engine.snapshot(), &account) else {
            return Ok(false);
        };
        if let Some(new_candidate) = &candidate {
            if !self.candidate_state(engine.snapshot(), new_candidate).registered {
                return Ok(false);
            }
        }
        // Settle rewards against the old vote before switching.
        self.distribute_gas(engine, &account, &mut state)?;
        let balance = state.balance.clone();
        match (&state.vote_to, &candidate) {
            (Some(old), _) => {
                self.adjust_candidate_votes(engine.snapshot(), old, &-balance.clone());
                if candidate.is_none() {
                    self.adjust_voters_count(engine.snapshot(), &-balance.clone());
                }
            }
            (None, Some(_)) => self.adjust_voters_count(engine.snapshot(), &balance),
            (None, None) => {}
        }
        if let Some(new_candidate) = &candidate {
            self.adjust_candidate_votes(engine.snapshot(), new_candidate, &balance);
            state.last_gas_per_vote = self.voter_reward(engine.snapshot(), new_candidate);
        } else {
            state.last_gas_per_vote = BigInt::zero();
        }
        state.vote_to = candidate;
        self.put_account_state(engine.snapshot(), &account, &state);
        Ok(true)
    }
}

impl Default for NeoToken {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for NeoToken {
    fn name(&self) -> &'static str {
        "NeoToken"
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
        let settings = engine.settings().clone();
        let committee = standby_committee(&settings);
        self.store_committee(engine.snapshot(), &committee);
        storage_put(engine.snapshot(), ID, KEY_VOTERS_COUNT, Vec::new());
        let mut gpb_key = vec![PREFIX_GAS_PER_BLOCK];
        gpb_key.extend_from_slice(&0u32.to_be_bytes());
        storage_put(engine.snapshot(), ID, &gpb_key, int_to_bytes(DEFAULT_GAS_PER_BLOCK));
        storage_put(
            engine.snapshot(),
            ID,
            KEY_REGISTER_PRICE,
            int_to_bytes(DEFAULT_REGISTER_PRICE),
        );
        // The whole supply starts at the committee address.
        let committee_address = self.committee_address(engine.snapshot(), &settings);
        let mut state = NeoAccountState {
            balance: BigInt::from(TOTAL_SUPPLY),
            ..Default::default()
        };
        state.balance_height = 0;
        self.put_account_state(engine.snapshot(), &committee_address, &state);
        post_transfer(
            engine,
            self.hash,
            None,
            Some(committee_address),
            &BigInt::from(TOTAL_SUPPLY),
            StackItem::Null,
        )
    }

    fn on_persist(&self, engine: &mut ApplicationEngine) -> VmResult<()> {
        let settings = engine.settings().clone();
        let height = engine.block_height();
        let size = settings.committee_size() as u32;
        if size > 0 && height > 0 && height % size == 0 {
            let committee = self.compute_committee(engine.snapshot(), &settings);
            self.store_committee(engine.snapshot(), &committee);
        }
        Ok(())
    }

    fn post_persist(&self, engine: &mut ApplicationEngine) -> VmResult<()> {
        let settings = engine.settings().clone();
        let height = engine.block_height();
        let committee = self.committee(engine.snapshot(), &settings);
        if committee.is_empty() {
            return Ok(());
        }
        let gas_per_block = self.gas_per_block(engine.snapshot(), height);
        // Round-robin committee member reward.
        let index = (height as usize) % committee.len();
        let member = committee[index].0;
        let member_account =
            UInt160::from_array(neonova_crypto::hash160(&standard::create_signature_script(&member)));
        let committee_reward = BigInt::from(gas_per_block * COMMITTEE_REWARD_RATIO / 100);
        let gas = engine.natives().gas();
        gas.mint(engine, &member_account, &committee_reward, false)?;

        // Per-vote reward accumulators for voted committee candidates.
        let voter_total = BigInt::from(gas_per_block * VOTER_REWARD_RATIO / 100);
        let share = &voter_total / BigInt::from(committee.len() as u64);
        for (candidate, _) in &committee {
            let state = self.candidate_state(engine.snapshot(), candidate);
            if state.registered && state.votes.is_positive() {
                let increment = &share * reward_scale() / &state.votes;
                let updated = self.voter_reward(engine.snapshot(), candidate) + increment;
                storage_put(
                    engine.snapshot(),
                    ID,
                    &voter_reward_key(candidate),
                    bigint_to_bytes(&updated),
                );
            }
        }
        // Refresh the mirrored committee cache from the DAO.
        let stored = self.committee_from_storage(engine.snapshot());
        *self.committee_cache.write() = stored;
        Ok(())
    }

    fn invoke(
        &self,
        engine: &mut ApplicationEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> VmResult<StackItem> {
        let rc = engine.vm().reference_counter().clone();
        match method {
            "symbol" => Ok(StackItem::from_string("NEO")),
            "decimals" => Ok(StackItem::from_int(0)),
            "totalSupply" => Ok(StackItem::from_int(TOTAL_SUPPLY)),
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
                let ok = self.transfer_internal(engine, from, to, amount, args[3].clone())?;
                Ok(StackItem::Boolean(ok))
            }
            "unclaimedGas" => {
                let account = super::policy::account_arg(&args[0])?;
                let end = args[1].as_i64()? as u32;
                Ok(StackItem::Integer(
                    self.unclaimed_gas(engine.snapshot(), &account, end),
                ))
            }
            "registerCandidate" => {
                let key = pubkey_arg(&args[0])?;
                let owner = signature_account(&key);
                if !engine.check_witness(&owner)? {
                    return Ok(StackItem::Boolean(false));
                }
                let price = self.register_price(engine.snapshot());
                engine.vm_mut().consume_gas(price)?;
                let mut state = self.candidate_state(engine.snapshot(), &key);
                state.registered = true;
                self.put_candidate_state(engine.snapshot(), &key, &state);
                Ok(StackItem::Boolean(true))
            }
            "unregisterCandidate" => {
                let key = pubkey_arg(&args[0])?;
                let owner = signature_account(&key);
                if !engine.check_witness(&owner)? {
                    return Ok(StackItem::Boolean(false));
                }
                let mut state = self.candidate_state(engine.snapshot(), &key);
                state.registered = false;
                self.put_candidate_state(engine.snapshot(), &key, &state);
                Ok(StackItem::Boolean(true))
            }
            "vote" => {
                let account = super::policy::account_arg(&args[0])?;
                let candidate = if args[1].is_null() {
                    None
                } else {
                    Some(pubkey_arg(&args[1])?)
                };
                let ok = self.vote_internal(engine, account, candidate)?;
                Ok(StackItem::Boolean(ok))
            }
            "getCandidates" => {
                let mut entries = Vec::new();
                for (key, value) in engine
                    .snapshot()
                    .find_storage(ID, &[PREFIX_CANDIDATE], false)
                {
                    let Ok(point) = ECPoint::from_bytes(&key[1..]) else {
                        continue;
                    };
                    let Some(state) = CandidateState::from_bytes(&value) else {
                        continue;
                    };
                    if state.registered {
                        entries.push(StackItem::new_struct(
                            &rc,
                            vec![
                                StackItem::from_bytes(point.to_vec()),
                                StackItem::Integer(state.votes),
                            ],
                        )?);
                    }
                }
                StackItem::new_array(&rc, entries)
            }
            "getCandidateVote" => {
                let key = pubkey_arg(&args[0])?;
                let state = self.candidate_state(engine.snapshot(), &key);
                if state.registered {
                    Ok(StackItem::Integer(state.votes))
                } else {
                    Ok(StackItem::from_int(-1))
                }
            }
            "getCommittee" => {
                let mut keys: Vec<ECPoint> = self
                    .committee(engine.snapshot(), engine.settings())
                    .into_iter()
                    .map(|(k, _)| k)
                    .collect();
                keys.sort();
                let items = keys
                    .into_iter()
                    .map(|k| StackItem::from_bytes(k.to_vec()))
                    .collect();
                StackItem::new_array(&rc, items)
            }
            "getNextBlockValidators" => {
                let settings = engine.settings().clone();
                let validators = self.next_block_validators(engine.snapshot(), &settings);
                let items = validators
                    .into_iter()
                    .map(|k| StackItem::from_bytes(k.to_vec()))
                    .collect();
                StackItem::new_array(&rc, items)
            }
            "getGasPerBlock" => {
                let height = engine.block_height();
                Ok(StackItem::from_int(
                    self.gas_per_block(engine.snapshot(), height),
                ))
            }
            "setGasPerBlock" => {
                let value = args[0].as_i64()?;
                if !(0..=10 * GAS_FACTOR).contains(&value) {
                    return Err(VmError::throw("GasPerBlock out of range"));
                }
                if !engine.check_committee()? {
                    return Err(VmError::throw("invalid committee signature"));
                }
                // Effective from the next block.
                let start = engine.block_height() + 1;
                let mut key = vec![PREFIX_GAS_PER_BLOCK];
                key.extend_from_slice(&start.to_be_bytes());
                storage_put(engine.snapshot(), ID, &key, int_to_bytes(value));
                Ok(StackItem::Null)
            }
            "getRegisterPrice" => Ok(StackItem::from_int(self.register_price(engine.snapshot()))),
            "setRegisterPrice" => {
                let value = args[0].as_i64()?;
                if value <= 0 {
                    return Err(VmError::throw("RegisterPrice must be positive"));
                }
                if !engine.check_committee()? {
                    return Err(VmError::throw("invalid committee signature"));
                }
                storage_put(engine.snapshot(), ID, KEY_REGISTER_PRICE, int_to_bytes(value));
                Ok(StackItem::Null)
            }
            "getAccountState" => {
                let account = super::policy::account_arg(&args[0])?;
                match self.account_state(engine.snapshot(), &account) {
                    Some(state) => StackItem::new_struct(
                        &rc,
                        vec![
                            StackItem::Integer(state.balance),
                            StackItem::from_int(state.balance_height as i64),
                            match state.vote_to {
                                Some(key) => StackItem::from_bytes(key.to_vec()),
                                None => StackItem::Null,
                            },
                            StackItem::Integer(state.last_gas_per_vote),
                        ],
                    ),
                    None => Ok(StackItem::Null),
                }
            }
            _ => Err(VmError::throw(format!("unknown NEO method {method}"))),
        }
    }
}

fn balance_key(account: &UInt160) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(PREFIX_BALANCE);
    key.extend_from_slice(account.as_bytes());
    key
}

fn candidate_key(candidate: &ECPoint) -> Vec<u8> {
    let mut key = Vec::with_capacity(34);
    key.push(PREFIX_CANDIDATE);
    key.extend_from_slice(candidate.as_bytes());
    key
}

fn voter_reward_key(candidate: &ECPoint) -> Vec<u8> {
    let mut key = Vec::with_capacity(34);
    key.push(PREFIX_VOTER_REWARD);
    key.extend_from_slice(candidate.as_bytes());
    key
}

fn standby_committee(settings: &ProtocolSettings) -> Vec<(ECPoint, BigInt)> {
    settings
        .committee_keys()
        .iter()
        .filter_map(|bytes| ECPoint::from_bytes(bytes).ok())
        .map(|key| (key, BigInt::zero()))
        .collect()
}

fn pubkey_arg(item: &StackItem) -> VmResult<ECPoint> {
    let bytes = item.as_bytes()?;
    ECPoint::from_bytes(&bytes).map_err(|e| VmError::throw(format!("invalid public key: {e}")))
}

/// The single-signature account controlled by a key.
fn signature_account(key: &ECPoint) -> UInt160 {
    UInt160::from_array(neonova_crypto::hash160(&standard::create_signature_script(key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_state_round_trip() {
        let state = NeoAccountState {
            balance: BigInt::from(1234),
            balance_height: 77,
            vote_to: None,
            last_gas_per_vote: BigInt::from(5),
        };
        let decoded = NeoAccountState::from_bytes(&state.to_bytes()).unwrap();
        assert_eq!(decoded.balance, state.balance);
        assert_eq!(decoded.balance_height, 77);
        assert!(decoded.vote_to.is_none());
    }

    #[test]
    fn candidate_state_round_trip() {
        let state = CandidateState {
            registered: true,
            votes: BigInt::from(42),
        };
        let decoded = CandidateState::from_bytes(&state.to_bytes()).unwrap();
        assert!(decoded.registered);
        assert_eq!(decoded.votes, BigInt::from(42));
    }

    #[test]
    fn unclaimed_gas_requires_holding_period() {
        let token = NeoToken::new();
        let dao = Dao::new(std::sync::Arc::new(neonova_persistence::MemoryStore::new()));
        assert!(token
            .unclaimed_gas(&dao, &UInt160::from_array([1; 20]), 100)
            .is_zero());
    }
}
