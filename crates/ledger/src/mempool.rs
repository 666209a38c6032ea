//! The memory pool: verified transactions awaiting a block.

use crate::{VerifyError, VerifyResult};
use neonova_core::{Transaction, TransactionAttribute, UInt160, UInt256};
use num_bigint::BigInt;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// Priority key ordering the pool: high-priority first, then fee density,
/// then hash for determinism. `BTreeSet` keeps the *lowest* key first, so
/// eviction pops from the front.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct PoolKey {
    high_priority: bool,
    fee_per_byte: i64,
    network_fee: i64,
    hash: UInt256,
}

#[derive(Debug, Clone)]
struct PoolItem {
    tx: Transaction,
    key: PoolKey,
}

struct PoolState {
    items: HashMap<UInt256, PoolItem>,
    ordered: BTreeSet<PoolKey>,
    /// Sum of fees every sender has committed to pooled transactions.
    sender_fees: HashMap<UInt160, i64>,
    /// Conflict target hash → pooled transactions that declared it.
    conflicts: HashMap<UInt256, Vec<UInt256>>,
}

/// A bounded, fee-ordered transaction pool.
///
/// Admission assumes the transaction already passed `VerifyTx`; the pool
/// adds the cross-transaction checks (sender fee budget, conflict
/// exclusion, capacity eviction).
pub struct MemPool {
    capacity: usize,
    state: RwLock<PoolState>,
}

impl MemPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: RwLock::new(PoolState {
                items: HashMap::new(),
                ordered: BTreeSet::new(),
                sender_fees: HashMap::new(),
                conflicts: HashMap::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.state.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().items.is_empty()
    }

    pub fn contains(&self, hash: &UInt256) -> bool {
        self.state.read().items.contains_key(hash)
    }

    /// Fees (system + network) this sender has pending in the pool.
    pub fn sender_fee(&self, sender: &UInt160) -> i64 {
        self.state.read().sender_fees.get(sender).copied().unwrap_or(0)
    }

    /// Pooled transactions, best first; block builders take a prefix.
    pub fn sorted_transactions(&self) -> Vec<Transaction> {
        let state = self.state.read();
        state
            .ordered
            .iter()
            .rev()
            .filter_map(|key| state.items.get(&key.hash).map(|item| item.tx.clone()))
            .collect()
    }

    /// Admits a verified transaction. `balance` is the sender's spendable
    /// GAS as of the current snapshot.
    pub fn try_add(&self, tx: Transaction, balance: &BigInt) -> VerifyResult<()> {
        let hash = tx.hash();
        let mut state = self.state.write();
        if state.items.contains_key(&hash) {
            return Err(VerifyError::AlreadyExists);
        }
        // A pooled transaction that declared a conflict with this hash keeps
        // it out unless this transaction pays strictly more.
        if let Some(rivals) = state.conflicts.get(&hash) {
            let rival_fees: i64 = rivals
                .iter()
                .filter_map(|h| state.items.get(h))
                .map(|item| item.tx.network_fee)
                .sum();
            if tx.network_fee <= rival_fees {
                return Err(VerifyError::MemPoolConflict);
            }
        }
        // Conflicts declared by this transaction against pooled ones.
        let mut evict: Vec<UInt256> = Vec::new();
        let mut conflicting_fees = 0i64;
        for attr in tx.attributes_of(TransactionAttribute::CONFLICTS) {
            if let TransactionAttribute::Conflicts { hash: target } = attr {
                if let Some(item) = state.items.get(target) {
                    conflicting_fees += item.tx.network_fee;
                    evict.push(*target);
                }
            }
        }
        if !evict.is_empty() && tx.network_fee <= conflicting_fees {
            return Err(VerifyError::MemPoolConflict);
        }

        // The sender must be able to fund every pooled transaction at once.
        let sender = tx.sender();
        let pending = state.sender_fees.get(&sender).copied().unwrap_or(0);
        let total =
            BigInt::from(pending) + BigInt::from(tx.system_fee) + BigInt::from(tx.network_fee);
        if total > *balance {
            return Err(VerifyError::MemPoolConflict);
        }

        let key = pool_key(&tx);
        if state.items.len() >= self.capacity && evict.is_empty() {
            // Evict the cheapest entry, but only for a strictly better one.
            let cheapest = state.ordered.iter().next().cloned();
            match cheapest {
                Some(lowest) if key > lowest => {
                    Self::remove_locked(&mut state, &lowest.hash);
                }
                _ => return Err(VerifyError::OutOfMemory),
            }
        }
        for target in evict {
            Self::remove_locked(&mut state, &target);
        }

        for attr in tx.attributes_of(TransactionAttribute::CONFLICTS) {
            if let TransactionAttribute::Conflicts { hash: target } = attr {
                state.conflicts.entry(*target).or_default().push(hash);
            }
        }
        *state.sender_fees.entry(sender).or_insert(0) += tx.system_fee + tx.network_fee;
        state.ordered.insert(key.clone());
        state.items.insert(hash, PoolItem { tx, key });
        Ok(())
    }

    /// Removes a transaction (mined or invalidated).
    pub fn remove(&self, hash: &UInt256) {
        let mut state = self.state.write();
        Self::remove_locked(&mut state, hash);
    }

    fn remove_locked(state: &mut PoolState, hash: &UInt256) {
        let Some(item) = state.items.remove(hash) else {
            return;
        };
        state.ordered.remove(&item.key);
        let sender = item.tx.sender();
        if let Some(fees) = state.sender_fees.get_mut(&sender) {
            *fees -= item.tx.system_fee + item.tx.network_fee;
            if *fees <= 0 {
                state.sender_fees.remove(&sender);
            }
        }
        for attr in item.tx.attributes_of(TransactionAttribute::CONFLICTS) {
            if let TransactionAttribute::Conflicts { hash: target } = attr {
                if let Some(list) = state.conflicts.get_mut(target) {
                    list.retain(|h| h != hash);
                    if list.is_empty() {
                        state.conflicts.remove(target);
                    }
                }
            }
        }
    }

    /// Drops transactions whose validity window closed at `height`.
    pub fn remove_expired(&self, height: u32) {
        let mut state = self.state.write();
        let expired: Vec<UInt256> = state
            .items
            .values()
            .filter(|item| item.tx.valid_until_block <= height)
            .map(|item| item.key.hash)
            .collect();
        for hash in expired {
            Self::remove_locked(&mut state, &hash);
        }
    }

    /// Drops every transaction included in (or conflicting with) a committed
    /// block.
    pub fn remove_stale(&self, block_txs: &[Transaction]) {
        let mut state = self.state.write();
        for tx in block_txs {
            let hash = tx.hash();
            Self::remove_locked(&mut state, &hash);
            // Pooled rivals that conflict with a now-committed tx die too.
            if let Some(rivals) = state.conflicts.get(&hash).cloned() {
                for rival in rivals {
                    Self::remove_locked(&mut state, &rival);
                }
            }
            for attr in tx.attributes_of(TransactionAttribute::CONFLICTS) {
                if let TransactionAttribute::Conflicts { hash: target } = attr {
                    Self::remove_locked(&mut state, target);
                }
            }
        }
    }
}

fn pool_key(tx: &Transaction) -> PoolKey {
    PoolKey {
        high_priority: tx
            .attributes_of(TransactionAttribute::HIGH_PRIORITY)
            .next()
            .is_some(),
        fee_per_byte: tx.fee_per_byte(),
        network_fee: tx.network_fee,
        hash: tx.hash(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neonova_core::{Signer, Witness};

    fn tx(nonce: u32, network_fee: i64, sender: u8) -> Transaction {
        Transaction {
            version: 0,
            nonce,
            system_fee: 0,
            network_fee,
            valid_until_block: 100,
            signers: vec![Signer::called_by_entry(UInt160::from_array([sender; 20]))],
            attributes: vec![],
            script: vec![0x11],
            witnesses: vec![Witness::default()],
        }
    }

    fn rich() -> BigInt {
        BigInt::from(1_000_000_000i64)
    }

    #[test]
    fn orders_by_fee_density() {
        let pool = MemPool::new(10);
        pool.try_add(tx(1, 100, 1), &rich()).unwrap();
        pool.try_add(tx(2, 5_000, 1), &rich()).unwrap();
        pool.try_add(tx(3, 1_000, 1), &rich()).unwrap();
        let sorted = pool.sorted_transactions();
        assert_eq!(sorted[0].network_fee, 5_000);
        assert_eq!(sorted[2].network_fee, 100);
    }

    #[test]
    fn high_priority_outranks_fees() {
        let pool = MemPool::new(10);
        let mut hp = tx(1, 1, 1);
        hp.attributes.push(TransactionAttribute::HighPriority);
        pool.try_add(tx(2, 1_000_000, 1), &rich()).unwrap();
        pool.try_add(hp.clone(), &rich()).unwrap();
        assert_eq!(pool.sorted_transactions()[0].hash(), hp.hash());
    }

    #[test]
    fn sender_fee_budget_is_enforced() {
        let pool = MemPool::new(10);
        let balance = BigInt::from(1_000i64);
        pool.try_add(tx(1, 500, 7), &balance).unwrap();
        // Second tx pushes the sender's pooled fees past the balance.
        assert_eq!(
            pool.try_add(tx(2, 501, 7), &balance),
            Err(VerifyError::MemPoolConflict)
        );
        assert_eq!(pool.try_add(tx(3, 500, 7), &balance), Ok(()));
    }

    #[test]
    fn eviction_prefers_cheapest() {
        let pool = MemPool::new(2);
        pool.try_add(tx(1, 10, 1), &rich()).unwrap();
        pool.try_add(tx(2, 20, 1), &rich()).unwrap();
        // Cheaper than everything pooled: rejected.
        assert_eq!(pool.try_add(tx(3, 5, 1), &rich()), Err(VerifyError::OutOfMemory));
        // Better: evicts the cheapest.
        pool.try_add(tx(4, 30, 1), &rich()).unwrap();
        assert_eq!(pool.len(), 2);
        let fees: Vec<i64> = pool
            .sorted_transactions()
            .iter()
            .map(|t| t.network_fee)
            .collect();
        assert_eq!(fees, vec![30, 20]);
    }

    #[test]
    fn conflicts_block_the_target() {
        let pool = MemPool::new(10);
        let target = tx(1, 100, 1);
        let mut rival = tx(2, 50, 2);
        rival.attributes.push(TransactionAttribute::Conflicts {
            hash: target.hash(),
        });
        pool.try_add(rival, &rich()).unwrap();
        assert_eq!(
            pool.try_add(target, &rich()),
            Err(VerifyError::MemPoolConflict)
        );
    }

    #[test]
    fn remove_expired_drops_closed_windows() {
        let pool = MemPool::new(10);
        let mut stale = tx(1, 100, 1);
        stale.valid_until_block = 5;
        pool.try_add(stale, &rich()).unwrap();
        pool.remove_expired(4);
        assert_eq!(pool.len(), 1);
        pool.remove_expired(5);
        assert!(pool.is_empty());
    }

    #[test]
    fn remove_stale_clears_included_and_conflicting() {
        let pool = MemPool::new(10);
        let mined = tx(1, 100, 1);
        let mut rival = tx(2, 200, 2);
        rival.attributes.push(TransactionAttribute::Conflicts {
            hash: mined.hash(),
        });
        pool.try_add(rival.clone(), &rich()).unwrap();
        pool.remove_stale(std::slice::from_ref(&mined));
        assert!(!pool.contains(&rival.hash()));
        assert!(pool.is_empty());
    }
}
