// VALIDATOR POOL & COMMITTEE SELECTION
// Deterministic, stake-weighted committee selection over a pool snapshot.
//
// SAFETY INVARIANTS:
// 1. Selection depends only on (seed, snapshot, size); input order is irrelevant
// 2. Every honest node derives the same seed from (target height, subject)
// 3. Only eligible validators backed by confident data enter the pool
// 4. Zero-stake entries are never selected

use hat_core::{Address, Amount, BlockHeight, Hash256};
use hat_crypto::hashing::{canonical_digest, hash_to_u64, sha256, DOMAIN_COMMITTEE};
use hat_crypto::CryptoResult;
use hat_state::ValidatorRegistry;
use log::info;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Sorted `(address, stake)` pairs.
pub type PoolSnapshot = Vec<(Address, Amount)>;

/// In-memory set of selectable validators, rebuilt from the registry.
#[derive(Default)]
pub struct ValidatorPool {
    members: RwLock<BTreeMap<Address, Amount>>,
    last_rebuild: RwLock<Option<BlockHeight>>,
}

impl ValidatorPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the pool with every selectable record in the registry.
    pub fn rebuild(&self, registry: &ValidatorRegistry, height: BlockHeight) -> usize {
        let fresh: BTreeMap<Address, Amount> = registry
            .iter_all()
            .filter(|r| r.is_selectable() && r.staked_amount > 0)
            .map(|r| (r.address, r.staked_amount))
            .collect();
        let count = fresh.len();
        *self.members.write() = fresh;
        *self.last_rebuild.write() = Some(height);
        info!("Validator pool rebuilt at height {}: {} members", height, count);
        count
    }

    pub fn needs_refresh(&self, height: BlockHeight, interval: u64) -> bool {
        match *self.last_rebuild.read() {
            None => true,
            Some(last) => height.saturating_sub(last) >= interval,
        }
    }

    pub fn upsert(&self, address: Address, stake: Amount) {
        if stake == 0 {
            self.members.write().remove(&address);
        } else {
            self.members.write().insert(address, stake);
        }
    }

    pub fn remove(&self, address: &Address) {
        self.members.write().remove(address);
    }

    pub fn stake_of(&self, address: &Address) -> Option<Amount> {
        self.members.read().get(address).copied()
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        self.members.read().iter().map(|(a, s)| (*a, *s)).collect()
    }
}

/// Seed shared by every node selecting for `(target_height, subject)`.
pub fn committee_seed(target_height: BlockHeight, subject: &Address) -> CryptoResult<Hash256> {
    canonical_digest(DOMAIN_COMMITTEE, &(target_height, subject))
}

fn ticket(seed: &Hash256, address: &Address) -> u64 {
    let mut buf = Vec::with_capacity(52);
    buf.extend_from_slice(&seed.0);
    buf.extend_from_slice(&address.0);
    hash_to_u64(&sha256(&buf))
}

/// Picks up to `size` validators. Each candidate draws a ticket from
/// `H(seed || address)`; the rank key is `ticket / stake`, so larger stake
/// ranks earlier in expectation. Ties fall back to address order.
pub fn select_committee(snapshot: &[(Address, Amount)], seed: &Hash256, size: usize) -> Vec<Address> {
    let mut ranked: Vec<(Address, Amount, u64)> = snapshot
        .iter()
        .filter(|(_, stake)| *stake > 0)
        .map(|(a, s)| (*a, *s, ticket(seed, a)))
        .collect();

    // Compare t_a / s_a against t_b / s_b without division.
    ranked.sort_by(|(addr_a, stake_a, t_a), (addr_b, stake_b, t_b)| {
        let lhs = (*t_a as u128) * (*stake_b as u128);
        let rhs = (*t_b as u128) * (*stake_a as u128);
        match lhs.cmp(&rhs) {
            Ordering::Equal => addr_a.cmp(addr_b),
            other => other,
        }
    });
    ranked.into_iter().take(size).map(|(a, _, _)| a).collect()
}
