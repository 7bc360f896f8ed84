// VALIDATOR REGISTRY
// Durable eligibility records keyed by validator address.
//
// SAFETY INVARIANTS:
// 1. Each write replaces the full record in one atomic put
// 2. Writes are retried once before the failure is surfaced
// 3. A read failure degrades to "not found" with a warning
// 4. Iteration is lazy; callers may stop at any point

use crate::locks::KeyLocks;
use crate::store::{with_retry, KvStore, StoreError};
use hat_core::{Address, ValidatorEligibilityRecord};
use log::{info, warn};
use std::ops::ControlFlow;
use std::sync::Arc;
use thiserror::Error;

pub const VALIDATOR_PREFIX: &[u8] = b"validator_";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("record encoding failed: {0}")]
    Encoding(String),
}

pub fn validator_key(address: &Address) -> Vec<u8> {
    let mut key = VALIDATOR_PREFIX.to_vec();
    key.extend_from_slice(address.to_hex().as_bytes());
    key
}

pub struct ValidatorRegistry {
    store: Arc<dyn KvStore>,
    locks: KeyLocks,
}

impl ValidatorRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        ValidatorRegistry {
            store,
            locks: KeyLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn write(&self, record: &ValidatorEligibilityRecord) -> Result<(), RegistryError> {
        let value = bincode::serialize(record).map_err(|e| RegistryError::Encoding(e.to_string()))?;
        let key = validator_key(&record.address);
        with_retry("validator write", || self.store.put(&key, &value)).map_err(|e| {
            warn!("Validator record for {} not persisted: {}", record.address, e);
            RegistryError::from(e)
        })
    }

    /// Writes `record` unless a record computed at a later height is
    /// already stored. Returns whether the write happened.
    pub fn write_if_newer(&self, record: &ValidatorEligibilityRecord) -> Result<bool, RegistryError> {
        self.locks.with_lock(&validator_key(&record.address), || {
            if let Some(existing) = self.read(&record.address) {
                if existing.last_update_height > record.last_update_height {
                    info!(
                        "Skipping stale eligibility for {} (height {} < {})",
                        record.address, record.last_update_height, existing.last_update_height
                    );
                    return Ok(false);
                }
            }
            self.write(record)?;
            Ok(true)
        })
    }

    pub fn read(&self, address: &Address) -> Option<ValidatorEligibilityRecord> {
        let raw = match self.store.get(&validator_key(address)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Validator read for {} failed: {}", address, e);
                return None;
            }
        };
        match bincode::deserialize(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Validator record for {} is corrupt: {}", address, e);
                None
            }
        }
    }

    /// Streams every stored record in key order. Undecodable entries are
    /// skipped with a warning.
    pub fn iter_all(&self) -> impl Iterator<Item = ValidatorEligibilityRecord> + '_ {
        self.store
            .prefix_scan(VALIDATOR_PREFIX)
            .filter_map(|item| match item {
                Ok((key, raw)) => match bincode::deserialize::<ValidatorEligibilityRecord>(&raw) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!("Skipping corrupt record {}: {}", String::from_utf8_lossy(&key), e);
                        None
                    }
                },
                Err(e) => {
                    warn!("Validator scan error: {}", e);
                    None
                }
            })
    }

    /// Visitor form of `iter_all`; returns how many records were visited.
    pub fn visit_all<F>(&self, mut visitor: F) -> usize
    where
        F: FnMut(&ValidatorEligibilityRecord) -> ControlFlow<()>,
    {
        let mut visited = 0;
        for record in self.iter_all() {
            visited += 1;
            if visitor(&record).is_break() {
                break;
            }
        }
        visited
    }

    pub fn list_keys_with_prefix(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        self.store
            .prefix_scan(prefix)
            .filter_map(|item| match item {
                Ok((key, _)) => Some(key),
                Err(e) => {
                    warn!("Prefix scan error: {}", e);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::flaky::FlakyStore;
    use crate::store::MemoryStore;
    use hat_core::DataQuality;
    use proptest::prelude::*;
    use std::sync::atomic::Ordering;

    fn record(n: u8, height: u64) -> ValidatorEligibilityRecord {
        let mut r = ValidatorEligibilityRecord::new(Address([n; 20]));
        r.staked_amount = 1_000 * n as u64;
        r.last_update_height = height;
        r
    }

    #[test]
    fn test_boundary_record_round_trip() {
        let registry = ValidatorRegistry::new(Arc::new(MemoryStore::new()));
        let zero = ValidatorEligibilityRecord::new(Address::default());
        registry.write(&zero).unwrap();
        assert_eq!(registry.read(&zero.address), Some(zero));
        assert_eq!(registry.read(&Address([9; 20])), None);
    }

    #[test]
    fn test_write_retries_once() {
        let store = Arc::new(FlakyStore::default());
        let registry = ValidatorRegistry::new(store.clone());
        store.failing_writes.store(1, Ordering::SeqCst);
        assert!(registry.write(&record(1, 1)).is_ok());

        store.failing_writes.store(2, Ordering::SeqCst);
        assert!(matches!(registry.write(&record(2, 1)), Err(RegistryError::Storage(_))));
        assert_eq!(registry.read(&Address([2; 20])), None);
    }

    #[test]
    fn test_read_failure_is_not_found() {
        let store = Arc::new(FlakyStore::default());
        let registry = ValidatorRegistry::new(store.clone());
        registry.write(&record(3, 1)).unwrap();
        store.failing_reads.store(1, Ordering::SeqCst);
        assert_eq!(registry.read(&Address([3; 20])), None);
        assert!(registry.read(&Address([3; 20])).is_some());
    }

    #[test]
    fn test_visit_all_stops_early() {
        let registry = ValidatorRegistry::new(Arc::new(MemoryStore::new()));
        for n in 1..=5 {
            registry.write(&record(n, 1)).unwrap();
        }
        let mut seen = Vec::new();
        let visited = registry.visit_all(|r| {
            seen.push(r.address);
            if seen.len() == 2 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        assert_eq!(visited, 2);
        assert_eq!(seen, vec![Address([1; 20]), Address([2; 20])]);
        assert_eq!(registry.iter_all().count(), 5);
        assert_eq!(registry.list_keys_with_prefix(VALIDATOR_PREFIX).len(), 5);
    }

    #[test]
    fn test_write_if_newer_skips_stale() {
        let registry = ValidatorRegistry::new(Arc::new(MemoryStore::new()));
        assert!(registry.write_if_newer(&record(4, 10)).unwrap());
        assert!(!registry.write_if_newer(&record(4, 9)).unwrap());
        assert!(registry.write_if_newer(&record(4, 10)).unwrap());
        assert_eq!(registry.read(&Address([4; 20])).unwrap().last_update_height, 10);
    }

    fn quality() -> impl Strategy<Value = DataQuality> {
        prop_oneof![
            Just(DataQuality::Complete),
            Just(DataQuality::IndexFallback),
            Just(DataQuality::Stale),
            Just(DataQuality::Partial),
        ]
    }

    prop_compose! {
        fn any_record()(
            addr in any::<[u8; 20]>(),
            stake in any::<u64>(),
            age in any::<u64>(),
            seen in any::<u64>(),
            txs in any::<u64>(),
            unique in any::<u64>(),
            sources in any::<u32>(),
            height in any::<u64>(),
            time in any::<u64>(),
            flags in any::<(bool, bool, bool)>(),
            q in quality(),
        ) -> ValidatorEligibilityRecord {
            let mut r = ValidatorEligibilityRecord::new(Address(addr));
            r.staked_amount = stake;
            r.stake_age_blocks = age;
            r.blocks_since_first_seen = seen;
            r.transaction_count = txs;
            r.unique_interactions = unique;
            r.funding_sources = sources;
            r.last_update_height = height;
            r.last_update_time = time;
            r.meets_stake_requirement = flags.0;
            r.meets_history_requirement = flags.1;
            r.meets_interaction_requirement = flags.2;
            r.refresh_eligibility();
            r.data_quality = q;
            r
        }
    }

    proptest! {
        #[test]
        fn prop_registry_round_trip(r in any_record()) {
            let registry = ValidatorRegistry::new(Arc::new(MemoryStore::new()));
            registry.write(&r).unwrap();
            prop_assert_eq!(registry.read(&r.address), Some(r));
        }
    }
}
