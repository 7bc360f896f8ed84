//! Per-key mutual exclusion.
//!
//! Mutations of one validator record, dispute or reward are serialized on
//! that record's own lock; unrelated keys never contend. An entry lives only
//! while some caller holds or waits on it.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
pub struct KeyLocks {
    locks: DashMap<Vec<u8>, Arc<Mutex<()>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, key: &[u8]) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_vec())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs `f` while holding the lock for `key`.
    pub fn with_lock<T>(&self, key: &[u8], f: impl FnOnce() -> T) -> T {
        let handle = self.handle(key);
        let out = {
            let _guard = handle.lock();
            f()
        };
        drop(handle);
        // Only the table's own reference left: nobody holds or waits.
        self.locks.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        out
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
