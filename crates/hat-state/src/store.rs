// KEY-VALUE STORE
// Byte-oriented storage shared by the validator registry and the dispute
// engine. Single puts and batches are atomic from a reader's perspective.

use log::warn;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend failure: {0}")]
    Backend(String),

    #[error("codec failure: {0}")]
    Codec(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One mutation inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

pub type KvPair = (Vec<u8>, Vec<u8>);

/// Lazy, key-ordered scan. Dropping it ends the scan.
pub type PrefixIter<'a> = Box<dyn Iterator<Item = StoreResult<KvPair>> + 'a>;

pub trait KvStore: Send + Sync {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Applies every op or none.
    fn write_batch(&self, ops: Vec<BatchOp>) -> StoreResult<()>;

    fn prefix_scan<'a>(&'a self, prefix: &[u8]) -> PrefixIter<'a>;
}

/// Retries a store mutation once before surfacing the failure.
pub fn with_retry<T>(what: &str, mut op: impl FnMut() -> StoreResult<T>) -> StoreResult<T> {
    match op() {
        Ok(v) => Ok(v),
        Err(first) => {
            warn!("Store {} failed, retrying once: {}", what, first);
            op()
        }
    }
}

/// Ordered in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.map.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> StoreResult<()> {
        let mut map = self.map.write();
        for op in ops {
            match op {
                BatchOp::Put(k, v) => {
                    map.insert(k, v);
                }
                BatchOp::Delete(k) => {
                    map.remove(&k);
                }
            }
        }
        Ok(())
    }

    fn prefix_scan<'a>(&'a self, prefix: &[u8]) -> PrefixIter<'a> {
        // Snapshot under the read lock so the caller never holds it.
        let prefix = prefix.to_vec();
        let snapshot: Vec<KvPair> = self
            .map
            .read()
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Box::new(snapshot.into_iter().map(Ok))
    }
}

/// Store wrapper that fails a scripted number of writes; used to exercise
/// retry paths.
#[cfg(test)]
pub(crate) mod flaky {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    pub struct FlakyStore {
        pub inner: MemoryStore,
        pub failing_writes: AtomicU32,
        pub failing_reads: AtomicU32,
    }

    impl FlakyStore {
        fn trip(counter: &AtomicU32) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    impl KvStore for FlakyStore {
        fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
            if Self::trip(&self.failing_reads) {
                return Err(StoreError::Backend("injected read failure".into()));
            }
            self.inner.get(key)
        }

        fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
            if Self::trip(&self.failing_writes) {
                return Err(StoreError::Backend("injected write failure".into()));
            }
            self.inner.put(key, value)
        }

        fn write_batch(&self, ops: Vec<BatchOp>) -> StoreResult<()> {
            if Self::trip(&self.failing_writes) {
                return Err(StoreError::Backend("injected write failure".into()));
            }
            self.inner.write_batch(ops)
        }

        fn prefix_scan<'a>(&'a self, prefix: &[u8]) -> PrefixIter<'a> {
            self.inner.prefix_scan(prefix)
        }
    }
}
