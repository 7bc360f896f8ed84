// HAT STATE
// Key-value storage, per-key locks and the validator registry.
pub mod store;
pub mod locks;
pub mod registry;

#[cfg(feature = "rocksdb")]
pub mod rocks;

pub use store::{with_retry, BatchOp, KvPair, KvStore, MemoryStore, PrefixIter, StoreError, StoreResult};
pub use locks::KeyLocks;
pub use registry::{validator_key, RegistryError, ValidatorRegistry, VALIDATOR_PREFIX};

#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;
