//! RocksDB-backed store.

use crate::store::{BatchOp, KvStore, PrefixIter, StoreError, StoreResult};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;

pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(RocksStore { db })
    }
}

impl KvStore for RocksStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.db.get(key).map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.db.put(key, value).map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> StoreResult<()> {
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                BatchOp::Put(k, v) => batch.put(k, v),
                BatchOp::Delete(k) => batch.delete(k),
            }
        }
        self.db.write(batch).map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn prefix_scan<'a>(&'a self, prefix: &[u8]) -> PrefixIter<'a> {
        let owned = prefix.to_vec();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward))
            .map(|item| {
                item.map(|(k, v)| (k.to_vec(), v.to_vec()))
                    .map_err(|e| StoreError::Backend(e.to_string()))
            })
            .take_while(move |item| match item {
                Ok((k, _)) => k.starts_with(&owned),
                Err(_) => true,
            });
        Box::new(iter)
    }
}
