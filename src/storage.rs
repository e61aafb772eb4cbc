//! RocksDB persistence engine.
//!
//! Values are bincode-encoded. Mutations go through [`Storage::transact`],
//! which runs a closure inside an optimistic transaction and re-runs it when
//! the commit loses a write conflict. Callers never perform their own
//! read-then-write across two round trips.

use rocksdb::{ColumnFamily, ErrorKind, OptimisticTransactionDB, Options, Transaction};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::thread;
use tracing::{debug, warn};

use crate::config::StorageConfig;
use crate::error::PersistenceError;

pub const CF_KEY_RECORDS: &str = "key_records";
pub const CF_USER_INDEX: &str = "key_records_by_user";
pub const CF_META: &str = "meta";

const COLUMN_FAMILIES: [&str; 3] = [CF_KEY_RECORDS, CF_USER_INDEX, CF_META];

pub struct Storage {
    db: OptimisticTransactionDB,
    max_commit_attempts: u32,
}

impl Storage {
    pub fn open(config: &StorageConfig) -> Result<Self, PersistenceError> {
        let path = Path::new(&config.db_path);
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = OptimisticTransactionDB::open_cf(&opts, path, COLUMN_FAMILIES)?;
        debug!("Opened key record database at {:?}", path);

        Ok(Storage {
            db,
            max_commit_attempts: config.max_commit_attempts.max(1),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, PersistenceError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PersistenceError::Database(format!("missing column family '{}'", name)))
    }

    /// Point read outside any transaction. Sees the latest committed value.
    pub fn get<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>, PersistenceError> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Run `op` inside an optimistic transaction and commit it.
    ///
    /// If the commit fails because another writer touched a key that `op`
    /// read with [`StorageTxn::get_for_update`], the transaction is discarded
    /// and `op` runs again against fresh state. An error returned by `op`
    /// aborts the transaction without writing anything.
    pub fn transact<R, E, F>(&self, mut op: F) -> Result<R, E>
    where
        F: FnMut(&StorageTxn<'_>) -> Result<R, E>,
        E: From<PersistenceError>,
    {
        for attempt in 1..=self.max_commit_attempts {
            let txn = StorageTxn {
                storage: self,
                inner: self.db.transaction(),
            };
            let value = op(&txn)?;

            match txn.inner.commit() {
                Ok(()) => return Ok(value),
                Err(e) if matches!(e.kind(), ErrorKind::Busy | ErrorKind::TryAgain) => {
                    debug!(attempt, "Write conflict on commit, retrying");
                    thread::yield_now();
                }
                Err(e) => return Err(PersistenceError::from(e).into()),
            }
        }

        warn!(attempts = self.max_commit_attempts, "Giving up on contended transaction");
        Err(PersistenceError::Contention {
            attempts: self.max_commit_attempts,
        }
        .into())
    }
}

/// A single attempt of a [`Storage::transact`] closure.
pub struct StorageTxn<'a> {
    storage: &'a Storage,
    inner: Transaction<'a, OptimisticTransactionDB>,
}

impl StorageTxn<'_> {
    /// Read a key and register it for conflict detection at commit time.
    pub fn get_for_update<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>, PersistenceError> {
        let handle = self.storage.cf(cf)?;
        match self.inner.get_for_update_cf(handle, key, true)? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn put<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<(), PersistenceError> {
        let bytes = encode(value)?;
        self.inner.put_cf(self.storage.cf(cf)?, key, bytes)?;
        Ok(())
    }

    pub fn delete(&self, cf: &str, key: &[u8]) -> Result<(), PersistenceError> {
        self.inner.delete_cf(self.storage.cf(cf)?, key)?;
        Ok(())
    }
}

/// Big-endian so that ids sort numerically under RocksDB's byte ordering.
pub fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

/// Wall clock in unix milliseconds, used for audit timestamps.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, PersistenceError> {
    bincode::serialize(value).map_err(|e| PersistenceError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PersistenceError> {
    bincode::deserialize(bytes).map_err(|e| PersistenceError::Deserialization(e.to_string()))
}
