//! Custodial key records and their drop allowance
//!
//! Each user owns at most one key record. The record counts how many
//! faucet drops have been made against it, up to [`MAX_DROPS_PER_KEY`]:
//! - `store` creates and looks up records
//! - `drops` computes the remaining allowance and records drops atomically

pub mod drops;
pub mod store;
pub mod types;

pub use drops::DropAccountant;
pub use store::KeyRecordStore;
pub use types::{remaining_drops, KeyRecord, RecordId, User, UserId, MAX_DROPS_PER_KEY};

use std::sync::Arc;

use crate::config::KeyringConfig;
use crate::error::{KeyringError, PersistenceError, Result};
use crate::storage::Storage;

/// Entry point used by the API layer. Safe to share across threads.
pub struct Keyring {
    store: Arc<KeyRecordStore>,
    accountant: DropAccountant,
}

impl Keyring {
    pub fn open(config: &KeyringConfig) -> Result<Self> {
        config.validate()?;
        let storage = Storage::open(&config.storage)?;
        Ok(Self::with_storage(Arc::new(storage)))
    }

    pub fn with_storage(storage: Arc<Storage>) -> Self {
        let store = Arc::new(KeyRecordStore::new(storage));
        Self {
            accountant: DropAccountant::new(Arc::clone(&store)),
            store,
        }
    }

    pub fn create_key_record(&self, user: &User, external_key_id: &str, address: &str) -> Result<KeyRecord> {
        self.store.create(user, external_key_id, address)
    }

    pub fn get_key_record_for_user(&self, user: &User) -> Result<KeyRecord> {
        self.store.find_by_user(user)
    }

    /// Return the user's record, provisioning it with the given key if absent.
    pub fn get_or_create(&self, user: &User, external_key_id: &str, address: &str) -> Result<KeyRecord> {
        match self.store.find_by_user(user) {
            Err(KeyringError::NotFound(_)) => {}
            found => return found,
        }

        match self.store.create(user, external_key_id, address) {
            // Lost a provisioning race; the winner's record is the user's record
            Err(KeyringError::Persistence(PersistenceError::ConstraintViolation(reason))) => {
                self.store.find_by_user(user).map_err(|e| match e {
                    KeyringError::NotFound(_) => PersistenceError::ConstraintViolation(reason).into(),
                    other => other,
                })
            }
            created => created,
        }
    }

    pub fn remaining_drops(&self, record: &KeyRecord) -> u32 {
        self.accountant.remaining_drops(record)
    }

    pub fn record_drop(&self, record: &KeyRecord) -> Result<KeyRecord> {
        self.accountant.record_drop(record)
    }

    pub fn record_drop_within_cap(&self, record: &KeyRecord) -> Result<KeyRecord> {
        self.accountant.record_drop_within_cap(record)
    }
}
