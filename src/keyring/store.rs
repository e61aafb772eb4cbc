//! Key record storage and lookup

use std::sync::Arc;
use tracing::info;

use super::types::{KeyRecord, RecordId, User};
use crate::error::{KeyringError, PersistenceError, Result};
use crate::storage::{id_key, now_millis, Storage, CF_KEY_RECORDS, CF_META, CF_USER_INDEX};

const NEXT_RECORD_ID: &[u8] = b"next_key_record_id";

/// Durable mapping from a user to their single key record.
///
/// Uniqueness per user is enforced here: `create` checks the user index
/// inside the same transaction that writes the record, so a second record
/// for the same user is rejected with a constraint violation even when two
/// creates race.
pub struct KeyRecordStore {
    storage: Arc<Storage>,
}

impl KeyRecordStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Persist a new key record with no drops used
    pub fn create(&self, user: &User, external_key_id: &str, address: &str) -> Result<KeyRecord> {
        require_non_empty("external_key_id", external_key_id)?;
        require_non_empty("address", address)?;

        let user_key = id_key(user.id);

        let record = self.storage.transact(|txn| -> Result<KeyRecord> {
            if let Some(existing) = txn.get_for_update::<RecordId>(CF_USER_INDEX, &user_key)? {
                return Err(PersistenceError::ConstraintViolation(format!(
                    "user {} already has key record {}",
                    user.id, existing
                ))
                .into());
            }

            let id: RecordId = txn.get_for_update(CF_META, NEXT_RECORD_ID)?.unwrap_or(1);
            txn.put(CF_META, NEXT_RECORD_ID, &(id + 1))?;

            let now = now_millis();
            let record = KeyRecord {
                id,
                user_id: user.id,
                external_key_id: external_key_id.to_string(),
                address: address.to_string(),
                drops_used: 0,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            };

            txn.put(CF_KEY_RECORDS, &id_key(id), &record)?;
            txn.put(CF_USER_INDEX, &user_key, &id)?;
            Ok(record)
        })?;

        info!(record_id = record.id, user_id = user.id, address = %record.address, "Created key record");
        Ok(record)
    }

    /// Get the live key record for a user
    pub fn find_by_user(&self, user: &User) -> Result<KeyRecord> {
        let record_id: RecordId = self
            .storage
            .get(CF_USER_INDEX, &id_key(user.id))?
            .ok_or(KeyringError::NotFound(user.id))?;

        match self.find_by_id(record_id)? {
            Some(record) if !record.is_deleted() => Ok(record),
            Some(_) => Err(KeyringError::NotFound(user.id)),
            // The index and the record are written together, so this is corruption
            None => Err(PersistenceError::RecordMissing(record_id).into()),
        }
    }

    /// Get a record by id, including soft-deleted ones
    pub fn find_by_id(&self, id: RecordId) -> Result<Option<KeyRecord>> {
        Ok(self.storage.get(CF_KEY_RECORDS, &id_key(id))?)
    }

    /// Mark the user's record deleted and release the user for re-provisioning.
    pub fn soft_delete(&self, user: &User) -> Result<KeyRecord> {
        let user_key = id_key(user.id);

        let record = self.storage.transact(|txn| -> Result<KeyRecord> {
            let id: RecordId = txn
                .get_for_update(CF_USER_INDEX, &user_key)?
                .ok_or(KeyringError::NotFound(user.id))?;
            let key = id_key(id);
            let mut record: KeyRecord = txn
                .get_for_update(CF_KEY_RECORDS, &key)?
                .ok_or(PersistenceError::RecordMissing(id))?;

            let now = now_millis();
            record.deleted_at = Some(now);
            record.updated_at = now;

            txn.put(CF_KEY_RECORDS, &key, &record)?;
            txn.delete(CF_USER_INDEX, &user_key)?;
            Ok(record)
        })?;

        info!(record_id = record.id, user_id = user.id, "Soft-deleted key record");
        Ok(record)
    }

    /// Atomically apply `mutate` to the stored record and write it back.
    ///
    /// `mutate` always sees the latest committed value and may run more than
    /// once if a concurrent writer wins the commit. Returning an error aborts
    /// the update.
    pub(crate) fn update_record<F>(&self, id: RecordId, mut mutate: F) -> Result<KeyRecord>
    where
        F: FnMut(&mut KeyRecord) -> Result<()>,
    {
        let key = id_key(id);

        self.storage.transact(|txn| -> Result<KeyRecord> {
            let mut record: KeyRecord = match txn.get_for_update(CF_KEY_RECORDS, &key)? {
                Some(record) => record,
                None => return Err(PersistenceError::RecordMissing(id).into()),
            };
            if record.is_deleted() {
                return Err(PersistenceError::RecordMissing(id).into());
            }

            mutate(&mut record)?;
            record.updated_at = now_millis();

            txn.put(CF_KEY_RECORDS, &key, &record)?;
            Ok(record)
        })
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(PersistenceError::ConstraintViolation(format!("{} must not be empty", field)).into());
    }
    Ok(())
}
