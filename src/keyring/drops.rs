//! Drop allowance accounting

use std::sync::Arc;
use tracing::{debug, warn};

use super::store::KeyRecordStore;
use super::types::{KeyRecord, MAX_DROPS_PER_KEY};
use crate::error::{KeyringError, PersistenceError, Result};

/// Enforces the drop cap and reports the remaining allowance.
///
/// Every write to `drops_used` is a single atomic increment executed by the
/// store. The record passed in only identifies the target; its counter value
/// is never used to compute the new one.
pub struct DropAccountant {
    store: Arc<KeyRecordStore>,
}

impl DropAccountant {
    pub fn new(store: Arc<KeyRecordStore>) -> Self {
        Self { store }
    }

    pub fn remaining_drops(&self, record: &KeyRecord) -> u32 {
        record.remaining_drops()
    }

    /// Increment the record's drop counter by exactly one.
    ///
    /// Does not consult the cap. Callers that need the cap enforced should
    /// use [`DropAccountant::record_drop_within_cap`].
    pub fn record_drop(&self, record: &KeyRecord) -> Result<KeyRecord> {
        let updated = self.store.update_record(record.id, increment)?;
        debug!(record_id = updated.id, drops_used = updated.drops_used, "Recorded drop");
        Ok(updated)
    }

    /// Increment the counter only while it is below the cap.
    ///
    /// The check and the increment happen in one atomic update, so concurrent
    /// callers can never push the counter past [`MAX_DROPS_PER_KEY`].
    pub fn record_drop_within_cap(&self, record: &KeyRecord) -> Result<KeyRecord> {
        let result = self.store.update_record(record.id, |current| {
            if current.drops_used >= MAX_DROPS_PER_KEY {
                return Err(KeyringError::DropCapReached {
                    record_id: current.id,
                    drops_used: current.drops_used,
                });
            }
            increment(current)
        });

        match result {
            Ok(updated) => {
                debug!(record_id = updated.id, drops_used = updated.drops_used, "Recorded capped drop");
                Ok(updated)
            }
            Err(e @ KeyringError::DropCapReached { .. }) => {
                warn!(record_id = record.id, "Drop rejected: {}", e);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

fn increment(record: &mut KeyRecord) -> Result<()> {
    record.drops_used = record.drops_used.checked_add(1).ok_or_else(|| {
        PersistenceError::ConstraintViolation(format!("drop counter of key record {} is saturated", record.id))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyring::test_support::open_test_storage;
    use crate::keyring::types::User;

    fn accountant_with_record() -> (tempfile::TempDir, DropAccountant, KeyRecord) {
        let (dir, storage) = open_test_storage();
        let store = Arc::new(KeyRecordStore::new(storage));
        let record = store.create(&User::new(1), "tk-001", "0xabc").unwrap();
        (dir, DropAccountant::new(store), record)
    }

    #[test]
    fn test_single_drop() {
        let (_dir, accountant, record) = accountant_with_record();
        assert_eq!(accountant.remaining_drops(&record), 10);

        let updated = accountant.record_drop(&record).unwrap();
        assert_eq!(updated.drops_used, record.drops_used + 1);
        assert_eq!(accountant.remaining_drops(&updated), 9);
        assert!(updated.updated_at >= record.updated_at);
        assert_eq!(updated.created_at, record.created_at);
    }

    #[test]
    fn test_stale_record_does_not_lose_increments() {
        let (_dir, accountant, record) = accountant_with_record();

        // The same (stale) snapshot is passed every time
        accountant.record_drop(&record).unwrap();
        accountant.record_drop(&record).unwrap();
        let updated = accountant.record_drop(&record).unwrap();

        assert_eq!(updated.drops_used, 3);
    }

    #[test]
    fn test_uncapped_drop_passes_cap() {
        let (_dir, accountant, record) = accountant_with_record();

        let mut latest = record.clone();
        for _ in 0..12 {
            latest = accountant.record_drop(&record).unwrap();
        }

        assert_eq!(latest.drops_used, 12);
        assert_eq!(accountant.remaining_drops(&latest), 0);
    }

    #[test]
    fn test_capped_drop_stops_at_cap() {
        let (_dir, accountant, record) = accountant_with_record();

        for _ in 0..MAX_DROPS_PER_KEY {
            accountant.record_drop_within_cap(&record).unwrap();
        }

        let err = accountant.record_drop_within_cap(&record).unwrap_err();
        assert!(matches!(
            err,
            KeyringError::DropCapReached { drops_used: 10, .. }
        ));
    }

    #[test]
    fn test_concurrent_capped_drops_never_exceed_cap() {
        let (_dir, accountant, record) = accountant_with_record();

        let outcomes: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..30)
                .map(|_| s.spawn(|| accountant.record_drop_within_cap(&record)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let succeeded = outcomes.iter().filter(|r| r.is_ok()).count();
        let rejected = outcomes
            .iter()
            .filter(|r| matches!(r, Err(KeyringError::DropCapReached { .. })))
            .count();
        assert_eq!(succeeded, 10);
        assert_eq!(rejected, 20);

        let stored = accountant.store.find_by_id(record.id).unwrap().unwrap();
        assert_eq!(stored.drops_used, MAX_DROPS_PER_KEY);
    }

    #[test]
    fn test_saturated_counter_is_rejected() {
        let (_dir, accountant, record) = accountant_with_record();

        accountant
            .store
            .update_record(record.id, |r| {
                r.drops_used = u32::MAX;
                Ok(())
            })
            .unwrap();

        let err = accountant.record_drop(&record).unwrap_err();
        assert!(matches!(
            err,
            KeyringError::Persistence(PersistenceError::ConstraintViolation(_))
        ));
        assert_eq!(accountant.store.find_by_id(record.id).unwrap().unwrap().drops_used, u32::MAX);
    }

    #[test]
    fn test_drop_on_deleted_record() {
        let (_dir, accountant, record) = accountant_with_record();
        accountant.store.soft_delete(&User::new(1)).unwrap();

        let err = accountant.record_drop(&record).unwrap_err();
        assert!(matches!(
            err,
            KeyringError::Persistence(PersistenceError::RecordMissing(_))
        ));
    }
}
