//! Key record type definitions

use serde::{Deserialize, Serialize};

/// Persistent identifier of a user, issued by the identity layer
pub type UserId = u64;

/// Surrogate identifier of a key record, assigned at creation
pub type RecordId = u64;

/// Maximum number of drops a single key record may perform
pub const MAX_DROPS_PER_KEY: u32 = 10;

/// Reference to an authenticated user. Never created or mutated here.
#[derive(Clone, Copy, Debug)]
pub struct User {
    pub id: UserId,
}

impl User {
    pub fn new(id: UserId) -> Self {
        Self { id }
    }
}

/// A custodial key provisioned on behalf of exactly one user
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct KeyRecord {
    pub id: RecordId,
    pub user_id: UserId,

    // Issued by the custodial signer, immutable once set
    pub external_key_id: String,
    pub address: String,

    /// Only ever incremented by one per recorded drop
    pub drops_used: u32,

    pub created_at: u64,
    pub updated_at: u64,
    pub deleted_at: Option<u64>,
}

impl KeyRecord {
    pub fn remaining_drops(&self) -> u32 {
        remaining_drops(self.drops_used)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Drops left under the cap. Saturates at zero for over-cap counters.
pub fn remaining_drops(drops_used: u32) -> u32 {
    MAX_DROPS_PER_KEY.saturating_sub(drops_used)
}
