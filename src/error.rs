use thiserror::Error;

use crate::keyring::types::{RecordId, UserId};

/// Failures raised by the persistence engine. Surfaced to callers verbatim.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("Key record {0} no longer exists")]
    RecordMissing(RecordId),
    #[error("Write conflict persisted after {attempts} attempts")]
    Contention { attempts: u32 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum KeyringError {
    #[error("No key record found for user {0}")]
    NotFound(UserId),
    #[error("Key record {record_id} has used all of its drops ({drops_used})")]
    DropCapReached { record_id: RecordId, drops_used: u32 },
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, KeyringError>;

impl From<rocksdb::Error> for PersistenceError {
    fn from(err: rocksdb::Error) -> Self {
        PersistenceError::Database(err.into_string())
    }
}
