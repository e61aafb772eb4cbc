pub mod cli;
pub mod config;
pub mod error;
pub mod keyring;
pub mod storage;

pub use error::{KeyringError, PersistenceError, Result};
pub use keyring::{KeyRecord, Keyring, User, MAX_DROPS_PER_KEY};
