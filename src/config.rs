use serde::{Deserialize, Serialize};

use crate::error::{KeyringError, Result};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KeyringConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    pub db_path: String,
    /// Commit attempts for a contended read-modify-write before giving up.
    #[serde(default = "default_max_commit_attempts")]
    pub max_commit_attempts: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_commit_attempts() -> u32 {
    64
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            storage: StorageConfig {
                db_path: "./data/keyring".to_string(),
                max_commit_attempts: default_max_commit_attempts(),
            },
        }
    }
}

impl KeyringConfig {
    /// Load the config at `path`, writing the defaults there if it does not exist.
    pub fn load(path: &str) -> Result<Self> {
        if !std::path::Path::new(path).exists() {
            let config = Self::default();
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| KeyringError::Config(format!("could not render defaults: {}", e)))?;
            std::fs::write(path, rendered)
                .map_err(|e| KeyringError::Config(format!("could not write '{}': {}", path, e)))?;
            return Ok(config);
        }

        let s = std::fs::read_to_string(path)
            .map_err(|e| KeyringError::Config(format!("could not read '{}': {}", path, e)))?;
        toml::from_str(&s).map_err(|e| KeyringError::Config(format!("could not parse '{}': {}", path, e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.db_path.trim().is_empty() {
            return Err(KeyringError::Config("storage.db_path must not be empty".to_string()));
        }
        if self.storage.max_commit_attempts == 0 {
            return Err(KeyringError::Config(
                "storage.max_commit_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
