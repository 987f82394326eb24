//! Sync configuration module
//!
//! Timing, batching and local-login settings for the sync layer. Built in
//! code through [`SyncConfigBuilder`] or loaded from TOML:
//!
//! ```toml
//! debounce_ms = 1000
//! pull_interval_ms = 10000
//! push_interval_ms = 30000
//! signature_batch_size = 5
//!
//! [local_credentials]
//! "admin.example@mail.test" = "secret"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding the local database path
pub const DB_PATH_ENV: &str = "PRESENSI_SYNC_DB";

const DEFAULT_DEBOUNCE_MS: u64 = 1_000;
const DEFAULT_PULL_INTERVAL_MS: u64 = 10_000;
const DEFAULT_PUSH_INTERVAL_MS: u64 = 30_000;
const DEFAULT_VISIBILITY_SETTLE_MS: u64 = 1_000;
const DEFAULT_SIGNATURE_BATCH_SIZE: usize = 5;

/// Sync layer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period after an enqueue before the queue flushes
    pub debounce_ms: u64,
    /// Pull cadence for the current scope
    pub pull_interval_ms: u64,
    /// Push cadence for a non-empty queue
    pub push_interval_ms: u64,
    /// Delay between the page becoming visible and the pull it triggers
    pub visibility_settle_ms: u64,
    /// Signature pushes per batch
    pub signature_batch_size: usize,
    /// Offline login table, email -> password
    pub local_credentials: BTreeMap<String, String>,
    /// SQLite file backing the local store
    pub database_path: Option<PathBuf>,
    /// Version stamped on pushed signature documents
    pub app_version: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            pull_interval_ms: DEFAULT_PULL_INTERVAL_MS,
            push_interval_ms: DEFAULT_PUSH_INTERVAL_MS,
            visibility_settle_ms: DEFAULT_VISIBILITY_SETTLE_MS,
            signature_batch_size: DEFAULT_SIGNATURE_BATCH_SIZE,
            local_credentials: BTreeMap::new(),
            database_path: None,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl SyncConfig {
    /// Create a new SyncConfigBuilder
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_toml_str(&source)?;
        config.apply_env();
        Ok(config)
    }

    /// Apply `PRESENSI_SYNC_DB` if set
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var(DB_PATH_ENV) {
            if !path.is_empty() {
                self.database_path = Some(PathBuf::from(path));
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::InvalidValue("debounce_ms"));
        }
        if self.pull_interval_ms == 0 {
            return Err(ConfigError::InvalidValue("pull_interval_ms"));
        }
        if self.push_interval_ms == 0 {
            return Err(ConfigError::InvalidValue("push_interval_ms"));
        }
        if self.signature_batch_size == 0 {
            return Err(ConfigError::InvalidValue("signature_batch_size"));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn pull_interval(&self) -> Duration {
        Duration::from_millis(self.pull_interval_ms)
    }

    pub fn push_interval(&self) -> Duration {
        Duration::from_millis(self.push_interval_ms)
    }

    pub fn visibility_settle(&self) -> Duration {
        Duration::from_millis(self.visibility_settle_ms)
    }

    /// Configured database path, or the platform data directory
    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = &self.database_path {
            return path.clone();
        }
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("presensi-sync");
        path.push("local.db");
        path
    }
}

/// Builder for SyncConfig
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn debounce(mut self, delay: Duration) -> Self {
        self.config.debounce_ms = delay.as_millis() as u64;
        self
    }

    pub fn pull_interval(mut self, interval: Duration) -> Self {
        self.config.pull_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn push_interval(mut self, interval: Duration) -> Self {
        self.config.push_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn visibility_settle(mut self, delay: Duration) -> Self {
        self.config.visibility_settle_ms = delay.as_millis() as u64;
        self
    }

    pub fn signature_batch_size(mut self, size: usize) -> Self {
        self.config.signature_batch_size = size;
        self
    }

    /// Add an offline login
    pub fn local_credential(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.local_credentials.insert(email.into(), password.into());
        self
    }

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = Some(path.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<SyncConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {0}")]
    InvalidValue(&'static str),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("failed to read config: {0}")]
    Io(String),
}
