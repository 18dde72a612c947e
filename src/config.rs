//! Configuration module for Fallcrate.

use serde::Deserialize;
use std::path::Path;

use crate::tree::DEFAULT_MAX_SUFFIX_ATTEMPTS;
use crate::{FallcrateError, Result};

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite metadata database.
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Path to the blob storage directory.
    #[serde(default = "default_blob_path")]
    pub blob_path: String,
    /// Total storage quota in bytes.
    #[serde(default = "default_max_storage_bytes")]
    pub max_storage_bytes: u64,
    /// Maximum size of a single file in megabytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size_mb: u64,
}

fn default_database_path() -> String {
    "data/fallcrate.db".to_string()
}

fn default_blob_path() -> String {
    "data/blobs".to_string()
}

fn default_max_storage_bytes() -> u64 {
    1_000_000_000
}

fn default_max_file_size() -> u64 {
    100
}

impl StorageConfig {
    /// Maximum size of a single file in bytes.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            blob_path: default_blob_path(),
            max_storage_bytes: default_max_storage_bytes(),
            max_file_size_mb: default_max_file_size(),
        }
    }
}

/// Account configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Owner recorded on every created node.
    #[serde(default = "default_owner_id")]
    pub owner_id: String,
}

fn default_owner_id() -> String {
    "local".to_string()
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            owner_id: default_owner_id(),
        }
    }
}

/// Archive download configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Archive name for multi-selections downloaded at the root.
    #[serde(default = "default_archive_name")]
    pub default_name: String,
}

fn default_archive_name() -> String {
    "Fallcrate".to_string()
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            default_name: default_archive_name(),
        }
    }
}

/// Naming configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NamingConfig {
    /// How many `" (n)"` candidates to try before reporting a conflict.
    #[serde(default = "default_max_suffix_attempts")]
    pub max_suffix_attempts: u32,
}

fn default_max_suffix_attempts() -> u32 {
    DEFAULT_MAX_SUFFIX_ATTEMPTS
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            max_suffix_attempts: default_max_suffix_attempts(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/fallcrate.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Account configuration.
    #[serde(default)]
    pub account: AccountConfig,
    /// Archive configuration.
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Naming configuration.
    #[serde(default)]
    pub naming: NamingConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FallcrateError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| FallcrateError::Validation(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FALLCRATE_OWNER_ID`: Override the owner recorded on new nodes
    pub fn apply_env_overrides(&mut self) {
        if let Ok(owner_id) = std::env::var("FALLCRATE_OWNER_ID") {
            if !owner_id.is_empty() {
                self.account.owner_id = owner_id;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.account.owner_id.trim().is_empty() {
            return Err(FallcrateError::Config(
                "account.owner_id must not be empty".to_string(),
            ));
        }
        if self.archive.default_name.trim().is_empty() {
            return Err(FallcrateError::Config(
                "archive.default_name must not be empty".to_string(),
            ));
        }
        if self.storage.max_storage_bytes == 0 {
            return Err(FallcrateError::Config(
                "storage.max_storage_bytes must be positive".to_string(),
            ));
        }
        if self.storage.max_file_size_mb == 0 {
            return Err(FallcrateError::Config(
                "storage.max_file_size_mb must be positive".to_string(),
            ));
        }
        if self.naming.max_suffix_attempts == 0 {
            return Err(FallcrateError::Config(
                "naming.max_suffix_attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
