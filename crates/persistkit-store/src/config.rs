//! Store configuration.
//!
//! The backend is chosen once, when the store is constructed, from a TOML
//! file such as:
//!
//! ```toml
//! name = "trips"
//! backend = "sync"
//! path = "data/trips.json"
//!
//! [sync]
//! app_id = "trips-app"
//! collections = ["trips", "livingAccommodation", "bucketList"]
//! evict_remote_on_delete = false
//! ```
//!
//! The sync token may be supplied through `PERSISTKIT_SYNC_TOKEN` instead of
//! the file.

use std::path::{Path, PathBuf};

use persistkit_core::errors::{ExError, ExErrorKind};
use persistkit_core_types::Sensitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding `[sync] token`
pub const SYNC_TOKEN_ENV: &str = "PERSISTKIT_SYNC_TOKEN";

/// Which backend serves the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    File,
    Sync,
}

/// Top-level store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Human-readable store name.
    pub name: String,
    pub backend: BackendKind,
    /// Local table file. Its file name becomes the store identifier.
    pub path: PathBuf,
    /// Replication settings; required when `backend = "sync"`.
    #[serde(default)]
    pub sync: Option<SyncSettings>,
}

/// Replication settings for the sync backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncSettings {
    pub app_id: String,
    #[serde(default)]
    pub token: Option<Sensitive<String>>,
    /// Collections read, subscribed and replicated into.
    pub collections: Vec<String>,
    /// Row limit of each collection query.
    #[serde(default = "default_query_limit")]
    pub query_limit: u32,
    /// Deadline for one remote read, and for each remote write attempt.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// Evict the remote document when a snapshot is deleted locally.
    #[serde(default)]
    pub evict_remote_on_delete: bool,
    /// Attempts per outbox operation before it is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

fn default_query_limit() -> u32 {
    1000
}

fn default_query_timeout_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_base_ms() -> u64 {
    200
}

fn default_retry_max_ms() -> u64 {
    30_000
}

impl SyncSettings {
    /// Settings with every optional field at its default
    pub fn new(app_id: impl Into<String>, collections: Vec<String>) -> Self {
        Self {
            app_id: app_id.into(),
            token: None,
            collections,
            query_limit: default_query_limit(),
            query_timeout_ms: default_query_timeout_ms(),
            evict_remote_on_delete: false,
            max_attempts: default_max_attempts(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for ExError {
    fn from(err: ConfigError) -> Self {
        let kind = match err {
            ConfigError::Read { .. } => ExErrorKind::Io,
            ConfigError::Parse(_) | ConfigError::Invalid(_) => ExErrorKind::InvalidInput,
        };
        ExError::new(kind)
            .with_op("load_config")
            .with_message(err.to_string())
    }
}

impl StoreConfig {
    /// Config for a file-backed store
    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            backend: BackendKind::File,
            path: path.into(),
            sync: None,
        }
    }

    /// Config for a sync-backed store
    pub fn sync(name: impl Into<String>, path: impl Into<PathBuf>, settings: SyncSettings) -> Self {
        Self {
            name: name.into(),
            backend: BackendKind::Sync,
            path: path.into(),
            sync: Some(settings),
        }
    }

    /// Load, apply environment overrides and validate
    ///
    /// # Errors
    ///
    /// `ConfigError` when the file is unreadable, malformed or invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse without environment overrides or validation
    ///
    /// # Errors
    ///
    /// `ConfigError::Parse` on malformed TOML or unknown fields.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply overrides from `lookup` (normally the process environment)
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(sync) = self.sync.as_mut() {
            if let Some(token) = lookup(SYNC_TOKEN_ENV).filter(|t| !t.is_empty()) {
                sync.token = Some(Sensitive::new(token));
            }
        }
    }

    /// # Errors
    ///
    /// `ConfigError::Invalid` naming the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.name.trim().is_empty() {
            return invalid("name must not be empty");
        }
        if self.path.file_name().is_none() {
            return invalid("path must name a file");
        }
        match (self.backend, &self.sync) {
            (BackendKind::Sync, None) => invalid("backend \"sync\" requires a [sync] table"),
            (BackendKind::Sync, Some(sync)) => sync.validate(),
            (BackendKind::File, _) => Ok(()),
        }
    }
}

impl SyncSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.app_id.trim().is_empty() {
            return invalid("sync.app_id must not be empty");
        }
        if self.collections.is_empty() {
            return invalid("sync.collections must name at least one collection");
        }
        if self.collections.iter().any(|c| c.trim().is_empty()) {
            return invalid("sync.collections must not contain blank names");
        }
        if self.query_limit == 0 {
            return invalid("sync.query_limit must be positive");
        }
        if self.query_timeout_ms == 0 {
            return invalid("sync.query_timeout_ms must be positive");
        }
        if self.max_attempts == 0 {
            return invalid("sync.max_attempts must be at least 1");
        }
        if self.retry_base_ms > self.retry_max_ms {
            return invalid("sync.retry_base_ms must not exceed sync.retry_max_ms");
        }
        Ok(())
    }
}
