//! PersistKit Store - file-backed persistence
//!
//! Provides:
//! - `JsonFileStore`, a single-file JSON backend with atomic whole-table writes
//! - The table file format shared with the sync backend's local copy
//! - Save bookkeeping (identifier promotion, reference remap, table merge)
//! - Store configuration loaded from TOML

#![allow(clippy::result_large_err)]

pub mod bookkeeping;
pub mod config;
pub mod errors;
pub mod file;

// Re-export key types
pub use config::{BackendKind, ConfigError, StoreConfig, SyncSettings};
pub use errors::Result;
pub use file::{JsonFileStore, Table};
