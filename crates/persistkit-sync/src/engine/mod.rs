//! Replication engine port
//!
//! The engine itself is external: it replicates documents between peers in
//! the background and answers DQL statements against its local copy. This
//! module defines the calls the sync store makes on it, the statements it
//! sends, and a loopback engine for offline use.

pub mod memory;
pub mod statement;

use std::collections::BTreeMap;

use async_trait::async_trait;
use persistkit_core::errors::{ExError, ExErrorKind};
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryEngine;
pub use statement::Statement;

/// Named statement arguments (`:new`, `:id`)
pub type QueryArgs = BTreeMap<String, Value>;

/// One result row: the serialized document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRow {
    bytes: Vec<u8>,
}

impl QueryRow {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The engine refused the statement (syntax, constraint, duplicate id)
    #[error("statement rejected: {0}")]
    Rejected(String),

    /// The engine could not be reached or is not running
    #[error("engine unavailable: {0}")]
    Unavailable(String),
}

impl From<EngineError> for ExError {
    fn from(err: EngineError) -> Self {
        ExError::new(ExErrorKind::SyncEngine).with_message(err.to_string())
    }
}

/// Calls the sync store makes on a replication engine
///
/// Every call may take arbitrarily long or never finish; callers bound them
/// with a deadline.
#[async_trait]
pub trait SyncEngine: Send + Sync {
    /// Run one DQL statement against the engine's local copy
    async fn execute(&self, statement: &str, args: &QueryArgs)
        -> Result<Vec<QueryRow>, EngineError>;

    /// Keep documents matching `query` flowing in from peers
    async fn register_subscription(&self, query: &str) -> Result<(), EngineError>;

    async fn start_sync(&self) -> Result<(), EngineError>;

    async fn stop_sync(&self) -> Result<(), EngineError>;
}
