//! Error handling for persistkit-sync
//!
//! Wraps persistkit-core ExError with replication-specific helpers

use std::time::Duration;

use persistkit_core::errors::{ExError, ExErrorKind};

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Create an error for a remote call that missed its deadline
pub fn deadline_exceeded(op: &str, deadline: Duration) -> ExError {
    ExError::new(ExErrorKind::Timeout)
        .with_op(op)
        .with_message(format!("no answer from the sync engine within {:?}", deadline))
}

/// Create an error for a snapshot routed to a collection that is not replicated
pub fn unreplicated_collection(collection: &str, entity_name: &str, primary_key: &str) -> ExError {
    ExError::new(ExErrorKind::InvalidInput)
        .with_op("save")
        .with_collection(collection)
        .with_entity_name(entity_name)
        .with_primary_key(primary_key)
        .with_message(format!("Collection {} is not configured for replication", collection))
}

/// Create an error for a store opened without usable sync settings
pub fn not_a_sync_config(reason: &str) -> ExError {
    ExError::new(ExErrorKind::InvalidInput)
        .with_op("open")
        .with_message(reason.to_string())
}

/// Create an error for a background worker that died
pub fn worker_failed(reason: impl std::fmt::Display) -> ExError {
    ExError::new(ExErrorKind::Internal)
        .with_op("shutdown")
        .with_message(format!("replication worker failed: {}", reason))
}
