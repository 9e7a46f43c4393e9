//! Error handling for persistkit-store
//!
//! Wraps persistkit-core ExError with store-specific helpers

use std::path::Path;

use persistkit_core::errors::{ExError, ExErrorKind};

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

pub use persistkit_core::errors::io_error;

/// Create an error for a table file that cannot be decoded
pub fn table_corrupt(path: &Path, reason: impl std::fmt::Display) -> ExError {
    ExError::new(ExErrorKind::Decode)
        .with_op("read_table")
        .with_message(format!("Table file {} is corrupt: {}", path.display(), reason))
}

/// Create an error for a save that references an entity the schema does not declare
pub fn unknown_entity(entity_name: &str) -> ExError {
    ExError::new(ExErrorKind::InvalidInput)
        .with_op("save")
        .with_entity_name(entity_name)
        .with_message(format!("Entity {} is not part of this store's schema", entity_name))
}

/// Create an error for a snapshot whose identifier belongs to another store
pub fn foreign_identifier(store_identifier: &str, entity_name: &str, primary_key: &str) -> ExError {
    ExError::new(ExErrorKind::IdentifierConflict)
        .with_op("save")
        .with_entity_name(entity_name)
        .with_primary_key(primary_key)
        .with_message(format!(
            "Identifier belongs to store {:?}, not this one",
            store_identifier
        ))
}

/// Create an error for an invalid store configuration
pub fn config_error(reason: impl Into<String>) -> ExError {
    ExError::new(ExErrorKind::InvalidInput)
        .with_op("load_config")
        .with_message(reason)
}
