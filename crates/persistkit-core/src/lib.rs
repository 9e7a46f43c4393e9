//! PersistKit Core - store contract and snapshot model
//!
//! This crate provides the backend-independent half of the persistence layer:
//! - Persistent identifiers with temporary → permanent promotion
//! - Immutable snapshots with explicit-null relationships
//! - Save/fetch request types and the `DataStore` contract
//! - The identifier authority every backend mints keys through
//! - Entity ⇄ snapshot codec with ISO-8601 dates
//! - Caller-side predicate/sort evaluation for rejected queries
//! - Error and logging facilities shared by every crate in the workspace

#![allow(clippy::result_large_err)]

pub mod codec;
pub mod contract;
pub mod errors;
pub mod identity;
pub mod logging_facility;
pub mod model;
pub mod query;

pub use persistkit_core_types as core_types;

// Re-export commonly used types
pub use codec::{decode_entity, encode_entity, Entity, SnapshotBuilder, SnapshotReader, ToOneState};
pub use contract::{DataStore, StoreHandle};
pub use errors::{ExError, ExErrorKind, Result, StoreError};
pub use identity::IdentifierAuthority;
pub use model::{
    FetchRequest, FetchResult, PersistentIdentifier, Relationship, SaveRequest, SaveResult,
    Snapshot,
};
