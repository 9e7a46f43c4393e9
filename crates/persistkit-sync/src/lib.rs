//! PersistKit Sync - store adapter over a replicated document engine
//!
//! Provides:
//! - `SyncStore`, which keeps a local table like the file store and queues
//!   every change for replication through a durable outbox
//! - The `SyncEngine` port, its DQL statements, and the loopback `MemoryEngine`
//! - `open_backend`, which picks the file or sync backend from a `StoreConfig`

#![allow(clippy::result_large_err)]

pub mod backend;
pub mod document;
pub mod engine;
pub mod errors;
pub mod outbox;
pub mod replicator;
pub mod store;

// Re-export key types
pub use backend::{open_backend, Backend, SyncDeps};
pub use engine::{EngineError, MemoryEngine, QueryArgs, QueryRow, Statement, SyncEngine};
pub use errors::Result;
pub use outbox::{Outbox, OutboxEntry, ReplicationStatus};
pub use replicator::ReplicationMonitor;
pub use store::SyncStore;
