//! Configuration-time backend selection

use std::sync::Arc;

use persistkit_core::contract::{DataStore, StoreHandle};
use persistkit_core::errors::{ExError, ExErrorKind};
use persistkit_core::model::Schema;
use persistkit_store::{BackendKind, JsonFileStore, StoreConfig};
use tokio::runtime::Handle;

use crate::engine::SyncEngine;
use crate::errors::Result;
use crate::replicator::ReplicationMonitor;
use crate::store::SyncStore;

/// What a sync backend needs besides its config
#[derive(Clone)]
pub struct SyncDeps {
    pub engine: Arc<dyn SyncEngine>,
    /// Multi-threaded runtime the replicator runs on
    pub runtime: Handle,
}

impl SyncDeps {
    pub fn new(engine: Arc<dyn SyncEngine>, runtime: Handle) -> Self {
        Self { engine, runtime }
    }
}

#[derive(Debug)]
pub enum Backend {
    File(JsonFileStore),
    Sync(SyncStore),
}

/// Open the backend named by `config.backend`
///
/// # Errors
///
/// `InvalidInput` for an invalid config or a sync backend without `deps`;
/// otherwise whatever the backend's `open` returns.
pub fn open_backend(config: &StoreConfig, deps: Option<SyncDeps>) -> Result<Backend> {
    config.validate()?;
    match config.backend {
        BackendKind::File => Ok(Backend::File(JsonFileStore::open(
            config.name.clone(),
            config.path.clone(),
        )?)),
        BackendKind::Sync => {
            let deps = deps.ok_or_else(|| {
                ExError::new(ExErrorKind::InvalidInput)
                    .with_op("open")
                    .with_message("sync backend requires an engine and a runtime")
            })?;
            Ok(Backend::Sync(SyncStore::open(config, deps.engine, deps.runtime)?))
        }
    }
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::File(_) => BackendKind::File,
            Backend::Sync(_) => BackendKind::Sync,
        }
    }

    pub fn identifier(&self) -> &str {
        match self {
            Backend::File(store) => store.identifier(),
            Backend::Sync(store) => store.identifier(),
        }
    }

    pub fn with_schema(self, schema: Schema) -> Self {
        match self {
            Backend::File(store) => Backend::File(store.with_schema(schema)),
            Backend::Sync(store) => Backend::Sync(store.with_schema(schema)),
        }
    }

    /// Replication backlog view; `None` for the file backend
    pub fn monitor(&self) -> Option<ReplicationMonitor> {
        match self {
            Backend::File(_) => None,
            Backend::Sync(store) => Some(store.monitor()),
        }
    }

    /// Serialize access behind a shared handle
    pub fn into_handle(self) -> StoreHandle {
        match self {
            Backend::File(store) => StoreHandle::new(store),
            Backend::Sync(store) => StoreHandle::new(store),
        }
    }
}

impl std::fmt::Debug for SyncDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncDeps").finish_non_exhaustive()
    }
}
