//! Sync-backed store
//!
//! Local bookkeeping is the same as the file store's and is durable before
//! `save` returns. Each saved snapshot also queues one remote statement in
//! the outbox, which the replicator drains in the background; the remote
//! outcome never changes the `SaveResult`.
//!
//! Known gaps:
//! - A crash between the table write and the outbox append loses the remote
//!   operations of that save; the local table is still correct.
//! - An outbox append that fails while the process runs keeps the statements
//!   in memory as `unqueued` in [`ReplicationStatus`], with `last_error` set.
//!   The next save or [`SyncStore::retry_failed`] appends them again, and
//!   `flush` times out until that succeeds.
//! - With `evict_remote_on_delete` off, a local delete leaves the remote
//!   document in place, and the next [`SyncStore::pull`] brings it back.
//! - Blocking calls (`open`, `read_remote`, `pull`, `flush`, `shutdown`) drive
//!   futures with `Handle::block_on`. They must not be called from inside an
//!   async context, and the runtime must be multi-threaded so its timers run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::try_join_all;
use persistkit_core::contract::{reject_unsupported_query, DataStore};
use persistkit_core::core_types::RequestId;
use persistkit_core::errors::ExError;
use persistkit_core::identity::IdentifierAuthority;
use persistkit_core::model::{
    FetchRequest, FetchResult, SaveRequest, SaveResult, Schema, Snapshot,
};
use persistkit_core::{log_op_end, log_op_error, log_op_start};
use persistkit_store::bookkeeping::{apply_save, AppliedSave};
use persistkit_store::file::store_identifier_for;
use persistkit_store::{BackendKind, StoreConfig, SyncSettings, Table};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::document::{from_row, to_document};
use crate::engine::statement::is_valid_collection_name;
use crate::engine::{Statement, SyncEngine};
use crate::errors::{
    deadline_exceeded, not_a_sync_config, unreplicated_collection, worker_failed, Result,
};
use crate::outbox::{Outbox, ReplicationStatus, RetryPolicy};
use crate::replicator::{ReplicationMonitor, Replicator, Shared};

pub struct SyncStore {
    name: String,
    path: PathBuf,
    settings: SyncSettings,
    schema: Option<Schema>,
    authority: IdentifierAuthority,
    engine: Arc<dyn SyncEngine>,
    runtime: Handle,
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
}

impl SyncStore {
    /// Open a sync store described by `config`
    ///
    /// Registers one subscription per collection, starts the engine, and
    /// spawns the replicator on `runtime`. Operations left in the outbox by a
    /// previous run are replicated first.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a non-sync or invalid config, `Io` / `Decode` for an
    /// unreadable outbox, `SyncEngine` / `Timeout` when the engine does not
    /// start within `query_timeout_ms`.
    pub fn open(
        config: &StoreConfig,
        engine: Arc<dyn SyncEngine>,
        runtime: Handle,
    ) -> Result<Self> {
        if config.backend != BackendKind::Sync {
            return Err(not_a_sync_config("store backend is not \"sync\""));
        }
        config.validate()?;
        let settings = config
            .sync
            .clone()
            .ok_or_else(|| not_a_sync_config("missing [sync] table"))?;
        if let Some(bad) = settings
            .collections
            .iter()
            .find(|c| !is_valid_collection_name(c))
        {
            return Err(not_a_sync_config(&format!(
                "collection name {:?} is not a plain identifier",
                bad
            )));
        }

        let identifier = store_identifier_for(&config.path)?;
        let outbox = Outbox::open(Outbox::path_for(&config.path))?;
        let deadline = Duration::from_millis(settings.query_timeout_ms);

        let start = Instant::now();
        log_op_start!(
            "open",
            store_id = identifier.as_str(),
            collections = settings.collections.len(),
            pending = outbox.status().pending
        );
        let connected = runtime.block_on(connect(engine.as_ref(), &settings, deadline));
        let duration_ms = start.elapsed().as_millis() as u64;
        if let Err(err) = connected {
            log_op_error!("open", err, duration_ms = duration_ms, store_id = identifier.as_str());
            return Err(err.with_store_id(identifier));
        }
        log_op_end!("open", duration_ms = duration_ms, store_id = identifier.as_str());

        let shared = Arc::new(Shared::new(outbox));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let policy = RetryPolicy {
            max_attempts: settings.max_attempts,
            base: Duration::from_millis(settings.retry_base_ms),
            max: Duration::from_millis(settings.retry_max_ms),
        };
        let worker = Replicator::new(
            identifier.clone(),
            Arc::clone(&engine),
            Arc::clone(&shared),
            policy,
            deadline,
        )
        .start(&runtime, shutdown_rx);

        Ok(Self {
            name: config.name.clone(),
            path: config.path.clone(),
            settings,
            schema: None,
            authority: IdentifierAuthority::new(identifier),
            engine,
            runtime,
            shared,
            shutdown,
            worker: Some(worker),
        })
    }

    /// Validate every saved snapshot against `schema`
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Read the local table from disk
    pub fn load(&self) -> Result<Table> {
        Table::read(&self.path)
    }

    pub fn replication_status(&self) -> ReplicationStatus {
        self.shared.status()
    }

    pub fn monitor(&self) -> ReplicationMonitor {
        self.shared.monitor()
    }

    /// Block until the outbox is empty
    ///
    /// # Errors
    ///
    /// `Timeout` when operations are still pending after `deadline`.
    pub fn flush(&self, deadline: Duration) -> Result<ReplicationStatus> {
        let monitor = self.monitor();
        self.runtime.block_on(monitor.wait_idle(deadline))
    }

    /// Put dead-lettered operations, and statements whose append failed, back
    /// in the queue
    ///
    /// # Errors
    ///
    /// `Io` / `Encode` when the outbox cannot be written.
    pub fn retry_failed(&self) -> Result<usize> {
        self.shared.requeue_failed()
    }

    /// Every document of every configured collection, as local snapshots
    ///
    /// All collection queries run concurrently under one `query_timeout_ms`
    /// deadline.
    ///
    /// # Errors
    ///
    /// `Timeout` when the engine does not answer in time, `SyncEngine` when
    /// it rejects a query, `Decode` for a row that is not a snapshot document.
    pub fn read_remote(&self) -> Result<Vec<Snapshot>> {
        let start = Instant::now();
        log_op_start!(
            "read_remote",
            store_id = self.identifier(),
            collections = self.settings.collections.len()
        );

        let result = self.read_remote_inner();
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(snapshots) => {
                log_op_end!(
                    "read_remote",
                    duration_ms = duration_ms,
                    store_id = self.identifier(),
                    fetched = snapshots.len()
                );
            }
            Err(err) => {
                log_op_error!(
                    "read_remote",
                    err,
                    duration_ms = duration_ms,
                    store_id = self.identifier()
                );
            }
        }
        result.map_err(|e| e.with_store_id(self.identifier()))
    }

    /// Merge remote documents into the local table
    ///
    /// A remote document replaces the local snapshot with the same
    /// identifier. Documents with a local change not yet applied remotely
    /// (pending, dead-lettered or unqueued) are skipped, so that change is
    /// not overwritten. Returns the number of snapshots that changed.
    ///
    /// # Errors
    ///
    /// Any `read_remote` error, or `Io` when the table cannot be written.
    pub fn pull(&mut self) -> Result<usize> {
        let start = Instant::now();
        log_op_start!("pull", store_id = self.identifier());

        let result = self.pull_inner();
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(merged) => {
                log_op_end!(
                    "pull",
                    duration_ms = duration_ms,
                    store_id = self.identifier(),
                    merged = *merged
                );
            }
            Err(err) => {
                log_op_error!("pull", err, duration_ms = duration_ms, store_id = self.identifier());
            }
        }
        result.map_err(|e| e.with_store_id(self.identifier()))
    }

    /// Stop the replicator and the engine
    ///
    /// Pending operations stay in the outbox for the next `open`.
    ///
    /// # Errors
    ///
    /// `Timeout` when the worker or the engine does not stop within
    /// `query_timeout_ms`, `Internal` when the worker panicked.
    pub fn shutdown(mut self) -> Result<()> {
        self.shutdown.send_replace(true);
        let worker = self.worker.take();
        let engine = Arc::clone(&self.engine);
        let deadline = self.query_timeout();

        self.runtime.block_on(async move {
            if let Some(worker) = worker {
                match tokio::time::timeout(deadline, worker).await {
                    Ok(Ok(())) => {}
                    Ok(Err(join_err)) => return Err(worker_failed(join_err)),
                    Err(_) => return Err(deadline_exceeded("shutdown", deadline)),
                }
            }
            match tokio::time::timeout(deadline, engine.stop_sync()).await {
                Ok(stopped) => stopped.map_err(|e| ExError::from(e).with_op("stop_sync")),
                Err(_) => Err(deadline_exceeded("stop_sync", deadline)),
            }
        })
    }

    fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.query_timeout_ms)
    }

    fn is_replicated(&self, collection: &str) -> bool {
        self.settings.collections.iter().any(|c| c == collection)
    }

    fn check_routing(&self, request: &SaveRequest) -> Result<()> {
        let evicting = self.settings.evict_remote_on_delete;
        let routed = request
            .inserted
            .iter()
            .chain(&request.updated)
            .chain(request.deleted.iter().filter(|_| evicting));
        for snapshot in routed {
            let collection = snapshot.routing_collection()?;
            if !self.is_replicated(collection) {
                return Err(unreplicated_collection(
                    collection,
                    snapshot.entity_name(),
                    snapshot.persistent_identifier().primary_key(),
                ));
            }
        }
        Ok(())
    }

    fn statements_for(&self, applied: &AppliedSave) -> Result<Vec<Statement>> {
        let mut statements = Vec::new();
        for snapshot in &applied.inserted {
            statements.push(Statement::Insert {
                collection: snapshot.routing_collection()?.to_string(),
                document: to_document(snapshot)?,
            });
        }
        for snapshot in &applied.updated {
            statements.push(Statement::Upsert {
                collection: snapshot.routing_collection()?.to_string(),
                document: to_document(snapshot)?,
            });
        }
        if self.settings.evict_remote_on_delete {
            for snapshot in &applied.deleted {
                statements.push(Statement::Evict {
                    collection: snapshot.routing_collection()?.to_string(),
                    id: snapshot.persistent_identifier().primary_key().to_string(),
                });
            }
        }
        Ok(statements)
    }

    fn save_inner(&mut self, request: &SaveRequest) -> Result<SaveResult> {
        self.check_routing(request)?;
        let mut table = self.load()?;
        let applied = apply_save(&mut table, &self.authority, request, self.schema.as_ref())?;
        let statements = self.statements_for(&applied)?;

        table.write(&self.path)?;
        self.authority.commit(&applied.remapped);

        if let Err(err) = self.shared.enqueue(statements) {
            // held as unqueued and visible in `replication_status`
            error!(
                store_id = self.identifier(),
                err.code = err.code(),
                error = %err,
                "Saved locally but failed to queue replication"
            );
        }
        Ok(applied.into_result(self.authority.store_identifier()))
    }

    fn fetch_inner(&self, request: &FetchRequest) -> Result<FetchResult> {
        reject_unsupported_query(request)?;
        let table = self.load()?;
        Ok(FetchResult {
            fetched_snapshots: table
                .snapshots()
                .filter(|s| request.selects(s))
                .cloned()
                .collect(),
            related_snapshots: table
                .iter()
                .map(|(id, s)| (id.clone(), s.clone()))
                .collect(),
        })
    }

    fn read_remote_inner(&self) -> Result<Vec<Snapshot>> {
        let deadline = self.query_timeout();
        let limit = self.settings.query_limit;
        let queries = self.settings.collections.iter().map(|collection| {
            let engine = Arc::clone(&self.engine);
            let statement = Statement::Select {
                collection: collection.clone(),
                limit,
            };
            async move {
                match engine.execute(&statement.text(), &statement.args()).await {
                    Ok(rows) => Ok((statement, rows)),
                    Err(e) => Err(ExError::from(e)
                        .with_op("read_remote")
                        .with_collection(statement.collection())),
                }
            }
        });

        let answered = self
            .runtime
            .block_on(async { tokio::time::timeout(deadline, try_join_all(queries)).await })
            .map_err(|_| deadline_exceeded("read_remote", deadline))??;

        let mut snapshots = Vec::new();
        for (statement, rows) in answered {
            for row in &rows {
                snapshots.push(from_row(row, statement.collection(), self.identifier())?);
            }
        }
        Ok(snapshots)
    }

    fn pull_inner(&mut self) -> Result<usize> {
        let remote = self.read_remote()?;
        // pending, dead-lettered and unqueued changes all outrank the remote copy
        let unreplicated = self.shared.unreplicated_documents("pull")?;

        let mut table = self.load()?;
        let mut merged = 0;
        for snapshot in remote {
            let key = (
                snapshot.collection_name().unwrap_or_default().to_string(),
                snapshot.persistent_identifier().primary_key().to_string(),
            );
            if unreplicated.contains(&key) {
                continue;
            }
            if let Some(schema) = &self.schema {
                let valid = schema
                    .entity(snapshot.entity_name())
                    .map(|entity| entity.validate(&snapshot));
                if !matches!(valid, Some(Ok(()))) {
                    warn!(
                        store_id = self.identifier(),
                        entity_name = snapshot.entity_name(),
                        primary_key = snapshot.persistent_identifier().primary_key(),
                        "Skipping remote document that does not match the schema"
                    );
                    continue;
                }
            }
            if table.get(snapshot.persistent_identifier()) != Some(&snapshot) {
                table.put(snapshot);
                merged += 1;
            }
        }

        if merged > 0 {
            table.write(&self.path)?;
        }
        Ok(merged)
    }
}

async fn connect(
    engine: &dyn SyncEngine,
    settings: &SyncSettings,
    deadline: Duration,
) -> Result<()> {
    let started = async {
        for collection in &settings.collections {
            let query = Statement::Select {
                collection: collection.clone(),
                limit: settings.query_limit,
            };
            engine.register_subscription(&query.text()).await?;
        }
        engine.start_sync().await
    };
    match tokio::time::timeout(deadline, started).await {
        Ok(result) => result.map_err(|e| ExError::from(e).with_op("open")),
        Err(_) => Err(deadline_exceeded("open", deadline)),
    }
}

impl DataStore for SyncStore {
    fn identifier(&self) -> &str {
        self.authority.store_identifier()
    }

    fn save(&mut self, request: SaveRequest) -> Result<SaveResult> {
        let request_id = RequestId::new();
        let start = Instant::now();
        log_op_start!(
            "save",
            store_id = self.identifier(),
            request_id = %request_id,
            inserted = request.inserted.len(),
            updated = request.updated.len(),
            deleted = request.deleted.len()
        );

        let result = self.save_inner(&request);
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                log_op_end!(
                    "save",
                    duration_ms = duration_ms,
                    store_id = self.identifier(),
                    request_id = %request_id,
                    pending = self.shared.status().pending
                );
            }
            Err(err) => {
                log_op_error!(
                    "save",
                    err,
                    duration_ms = duration_ms,
                    store_id = self.identifier(),
                    request_id = %request_id
                );
            }
        }
        result.map_err(|e| e.with_store_id(self.identifier()))
    }

    fn fetch(&self, request: &FetchRequest) -> Result<FetchResult> {
        let request_id = RequestId::new();
        let start = Instant::now();
        log_op_start!(
            "fetch",
            store_id = self.identifier(),
            request_id = %request_id,
            entity_name = request.entity_name.as_deref().unwrap_or("*")
        );

        let result = self.fetch_inner(request);
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(r) => {
                log_op_end!(
                    "fetch",
                    duration_ms = duration_ms,
                    store_id = self.identifier(),
                    request_id = %request_id,
                    fetched = r.fetched_snapshots.len()
                );
            }
            Err(err) => {
                log_op_error!(
                    "fetch",
                    err,
                    duration_ms = duration_ms,
                    store_id = self.identifier(),
                    request_id = %request_id
                );
            }
        }
        result.map_err(|e| e.with_store_id(self.identifier()))
    }
}

impl Drop for SyncStore {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

impl std::fmt::Debug for SyncStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStore")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("store_identifier", &self.identifier())
            .field("collections", &self.settings.collections)
            .finish_non_exhaustive()
    }
}
