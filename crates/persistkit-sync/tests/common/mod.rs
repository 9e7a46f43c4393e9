// Shared fixtures for sync store integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use persistkit_core::model::{PersistentIdentifier, Snapshot};
use persistkit_store::{StoreConfig, SyncSettings};
use persistkit_sync::{
    EngineError, MemoryEngine, QueryArgs, QueryRow, ReplicationStatus, SyncEngine, SyncStore,
};
use serde_json::json;

pub const COLLECTIONS: [&str; 3] = ["trips", "livingAccommodation", "bucketList"];

/// How a scripted engine answers one class of statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Healthy,
    /// Never answers
    Hang,
    /// Answers `Unavailable` immediately
    Fail,
}

/// Loopback engine whose reads and writes can be made to hang or fail
#[derive(Debug)]
pub struct ScriptedEngine {
    pub inner: MemoryEngine,
    reads: Mutex<Mode>,
    writes: Mutex<Mode>,
    calls: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(reads: Mode, writes: Mode) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryEngine::new(),
            reads: Mutex::new(reads),
            writes: Mutex::new(writes),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_reads(&self, mode: Mode) {
        *self.reads.lock().unwrap() = mode;
    }

    pub fn set_writes(&self, mode: Mode) {
        *self.writes.lock().unwrap() = mode;
    }

    /// Number of `execute` calls received, answered or not
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncEngine for ScriptedEngine {
    async fn execute(
        &self,
        statement: &str,
        args: &QueryArgs,
    ) -> Result<Vec<QueryRow>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mode = if statement.starts_with("SELECT") {
            *self.reads.lock().unwrap()
        } else {
            *self.writes.lock().unwrap()
        };
        match mode {
            Mode::Healthy => self.inner.execute(statement, args).await,
            Mode::Hang => futures::future::pending().await,
            Mode::Fail => Err(EngineError::Unavailable("peer offline".to_string())),
        }
    }

    async fn register_subscription(&self, query: &str) -> Result<(), EngineError> {
        self.inner.register_subscription(query).await
    }

    async fn start_sync(&self) -> Result<(), EngineError> {
        self.inner.start_sync().await
    }

    async fn stop_sync(&self) -> Result<(), EngineError> {
        self.inner.stop_sync().await
    }
}

pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

/// Sync settings with short deadlines and backoff
pub fn fast_settings() -> SyncSettings {
    let mut settings = SyncSettings::new(
        "trips-app",
        COLLECTIONS.iter().map(|c| c.to_string()).collect(),
    );
    settings.query_timeout_ms = 200;
    settings.retry_base_ms = 20;
    settings.retry_max_ms = 100;
    settings.max_attempts = 100;
    settings
}

pub fn sync_config(dir: &Path, settings: SyncSettings) -> StoreConfig {
    StoreConfig::sync("trips", dir.join("trips.json"), settings)
}

pub fn open_store(
    dir: &Path,
    settings: SyncSettings,
    engine: Arc<dyn SyncEngine>,
    rt: &tokio::runtime::Runtime,
) -> SyncStore {
    SyncStore::open(&sync_config(dir, settings), engine, rt.handle().clone())
        .expect("Failed to open sync store")
}

pub fn new_trip(name: &str) -> Snapshot {
    Snapshot::new(PersistentIdentifier::temporary("Trip"), "trips")
        .with_attribute("name", json!(name))
        .with_attribute("startDate", json!("2024-06-11T10:00:00Z"))
}

/// Poll `store` until `done` holds for its replication status
pub fn wait_for(
    store: &SyncStore,
    timeout: Duration,
    done: impl Fn(&ReplicationStatus) -> bool,
) -> ReplicationStatus {
    let deadline = Instant::now() + timeout;
    loop {
        let status = store.replication_status();
        if done(&status) {
            return status;
        }
        assert!(
            Instant::now() < deadline,
            "replication status never settled: {:?}",
            status
        );
        std::thread::sleep(Duration::from_millis(10));
    }
}
