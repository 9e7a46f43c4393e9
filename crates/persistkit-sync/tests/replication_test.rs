// Integration tests for the replication outbox and remote reads
// Covers restart recovery, drain order, bounded remote reads, and pull merges

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{fast_settings, new_trip, open_store, runtime, wait_for, Mode, ScriptedEngine};
use persistkit_core::contract::DataStore;
use persistkit_core::core_types::schema::EVENT_REPLICATION_FAILED;
use persistkit_core::errors::ExErrorKind;
use persistkit_core::logging_facility::test_capture::init_test_capture;
use persistkit_core::model::{FetchRequest, PersistentIdentifier, SaveRequest, Snapshot};
use persistkit_sync::document::to_document;
use persistkit_store::StoreConfig;
use persistkit_sync::{MemoryEngine, Outbox, SyncStore};
use serde_json::json;
use tempfile::TempDir;

const FLUSH: Duration = Duration::from_secs(10);

fn peer_trip(key: &str, name: &str) -> serde_json::Value {
    let snapshot = Snapshot::new(PersistentIdentifier::permanent("peer.json", "Trip", key), "trips")
        .with_attribute("name", json!(name));
    to_document(&snapshot).unwrap()
}

#[test]
fn test_outbox_survives_restart() {
    let rt = runtime();
    let dir = TempDir::new().unwrap();

    // Given: A save made while the engine rejects writes
    let offline = ScriptedEngine::new(Mode::Healthy, Mode::Fail);
    let mut store = open_store(dir.path(), fast_settings(), offline.clone(), &rt);
    let trip = new_trip("Lake");
    let result = store.save(SaveRequest::new().insert(trip.clone())).unwrap();
    let permanent = result.remapped_identifiers[trip.persistent_identifier()].clone();
    wait_for(&store, FLUSH, |s| s.last_error.is_some());
    store.shutdown().unwrap();

    // Then: The pending insert is on disk beside the table
    let outbox = Outbox::open(Outbox::path_for(&dir.path().join("trips.json"))).unwrap();
    assert_eq!(outbox.status().pending, 1);
    assert_eq!(outbox.front().unwrap().statement.document_id(), Some(permanent.primary_key()));
    assert!(outbox.front().unwrap().attempts >= 1);

    // When: The store is reopened against a healthy engine
    let online = Arc::new(MemoryEngine::new());
    let store = open_store(dir.path(), fast_settings(), online.clone(), &rt);

    // Then: The leftover operation is replicated without a new save
    assert_eq!(store.flush(FLUSH).unwrap().pending, 0);
    let docs = online.documents("trips");
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["_id"], json!(permanent.primary_key()));
    store.shutdown().unwrap();
}

#[test]
fn test_operations_reach_engine_in_save_order() {
    let rt = runtime();
    let dir = TempDir::new().unwrap();
    let engine = ScriptedEngine::new(Mode::Healthy, Mode::Fail);
    let mut settings = fast_settings();
    settings.evict_remote_on_delete = true;
    let mut store = open_store(dir.path(), settings, engine.clone(), &rt);

    // Given: Insert, update and delete of one trip queued while writes fail
    let trip = new_trip("Desert");
    let result = store.save(SaveRequest::new().insert(trip.clone())).unwrap();
    let stored = trip.copy_with_identifier(
        result.remapped_identifiers[trip.persistent_identifier()].clone(),
    );
    store
        .save(SaveRequest::new().update(stored.clone().with_attribute("name", json!("Dunes"))))
        .unwrap();
    store.save(SaveRequest::new().delete(stored)).unwrap();
    assert_eq!(store.replication_status().pending, 3);

    // When: The engine comes back
    engine.set_writes(Mode::Healthy);
    store.flush(FLUSH).unwrap();

    // Then: The engine saw insert, upsert, evict in that order
    assert_eq!(
        engine.inner.executed(),
        vec![
            "INSERT INTO trips DOCUMENTS (:new)",
            "INSERT INTO trips DOCUMENTS (:new) ON ID CONFLICT DO UPDATE",
            "EVICT FROM trips WHERE _id = :id",
        ]
    );
    assert!(engine.inner.documents("trips").is_empty());
    store.shutdown().unwrap();
}

#[test]
fn test_read_remote_is_bounded_on_hung_engine() {
    // Given: An engine whose reads never answer
    let rt = runtime();
    let dir = TempDir::new().unwrap();
    let engine = ScriptedEngine::new(Mode::Hang, Mode::Healthy);
    let store = open_store(dir.path(), fast_settings(), engine, &rt);

    // When: The remote collections are read
    let started = Instant::now();
    let err = store.read_remote().unwrap_err();

    // Then: The call fails with Timeout near the configured deadline
    assert_eq!(err.kind(), ExErrorKind::Timeout);
    assert_eq!(err.store_id(), Some("trips.json"));
    assert!(started.elapsed() < Duration::from_secs(5));
    store.shutdown().unwrap();
}

#[test]
fn test_read_remote_surfaces_engine_errors() {
    let rt = runtime();
    let dir = TempDir::new().unwrap();
    let engine = ScriptedEngine::new(Mode::Fail, Mode::Healthy);
    let store = open_store(dir.path(), fast_settings(), engine, &rt);

    let err = store.read_remote().unwrap_err();

    assert_eq!(err.kind(), ExErrorKind::SyncEngine);
    assert_eq!(err.op(), Some("read_remote"));
    store.shutdown().unwrap();
}

#[test]
fn test_read_remote_rebinds_peer_documents() {
    let rt = runtime();
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(MemoryEngine::new());
    engine.seed("trips", peer_trip("k1", "Shared")).unwrap();
    let store = open_store(dir.path(), fast_settings(), engine, &rt);

    let snapshots = store.read_remote().unwrap();

    assert_eq!(snapshots.len(), 1);
    let id = snapshots[0].persistent_identifier();
    assert_eq!(id.store_identifier(), "trips.json");
    assert_eq!(id.primary_key(), "k1");
    store.shutdown().unwrap();
}

#[test]
fn test_pull_merges_remote_and_keeps_pending_local_changes() {
    let rt = runtime();
    let dir = TempDir::new().unwrap();
    let engine = ScriptedEngine::new(Mode::Healthy, Mode::Fail);
    engine.inner.seed("trips", peer_trip("k1", "Remote")).unwrap();
    let mut store = open_store(dir.path(), fast_settings(), engine.clone(), &rt);

    // When: Remote documents are pulled into an empty table
    assert_eq!(store.pull().unwrap(), 1);

    // Then: They are fetchable locally
    let fetched = store.fetch(&FetchRequest::entity("Trip")).unwrap();
    assert_eq!(fetched.fetched_snapshots.len(), 1);
    let local = fetched.fetched_snapshots[0].clone();
    assert_eq!(local.attribute("name"), Some(&json!("Remote")));

    // When: The trip is changed locally but cannot be replicated yet
    store
        .save(SaveRequest::new().update(local.with_attribute("name", json!("Local"))))
        .unwrap();
    assert_eq!(store.pull().unwrap(), 0);

    // Then: The unreplicated local change wins over the stale remote copy
    let fetched = store.fetch(&FetchRequest::entity("Trip")).unwrap();
    assert_eq!(fetched.fetched_snapshots[0].attribute("name"), Some(&json!("Local")));
    store.shutdown().unwrap();
}

#[test]
fn test_pull_keeps_dead_lettered_local_update() {
    // Given: A replicated trip whose later rename exhausted its one attempt
    let rt = runtime();
    let dir = TempDir::new().unwrap();
    let engine = ScriptedEngine::new(Mode::Healthy, Mode::Healthy);
    let mut settings = fast_settings();
    settings.max_attempts = 1;
    let mut store = open_store(dir.path(), settings, engine.clone(), &rt);
    let trip = new_trip("Remote");
    let result = store.save(SaveRequest::new().insert(trip.clone())).unwrap();
    let stored = trip.copy_with_identifier(
        result.remapped_identifiers[trip.persistent_identifier()].clone(),
    );
    store.flush(FLUSH).unwrap();

    engine.set_writes(Mode::Fail);
    store
        .save(SaveRequest::new().update(stored.clone().with_attribute("name", json!("Local"))))
        .unwrap();
    wait_for(&store, FLUSH, |s| s.failed == 1);

    // When: The store pulls the stale remote copy
    assert_eq!(store.pull().unwrap(), 0);

    // Then: The saved local name survives
    let local = store.load().unwrap();
    let kept = local.get(stored.persistent_identifier()).unwrap();
    assert_eq!(kept.attribute("name"), Some(&json!("Local")));

    // When: The engine recovers and the dead letter is retried
    engine.set_writes(Mode::Healthy);
    store.retry_failed().unwrap();
    store.flush(FLUSH).unwrap();

    // Then: The remote copy carries the local name
    let remote = store.read_remote().unwrap();
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].attribute("name"), Some(&json!("Local")));
    store.shutdown().unwrap();
}

#[test]
fn test_pull_resurrects_local_delete_without_remote_eviction() {
    // Given: A replicated trip deleted locally with eviction off
    let rt = runtime();
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(MemoryEngine::new());
    let mut store = open_store(dir.path(), fast_settings(), engine.clone(), &rt);
    let trip = new_trip("Fjords");
    let result = store.save(SaveRequest::new().insert(trip.clone())).unwrap();
    let stored = trip.copy_with_identifier(
        result.remapped_identifiers[trip.persistent_identifier()].clone(),
    );
    store.flush(FLUSH).unwrap();
    store.save(SaveRequest::new().delete(stored.clone())).unwrap();
    assert!(store.load().unwrap().is_empty());

    // When: The store pulls from the engine
    let merged = store.pull().unwrap();

    // Then: The remote copy brings the deleted trip back
    assert_eq!(merged, 1);
    assert_eq!(store.load().unwrap().get(stored.persistent_identifier()), Some(&stored));
    store.shutdown().unwrap();
}

#[test]
fn test_remote_failure_logged_at_warn_with_code() {
    let capture = init_test_capture();
    let rt = runtime();
    let dir = TempDir::new().unwrap();
    let engine = ScriptedEngine::new(Mode::Healthy, Mode::Fail);
    let table = dir.path().join("logged_failures.json");
    let config = StoreConfig::sync("logged", table, fast_settings());
    let mut store = SyncStore::open(&config, engine, rt.handle().clone()).unwrap();

    // When: A save cannot be replicated
    store.save(SaveRequest::new().insert(new_trip("Logged"))).unwrap();
    wait_for(&store, FLUSH, |s| s.last_error.is_some());
    store.shutdown().unwrap();

    // Then: The failure is a warning carrying the stable error code
    let failures: Vec<_> = capture
        .events_with("store_id", "logged_failures.json")
        .into_iter()
        .filter(|e| e.event.as_deref() == Some(EVENT_REPLICATION_FAILED))
        .collect();
    assert!(!failures.is_empty(), "Expected a replication_failed event");
    assert_eq!(failures[0].level, tracing::Level::WARN);
    assert_eq!(failures[0].op.as_deref(), Some("replicate"));
    assert_eq!(failures[0].field("err.code"), Some("ERR_SYNC_ENGINE"));
}
