// Documents the single-writer limitation of the file store: there is no
// cross-process locking, so overlapping read-modify-write cycles on one file
// lose updates. These tests pin the hazard down rather than work around it.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use persistkit_core::contract::DataStore;
use persistkit_core::model::{FetchRequest, PersistentIdentifier, SaveRequest, Snapshot};
use persistkit_store::{JsonFileStore, Table};
use serde_json::json;
use tempfile::TempDir;

fn trip(name: &str) -> Snapshot {
    Snapshot::new(PersistentIdentifier::temporary("Trip"), "trips")
        .with_attribute("name", json!(name))
}

#[test]
fn test_sequential_writers_see_each_other() {
    // Given: Two store instances over one file
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trips.json");
    let mut first = JsonFileStore::open("first", &path).unwrap();
    let mut second = JsonFileStore::open("second", &path).unwrap();

    // When: They save one after the other
    first.save(SaveRequest::new().insert(trip("A"))).unwrap();
    second.save(SaveRequest::new().insert(trip("B"))).unwrap();

    // Then: Each save re-reads the file, so nothing is lost
    assert_eq!(first.fetch(&FetchRequest::all()).unwrap().fetched_snapshots.len(), 2);
}

#[test]
fn test_overlapping_writers_lose_updates() {
    // Given: A writer that has read the table but not yet written it back
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trips.json");
    let mut store = JsonFileStore::open("trips", &path).unwrap();
    store.save(SaveRequest::new().insert(trip("A"))).unwrap();
    let stale = Table::read(&path).unwrap();

    // When: Another writer commits in between
    store.save(SaveRequest::new().insert(trip("B"))).unwrap();
    assert_eq!(Table::read(&path).unwrap().len(), 2);

    // And: The first writer finishes its cycle with its stale copy
    stale.write(&path).unwrap();

    // Then: The second writer's insert is gone
    let names: Vec<_> = store
        .fetch(&FetchRequest::all())
        .unwrap()
        .fetched_snapshots
        .iter()
        .map(|s| s.attribute("name").cloned())
        .collect();
    assert_eq!(names, vec![Some(json!("A"))]);
}
