//! Snapshot ⇄ engine document
//!
//! A document is the snapshot's JSON record plus an `_id` equal to the
//! primary key. Peers share a collection, so on the way back in every
//! identifier is rebound to the local store.

use std::collections::HashMap;

use persistkit_core::errors::{ExError, ExErrorKind};
use persistkit_core::model::{PersistentIdentifier, Snapshot};
use serde_json::Value;

use crate::engine::QueryRow;
use crate::errors::Result;

pub const DOCUMENT_ID: &str = "_id";

/// Serialize `snapshot` as a document keyed by its primary key
pub fn to_document(snapshot: &Snapshot) -> Result<Value> {
    let mut value = serde_json::to_value(snapshot)
        .map_err(|e| persistkit_core::errors::encode_error("to_document", e))?;
    match value.as_object_mut() {
        Some(object) => {
            object.insert(
                DOCUMENT_ID.to_string(),
                Value::String(snapshot.persistent_identifier().primary_key().to_string()),
            );
            Ok(value)
        }
        None => Err(ExError::new(ExErrorKind::Encode)
            .with_op("to_document")
            .with_message("snapshot did not serialize to an object")),
    }
}

/// Decode one result row of `collection` into a snapshot owned by `store_identifier`
///
/// # Errors
///
/// `Decode` when the row is not a snapshot document or its `_id` disagrees
/// with the embedded identifier.
pub fn from_row(row: &QueryRow, collection: &str, store_identifier: &str) -> Result<Snapshot> {
    let value: Value = serde_json::from_slice(row.bytes())
        .map_err(|e| persistkit_core::errors::decode_error("from_row", e))?;
    from_document(value, collection, store_identifier)
}

pub fn from_document(value: Value, collection: &str, store_identifier: &str) -> Result<Snapshot> {
    let decode = |message: String| {
        ExError::new(ExErrorKind::Decode)
            .with_op("from_document")
            .with_collection(collection)
            .with_message(message)
    };

    let id = value
        .get(DOCUMENT_ID)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| decode("document has no string _id".to_string()))?;
    let snapshot: Snapshot =
        serde_json::from_value(value).map_err(|e| decode(format!("document {}: {}", id, e)))?;

    let embedded = snapshot.persistent_identifier();
    if embedded.primary_key() != id || embedded.is_temporary() {
        return Err(decode(format!(
            "document {} carries identifier {}",
            id, embedded
        )));
    }
    if snapshot.collection_name() != Some(collection) {
        return Err(decode(format!(
            "document {} routed to {:?}, found in {}",
            id,
            snapshot.collection_name(),
            collection
        )));
    }

    Ok(rebind(&snapshot, store_identifier))
}

/// Same snapshot with its own identifier and every relationship target
/// owned by `store_identifier`
fn rebind(snapshot: &Snapshot, store_identifier: &str) -> Snapshot {
    let local = |id: &PersistentIdentifier| {
        PersistentIdentifier::permanent(store_identifier, id.entity_name(), id.primary_key())
    };

    let foreign: HashMap<PersistentIdentifier, PersistentIdentifier> = snapshot
        .relationships()
        .values()
        .flat_map(|rel| rel.targets())
        .filter(|id| !id.is_temporary() && id.store_identifier() != store_identifier)
        .map(|id| (id.clone(), local(id)))
        .collect();

    let remapped = snapshot
        .with_remapped_references(&foreign)
        .unwrap_or_else(|| snapshot.clone());
    let own = snapshot.persistent_identifier();
    if own.store_identifier() == store_identifier {
        remapped
    } else {
        remapped.copy_with_identifier(local(own))
    }
}
