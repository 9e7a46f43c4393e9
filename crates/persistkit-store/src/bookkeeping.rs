//! Local save bookkeeping shared by every table-backed store
//!
//! Applies one `SaveRequest` to an in-memory [`Table`]: mints permanent
//! identifiers for inserts, overwrites updates, removes deletes, and rewrites
//! relationship references to identifiers promoted in the same batch. The
//! caller writes the table durably and then commits the promotions.

use std::collections::HashMap;

use persistkit_core::identity::IdentifierAuthority;
use persistkit_core::model::{PersistentIdentifier, SaveRequest, SaveResult, Schema, Snapshot};

use crate::errors::{foreign_identifier, unknown_entity, Result};
use crate::file::table::Table;

/// Outcome of applying a request to a table, before it is made durable
#[derive(Debug, Clone, Default)]
pub struct AppliedSave {
    /// temporary → permanent, one entry per insert
    pub remapped: HashMap<PersistentIdentifier, PersistentIdentifier>,
    /// Inserted snapshots as stored, bound to their permanent identifiers
    pub inserted: Vec<Snapshot>,
    /// Updated snapshots as stored
    pub updated: Vec<Snapshot>,
    /// Deleted snapshots as requested
    pub deleted: Vec<Snapshot>,
}

impl AppliedSave {
    pub fn into_result(self, store_identifier: &str) -> SaveResult {
        SaveResult {
            store_identifier: store_identifier.to_string(),
            remapped_identifiers: self.remapped,
            deleted_identifiers: self
                .deleted
                .iter()
                .map(|s| s.persistent_identifier().clone())
                .collect(),
        }
    }
}

/// Apply `request` to `table`
///
/// `table` is left untouched when an error is returned. Updating an
/// identifier that is not in the table stores it; deleting one that is not
/// in the table is a no-op that is still reported as deleted.
///
/// # Errors
///
/// `IdentifierConflict` for lifecycle violations or foreign identifiers,
/// `InvalidInput` / `Decode` when `schema` rejects a snapshot.
pub fn apply_save(
    table: &mut Table,
    authority: &IdentifierAuthority,
    request: &SaveRequest,
    schema: Option<&Schema>,
) -> Result<AppliedSave> {
    request.validate()?;
    for snapshot in request.updated.iter().chain(&request.deleted) {
        let id = snapshot.persistent_identifier();
        if id.store_identifier() != authority.store_identifier() {
            return Err(foreign_identifier(
                id.store_identifier(),
                id.entity_name(),
                id.primary_key(),
            ));
        }
    }

    let mut staged = table.clone();
    let mut applied = AppliedSave::default();

    for snapshot in &request.inserted {
        let temporary = snapshot.persistent_identifier();
        let permanent = authority.mint_for(temporary, |candidate| {
            staged.contains(candidate) || applied.remapped.values().any(|p| p == candidate)
        })?;
        applied.remapped.insert(temporary.clone(), permanent.clone());
        applied.inserted.push(snapshot.copy_with_identifier(permanent));
    }

    applied.updated = request.updated.clone();

    // references to rows promoted in this batch point at the permanent ids
    for snapshot in applied.inserted.iter_mut().chain(applied.updated.iter_mut()) {
        if let Some(remapped) = snapshot.with_remapped_references(&applied.remapped) {
            *snapshot = remapped;
        }
    }

    if let Some(schema) = schema {
        for snapshot in applied.inserted.iter().chain(&applied.updated) {
            let entity = schema
                .entity(snapshot.entity_name())
                .ok_or_else(|| unknown_entity(snapshot.entity_name()))?;
            entity.validate(snapshot)?;
        }
    }

    for snapshot in applied.inserted.iter().chain(&applied.updated) {
        staged.put(snapshot.clone());
    }
    for snapshot in &request.deleted {
        staged.remove(snapshot.persistent_identifier());
    }
    applied.deleted = request.deleted.clone();

    *table = staged;
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistkit_core::errors::ExErrorKind;
    use persistkit_core::model::{AttributeKind, EntitySchema, Relationship};
    use serde_json::json;

    fn authority() -> IdentifierAuthority {
        IdentifierAuthority::new("trips.json")
    }

    #[test]
    fn test_inserts_get_distinct_permanent_ids() {
        let mut table = Table::new();
        let a = Snapshot::new(PersistentIdentifier::temporary("Trip"), "trips");
        let b = Snapshot::new(PersistentIdentifier::temporary("Trip"), "trips");
        let request = SaveRequest::new().insert(a.clone()).insert(b.clone());

        let applied = apply_save(&mut table, &authority(), &request, None).unwrap();

        let p1 = &applied.remapped[a.persistent_identifier()];
        let p2 = &applied.remapped[b.persistent_identifier()];
        assert_ne!(p1, p2);
        assert!(!p1.is_temporary());
        assert_eq!(table.len(), 2);
        assert!(table.contains(p1) && table.contains(p2));
    }

    #[test]
    fn test_same_batch_references_are_remapped() {
        let mut table = Table::new();
        let trip_temp = PersistentIdentifier::temporary("Trip");
        let item = Snapshot::new(PersistentIdentifier::temporary("BucketListItem"), "bucketList")
            .with_relationship("trip", Relationship::ToOne(trip_temp.clone()));
        let request = SaveRequest::new()
            .insert(Snapshot::new(trip_temp.clone(), "trips"))
            .insert(item.clone());

        let applied = apply_save(&mut table, &authority(), &request, None).unwrap();

        let trip_perm = applied.remapped[&trip_temp].clone();
        let item_perm = &applied.remapped[item.persistent_identifier()];
        assert_eq!(
            table.get(item_perm).unwrap().relationship("trip"),
            Some(&Relationship::ToOne(trip_perm))
        );
    }

    #[test]
    fn test_failed_apply_leaves_table_untouched() {
        let mut table = Table::new();
        let schema = Schema::new(vec![
            EntitySchema::new("Trip", "trips").attribute("name", AttributeKind::String)
        ]);
        let ok = Snapshot::new(PersistentIdentifier::temporary("Trip"), "trips")
            .with_attribute("name", json!("Camping"));
        let bad = Snapshot::new(PersistentIdentifier::temporary("Trip"), "trips");
        let request = SaveRequest::new().insert(ok).insert(bad);

        assert!(apply_save(&mut table, &authority(), &request, Some(&schema)).is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn test_unknown_entity_rejected_by_schema() {
        let mut table = Table::new();
        let schema = Schema::new(vec![EntitySchema::new("Trip", "trips")]);
        let request = SaveRequest::new().insert(Snapshot::new(
            PersistentIdentifier::temporary("Receipt"),
            "receipts",
        ));

        let err = apply_save(&mut table, &authority(), &request, Some(&schema)).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidInput);
    }

    #[test]
    fn test_foreign_identifier_rejected() {
        let mut table = Table::new();
        let foreign = PersistentIdentifier::permanent("other.json", "Trip", "k");
        let request = SaveRequest::new().update(Snapshot::new(foreign, "trips"));

        let err = apply_save(&mut table, &authority(), &request, None).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::IdentifierConflict);
    }

    #[test]
    fn test_delete_of_absent_row_is_reported() {
        let mut table = Table::new();
        let ghost = PersistentIdentifier::permanent("trips.json", "Trip", "ghost");
        let request = SaveRequest::new().delete(Snapshot::new(ghost.clone(), "trips"));

        let applied = apply_save(&mut table, &authority(), &request, None).unwrap();
        let result = applied.into_result("trips.json");
        assert_eq!(result.deleted_identifiers, vec![ghost]);
        assert!(result.remapped_identifiers.is_empty());
    }
}
