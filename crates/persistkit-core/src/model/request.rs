//! Save / fetch batch types exchanged between the coordinator and a backend.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::identifier::PersistentIdentifier;
use super::snapshot::Snapshot;
use crate::errors::StoreError;

/// One batch of mutations
///
/// The three lists must be identifier-disjoint.
#[derive(Debug, Clone, Default)]
pub struct SaveRequest {
    pub inserted: Vec<Snapshot>,
    pub updated: Vec<Snapshot>,
    pub deleted: Vec<Snapshot>,
}

impl SaveRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(mut self, snapshot: Snapshot) -> Self {
        self.inserted.push(snapshot);
        self
    }

    pub fn update(mut self, snapshot: Snapshot) -> Self {
        self.updated.push(snapshot);
        self
    }

    pub fn delete(mut self, snapshot: Snapshot) -> Self {
        self.deleted.push(snapshot);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Check the identifier lifecycle rules for this batch
    ///
    /// - inserts carry temporary identifiers
    /// - updates and deletes carry permanent identifiers
    /// - no identifier appears twice across (or within) the lists
    ///
    /// # Errors
    ///
    /// `IdentifierConflict` or `OverlappingRequest` on the first violation.
    pub fn validate(&self) -> std::result::Result<(), StoreError> {
        let mut seen: HashMap<&PersistentIdentifier, &'static str> = HashMap::new();
        let lists: [(&'static str, &Vec<Snapshot>); 3] = [
            ("inserted", &self.inserted),
            ("updated", &self.updated),
            ("deleted", &self.deleted),
        ];

        for (list, snapshots) in lists {
            for snapshot in snapshots {
                let id = snapshot.persistent_identifier();
                let expects_temporary = list == "inserted";
                if id.is_temporary() != expects_temporary {
                    return Err(StoreError::IdentifierConflict {
                        entity_name: id.entity_name().to_string(),
                        primary_key: id.primary_key().to_string(),
                        reason: if expects_temporary {
                            "inserted snapshot already has a permanent identifier".to_string()
                        } else {
                            format!("{} snapshot still has a temporary identifier", list)
                        },
                    });
                }
                if let Some(first) = seen.insert(id, list) {
                    return Err(StoreError::OverlappingRequest {
                        entity_name: id.entity_name().to_string(),
                        primary_key: id.primary_key().to_string(),
                        first,
                        second: list,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Outcome of a successful save
#[derive(Debug, Clone, PartialEq)]
pub struct SaveResult {
    pub store_identifier: String,
    /// temporary → permanent, one entry per inserted snapshot
    pub remapped_identifiers: HashMap<PersistentIdentifier, PersistentIdentifier>,
    pub deleted_identifiers: Vec<PersistentIdentifier>,
}

/// Caller-supplied filter, evaluated in memory by the caller
#[derive(Clone)]
pub struct Predicate {
    description: String,
    test: Arc<dyn Fn(&Snapshot) -> bool + Send + Sync>,
}

impl Predicate {
    pub fn new(
        description: impl Into<String>,
        test: impl Fn(&Snapshot) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            test: Arc::new(test),
        }
    }

    /// Matches snapshots whose attribute `name` equals `value`
    pub fn attribute_equals(name: impl Into<String>, value: serde_json::Value) -> Self {
        let name = name.into();
        let description = format!("{} == {}", name, value);
        Self::new(description, move |s| s.attribute(&name) == Some(&value))
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn matches(&self, snapshot: &Snapshot) -> bool {
        (self.test)(snapshot)
    }
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Predicate")
            .field("description", &self.description)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Sort key over one attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDescriptor {
    pub attribute: String,
    pub order: SortOrder,
}

impl SortDescriptor {
    pub fn ascending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            order: SortOrder::Descending,
        }
    }
}

/// Query for one entity type
///
/// Backends reject `predicate` and `sort_descriptors`; see
/// `crate::query::apply_in_memory` for the caller-side evaluation.
#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    /// Entity type to fetch; `None` fetches every entity
    pub entity_name: Option<String>,
    pub predicate: Option<Predicate>,
    pub sort_descriptors: Vec<SortDescriptor>,
}

impl FetchRequest {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn entity(name: impl Into<String>) -> Self {
        Self {
            entity_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn filtered(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn sorted_by(mut self, descriptor: SortDescriptor) -> Self {
        self.sort_descriptors.push(descriptor);
        self
    }

    /// Same request with predicate and sort removed
    pub fn unfiltered(&self) -> Self {
        Self {
            entity_name: self.entity_name.clone(),
            predicate: None,
            sort_descriptors: Vec::new(),
        }
    }

    pub fn selects(&self, snapshot: &Snapshot) -> bool {
        self.entity_name
            .as_deref()
            .map_or(true, |name| snapshot.entity_name() == name)
    }
}

/// Snapshots returned by a fetch
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    /// Snapshots of the requested entity type, unordered
    pub fetched_snapshots: Vec<Snapshot>,
    /// Every snapshot in the store, for relationship resolution
    pub related_snapshots: HashMap<PersistentIdentifier, Snapshot>,
}

impl FetchResult {
    /// Identifiers of the fetched snapshots
    pub fn fetched_identifiers(&self) -> HashSet<&PersistentIdentifier> {
        self.fetched_snapshots
            .iter()
            .map(Snapshot::persistent_identifier)
            .collect()
    }
}
