use std::collections::{BTreeMap, HashMap};

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::identifier::PersistentIdentifier;
use crate::errors::StoreError;

/// Value of one relationship slot in a snapshot
///
/// `Null` is an explicit "cleared" marker and is serialized as JSON `null`.
/// A relationship that is absent from the map was never set; the two states
/// must survive a round trip through any serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relationship {
    Null,
    ToOne(PersistentIdentifier),
    ToMany(Vec<PersistentIdentifier>),
}

impl Relationship {
    /// Identifiers referenced by this slot
    pub fn targets(&self) -> Vec<&PersistentIdentifier> {
        match self {
            Relationship::Null => Vec::new(),
            Relationship::ToOne(id) => vec![id],
            Relationship::ToMany(ids) => ids.iter().collect(),
        }
    }

    fn remapped(&self, map: &HashMap<PersistentIdentifier, PersistentIdentifier>) -> Self {
        let swap = |id: &PersistentIdentifier| map.get(id).cloned().unwrap_or_else(|| id.clone());
        match self {
            Relationship::Null => Relationship::Null,
            Relationship::ToOne(id) => Relationship::ToOne(swap(id)),
            Relationship::ToMany(ids) => Relationship::ToMany(ids.iter().map(swap).collect()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RelationshipRepr {
    ToMany(Vec<PersistentIdentifier>),
    ToOne(PersistentIdentifier),
}

impl Serialize for Relationship {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Relationship::Null => serializer.serialize_none(),
            Relationship::ToOne(id) => id.serialize(serializer),
            Relationship::ToMany(ids) => ids.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Relationship {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(
            match Option::<RelationshipRepr>::deserialize(deserializer)? {
                None => Relationship::Null,
                Some(RelationshipRepr::ToOne(id)) => Relationship::ToOne(id),
                Some(RelationshipRepr::ToMany(ids)) => Relationship::ToMany(ids),
            },
        )
    }
}

/// Immutable, serializable projection of an entity's state
///
/// Updates produce a new snapshot bound to the same identifier; inserts are
/// rebound to a permanent identifier with [`Snapshot::copy_with_identifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    persistent_identifier: PersistentIdentifier,
    entity_name: String,
    #[serde(default)]
    collection_name: Option<String>,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
    #[serde(default)]
    relationships: BTreeMap<String, Relationship>,
}

impl Snapshot {
    /// Start a snapshot for `id`, routed to `collection_name`
    pub fn new(id: PersistentIdentifier, collection_name: impl Into<String>) -> Self {
        Self {
            entity_name: id.entity_name().to_string(),
            persistent_identifier: id,
            collection_name: Some(collection_name.into()),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// A snapshot with no routing collection (legacy records)
    pub fn unrouted(id: PersistentIdentifier) -> Self {
        Self {
            entity_name: id.entity_name().to_string(),
            persistent_identifier: id,
            collection_name: None,
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn with_relationship(mut self, name: impl Into<String>, value: Relationship) -> Self {
        self.relationships.insert(name.into(), value);
        self
    }

    pub(crate) fn set_attribute(&mut self, name: impl Into<String>, value: Value) {
        self.attributes.insert(name.into(), value);
    }

    pub(crate) fn set_relationship(&mut self, name: impl Into<String>, value: Relationship) {
        self.relationships.insert(name.into(), value);
    }

    pub fn persistent_identifier(&self) -> &PersistentIdentifier {
        &self.persistent_identifier
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn collection_name(&self) -> Option<&str> {
        self.collection_name.as_deref()
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn relationships(&self) -> &BTreeMap<String, Relationship> {
        &self.relationships
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.get(name)
    }

    /// Same state bound to another identifier
    pub fn copy_with_identifier(&self, id: PersistentIdentifier) -> Self {
        Self {
            persistent_identifier: id,
            ..self.clone()
        }
    }

    /// Rewrite relationship targets through `map` (temporary → permanent)
    ///
    /// Returns `None` when no slot references a remapped identifier.
    pub fn with_remapped_references(
        &self,
        map: &HashMap<PersistentIdentifier, PersistentIdentifier>,
    ) -> Option<Self> {
        let touched = self
            .relationships
            .values()
            .flat_map(Relationship::targets)
            .any(|id| map.contains_key(id));
        if !touched {
            return None;
        }
        let relationships = self
            .relationships
            .iter()
            .map(|(name, rel)| (name.clone(), rel.remapped(map)))
            .collect();
        Some(Self {
            relationships,
            ..self.clone()
        })
    }

    /// Collection this snapshot replicates into
    ///
    /// # Errors
    ///
    /// `MissingRoutingField` when the collection name is absent or blank.
    pub fn routing_collection(&self) -> std::result::Result<&str, StoreError> {
        match self.collection_name.as_deref() {
            Some(name) if !name.trim().is_empty() => Ok(name),
            _ => Err(StoreError::MissingRoutingField {
                entity_name: self.entity_name.clone(),
                primary_key: self.persistent_identifier.primary_key().to_string(),
            }),
        }
    }
}
