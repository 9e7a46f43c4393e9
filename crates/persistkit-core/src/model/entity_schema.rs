//! Stable attribute / relationship schema per entity type.

use chrono::DateTime;
use serde_json::Value;

use super::snapshot::{Relationship, Snapshot};
use crate::errors::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    String,
    Integer,
    Double,
    Bool,
    /// ISO-8601 string
    Date,
    /// Hyphenated UUID string
    Uuid,
}

impl AttributeKind {
    fn accepts(self, value: &Value) -> bool {
        match self {
            AttributeKind::String => value.is_string(),
            AttributeKind::Integer => value.is_i64() || value.is_u64(),
            AttributeKind::Double => value.is_number(),
            AttributeKind::Bool => value.is_boolean(),
            AttributeKind::Date => value
                .as_str()
                .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
            AttributeKind::Uuid => value
                .as_str()
                .is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSpec {
    pub name: String,
    pub kind: AttributeKind,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipSpec {
    pub name: String,
    pub destination: String,
    pub to_many: bool,
}

/// Schema of one entity type and the collection it replicates into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    pub entity_name: String,
    pub collection_name: String,
    pub attributes: Vec<AttributeSpec>,
    pub relationships: Vec<RelationshipSpec>,
}

impl EntitySchema {
    pub fn new(entity_name: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            collection_name: collection_name.into(),
            attributes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes.push(AttributeSpec {
            name: name.into(),
            kind,
            optional: false,
        });
        self
    }

    pub fn optional_attribute(mut self, name: impl Into<String>, kind: AttributeKind) -> Self {
        self.attributes.push(AttributeSpec {
            name: name.into(),
            kind,
            optional: true,
        });
        self
    }

    pub fn to_one(mut self, name: impl Into<String>, destination: impl Into<String>) -> Self {
        self.relationships.push(RelationshipSpec {
            name: name.into(),
            destination: destination.into(),
            to_many: false,
        });
        self
    }

    pub fn to_many(mut self, name: impl Into<String>, destination: impl Into<String>) -> Self {
        self.relationships.push(RelationshipSpec {
            name: name.into(),
            destination: destination.into(),
            to_many: true,
        });
        self
    }

    pub fn attribute_spec(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn relationship_spec(&self, name: &str) -> Option<&RelationshipSpec> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Check that `snapshot` conforms to this schema
    ///
    /// Unknown attributes are tolerated so that newer writers do not break
    /// older readers; known attributes must have the declared shape.
    ///
    /// # Errors
    ///
    /// `InvalidAttribute` for the first mismatch found.
    pub fn validate(&self, snapshot: &Snapshot) -> std::result::Result<(), StoreError> {
        let invalid = |attribute: &str, reason: String| StoreError::InvalidAttribute {
            entity_name: self.entity_name.clone(),
            attribute: attribute.to_string(),
            reason,
        };

        if snapshot.entity_name() != self.entity_name {
            return Err(invalid(
                "entityName",
                format!("expected {}, found {}", self.entity_name, snapshot.entity_name()),
            ));
        }
        if snapshot.collection_name() != Some(self.collection_name.as_str()) {
            return Err(invalid(
                "collectionName",
                format!(
                    "expected {}, found {:?}",
                    self.collection_name,
                    snapshot.collection_name()
                ),
            ));
        }

        for spec in &self.attributes {
            match snapshot.attribute(&spec.name) {
                None | Some(Value::Null) if spec.optional => {}
                None => return Err(invalid(&spec.name, "missing".to_string())),
                Some(value) if !spec.kind.accepts(value) => {
                    return Err(invalid(
                        &spec.name,
                        format!("expected {:?}, found {}", spec.kind, value),
                    ))
                }
                Some(_) => {}
            }
        }

        for spec in &self.relationships {
            let Some(rel) = snapshot.relationship(&spec.name) else {
                continue;
            };
            let shape_ok = match rel {
                Relationship::Null => true,
                Relationship::ToOne(_) => !spec.to_many,
                Relationship::ToMany(_) => spec.to_many,
            };
            if !shape_ok {
                let expected = if spec.to_many { "many" } else { "one" };
                return Err(invalid(
                    &spec.name,
                    format!("expected to-{} relationship", expected),
                ));
            }
            if let Some(target) = rel
                .targets()
                .into_iter()
                .find(|id| id.entity_name() != spec.destination)
            {
                return Err(invalid(
                    &spec.name,
                    format!("targets {} instead of {}", target.entity_name(), spec.destination),
                ));
            }
        }
        Ok(())
    }
}

/// The set of entity types a store persists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    entities: Vec<EntitySchema>,
}

impl Schema {
    pub fn new(entities: Vec<EntitySchema>) -> Self {
        Self { entities }
    }

    pub fn entities(&self) -> &[EntitySchema] {
        &self.entities
    }

    pub fn entity(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.iter().find(|e| e.entity_name == name)
    }

    /// Distinct collection names, in declaration order
    pub fn collections(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for entity in &self.entities {
            if !out.contains(&entity.collection_name) {
                out.push(entity.collection_name.clone());
            }
        }
        out
    }
}
