//! Snapshot codec
//!
//! Converts domain entities to and from flat [`Snapshot`] records against their
//! [`EntitySchema`]. Dates travel as ISO-8601 strings (UTC, `Z` suffix,
//! fractional seconds only when present) so that every process reading the
//! store agrees on them. A relationship cleared by the entity is written as an
//! explicit null; one the entity never sets is left out, and the reader
//! reports the two differently.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::errors::StoreError;
use crate::model::{EntitySchema, PersistentIdentifier, Relationship, Snapshot};

/// A domain type that can be persisted through a store
pub trait Entity: Sized {
    /// Schema the encoded snapshot must satisfy
    fn schema() -> EntitySchema;

    /// Write this entity's state into `builder`
    fn encode(&self, builder: &mut SnapshotBuilder);

    /// Rebuild an entity from a validated snapshot
    ///
    /// # Errors
    ///
    /// `InvalidAttribute` when a field cannot be read.
    fn decode(reader: &SnapshotReader<'_>) -> std::result::Result<Self, StoreError>;
}

/// Encode `entity` into a snapshot bound to `id`
///
/// # Errors
///
/// `Encode` when a value fails to serialize, `InvalidAttribute` when the
/// result does not satisfy the entity schema.
pub fn encode_entity<E: Entity>(
    entity: &E,
    id: PersistentIdentifier,
) -> std::result::Result<Snapshot, StoreError> {
    let schema = E::schema();
    let mut builder = SnapshotBuilder::new(id, &schema.collection_name);
    entity.encode(&mut builder);
    let snapshot = builder.build()?;
    schema.validate(&snapshot)?;
    Ok(snapshot)
}

/// Decode a snapshot into `E`, validating it against `E::schema()` first
///
/// # Errors
///
/// `InvalidAttribute` on schema mismatch or unreadable fields.
pub fn decode_entity<E: Entity>(snapshot: &Snapshot) -> std::result::Result<E, StoreError> {
    E::schema().validate(snapshot)?;
    E::decode(&SnapshotReader::new(snapshot))
}

/// Render a timestamp in the interchange format
pub fn encode_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse an interchange timestamp
///
/// # Errors
///
/// `Decode` when `raw` is not RFC 3339.
pub fn decode_date(raw: &str) -> std::result::Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode {
            message: format!("invalid ISO-8601 date {:?}: {}", raw, e),
        })
}

/// Accumulates attributes and relationships for one snapshot
///
/// Setters never fail; the first serialization error is reported by
/// [`SnapshotBuilder::build`].
pub struct SnapshotBuilder {
    snapshot: Snapshot,
    error: Option<StoreError>,
}

impl SnapshotBuilder {
    pub fn new(id: PersistentIdentifier, collection_name: &str) -> Self {
        Self {
            snapshot: Snapshot::new(id, collection_name),
            error: None,
        }
    }

    pub fn set<T: Serialize>(&mut self, name: &str, value: &T) -> &mut Self {
        match serde_json::to_value(value) {
            Ok(value) => self.put(name, value),
            Err(e) => {
                self.error.get_or_insert(StoreError::Encode {
                    message: format!("attribute {}: {}", name, e),
                });
            }
        }
        self
    }

    pub fn set_date(&mut self, name: &str, date: &DateTime<Utc>) -> &mut Self {
        self.put(name, Value::String(encode_date(date)));
        self
    }

    pub fn set_optional_date(&mut self, name: &str, date: Option<&DateTime<Utc>>) -> &mut Self {
        let value = date.map_or(Value::Null, |d| Value::String(encode_date(d)));
        self.put(name, value);
        self
    }

    /// Set a to-one relationship; `None` writes the explicit null marker
    pub fn to_one(&mut self, name: &str, target: Option<&PersistentIdentifier>) -> &mut Self {
        let rel = target.map_or(Relationship::Null, |id| Relationship::ToOne(id.clone()));
        self.relate(name, rel);
        self
    }

    pub fn to_many(&mut self, name: &str, targets: &[PersistentIdentifier]) -> &mut Self {
        self.relate(name, Relationship::ToMany(targets.to_vec()));
        self
    }

    /// # Errors
    ///
    /// The first `Encode` error raised by a setter.
    pub fn build(self) -> std::result::Result<Snapshot, StoreError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.snapshot),
        }
    }

    fn put(&mut self, name: &str, value: Value) {
        self.snapshot.set_attribute(name, value);
    }

    fn relate(&mut self, name: &str, rel: Relationship) {
        self.snapshot.set_relationship(name, rel);
    }
}

/// State of a to-one relationship slot as read back from a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToOneState {
    /// Never written
    Absent,
    /// Explicitly cleared
    Cleared,
    Set(PersistentIdentifier),
}

impl ToOneState {
    pub fn into_option(self) -> Option<PersistentIdentifier> {
        match self {
            ToOneState::Set(id) => Some(id),
            ToOneState::Absent | ToOneState::Cleared => None,
        }
    }
}

/// Typed read access to a snapshot
pub struct SnapshotReader<'a> {
    snapshot: &'a Snapshot,
}

impl<'a> SnapshotReader<'a> {
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Self { snapshot }
    }

    pub fn identifier(&self) -> &PersistentIdentifier {
        self.snapshot.persistent_identifier()
    }

    /// # Errors
    ///
    /// `InvalidAttribute` when missing or of the wrong type.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> std::result::Result<T, StoreError> {
        let value = self
            .snapshot
            .attribute(name)
            .ok_or_else(|| self.invalid(name, "missing".to_string()))?;
        serde_json::from_value(value.clone()).map_err(|e| self.invalid(name, e.to_string()))
    }

    /// Missing and null both read as `None`
    ///
    /// # Errors
    ///
    /// `InvalidAttribute` when present with the wrong type.
    pub fn get_optional<T: DeserializeOwned>(
        &self,
        name: &str,
    ) -> std::result::Result<Option<T>, StoreError> {
        match self.snapshot.attribute(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| self.invalid(name, e.to_string())),
        }
    }

    /// # Errors
    ///
    /// `InvalidAttribute` when missing or not ISO-8601.
    pub fn date(&self, name: &str) -> std::result::Result<DateTime<Utc>, StoreError> {
        let raw: String = self.get(name)?;
        decode_date(&raw).map_err(|e| self.invalid(name, e.to_string()))
    }

    /// # Errors
    ///
    /// `InvalidAttribute` when present but not ISO-8601.
    pub fn optional_date(
        &self,
        name: &str,
    ) -> std::result::Result<Option<DateTime<Utc>>, StoreError> {
        match self.get_optional::<String>(name)? {
            None => Ok(None),
            Some(raw) => decode_date(&raw)
                .map(Some)
                .map_err(|e| self.invalid(name, e.to_string())),
        }
    }

    /// # Errors
    ///
    /// `InvalidAttribute` when the slot holds a to-many list.
    pub fn to_one(&self, name: &str) -> std::result::Result<ToOneState, StoreError> {
        match self.snapshot.relationship(name) {
            None => Ok(ToOneState::Absent),
            Some(Relationship::Null) => Ok(ToOneState::Cleared),
            Some(Relationship::ToOne(id)) => Ok(ToOneState::Set(id.clone())),
            Some(Relationship::ToMany(_)) => {
                Err(self.invalid(name, "expected to-one, found list".to_string()))
            }
        }
    }

    /// Missing or null reads as empty
    ///
    /// # Errors
    ///
    /// `InvalidAttribute` when the slot holds a single identifier.
    pub fn to_many(
        &self,
        name: &str,
    ) -> std::result::Result<Vec<PersistentIdentifier>, StoreError> {
        match self.snapshot.relationship(name) {
            None | Some(Relationship::Null) => Ok(Vec::new()),
            Some(Relationship::ToMany(ids)) => Ok(ids.clone()),
            Some(Relationship::ToOne(_)) => {
                Err(self.invalid(name, "expected list, found to-one".to_string()))
            }
        }
    }

    fn invalid(&self, attribute: &str, reason: String) -> StoreError {
        StoreError::InvalidAttribute {
            entity_name: self.snapshot.entity_name().to_string(),
            attribute: attribute.to_string(),
            reason,
        }
    }
}
