use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable key of a persisted entity
///
/// Unique per `(store_identifier, entity_name, primary_key)`. A temporary
/// identifier is minted client-side before the first save and carries no
/// store; a successful insert replaces it, exactly once, with a permanent
/// identifier minted by the store's `IdentifierAuthority`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentIdentifier {
    store_identifier: String,
    entity_name: String,
    primary_key: String,
    #[serde(default)]
    is_temporary: bool,
}

impl PersistentIdentifier {
    /// Create a fresh temporary identifier for an unsaved entity
    pub fn temporary(entity_name: impl Into<String>) -> Self {
        Self {
            store_identifier: String::new(),
            entity_name: entity_name.into(),
            primary_key: format!("t{}", Uuid::new_v4().simple()),
            is_temporary: true,
        }
    }

    /// Build a permanent identifier from its parts
    ///
    /// Only the identifier authority and decoders should call this; callers
    /// must never invent permanent keys.
    pub fn permanent(
        store_identifier: impl Into<String>,
        entity_name: impl Into<String>,
        primary_key: impl Into<String>,
    ) -> Self {
        Self {
            store_identifier: store_identifier.into(),
            entity_name: entity_name.into(),
            primary_key: primary_key.into(),
            is_temporary: false,
        }
    }

    pub fn store_identifier(&self) -> &str {
        &self.store_identifier
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn is_temporary(&self) -> bool {
        self.is_temporary
    }

    /// Structural check applied to identifiers read back from storage
    pub fn is_well_formed(&self) -> bool {
        if self.entity_name.is_empty() || self.primary_key.is_empty() {
            return false;
        }
        // permanent identifiers always belong to a store
        self.is_temporary || !self.store_identifier.is_empty()
    }
}

impl std::fmt::Display for PersistentIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_temporary {
            write!(f, "{}/{} (temporary)", self.entity_name, self.primary_key)
        } else {
            write!(
                f,
                "{}:{}/{}",
                self.store_identifier, self.entity_name, self.primary_key
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporaries_are_distinct() {
        let a = PersistentIdentifier::temporary("Trip");
        let b = PersistentIdentifier::temporary("Trip");
        assert_ne!(a, b);
        assert!(a.is_temporary());
        assert!(a.is_well_formed());
    }

    #[test]
    fn test_permanent_requires_store() {
        let orphan = PersistentIdentifier::permanent("", "Trip", "k1");
        assert!(!orphan.is_well_formed());

        let ok = PersistentIdentifier::permanent("trips.json", "Trip", "k1");
        assert!(ok.is_well_formed());
        assert!(!ok.is_temporary());
    }

    #[test]
    fn test_serialized_keys_are_camel_case() {
        let id = PersistentIdentifier::permanent("trips.json", "Trip", "k1");
        let value = serde_json::to_value(&id).unwrap();
        assert_eq!(value["storeIdentifier"], "trips.json");
        assert_eq!(value["entityName"], "Trip");
        assert_eq!(value["primaryKey"], "k1");
        assert_eq!(value["isTemporary"], false);
    }

    #[test]
    fn test_missing_temporary_flag_reads_as_permanent() {
        let id: PersistentIdentifier = serde_json::from_str(
            r#"{"storeIdentifier":"s","entityName":"Trip","primaryKey":"k"}"#,
        )
        .unwrap();
        assert!(!id.is_temporary());
    }
}
