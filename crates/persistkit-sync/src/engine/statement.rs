//! DQL statements sent to the engine
//!
//! Four shapes are used:
//!
//! | statement | text |
//! |---|---|
//! | insert | `INSERT INTO c DOCUMENTS (:new)` |
//! | upsert | `INSERT INTO c DOCUMENTS (:new) ON ID CONFLICT DO UPDATE` |
//! | evict  | `EVICT FROM c WHERE _id = :id` |
//! | select | `SELECT * FROM c LIMIT n` |
//!
//! Collection names are spliced into the text, so they are restricted to
//! plain identifiers; documents and ids always travel as arguments.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{EngineError, QueryArgs};

pub const ARG_NEW: &str = "new";
pub const ARG_ID: &str = "id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
    Insert { collection: String, document: Value },
    Upsert { collection: String, document: Value },
    Evict { collection: String, id: String },
    Select { collection: String, limit: u32 },
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_collection_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Statement {
    pub fn collection(&self) -> &str {
        match self {
            Statement::Insert { collection, .. }
            | Statement::Upsert { collection, .. }
            | Statement::Evict { collection, .. }
            | Statement::Select { collection, .. } => collection,
        }
    }

    /// `_id` of the document this statement writes or evicts
    pub fn document_id(&self) -> Option<&str> {
        match self {
            Statement::Insert { document, .. } | Statement::Upsert { document, .. } => {
                document.get("_id").and_then(Value::as_str)
            }
            Statement::Evict { id, .. } => Some(id),
            Statement::Select { .. } => None,
        }
    }

    /// Short name used in logs
    pub fn verb(&self) -> &'static str {
        match self {
            Statement::Insert { .. } => "insert",
            Statement::Upsert { .. } => "upsert",
            Statement::Evict { .. } => "evict",
            Statement::Select { .. } => "select",
        }
    }

    pub fn text(&self) -> String {
        match self {
            Statement::Insert { collection, .. } => {
                format!("INSERT INTO {} DOCUMENTS (:{})", collection, ARG_NEW)
            }
            Statement::Upsert { collection, .. } => format!(
                "INSERT INTO {} DOCUMENTS (:{}) ON ID CONFLICT DO UPDATE",
                collection, ARG_NEW
            ),
            Statement::Evict { collection, .. } => {
                format!("EVICT FROM {} WHERE _id = :{}", collection, ARG_ID)
            }
            Statement::Select { collection, limit } => {
                format!("SELECT * FROM {} LIMIT {}", collection, limit)
            }
        }
    }

    pub fn args(&self) -> QueryArgs {
        let mut args = QueryArgs::new();
        match self {
            Statement::Insert { document, .. } | Statement::Upsert { document, .. } => {
                args.insert(ARG_NEW.to_string(), document.clone());
            }
            Statement::Evict { id, .. } => {
                args.insert(ARG_ID.to_string(), Value::String(id.clone()));
            }
            Statement::Select { .. } => {}
        }
        args
    }

    /// Recognize one of the four shapes produced by [`Statement::text`]
    ///
    /// # Errors
    ///
    /// `Rejected` for any other text or a missing argument.
    pub fn parse(text: &str, args: &QueryArgs) -> Result<Self, EngineError> {
        let rejected = || EngineError::Rejected(format!("unsupported statement: {}", text));
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let arg = |name: &str| args.get(name).cloned().ok_or_else(rejected);

        let statement = match tokens.as_slice() {
            ["INSERT", "INTO", c, "DOCUMENTS", "(:new)"] => Statement::Insert {
                collection: c.to_string(),
                document: arg(ARG_NEW)?,
            },
            [
                "INSERT", "INTO", c, "DOCUMENTS", "(:new)", "ON", "ID", "CONFLICT", "DO", "UPDATE",
            ] => Statement::Upsert {
                collection: c.to_string(),
                document: arg(ARG_NEW)?,
            },
            ["EVICT", "FROM", c, "WHERE", "_id", "=", ":id"] => Statement::Evict {
                collection: c.to_string(),
                id: arg(ARG_ID)?.as_str().ok_or_else(rejected)?.to_string(),
            },
            ["SELECT", "*", "FROM", c, "LIMIT", n] => Statement::Select {
                collection: c.to_string(),
                limit: n.parse().map_err(|_| rejected())?,
            },
            _ => return Err(rejected()),
        };
        if !is_valid_collection_name(statement.collection()) {
            return Err(rejected());
        }
        Ok(statement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trips_insert(document: Value) -> Statement {
        Statement::Insert {
            collection: "trips".into(),
            document,
        }
    }

    #[test]
    fn test_statement_texts() {
        let doc = json!({"_id": "k1"});
        assert_eq!(
            trips_insert(doc.clone()).text(),
            "INSERT INTO trips DOCUMENTS (:new)"
        );
        let upsert = Statement::Upsert {
            collection: "trips".into(),
            document: doc,
        };
        assert_eq!(
            upsert.text(),
            "INSERT INTO trips DOCUMENTS (:new) ON ID CONFLICT DO UPDATE"
        );
        let evict = Statement::Evict {
            collection: "trips".into(),
            id: "k1".into(),
        };
        assert_eq!(evict.text(), "EVICT FROM trips WHERE _id = :id");
        let select = Statement::Select {
            collection: "trips".into(),
            limit: 1000,
        };
        assert_eq!(select.text(), "SELECT * FROM trips LIMIT 1000");
    }

    #[test]
    fn test_parse_recovers_each_shape() {
        let statements = vec![
            Statement::Insert {
                collection: "bucketList".into(),
                document: json!({"_id": "a"}),
            },
            Statement::Upsert {
                collection: "bucketList".into(),
                document: json!({"_id": "a"}),
            },
            Statement::Evict {
                collection: "bucketList".into(),
                id: "a".into(),
            },
            Statement::Select {
                collection: "bucketList".into(),
                limit: 10,
            },
        ];
        for statement in statements {
            let parsed = Statement::parse(&statement.text(), &statement.args()).unwrap();
            assert_eq!(parsed, statement);
        }
    }

    #[test]
    fn test_parse_rejects_unknown_text_and_missing_args() {
        assert!(Statement::parse("DROP COLLECTION trips", &QueryArgs::new()).is_err());
        assert!(Statement::parse("INSERT INTO trips DOCUMENTS (:new)", &QueryArgs::new()).is_err());
        assert!(Statement::parse("SELECT * FROM trips LIMIT many", &QueryArgs::new()).is_err());
    }

    #[test]
    fn test_collection_names_are_plain_identifiers() {
        assert!(is_valid_collection_name("livingAccommodation"));
        assert!(is_valid_collection_name("_archive2"));
        assert!(!is_valid_collection_name(""));
        assert!(!is_valid_collection_name("2trips"));
        assert!(!is_valid_collection_name("trips; EVICT"));
    }

    #[test]
    fn test_document_id() {
        assert_eq!(trips_insert(json!({"_id": "k9"})).document_id(), Some("k9"));
        let select = Statement::Select {
            collection: "trips".into(),
            limit: 1,
        };
        assert_eq!(select.document_id(), None);
    }
}
