//! Loopback engine
//!
//! Keeps documents in memory and interprets the four statement shapes. It
//! never talks to peers; it stands in for the real engine in offline runs and
//! in tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::statement::Statement;
use super::{EngineError, QueryArgs, QueryRow, SyncEngine};

type Collections = BTreeMap<String, BTreeMap<String, Value>>;

#[derive(Debug, Default)]
pub struct MemoryEngine {
    collections: Mutex<Collections>,
    subscriptions: Mutex<Vec<String>>,
    executed: Mutex<Vec<String>>,
    syncing: AtomicBool,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a document directly, as if a peer had replicated it in
    pub fn seed(&self, collection: &str, document: Value) -> Result<(), EngineError> {
        let id = document_id(&document)?;
        let mut collections = self.lock_collections()?;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, document);
        Ok(())
    }

    /// Documents of `collection`, ordered by `_id`
    pub fn documents(&self, collection: &str) -> Vec<Value> {
        self.collections
            .lock()
            .map(|c| c.get(collection).map(|docs| docs.values().cloned().collect()))
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    /// Statement texts executed so far, in order
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    fn lock_collections(&self) -> Result<std::sync::MutexGuard<'_, Collections>, EngineError> {
        self.collections
            .lock()
            .map_err(|_| EngineError::Unavailable("engine state poisoned".to_string()))
    }

    fn apply(&self, statement: Statement) -> Result<Vec<QueryRow>, EngineError> {
        let mut collections = self.lock_collections()?;
        match statement {
            Statement::Insert {
                collection,
                document,
            } => {
                let id = document_id(&document)?;
                let docs = collections.entry(collection.clone()).or_default();
                if docs.contains_key(&id) {
                    return Err(EngineError::Rejected(format!(
                        "document {} already exists in {}",
                        id, collection
                    )));
                }
                docs.insert(id, document);
                Ok(Vec::new())
            }
            Statement::Upsert {
                collection,
                document,
            } => {
                let id = document_id(&document)?;
                collections
                    .entry(collection)
                    .or_default()
                    .insert(id, document);
                Ok(Vec::new())
            }
            Statement::Evict { collection, id } => {
                if let Some(docs) = collections.get_mut(&collection) {
                    docs.remove(&id);
                }
                Ok(Vec::new())
            }
            Statement::Select { collection, limit } => {
                let rows = collections
                    .get(&collection)
                    .map(|docs| {
                        docs.values()
                            .take(limit as usize)
                            .map(|doc| serde_json::to_vec(doc).map(QueryRow::new))
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .transpose()
                    .map_err(|e| EngineError::Rejected(e.to_string()))?;
                Ok(rows.unwrap_or_default())
            }
        }
    }
}

fn document_id(document: &Value) -> Result<String, EngineError> {
    document
        .get("_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| EngineError::Rejected("document has no string _id".to_string()))
}

#[async_trait]
impl SyncEngine for MemoryEngine {
    async fn execute(
        &self,
        statement: &str,
        args: &QueryArgs,
    ) -> Result<Vec<QueryRow>, EngineError> {
        let parsed = Statement::parse(statement, args)?;
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(statement.to_string());
        }
        self.apply(parsed)
    }

    async fn register_subscription(&self, query: &str) -> Result<(), EngineError> {
        Statement::parse(query, &QueryArgs::new())?;
        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|_| EngineError::Unavailable("engine state poisoned".to_string()))?;
        if !subscriptions.iter().any(|s| s == query) {
            subscriptions.push(query.to_string());
        }
        Ok(())
    }

    async fn start_sync(&self) -> Result<(), EngineError> {
        self.syncing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_sync(&self) -> Result<(), EngineError> {
        self.syncing.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }

    fn exec(engine: &MemoryEngine, statement: Statement) -> Result<Vec<QueryRow>, EngineError> {
        run(engine.execute(&statement.text(), &statement.args()))
    }

    #[test]
    fn test_insert_rejects_duplicate_but_upsert_replaces() {
        let engine = MemoryEngine::new();
        let insert = Statement::Insert {
            collection: "trips".into(),
            document: json!({"_id": "k1", "name": "A"}),
        };
        exec(&engine, insert.clone()).unwrap();
        assert!(matches!(exec(&engine, insert), Err(EngineError::Rejected(_))));

        exec(
            &engine,
            Statement::Upsert {
                collection: "trips".into(),
                document: json!({"_id": "k1", "name": "B"}),
            },
        )
        .unwrap();
        assert_eq!(engine.documents("trips"), vec![json!({"_id": "k1", "name": "B"})]);
    }

    #[test]
    fn test_select_honours_limit_and_evict_removes() {
        let engine = MemoryEngine::new();
        for key in ["a", "b", "c"] {
            engine.seed("trips", json!({"_id": key})).unwrap();
        }
        let select = Statement::Select {
            collection: "trips".into(),
            limit: 2,
        };
        assert_eq!(exec(&engine, select).unwrap().len(), 2);

        let evict = Statement::Evict {
            collection: "trips".into(),
            id: "a".into(),
        };
        exec(&engine, evict).unwrap();
        assert_eq!(engine.documents("trips").len(), 2);
        assert_eq!(engine.executed().len(), 2);
    }

    #[test]
    fn test_lifecycle_and_subscriptions() {
        let engine = MemoryEngine::new();
        run(engine.register_subscription("SELECT * FROM trips LIMIT 1000")).unwrap();
        run(engine.register_subscription("SELECT * FROM trips LIMIT 1000")).unwrap();
        assert_eq!(engine.subscriptions().len(), 1);
        assert!(run(engine.register_subscription("garbage")).is_err());

        run(engine.start_sync()).unwrap();
        assert!(engine.is_syncing());
        run(engine.stop_sync()).unwrap();
        assert!(!engine.is_syncing());
    }
}
