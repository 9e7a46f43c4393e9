//! Single-file JSON store
//!
//! Every save is a whole-table read-modify-write of one JSON file; every
//! fetch reads the file again. There is no cross-process locking: two store
//! instances (or two processes) writing the same file will lose each other's
//! updates when their read-modify-write cycles overlap. Keep one writer per
//! file.

use std::path::{Path, PathBuf};
use std::time::Instant;

use persistkit_core::contract::{reject_unsupported_query, DataStore};
use persistkit_core::errors::{ExError, ExErrorKind};
use persistkit_core::identity::IdentifierAuthority;
use persistkit_core::model::{FetchRequest, FetchResult, SaveRequest, SaveResult, Schema};
use persistkit_core::{log_op_end, log_op_error, log_op_start};

use crate::bookkeeping::apply_save;
use crate::errors::Result;
use crate::file::table::Table;

#[derive(Debug)]
pub struct JsonFileStore {
    name: String,
    path: PathBuf,
    schema: Option<Schema>,
    authority: IdentifierAuthority,
}

impl JsonFileStore {
    /// Open the store backed by `path`
    ///
    /// The store identifier is the file name. Nothing is read until the first
    /// save or fetch.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when `path` has no file name.
    pub fn open(name: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let identifier = store_identifier_for(&path)?;
        Ok(Self {
            name: name.into(),
            path,
            schema: None,
            authority: IdentifierAuthority::new(identifier),
        })
    }

    /// Validate every saved snapshot against `schema`
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current table from disk
    pub fn load(&self) -> Result<Table> {
        Table::read(&self.path)
    }

    fn save_inner(&mut self, request: &SaveRequest) -> Result<SaveResult> {
        let mut table = self.load()?;
        let applied = apply_save(&mut table, &self.authority, request, self.schema.as_ref())?;
        table.write(&self.path)?;
        self.authority.commit(&applied.remapped);
        Ok(applied.into_result(self.authority.store_identifier()))
    }

    fn fetch_inner(&self, request: &FetchRequest) -> Result<FetchResult> {
        reject_unsupported_query(request)?;
        let table = self.load()?;
        Ok(FetchResult {
            fetched_snapshots: table
                .snapshots()
                .filter(|s| request.selects(s))
                .cloned()
                .collect(),
            related_snapshots: table
                .iter()
                .map(|(id, s)| (id.clone(), s.clone()))
                .collect(),
        })
    }
}

impl DataStore for JsonFileStore {
    fn identifier(&self) -> &str {
        self.authority.store_identifier()
    }

    fn save(&mut self, request: SaveRequest) -> Result<SaveResult> {
        let start = Instant::now();
        log_op_start!(
            "save",
            store_id = self.identifier(),
            inserted = request.inserted.len(),
            updated = request.updated.len(),
            deleted = request.deleted.len()
        );

        let result = self.save_inner(&request);
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => {
                log_op_end!("save", duration_ms = duration_ms, store_id = self.identifier());
            }
            Err(err) => {
                log_op_error!("save", err, duration_ms = duration_ms, store_id = self.identifier());
            }
        }
        result.map_err(|e| e.with_store_id(self.identifier()))
    }

    fn fetch(&self, request: &FetchRequest) -> Result<FetchResult> {
        let start = Instant::now();
        log_op_start!(
            "fetch",
            store_id = self.identifier(),
            entity_name = request.entity_name.as_deref().unwrap_or("*")
        );

        let result = self.fetch_inner(request);
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(r) => {
                log_op_end!(
                    "fetch",
                    duration_ms = duration_ms,
                    store_id = self.identifier(),
                    fetched = r.fetched_snapshots.len()
                );
            }
            Err(err) => {
                log_op_error!(
                    "fetch",
                    err,
                    duration_ms = duration_ms,
                    store_id = self.identifier()
                );
            }
        }
        result.map_err(|e| e.with_store_id(self.identifier()))
    }
}

/// Store identifier for a table at `path`: its file name
///
/// # Errors
///
/// `InvalidInput` when `path` has no file name.
pub fn store_identifier_for(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            ExError::new(ExErrorKind::InvalidInput)
                .with_op("open")
                .with_message(format!("Store path {} has no file name", path.display()))
        })
}
