//! On-disk table format
//!
//! A table file is a JSON array of snapshot records, pretty-printed with
//! sorted keys. Records are written in identifier order so that the same
//! table always produces the same bytes.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

use persistkit_core::errors::encode_error;
use persistkit_core::model::{PersistentIdentifier, Snapshot};

use crate::errors::{io_error, table_corrupt, Result};
use crate::file::atomic::atomic_write;

/// Identifier → snapshot map loaded from one table file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    rows: BTreeMap<PersistentIdentifier, Snapshot>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the table at `path`; a missing file is an empty table
    ///
    /// # Errors
    ///
    /// `Io` when the file cannot be read, `Decode` when it is not a valid
    /// table (malformed JSON, ill-formed or temporary identifiers, duplicate
    /// records).
    pub fn read(path: &Path) -> Result<Self> {
        match std::fs::read(path) {
            Ok(bytes) => Self::decode(path, &bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(io_error("read_table", e)),
        }
    }

    /// Replace the file at `path` with this table, atomically
    ///
    /// # Errors
    ///
    /// `Encode` or `Io`.
    pub fn write(&self, path: &Path) -> Result<()> {
        atomic_write(path, &self.encode()?)
    }

    pub fn decode(path: &Path, bytes: &[u8]) -> Result<Self> {
        let records: Vec<Snapshot> =
            serde_json::from_slice(bytes).map_err(|e| table_corrupt(path, e))?;

        let mut rows = BTreeMap::new();
        for record in records {
            let id = record.persistent_identifier().clone();
            if !id.is_well_formed() || id.is_temporary() {
                return Err(table_corrupt(path, format!("invalid identifier {}", id)));
            }
            if record.entity_name() != id.entity_name() {
                return Err(table_corrupt(
                    path,
                    format!("record {} claims entity {}", id, record.entity_name()),
                ));
            }
            if rows.insert(id.clone(), record).is_some() {
                return Err(table_corrupt(path, format!("duplicate record {}", id)));
            }
        }
        Ok(Self { rows })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        // Value's object map is ordered, which sorts struct keys too
        let value = serde_json::to_value(self.rows.values().collect::<Vec<_>>())
            .map_err(|e| encode_error("write_table", e))?;
        let mut bytes =
            serde_json::to_vec_pretty(&value).map_err(|e| encode_error("write_table", e))?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, id: &PersistentIdentifier) -> bool {
        self.rows.contains_key(id)
    }

    pub fn get(&self, id: &PersistentIdentifier) -> Option<&Snapshot> {
        self.rows.get(id)
    }

    /// Insert or overwrite the record under its own identifier
    pub fn put(&mut self, snapshot: Snapshot) -> Option<Snapshot> {
        self.rows
            .insert(snapshot.persistent_identifier().clone(), snapshot)
    }

    pub fn remove(&mut self, id: &PersistentIdentifier) -> Option<Snapshot> {
        self.rows.remove(id)
    }

    pub fn snapshots(&self) -> btree_map::Values<'_, PersistentIdentifier, Snapshot> {
        self.rows.values()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, PersistentIdentifier, Snapshot> {
        self.rows.iter()
    }
}
