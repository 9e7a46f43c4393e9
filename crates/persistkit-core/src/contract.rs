//! Store contract
//!
//! Every backend implements [`DataStore`]. Callers never hold a backend
//! directly; they go through a [`StoreHandle`], which serializes access so at
//! most one save or fetch is in flight per backend.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::errors::{poisoned, Result, StoreError, UnsupportedQueryKind};
use crate::model::{FetchRequest, FetchResult, SaveRequest, SaveResult};
use crate::query::apply_in_memory;
use crate::{log_op_end, log_op_error, log_op_start};

/// A persistence backend
pub trait DataStore: Send {
    /// Stable identifier of this store; stamped on every permanent identifier
    /// it mints
    fn identifier(&self) -> &str;

    /// Apply one batch of mutations durably
    ///
    /// # Errors
    ///
    /// Local failures only. Remote replication problems never surface here.
    fn save(&mut self, request: SaveRequest) -> Result<SaveResult>;

    /// Return the snapshots of the requested entity type, unordered
    ///
    /// # Errors
    ///
    /// `PredicateNotSupported` / `SortNotSupported` when the request carries
    /// a predicate or sort descriptors; the caller evaluates those itself.
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResult>;
}

/// Reject the query features no backend evaluates
///
/// The predicate is checked first.
///
/// # Errors
///
/// `UnsupportedQuery` naming the offending feature.
pub fn reject_unsupported_query(request: &FetchRequest) -> std::result::Result<(), StoreError> {
    if request.predicate.is_some() {
        return Err(StoreError::UnsupportedQuery {
            query: UnsupportedQueryKind::Predicate,
        });
    }
    if !request.sort_descriptors.is_empty() {
        return Err(StoreError::UnsupportedQuery {
            query: UnsupportedQueryKind::Sort,
        });
    }
    Ok(())
}

/// Shared, serialized access to one backend
#[derive(Clone)]
pub struct StoreHandle {
    identifier: Arc<str>,
    inner: Arc<Mutex<Box<dyn DataStore>>>,
}

impl StoreHandle {
    pub fn new<S: DataStore + 'static>(store: S) -> Self {
        Self::from_boxed(Box::new(store))
    }

    pub fn from_boxed(store: Box<dyn DataStore>) -> Self {
        Self {
            identifier: Arc::from(store.identifier()),
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn save(&self, request: SaveRequest) -> Result<SaveResult> {
        let mut store = self.inner.lock().map_err(|_| poisoned("save"))?;
        store.save(request)
    }

    pub fn fetch(&self, request: &FetchRequest) -> Result<FetchResult> {
        let store = self.inner.lock().map_err(|_| poisoned("fetch"))?;
        store.fetch(request)
    }

    /// Fetch, evaluating a rejected predicate or sort in memory
    ///
    /// The backend is asked first; when it answers with an unsupported-query
    /// error the request is reissued without predicate and sort, and both are
    /// applied to the result here.
    pub fn fetch_resolved(&self, request: &FetchRequest) -> Result<FetchResult> {
        match self.fetch(request) {
            Err(err) if err.kind().is_unsupported_query() => {
                let start = Instant::now();
                log_op_start!("fetch_resolved", store_id = %self.identifier, fallback = err.code());
                let mut result = match self.fetch(&request.unfiltered()) {
                    Ok(result) => result,
                    Err(err) => {
                        let duration_ms = start.elapsed().as_millis() as u64;
                        log_op_error!("fetch_resolved", err, duration_ms = duration_ms);
                        return Err(err);
                    }
                };
                result.fetched_snapshots = apply_in_memory(
                    std::mem::take(&mut result.fetched_snapshots),
                    request.predicate.as_ref(),
                    &request.sort_descriptors,
                );
                let duration_ms = start.elapsed().as_millis() as u64;
                log_op_end!(
                    "fetch_resolved",
                    duration_ms = duration_ms,
                    fetched = result.fetched_snapshots.len()
                );
                Ok(result)
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("identifier", &self.identifier)
            .finish()
    }
}
