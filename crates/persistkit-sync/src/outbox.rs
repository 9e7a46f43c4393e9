//! Durable outbox of pending remote operations
//!
//! Every local save enqueues its remote statements here before returning.
//! The replicator drains the queue front to back; an operation that keeps
//! failing is retried with exponential backoff and moved to the dead-letter
//! list after `max_attempts`. The queue is rewritten atomically on every
//! change, so it survives restarts.
//!
//! Statements whose append could not be persisted are held in memory as
//! unqueued and prepended to the next successful append or requeue. They do
//! not survive a restart.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use persistkit_core_types::OperationId;
use persistkit_store::file::atomic::atomic_write;
use serde::{Deserialize, Serialize};

use crate::engine::Statement;
use crate::errors::Result;

/// One pending remote operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: OperationId,
    pub statement: Statement,
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    /// Not retried before this instant
    #[serde(default)]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct OutboxFile {
    pending: VecDeque<OutboxEntry>,
    #[serde(default)]
    failed: Vec<OutboxEntry>,
}

/// Backoff parameters for failed operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `attempts + 1`, doubling from `base` up to `max`
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        let delay = self.base.saturating_mul(2u32.saturating_pow(exponent));
        std::cmp::min(delay, self.max)
    }
}

/// What happened to an operation after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still pending; retried after the backoff
    Retry { attempts: u32, delay: Duration },
    /// Moved to the dead-letter list
    DeadLettered { attempts: u32 },
}

/// Snapshot of the replication backlog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationStatus {
    /// Operations still queued
    pub pending: usize,
    /// Operations dead-lettered after exhausting their attempts
    pub failed: usize,
    /// Statements saved locally whose outbox append failed
    pub unqueued: usize,
    /// Most recent remote or outbox failure, if any since the last success
    pub last_error: Option<String>,
}

impl ReplicationStatus {
    pub fn is_idle(&self) -> bool {
        self.pending == 0 && self.unqueued == 0
    }
}

#[derive(Debug)]
pub struct Outbox {
    path: PathBuf,
    state: OutboxFile,
    unqueued: Vec<Statement>,
    last_error: Option<String>,
}

impl Outbox {
    /// Path of the outbox kept beside table file `table_path`
    pub fn path_for(table_path: &Path) -> PathBuf {
        let file_name = table_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        table_path.with_file_name(format!("{}.outbox.json", file_name))
    }

    /// Open the outbox at `path`; a missing file is an empty outbox
    ///
    /// # Errors
    ///
    /// `Io` or `Decode`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| persistkit_core::errors::decode_error("open_outbox", e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => OutboxFile::default(),
            Err(e) => return Err(persistkit_core::errors::io_error("open_outbox", e)),
        };
        let last_error = state
            .pending
            .front()
            .and_then(|entry: &OutboxEntry| entry.last_error.clone());
        Ok(Self {
            path,
            state,
            unqueued: Vec::new(),
            last_error,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append any unqueued statements, then `statements`, in order and persist
    ///
    /// Returns the ids of every appended entry, previously unqueued ones first.
    ///
    /// # Errors
    ///
    /// `Io` or `Encode` when the outbox cannot be written. Nothing is lost:
    /// every statement of the batch is kept as unqueued and retried with the
    /// next append.
    pub fn enqueue(&mut self, statements: Vec<Statement>) -> Result<Vec<OperationId>> {
        let mut batch = std::mem::take(&mut self.unqueued);
        batch.extend(statements);
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let mut next = self.state.clone();
        let ids = push_pending(&mut next, &batch);
        match self.replace(next) {
            Ok(()) => Ok(ids),
            Err(err) => {
                self.unqueued = batch;
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// The operation to attempt next
    pub fn front(&self) -> Option<&OutboxEntry> {
        self.state.pending.front()
    }

    pub fn pending(&self) -> impl Iterator<Item = &OutboxEntry> {
        self.state.pending.iter()
    }

    pub fn failed(&self) -> &[OutboxEntry] {
        &self.state.failed
    }

    /// Statements kept in memory after a failed append
    pub fn unqueued(&self) -> &[Statement] {
        &self.unqueued
    }

    /// Every statement not yet applied remotely: pending, dead-lettered and
    /// unqueued
    pub fn unreplicated(&self) -> impl Iterator<Item = &Statement> {
        self.state
            .pending
            .iter()
            .chain(&self.state.failed)
            .map(|entry| &entry.statement)
            .chain(&self.unqueued)
    }

    /// Remove a successfully replicated operation
    pub fn complete(&mut self, id: &OperationId) -> Result<()> {
        let mut next = self.state.clone();
        next.pending.retain(|entry| &entry.id != id);
        self.replace(next)?;
        if self.unqueued.is_empty() {
            self.last_error = None;
        }
        Ok(())
    }

    /// Record a failed attempt of `id`
    pub fn record_failure(
        &mut self,
        id: &OperationId,
        error: impl Into<String>,
        policy: &RetryPolicy,
    ) -> Result<Option<FailureOutcome>> {
        let error = error.into();
        let mut next = self.state.clone();
        let Some(index) = next.pending.iter().position(|entry| &entry.id == id) else {
            return Ok(None);
        };

        let outcome = {
            let entry = &mut next.pending[index];
            entry.attempts = entry.attempts.saturating_add(1);
            entry.last_error = Some(error.clone());
            if entry.attempts >= policy.max_attempts {
                FailureOutcome::DeadLettered {
                    attempts: entry.attempts,
                }
            } else {
                let delay = policy.backoff(entry.attempts);
                let delay_chrono =
                    chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
                entry.next_attempt_at = Some(Utc::now() + delay_chrono);
                FailureOutcome::Retry {
                    attempts: entry.attempts,
                    delay,
                }
            }
        };
        if let FailureOutcome::DeadLettered { .. } = outcome {
            if let Some(entry) = next.pending.remove(index) {
                next.failed.push(entry);
            }
        }

        self.replace(next)?;
        self.last_error = Some(error);
        Ok(Some(outcome))
    }

    /// Move every dead-lettered operation back to the end of the queue with a
    /// fresh attempt budget, followed by any unqueued statements
    ///
    /// Returns how many operations were added to the queue.
    ///
    /// # Errors
    ///
    /// `Io` or `Encode`; the outbox is left unchanged.
    pub fn requeue_failed(&mut self) -> Result<usize> {
        let mut next = self.state.clone();
        let count = next.failed.len() + self.unqueued.len();
        for mut entry in next.failed.drain(..) {
            entry.attempts = 0;
            entry.next_attempt_at = None;
            next.pending.push_back(entry);
        }
        push_pending(&mut next, &self.unqueued);
        if let Err(err) = self.replace(next) {
            self.last_error = Some(err.to_string());
            return Err(err);
        }
        self.unqueued.clear();
        Ok(count)
    }

    pub fn status(&self) -> ReplicationStatus {
        ReplicationStatus {
            pending: self.state.pending.len(),
            failed: self.state.failed.len(),
            unqueued: self.unqueued.len(),
            last_error: self.last_error.clone(),
        }
    }

    // Persist first, then swap in memory, so a failed write changes nothing
    fn replace(&mut self, next: OutboxFile) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&next)
            .map_err(|e| persistkit_core::errors::encode_error("write_outbox", e))?;
        atomic_write(&self.path, &bytes)?;
        self.state = next;
        Ok(())
    }
}

fn push_pending(next: &mut OutboxFile, statements: &[Statement]) -> Vec<OperationId> {
    let now = Utc::now();
    statements
        .iter()
        .map(|statement| {
            let id = OperationId::new();
            next.pending.push_back(OutboxEntry {
                id: id.clone(),
                statement: statement.clone(),
                attempts: 0,
                last_error: None,
                enqueued_at: now,
                next_attempt_at: None,
            });
            id
        })
        .collect()
}
