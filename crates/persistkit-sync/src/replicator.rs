//! Background replication worker
//!
//! Drains the outbox front to back on the store's runtime. Each remote call
//! runs under `query_timeout`; a failure or timeout leaves the operation at
//! the head of the queue until its backoff elapses, so operations on one
//! store reach the engine in the order they were saved. An operation that
//! exhausts its attempts is dead-lettered and the queue moves on.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use persistkit_core::core_types::schema::{EVENT_REPLICATED, EVENT_REPLICATION_FAILED};
use persistkit_core::errors::ExError;
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::{Statement, SyncEngine};
use crate::errors::{deadline_exceeded, Result};
use crate::outbox::{FailureOutcome, Outbox, OutboxEntry, ReplicationStatus, RetryPolicy};

/// Outbox state shared by the store and its worker
pub(crate) struct Shared {
    outbox: Mutex<Outbox>,
    wake: Notify,
    status: watch::Sender<ReplicationStatus>,
}

impl Shared {
    pub(crate) fn new(outbox: Outbox) -> Self {
        let (status, _) = watch::channel(outbox.status());
        Self {
            outbox: Mutex::new(outbox),
            wake: Notify::new(),
            status,
        }
    }

    pub(crate) fn lock(&self, op: &str) -> Result<MutexGuard<'_, Outbox>> {
        self.outbox
            .lock()
            .map_err(|_| persistkit_core::errors::poisoned(op))
    }

    /// Queue `statements` behind everything already pending and wake the worker
    ///
    /// A failed append is published in the status before the error returns.
    pub(crate) fn enqueue(&self, statements: Vec<Statement>) -> Result<usize> {
        let mut outbox = self.lock("enqueue")?;
        let queued = outbox.enqueue(statements);
        self.publish(&outbox);
        drop(outbox);
        let count = queued?.len();
        if count > 0 {
            self.wake.notify_one();
        }
        Ok(count)
    }

    pub(crate) fn requeue_failed(&self) -> Result<usize> {
        let mut outbox = self.lock("retry_failed")?;
        let requeued = outbox.requeue_failed();
        self.publish(&outbox);
        drop(outbox);
        let count = requeued?;
        self.wake.notify_one();
        Ok(count)
    }

    /// `(collection, document id)` of every statement not yet applied remotely
    pub(crate) fn unreplicated_documents(&self, op: &str) -> Result<HashSet<(String, String)>> {
        let outbox = self.lock(op)?;
        Ok(outbox
            .unreplicated()
            .filter_map(|statement| {
                statement
                    .document_id()
                    .map(|id| (statement.collection().to_string(), id.to_string()))
            })
            .collect())
    }

    pub(crate) fn status(&self) -> ReplicationStatus {
        self.status.borrow().clone()
    }

    pub(crate) fn monitor(&self) -> ReplicationMonitor {
        ReplicationMonitor {
            status: self.status.subscribe(),
        }
    }

    fn publish(&self, outbox: &Outbox) {
        self.status.send_replace(outbox.status());
    }
}

/// Read-only view of a store's replication backlog
#[derive(Debug, Clone)]
pub struct ReplicationMonitor {
    status: watch::Receiver<ReplicationStatus>,
}

impl ReplicationMonitor {
    pub fn status(&self) -> ReplicationStatus {
        self.status.borrow().clone()
    }

    /// Wait until nothing is pending
    ///
    /// # Errors
    ///
    /// `Timeout` if operations are still pending after `deadline`, `Internal`
    /// if the store was dropped first.
    pub async fn wait_idle(&self, deadline: Duration) -> Result<ReplicationStatus> {
        let mut status = self.status.clone();
        let idle = async move {
            loop {
                let current = status.borrow_and_update().clone();
                if current.is_idle() {
                    return Ok(current);
                }
                if status.changed().await.is_err() {
                    return Err(crate::errors::worker_failed("store closed"));
                }
            }
        };
        match tokio::time::timeout(deadline, idle).await {
            Ok(result) => result,
            Err(_) => Err(deadline_exceeded("wait_idle", deadline)),
        }
    }
}

pub(crate) struct Replicator {
    store_id: String,
    engine: Arc<dyn SyncEngine>,
    shared: Arc<Shared>,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl Replicator {
    pub(crate) fn new(
        store_id: impl Into<String>,
        engine: Arc<dyn SyncEngine>,
        shared: Arc<Shared>,
        policy: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store_id: store_id.into(),
            engine,
            shared,
            policy,
            call_timeout,
        }
    }

    /// Run on `runtime` until `shutdown` flips to true or its sender is dropped
    pub(crate) fn start(self, runtime: &Handle, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        runtime.spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!(store_id = %self.store_id, "Replicator started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let next = match self.shared.lock("replicate") {
                Ok(outbox) => outbox.front().cloned(),
                Err(err) => {
                    error!(
                        store_id = %self.store_id,
                        error = %err,
                        "Outbox unavailable, stopping replicator"
                    );
                    break;
                }
            };

            let Some(entry) = next else {
                tokio::select! {
                    _ = self.shared.wake.notified() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            };

            if let Some(wait) = remaining_backoff(&entry) {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }

            // An attempt abandoned by shutdown stays at the head of the outbox
            tokio::select! {
                _ = self.attempt(entry) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        debug!(store_id = %self.store_id, "Replicator stopped");
    }

    async fn attempt(&self, entry: OutboxEntry) {
        let statement = &entry.statement;
        let start = Instant::now();
        let outcome = match tokio::time::timeout(
            self.call_timeout,
            self.engine.execute(&statement.text(), &statement.args()),
        )
        .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => Err(ExError::from(err)
                .with_op("replicate")
                .with_collection(statement.collection())),
            Err(_) => Err(deadline_exceeded("replicate", self.call_timeout)
                .with_collection(statement.collection())),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let recorded = match &outcome {
            Ok(()) => self.record_success(&entry, duration_ms),
            Err(err) => self.record_failure(&entry, err, duration_ms),
        };
        if let Err(err) = recorded {
            error!(
                store_id = %self.store_id,
                operation_id = %entry.id,
                error = %err,
                "Failed to update outbox"
            );
            tokio::time::sleep(self.policy.base).await;
        }
    }

    fn record_success(&self, entry: &OutboxEntry, duration_ms: u64) -> Result<()> {
        let mut outbox = self.shared.lock("replicate")?;
        outbox.complete(&entry.id)?;
        self.shared.publish(&outbox);
        info!(
            component = module_path!(),
            op = "replicate",
            event = EVENT_REPLICATED,
            duration_ms = duration_ms,
            store_id = %self.store_id,
            operation_id = %entry.id,
            collection = entry.statement.collection(),
            statement = entry.statement.verb(),
            pending = outbox.status().pending,
        );
        Ok(())
    }

    fn record_failure(&self, entry: &OutboxEntry, err: &ExError, duration_ms: u64) -> Result<()> {
        let mut outbox = self.shared.lock("replicate")?;
        let outcome = outbox.record_failure(&entry.id, err.to_string(), &self.policy)?;
        self.shared.publish(&outbox);
        match outcome {
            Some(FailureOutcome::Retry { attempts, delay }) => {
                warn!(
                    component = module_path!(),
                    op = "replicate",
                    event = EVENT_REPLICATION_FAILED,
                    duration_ms = duration_ms,
                    store_id = %self.store_id,
                    operation_id = %entry.id,
                    collection = entry.statement.collection(),
                    err.kind = ?err.kind(),
                    err.code = err.code(),
                    attempts = attempts,
                    retry_in_ms = delay.as_millis() as u64,
                    "Replication failed, will retry: {}", err
                );
            }
            Some(FailureOutcome::DeadLettered { attempts }) => {
                warn!(
                    component = module_path!(),
                    op = "replicate",
                    event = EVENT_REPLICATION_FAILED,
                    duration_ms = duration_ms,
                    store_id = %self.store_id,
                    operation_id = %entry.id,
                    collection = entry.statement.collection(),
                    err.kind = ?err.kind(),
                    err.code = err.code(),
                    attempts = attempts,
                    "Replication abandoned after {} attempts: {}", attempts, err
                );
            }
            None => {}
        }
        Ok(())
    }
}

fn remaining_backoff(entry: &OutboxEntry) -> Option<Duration> {
    let due = entry.next_attempt_at?;
    (due - Utc::now()).to_std().ok().filter(|d| !d.is_zero())
}
