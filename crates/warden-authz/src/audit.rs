//! Audit sinks.
//!
//! Every decision and every administrative change ends in exactly one
//! audit entry. A sink failure is reported to the caller, who logs and
//! counts it; it never changes a verdict.
//!
//! Two sinks are provided:
//! - [`RepositoryAuditSink`] appends synchronously, bounded by a timeout.
//! - [`QueuedAuditSink`] hands entries to an [`AuditWorker`] over a
//!   bounded queue; the worker appends with retry and exponential
//!   backoff and drains the queue on shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use warden_core::models::audit::CreateAuditEntry;
use warden_core::repository::AuditLogRepository;

use crate::config::AuthzConfig;
use crate::error::AuthzError;

pub trait AuditSink: Send + Sync {
    fn record(
        &self,
        entry: CreateAuditEntry,
    ) -> impl Future<Output = Result<(), AuthzError>> + Send;
}

impl<T: AuditSink> AuditSink for Arc<T> {
    fn record(
        &self,
        entry: CreateAuditEntry,
    ) -> impl Future<Output = Result<(), AuthzError>> + Send {
        (**self).record(entry)
    }
}

// ---------------------------------------------------------------------------
// Synchronous sink
// ---------------------------------------------------------------------------

pub struct RepositoryAuditSink<L: AuditLogRepository> {
    repo: L,
    write_timeout: Duration,
}

impl<L: AuditLogRepository> RepositoryAuditSink<L> {
    pub fn new(repo: L, config: &AuthzConfig) -> Self {
        Self {
            repo,
            write_timeout: config.audit_write_timeout(),
        }
    }
}

impl<L: AuditLogRepository> AuditSink for RepositoryAuditSink<L> {
    async fn record(&self, entry: CreateAuditEntry) -> Result<(), AuthzError> {
        append_once(&self.repo, entry, self.write_timeout).await
    }
}

async fn append_once<L: AuditLogRepository>(
    repo: &L,
    entry: CreateAuditEntry,
    write_timeout: Duration,
) -> Result<(), AuthzError> {
    match tokio::time::timeout(write_timeout, repo.append(entry)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(AuthzError::AuditWriteFailure(e.to_string())),
        Err(_) => Err(AuthzError::AuditWriteFailure(format!(
            "append timed out after {} ms",
            write_timeout.as_millis()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Queued sink
// ---------------------------------------------------------------------------

#[derive(Default)]
struct AuditCounters {
    enqueued: AtomicU64,
    written: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time view of the audit queue for monitoring.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuditQueueStats {
    /// Accepted into the queue.
    pub enqueued: u64,
    /// Appended to the audit log.
    pub written: u64,
    /// Write attempts that failed and were retried.
    pub retried: u64,
    /// Entries dropped after exhausting retries.
    pub failed: u64,
    /// Entries refused because the queue stayed full or was closed.
    pub rejected: u64,
}

impl AuditCounters {
    fn snapshot(&self) -> AuditQueueStats {
        AuditQueueStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone)]
pub struct QueuedAuditSink {
    tx: mpsc::Sender<CreateAuditEntry>,
    counters: Arc<AuditCounters>,
    enqueue_timeout: Duration,
}

impl QueuedAuditSink {
    pub fn stats(&self) -> AuditQueueStats {
        self.counters.snapshot()
    }
}

impl AuditSink for QueuedAuditSink {
    async fn record(&self, entry: CreateAuditEntry) -> Result<(), AuthzError> {
        match self.tx.send_timeout(entry, self.enqueue_timeout).await {
            Ok(()) => {
                self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(AuthzError::AuditWriteFailure("audit queue is full".into()))
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(AuthzError::AuditWriteFailure("audit queue is closed".into()))
            }
        }
    }
}

#[derive(Debug, Clone)]
struct RetryPolicy {
    write_timeout: Duration,
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl RetryPolicy {
    /// Delay after `current`, grown by the multiplier and capped at
    /// `max_delay`. Never panics on overflow or a non-finite multiplier.
    fn next_delay(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .map_or(self.max_delay, |next| next.min(self.max_delay))
    }
}

/// Background task draining a [`QueuedAuditSink`].
pub struct AuditWorker {
    join: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
    counters: Arc<AuditCounters>,
}

impl AuditWorker {
    /// Spawn the worker on the current runtime and return the sink that
    /// feeds it.
    pub fn spawn<L>(repo: L, config: &AuthzConfig) -> (QueuedAuditSink, AuditWorker)
    where
        L: AuditLogRepository + 'static,
    {
        let (tx, rx) = mpsc::channel(config.audit_queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let counters = Arc::new(AuditCounters::default());
        let policy = RetryPolicy {
            write_timeout: config.audit_write_timeout(),
            max_retries: config.audit_max_retries,
            initial_delay: config.audit_retry_initial_delay(),
            max_delay: config.audit_retry_max_delay(),
            multiplier: config.audit_backoff_multiplier.max(1.0),
        };

        let join = tokio::spawn(run(repo, rx, shutdown_rx, Arc::clone(&counters), policy));

        let sink = QueuedAuditSink {
            tx,
            counters: Arc::clone(&counters),
            enqueue_timeout: config.audit_enqueue_timeout(),
        };
        let worker = AuditWorker {
            join,
            shutdown: shutdown_tx,
            counters,
        };
        (sink, worker)
    }

    pub fn stats(&self) -> AuditQueueStats {
        self.counters.snapshot()
    }

    /// Stop accepting entries, write everything already queued, then
    /// return the final counters.
    pub async fn shutdown(self) -> AuditQueueStats {
        let _ = self.shutdown.send(());
        if let Err(e) = self.join.await {
            error!(error = %e, "Audit worker terminated abnormally");
        }
        let stats = self.counters.snapshot();
        info!(
            written = stats.written,
            failed = stats.failed,
            rejected = stats.rejected,
            "Audit worker stopped"
        );
        stats
    }
}

async fn run<L: AuditLogRepository>(
    repo: L,
    mut rx: mpsc::Receiver<CreateAuditEntry>,
    mut shutdown: oneshot::Receiver<()>,
    counters: Arc<AuditCounters>,
    policy: RetryPolicy,
) {
    loop {
        tokio::select! {
            maybe_entry = rx.recv() => match maybe_entry {
                Some(entry) => write_with_retry(&repo, entry, &counters, &policy).await,
                // Every sink was dropped.
                None => return,
            },
            _ = &mut shutdown => break,
        }
    }

    rx.close();
    while let Some(entry) = rx.recv().await {
        write_with_retry(&repo, entry, &counters, &policy).await;
    }
}

async fn write_with_retry<L: AuditLogRepository>(
    repo: &L,
    entry: CreateAuditEntry,
    counters: &AuditCounters,
    policy: &RetryPolicy,
) {
    let mut delay = policy.initial_delay.min(policy.max_delay);
    let mut attempt = 0;
    loop {
        match append_once(repo, entry.clone(), policy.write_timeout).await {
            Ok(()) => {
                counters.written.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(e) if attempt >= policy.max_retries => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    error = %e,
                    kind = entry.kind.as_str(),
                    actor_id = %entry.actor_id,
                    capability = %entry.capability,
                    attempts = attempt + 1,
                    "Audit entry dropped after exhausting retries"
                );
                return;
            }
            Err(e) => {
                counters.retried.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %e,
                    attempt = attempt + 1,
                    retry_in_ms = delay.as_millis() as u64,
                    "Audit write failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = policy.next_delay(delay);
                attempt += 1;
            }
        }
    }
}
