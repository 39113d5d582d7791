//! Tests for the audit sinks: the queued sink with its worker, and the
//! synchronous repository sink.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::Utc;
use common::Harness;
use uuid::Uuid;
use warden_authz::audit::{AuditSink, AuditWorker, RepositoryAuditSink};
use warden_authz::config::AuthzConfig;
use warden_authz::decision::PermissionChecker;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::audit::{
    AuditContext, AuditEntry, AuditKind, AuditOutcome, CreateAuditEntry, DecisionSource,
};
use warden_core::models::permission::{ActionType, Capability, ResourceType};
use warden_core::repository::{AuditLogFilter, AuditLogRepository, PaginatedResult, Pagination};
use warden_db::repository::SurrealAuditLogRepository;

fn entry(actor_id: Uuid) -> CreateAuditEntry {
    CreateAuditEntry {
        kind: AuditKind::Decision,
        actor_id,
        capability: Capability::new(ResourceType::Search, ActionType::Read),
        resource_id: None,
        outcome: AuditOutcome::Allow,
        source: Some(DecisionSource::Role),
        reason: "granted by role".into(),
        subject_id: None,
        context: AuditContext::default(),
    }
}

/// Audit log that fails a fixed number of appends, optionally stalls,
/// and counts what it stored.
#[derive(Clone, Default)]
struct FlakyLog {
    failures_left: Arc<AtomicU32>,
    stored: Arc<AtomicU32>,
    stall: Duration,
}

impl FlakyLog {
    fn failing(times: u32) -> Self {
        let log = Self::default();
        log.failures_left.store(times, Ordering::SeqCst);
        log
    }

    fn slow(stall: Duration) -> Self {
        Self {
            stall,
            ..Self::default()
        }
    }

    fn stored(&self) -> u32 {
        self.stored.load(Ordering::SeqCst)
    }
}

impl AuditLogRepository for FlakyLog {
    async fn append(&self, input: CreateAuditEntry) -> WardenResult<AuditEntry> {
        if !self.stall.is_zero() {
            tokio::time::sleep(self.stall).await;
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(WardenError::Database("write rejected".into()));
        }
        self.stored.fetch_add(1, Ordering::SeqCst);
        Ok(AuditEntry {
            id: Uuid::new_v4(),
            kind: input.kind,
            actor_id: input.actor_id,
            resource_type: input.capability.resource,
            action_type: input.capability.action,
            resource_id: input.resource_id,
            outcome: input.outcome,
            source: input.source,
            reason: input.reason,
            subject_id: input.subject_id,
            context: input.context,
            timestamp: Utc::now(),
        })
    }

    async fn list(
        &self,
        _filter: AuditLogFilter,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<AuditEntry>> {
        Ok(PaginatedResult {
            items: Vec::new(),
            total: 0,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}

fn fast_retry_config() -> AuthzConfig {
    AuthzConfig {
        audit_retry_initial_delay_ms: 1,
        audit_backoff_multiplier: 2.0,
        audit_max_retries: 3,
        ..Default::default()
    }
}

#[tokio::test]
async fn queued_entries_are_written_and_drained_on_shutdown() {
    let h = Harness::new().await;
    let (sink, worker) = AuditWorker::spawn(
        SurrealAuditLogRepository::new(h.db.clone()),
        &h.config,
    );

    let editor = h.role("editor").await;
    let alice = h.user("alice", &editor).await;
    let engine = h.engine_with(sink.clone());
    for _ in 0..5 {
        engine
            .check_permission(
                alice.id,
                Capability::new(ResourceType::Product, ActionType::Read),
                None,
                AuditContext::default(),
            )
            .await;
    }

    let stats = worker.shutdown().await;
    assert_eq!(stats.enqueued, 5);
    assert_eq!(stats.written, 5);
    assert_eq!(stats.failed, 0);
    assert_eq!(h.audit(AuditKind::Decision).await.len(), 5);

    // The queue no longer accepts entries.
    assert!(sink.record(entry(alice.id)).await.is_err());
    assert_eq!(sink.stats().rejected, 1);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let log = FlakyLog::failing(2);
    let (sink, worker) = AuditWorker::spawn(log.clone(), &fast_retry_config());

    sink.record(entry(Uuid::new_v4())).await.unwrap();
    let stats = worker.shutdown().await;

    assert_eq!(stats.written, 1);
    assert_eq!(stats.retried, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(log.stored(), 1);
}

#[tokio::test]
async fn entry_is_dropped_after_exhausting_retries() {
    let log = FlakyLog::failing(100);
    let (sink, worker) = AuditWorker::spawn(log.clone(), &fast_retry_config());

    sink.record(entry(Uuid::new_v4())).await.unwrap();
    let stats = worker.shutdown().await;

    assert_eq!(stats.written, 0);
    assert_eq!(stats.retried, 3);
    assert_eq!(stats.failed, 1);
    assert_eq!(log.stored(), 0);
}

#[tokio::test]
async fn full_queue_rejects_instead_of_blocking() {
    let log = FlakyLog::slow(Duration::from_millis(300));
    let config = AuthzConfig {
        audit_queue_capacity: 1,
        audit_enqueue_timeout_ms: 10,
        ..Default::default()
    };
    let (sink, worker) = AuditWorker::spawn(log.clone(), &config);
    let actor = Uuid::new_v4();

    // First entry goes to the (stalled) worker, second fills the queue.
    sink.record(entry(actor)).await.unwrap();
    sink.record(entry(actor)).await.unwrap();
    let err = sink.record(entry(actor)).await.unwrap_err();
    assert_eq!(err.status_code(), 500);

    let stats = worker.shutdown().await;
    assert_eq!(stats.enqueued, 2);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.written, 2);
    assert_eq!(log.stored(), 2);
}

#[tokio::test]
async fn repository_sink_times_out() {
    let log = FlakyLog::slow(Duration::from_millis(200));
    let config = AuthzConfig {
        audit_write_timeout_ms: 20,
        ..Default::default()
    };
    let sink = RepositoryAuditSink::new(log, &config);

    let err = sink.record(entry(Uuid::new_v4())).await.unwrap_err();
    assert!(err.to_string().contains("timed out"));
}
