//! SurrealDB implementation of [`AuditLogRepository`].
//!
//! The `audit_log` table is append-only: this module only ever issues
//! CREATE and SELECT statements against it.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::audit::{
    AuditContext, AuditEntry, AuditKind, AuditOutcome, CreateAuditEntry, DecisionSource,
};
use warden_core::repository::{AuditLogFilter, AuditLogRepository, PaginatedResult, Pagination};

use crate::error::{DbError, parse_uuid};

/// Statement appending `$audit` under `$audit_id`. Shared with the grant
/// repository, which runs it inside its transactions.
pub(crate) const AUDIT_INSERT: &str =
    "CREATE type::record('audit_log', $audit_id) CONTENT $audit;";

/// Column values of a new audit row, bound as a single `$audit` object.
#[derive(Debug, SurrealValue)]
pub(crate) struct AuditContent {
    kind: String,
    actor_id: String,
    resource_type: String,
    action_type: String,
    resource_id: Option<String>,
    outcome: String,
    source: Option<String>,
    reason: String,
    subject_id: Option<String>,
    ip_address: Option<String>,
    client_id: Option<String>,
}

impl From<CreateAuditEntry> for AuditContent {
    fn from(entry: CreateAuditEntry) -> Self {
        Self {
            kind: entry.kind.as_str().into(),
            actor_id: entry.actor_id.to_string(),
            resource_type: entry.capability.resource.as_str().into(),
            action_type: entry.capability.action.as_str().into(),
            resource_id: entry.resource_id,
            outcome: entry.outcome.as_str().into(),
            source: entry.source.map(|s| s.as_str().to_string()),
            reason: entry.reason,
            subject_id: entry.subject_id.map(|id| id.to_string()),
            ip_address: entry.context.ip_address,
            client_id: entry.context.client_id,
        }
    }
}

#[derive(Debug, SurrealValue)]
struct AuditRow {
    kind: String,
    actor_id: String,
    resource_type: String,
    action_type: String,
    resource_id: Option<String>,
    outcome: String,
    source: Option<String>,
    reason: String,
    subject_id: Option<String>,
    ip_address: Option<String>,
    client_id: Option<String>,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct AuditRowWithId {
    record_id: String,
    kind: String,
    actor_id: String,
    resource_type: String,
    action_type: String,
    resource_id: Option<String>,
    outcome: String,
    source: Option<String>,
    reason: String,
    subject_id: Option<String>,
    ip_address: Option<String>,
    client_id: Option<String>,
    timestamp: DateTime<Utc>,
}

impl AuditRow {
    fn into_entry(self, id: Uuid) -> Result<AuditEntry, DbError> {
        let kind = AuditKind::parse(&self.kind)
            .ok_or_else(|| DbError::Decode(format!("unknown audit kind: {}", self.kind)))?;
        let outcome = AuditOutcome::parse(&self.outcome)
            .ok_or_else(|| DbError::Decode(format!("unknown audit outcome: {}", self.outcome)))?;
        let source = match self.source {
            Some(s) => Some(
                DecisionSource::parse(&s)
                    .ok_or_else(|| DbError::Decode(format!("unknown decision source: {s}")))?,
            ),
            None => None,
        };
        let subject_id = match self.subject_id {
            Some(s) => Some(parse_uuid(&s, "subject")?),
            None => None,
        };

        Ok(AuditEntry {
            id,
            kind,
            actor_id: parse_uuid(&self.actor_id, "actor")?,
            resource_type: self
                .resource_type
                .parse()
                .map_err(|_| DbError::Decode(format!("unknown resource type: {}", self.resource_type)))?,
            action_type: self
                .action_type
                .parse()
                .map_err(|_| DbError::Decode(format!("unknown action type: {}", self.action_type)))?,
            resource_id: self.resource_id,
            outcome,
            source,
            reason: self.reason,
            subject_id,
            context: AuditContext {
                ip_address: self.ip_address,
                client_id: self.client_id,
            },
            timestamp: self.timestamp,
        })
    }
}

impl AuditRowWithId {
    fn try_into_entry(self) -> Result<AuditEntry, DbError> {
        let id = parse_uuid(&self.record_id, "audit entry")?;
        AuditRow {
            kind: self.kind,
            actor_id: self.actor_id,
            resource_type: self.resource_type,
            action_type: self.action_type,
            resource_id: self.resource_id,
            outcome: self.outcome,
            source: self.source,
            reason: self.reason,
            subject_id: self.subject_id,
            ip_address: self.ip_address,
            client_id: self.client_id,
            timestamp: self.timestamp,
        }
        .into_entry(id)
    }
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// SurrealDB implementation of the append-only audit log.
#[derive(Clone)]
pub struct SurrealAuditLogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditLogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AuditLogRepository for SurrealAuditLogRepository<C> {
    async fn append(&self, input: CreateAuditEntry) -> WardenResult<AuditEntry> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(AUDIT_INSERT)
            .bind(("audit_id", id_str.clone()))
            .bind(("audit", AuditContent::from(input)))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(DbError::from_check)?;

        let rows: Vec<AuditRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "audit_log".into(),
            id: id_str,
        })?;

        Ok(row.into_entry(id)?)
    }

    async fn list(
        &self,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<AuditEntry>> {
        let mut conditions = Vec::new();
        if filter.actor_id.is_some() {
            conditions.push("actor_id = $actor_id");
        }
        if filter.kind.is_some() {
            conditions.push("kind = $kind");
        }
        if filter.resource_type.is_some() {
            conditions.push("resource_type = $resource_type");
        }
        if filter.action_type.is_some() {
            conditions.push("action_type = $action_type");
        }
        if filter.outcome.is_some() {
            conditions.push("outcome = $outcome");
        }
        if filter.from.is_some() {
            conditions.push("timestamp >= $from");
        }
        if filter.to.is_some() {
            conditions.push("timestamp < $to");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT count() AS total FROM audit_log{where_clause} GROUP ALL; \
             SELECT meta::id(id) AS record_id, * FROM audit_log{where_clause} \
             ORDER BY timestamp DESC \
             LIMIT $limit START $offset;"
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));

        if let Some(actor_id) = filter.actor_id {
            builder = builder.bind(("actor_id", actor_id.to_string()));
        }
        if let Some(kind) = filter.kind {
            builder = builder.bind(("kind", kind.as_str()));
        }
        if let Some(resource_type) = filter.resource_type {
            builder = builder.bind(("resource_type", resource_type.as_str()));
        }
        if let Some(action_type) = filter.action_type {
            builder = builder.bind(("action_type", action_type.as_str()));
        }
        if let Some(outcome) = filter.outcome {
            builder = builder.bind(("outcome", outcome.as_str()));
        }
        if let Some(from) = filter.from {
            builder = builder.bind(("from", from));
        }
        if let Some(to) = filter.to {
            builder = builder.bind(("to", to));
        }

        let mut result = builder.await.map_err(DbError::from)?;

        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let rows: Vec<AuditRowWithId> = result.take(1).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(|row| row.try_into_entry())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
