//! Database-specific error types and conversions.

use warden_core::error::WardenError;

/// Prefix of messages raised with `THROW` by guarded statements. Lets
/// [`DbError::from_check`] tell a refused write from a failed one.
pub(crate) const REFUSED: &str = "refused:";

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    /// A statement failed when checked (rejected write, failed
    /// transaction).
    #[error("Statement failed: {0}")]
    Statement(String),

    /// A UNIQUE index or record key rejected the write.
    #[error("Uniqueness conflict: {0}")]
    Conflict(String),

    /// A guarded statement refused the write, e.g. deleting a role that
    /// is still held.
    #[error("Write refused: {0}")]
    Refused(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Stored value could not be decoded: {0}")]
    Decode(String),
}

impl DbError {
    /// Classify an error reported by `Response::check`.
    ///
    /// SurrealDB reports duplicate record keys as "already exists",
    /// UNIQUE index violations as "already contains" and losing a race
    /// against a concurrent transaction as a "read or write conflict".
    pub(crate) fn from_check(err: impl std::fmt::Display) -> Self {
        let msg = err.to_string();
        if let Some(at) = msg.find(REFUSED) {
            return DbError::Refused(msg[at + REFUSED.len()..].trim().to_string());
        }
        if msg.contains("already exists")
            || msg.contains("already contains")
            || msg.contains("read or write conflict")
        {
            DbError::Conflict(msg)
        } else {
            DbError::Statement(msg)
        }
    }
}

impl From<DbError> for WardenError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => WardenError::NotFound { entity, id },
            DbError::Conflict(msg) | DbError::Refused(msg) => WardenError::ConstraintViolation(msg),
            other => WardenError::Database(other.to_string()),
        }
    }
}

pub(crate) fn parse_uuid(value: &str, what: &str) -> Result<uuid::Uuid, DbError> {
    uuid::Uuid::parse_str(value).map_err(|e| DbError::Decode(format!("invalid {what} UUID: {e}")))
}
