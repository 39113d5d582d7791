//! Authorization error types.

use thiserror::Error;
use warden_core::error::WardenError;

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("forbidden: {reason}")]
    PolicyDenied { reason: String },

    /// The decision failed closed because storage could not be reached.
    #[error("forbidden: {reason}")]
    InfrastructureError { reason: String },

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("audit write failed: {0}")]
    AuditWriteFailure(String),

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("cryptography error: {0}")]
    Crypto(String),

    #[error(transparent)]
    Core(WardenError),
}

impl AuthzError {
    /// HTTP status an adapter should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthzError::Unauthenticated | AuthzError::TokenExpired | AuthzError::TokenInvalid(_) => {
                401
            }
            AuthzError::PolicyDenied { .. } | AuthzError::InfrastructureError { .. } => 403,
            AuthzError::ConstraintViolation(_) => 409,
            AuthzError::Core(err) => match err {
                WardenError::NotFound { .. } => 404,
                WardenError::AlreadyExists { .. } | WardenError::ConstraintViolation(_) => 409,
                WardenError::SystemProtected { .. } => 409,
                WardenError::Validation { .. } => 400,
                WardenError::Database(_) | WardenError::Internal(_) => 500,
            },
            AuthzError::AuditWriteFailure(_) | AuthzError::Crypto(_) => 500,
        }
    }

    /// Whether this is a denial the caller may see the reason of.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            AuthzError::PolicyDenied { .. } | AuthzError::InfrastructureError { .. }
        )
    }
}

impl From<WardenError> for AuthzError {
    fn from(err: WardenError) -> Self {
        match err {
            WardenError::ConstraintViolation(msg) => AuthzError::ConstraintViolation(msg),
            other => AuthzError::Core(other),
        }
    }
}
