//! Warden Authz — permission catalog, grant store, decision engine,
//! audit sink and the per-request enforcement adapter.

pub mod admin;
pub mod audit;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod decision;
pub mod enforce;
pub mod error;
pub mod store;
pub mod token;

pub use admin::AdminService;
pub use audit::{AuditQueueStats, AuditSink, AuditWorker, QueuedAuditSink, RepositoryAuditSink};
pub use catalog::PermissionCatalog;
pub use config::AuthzConfig;
pub use decision::{Decision, DecisionEngine, PermissionChecker};
pub use enforce::{Authorized, Enforcer, RequestContext};
pub use error::AuthzError;
pub use store::GrantStore;
pub use token::{AccessTokenClaims, TokenVerifier};
