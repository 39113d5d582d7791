//! SurrealDB repository implementations.

mod audit;
mod grant;
mod permission;
mod role;
mod user;

pub use audit::SurrealAuditLogRepository;
pub use grant::SurrealGrantRepository;
pub use permission::SurrealPermissionRepository;
pub use role::SurrealRoleRepository;
pub use user::SurrealUserRepository;
