//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Grant mutations take the audit
//! entry describing them so that implementations can commit the row
//! change and its audit record in a single transaction.

use uuid::Uuid;

use crate::error::WardenResult;
use crate::models::{
    audit::{AuditEntry, AuditKind, AuditOutcome, CreateAuditEntry},
    grant::{GrantRolePermission, RoleGrant, SetUserOverride, UserOverride},
    permission::{ActionType, Capability, CreatePermission, Permission, ResourceType, UpdatePermission},
    role::{CreateRole, Role, UpdateRole},
    user::{CreateUser, User},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

pub trait PermissionRepository: Send + Sync {
    /// Fails with `AlreadyExists` if the capability is already defined.
    fn create(
        &self,
        input: CreatePermission,
    ) -> impl Future<Output = WardenResult<Permission>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<Permission>> + Send;
    fn get_by_capability(
        &self,
        capability: Capability,
    ) -> impl Future<Output = WardenResult<Permission>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdatePermission,
    ) -> impl Future<Output = WardenResult<Permission>> + Send;
    /// Hard delete. Refused with `SystemProtected` for system permissions
    /// and with `ConstraintViolation` while any role grant or user
    /// override still references the permission.
    fn delete(&self, id: Uuid) -> impl Future<Output = WardenResult<()>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<Permission>>> + Send;
}

pub trait RoleRepository: Send + Sync {
    fn create(&self, input: CreateRole) -> impl Future<Output = WardenResult<Role>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<Role>> + Send;
    fn get_by_name(&self, name: &str) -> impl Future<Output = WardenResult<Role>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateRole,
    ) -> impl Future<Output = WardenResult<Role>> + Send;
    /// Hard delete. Refused with `SystemProtected` for system roles and
    /// with `ConstraintViolation` while the role is held or holds grants.
    fn delete(&self, id: Uuid) -> impl Future<Output = WardenResult<()>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<Role>>> + Send;
}

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

pub trait UserRepository: Send + Sync {
    fn create(&self, input: CreateUser) -> impl Future<Output = WardenResult<User>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<User>> + Send;
    /// Replace the user's single role.
    fn assign_role(
        &self,
        id: Uuid,
        role_id: Uuid,
    ) -> impl Future<Output = WardenResult<User>> + Send;
    fn set_active(
        &self,
        id: Uuid,
        is_active: bool,
    ) -> impl Future<Output = WardenResult<User>> + Send;
}

// ---------------------------------------------------------------------------
// Grants
// ---------------------------------------------------------------------------

pub trait GrantRepository: Send + Sync {
    /// Grant a permission to a role and append `audit`, atomically.
    ///
    /// Returns `false` without writing anything if the grant already
    /// exists.
    fn grant_to_role(
        &self,
        input: GrantRolePermission,
        audit: CreateAuditEntry,
    ) -> impl Future<Output = WardenResult<bool>> + Send;

    /// Revoke a role grant and append `audit`, atomically. Returns `false`
    /// if there was nothing to revoke.
    fn revoke_from_role(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
        audit: CreateAuditEntry,
    ) -> impl Future<Output = WardenResult<bool>> + Send;

    /// All permissions granted to a role, active or not.
    fn get_role_permissions(
        &self,
        role_id: Uuid,
    ) -> impl Future<Output = WardenResult<Vec<Permission>>> + Send;

    fn list_role_grants(
        &self,
        role_id: Uuid,
    ) -> impl Future<Output = WardenResult<Vec<RoleGrant>>> + Send;

    /// Create or replace the override for (user, permission) and append
    /// `audit`, atomically.
    fn set_user_override(
        &self,
        input: SetUserOverride,
        audit: CreateAuditEntry,
    ) -> impl Future<Output = WardenResult<UserOverride>> + Send;

    /// Remove an override and append `audit`, atomically. Returns `false`
    /// if there was nothing to remove.
    fn clear_user_override(
        &self,
        user_id: Uuid,
        permission_id: Uuid,
        audit: CreateAuditEntry,
    ) -> impl Future<Output = WardenResult<bool>> + Send;

    /// The stored override, expired or not.
    fn get_user_override(
        &self,
        user_id: Uuid,
        permission_id: Uuid,
    ) -> impl Future<Output = WardenResult<Option<UserOverride>>> + Send;

    fn list_user_overrides(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = WardenResult<Vec<UserOverride>>> + Send;
}

// ---------------------------------------------------------------------------
// Audit (append-only)
// ---------------------------------------------------------------------------

/// Query filters for audit log entries.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub actor_id: Option<Uuid>,
    pub kind: Option<AuditKind>,
    pub resource_type: Option<ResourceType>,
    pub action_type: Option<ActionType>,
    pub outcome: Option<AuditOutcome>,
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
}

pub trait AuditLogRepository: Send + Sync {
    /// Append a new audit log entry. No update or delete operations exist.
    fn append(
        &self,
        input: CreateAuditEntry,
    ) -> impl Future<Output = WardenResult<AuditEntry>> + Send;
    /// Newest first.
    fn list(
        &self,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> impl Future<Output = WardenResult<PaginatedResult<AuditEntry>>> + Send;
}
