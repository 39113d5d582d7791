//! Administrative service: grant changes and role administration.
//!
//! Grant mutations validate their subjects, commit the row change and
//! its audit entry in one transaction, then invalidate the affected
//! cache entry before returning.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::audit::{AuditEntry, AuditKind, CreateAuditEntry};
use warden_core::models::grant::{GrantRolePermission, SetUserOverride, UserOverride};
use warden_core::models::permission::{ActionType, Permission};
use warden_core::models::role::{CreateRole, Role, UpdateRole};
use warden_core::models::user::{CreateUser, User};
use warden_core::repository::{
    AuditLogFilter, AuditLogRepository, GrantRepository, PaginatedResult, Pagination,
    PermissionRepository, RoleRepository, UserRepository,
};

use crate::catalog::PermissionCatalog;
use crate::store::GrantStore;

pub const SUPER_ADMIN_ROLE: &str = "super_admin";
pub const VIEWER_ROLE: &str = "viewer";

/// Input for [`AdminService::set_user_override`].
#[derive(Debug, Clone)]
pub struct OverrideInput {
    pub user_id: Uuid,
    pub permission_id: Uuid,
    pub is_granted: bool,
    pub reason: String,
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct AdminService<P, R, G, U, L>
where
    P: PermissionRepository,
    R: RoleRepository,
    G: GrantRepository,
    U: UserRepository,
    L: AuditLogRepository,
{
    catalog: Arc<PermissionCatalog<P>>,
    store: Arc<GrantStore<R, G>>,
    users: U,
    audit_log: L,
}

impl<P, R, G, U, L> AdminService<P, R, G, U, L>
where
    P: PermissionRepository,
    R: RoleRepository,
    G: GrantRepository,
    U: UserRepository,
    L: AuditLogRepository,
{
    pub fn new(
        catalog: Arc<PermissionCatalog<P>>,
        store: Arc<GrantStore<R, G>>,
        users: U,
        audit_log: L,
    ) -> Self {
        Self {
            catalog,
            store,
            users,
            audit_log,
        }
    }

    pub fn catalog(&self) -> &PermissionCatalog<P> {
        &self.catalog
    }

    // -----------------------------------------------------------------------
    // Role grants
    // -----------------------------------------------------------------------

    /// Returns `false` if the role already held the permission.
    pub async fn grant_role_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
        granted_by: Uuid,
    ) -> WardenResult<bool> {
        let role = self.store.roles().get_by_id(role_id).await?;
        let permission = self.catalog.get(permission_id).await?;

        let audit = CreateAuditEntry::administrative(
            AuditKind::RoleGrantAdded,
            granted_by,
            permission.capability(),
            role_id,
            format!("granted {} to role {}", permission.name, role.name),
        );
        let changed = self
            .store
            .grants()
            .grant_to_role(
                GrantRolePermission {
                    role_id,
                    permission_id,
                    granted_by,
                },
                audit,
            )
            .await?;

        if changed {
            self.store.invalidate_role(role_id);
            info!(role = %role.name, permission = %permission.name, %granted_by, "Role grant added");
        }
        Ok(changed)
    }

    /// Returns `false` if the role did not hold the permission.
    pub async fn revoke_role_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
        revoked_by: Uuid,
    ) -> WardenResult<bool> {
        let role = self.store.roles().get_by_id(role_id).await?;
        let permission = self.catalog.get(permission_id).await?;

        let audit = CreateAuditEntry::administrative(
            AuditKind::RoleGrantRemoved,
            revoked_by,
            permission.capability(),
            role_id,
            format!("revoked {} from role {}", permission.name, role.name),
        );
        let changed = self
            .store
            .grants()
            .revoke_from_role(role_id, permission_id, audit)
            .await?;

        if changed {
            self.store.invalidate_role(role_id);
            info!(role = %role.name, permission = %permission.name, %revoked_by, "Role grant removed");
        }
        Ok(changed)
    }

    pub async fn role_permissions(&self, role_id: Uuid) -> WardenResult<Vec<Permission>> {
        self.store.grants().get_role_permissions(role_id).await
    }

    // -----------------------------------------------------------------------
    // User overrides
    // -----------------------------------------------------------------------

    /// Create or replace the override for (user, permission).
    pub async fn set_user_override(
        &self,
        input: OverrideInput,
        granted_by: Uuid,
    ) -> WardenResult<UserOverride> {
        if input.reason.trim().is_empty() {
            return Err(WardenError::Validation {
                message: "an override needs a reason".into(),
            });
        }
        let user = self.users.get_by_id(input.user_id).await?;
        let permission = self.catalog.get(input.permission_id).await?;

        let verb = if input.is_granted { "allow" } else { "deny" };
        let audit = CreateAuditEntry::administrative(
            AuditKind::UserOverrideSet,
            granted_by,
            permission.capability(),
            user.id,
            format!(
                "{verb} {} for user {}: {}",
                permission.name, user.username, input.reason
            ),
        );
        let stored = self
            .store
            .grants()
            .set_user_override(
                SetUserOverride {
                    user_id: user.id,
                    permission_id: permission.id,
                    is_granted: input.is_granted,
                    granted_by,
                    reason: input.reason,
                    expires_at: input.expires_at,
                },
                audit,
            )
            .await?;

        self.store.invalidate_user(user.id);
        info!(
            user = %user.username,
            permission = %permission.name,
            is_granted = stored.is_granted,
            expires_at = ?stored.expires_at,
            %granted_by,
            "User override set"
        );
        Ok(stored)
    }

    /// Returns `false` if there was no override to clear.
    pub async fn clear_user_override(
        &self,
        user_id: Uuid,
        permission_id: Uuid,
        cleared_by: Uuid,
    ) -> WardenResult<bool> {
        let user = self.users.get_by_id(user_id).await?;
        let permission = self.catalog.get(permission_id).await?;

        let audit = CreateAuditEntry::administrative(
            AuditKind::UserOverrideCleared,
            cleared_by,
            permission.capability(),
            user_id,
            format!("cleared {} override for user {}", permission.name, user.username),
        );
        let changed = self
            .store
            .grants()
            .clear_user_override(user_id, permission_id, audit)
            .await?;

        if changed {
            self.store.invalidate_user(user_id);
            info!(user = %user.username, permission = %permission.name, %cleared_by, "User override cleared");
        }
        Ok(changed)
    }

    pub async fn user_overrides(&self, user_id: Uuid) -> WardenResult<Vec<UserOverride>> {
        self.store.grants().list_user_overrides(user_id).await
    }

    // -----------------------------------------------------------------------
    // Roles and actors
    // -----------------------------------------------------------------------

    pub async fn create_role(&self, input: CreateRole) -> WardenResult<Role> {
        let role = self.store.roles().create(input).await?;
        info!(role = %role.name, is_system = role.is_system, "Role created");
        Ok(role)
    }

    pub async fn role_by_name(&self, name: &str) -> WardenResult<Role> {
        self.store.roles().get_by_name(name).await
    }

    pub async fn list_roles(&self, pagination: Pagination) -> WardenResult<PaginatedResult<Role>> {
        self.store.roles().list(pagination).await
    }

    pub async fn deactivate_role(&self, role_id: Uuid) -> WardenResult<Role> {
        let role = self
            .store
            .roles()
            .update(
                role_id,
                UpdateRole {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await?;
        self.store.invalidate_role(role_id);
        info!(role = %role.name, "Role deactivated");
        Ok(role)
    }

    pub async fn delete_role(&self, role_id: Uuid) -> WardenResult<()> {
        self.store.roles().delete(role_id).await?;
        self.store.invalidate_role(role_id);
        Ok(())
    }

    pub async fn create_user(&self, input: CreateUser) -> WardenResult<User> {
        // The role must exist before anyone can hold it.
        self.store.roles().get_by_id(input.role_id).await?;
        let user = self.users.create(input).await?;
        info!(user = %user.username, role_id = %user.role_id, "Actor registered");
        Ok(user)
    }

    pub async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> WardenResult<User> {
        self.store.roles().get_by_id(role_id).await?;
        let user = self.users.assign_role(user_id, role_id).await?;
        info!(user = %user.username, %role_id, "Role assigned");
        Ok(user)
    }

    pub async fn set_user_active(&self, user_id: Uuid, is_active: bool) -> WardenResult<User> {
        let user = self.users.set_active(user_id, is_active).await?;
        info!(user = %user.username, is_active, "Actor activity changed");
        Ok(user)
    }

    /// Create the `super_admin` (every permission) and `viewer` (every
    /// `read`) system roles and top up their grants. Idempotent.
    pub async fn seed_system_roles(&self, seeded_by: Uuid) -> WardenResult<(Role, Role)> {
        let super_admin = self
            .ensure_system_role(SUPER_ADMIN_ROLE, "Unrestricted access to every capability")
            .await?;
        let viewer = self
            .ensure_system_role(VIEWER_ROLE, "Read-only access to every resource")
            .await?;

        let mut offset = 0;
        let mut added = 0;
        loop {
            let page = self
                .catalog
                .list(Pagination { offset, limit: 100 })
                .await?;
            let fetched = page.items.len() as u64;
            for permission in &page.items {
                if self
                    .grant_role_permission(super_admin.id, permission.id, seeded_by)
                    .await?
                {
                    added += 1;
                }
                if permission.action_type == ActionType::Read
                    && self
                        .grant_role_permission(viewer.id, permission.id, seeded_by)
                        .await?
                {
                    added += 1;
                }
            }
            offset += fetched;
            if fetched == 0 || offset >= page.total {
                break;
            }
        }

        info!(added, "System roles seeded");
        Ok((super_admin, viewer))
    }

    async fn ensure_system_role(&self, name: &str, description: &str) -> WardenResult<Role> {
        match self.store.roles().get_by_name(name).await {
            Ok(role) => Ok(role),
            Err(WardenError::NotFound { .. }) => {
                self.create_role(CreateRole {
                    name: name.into(),
                    description: description.into(),
                    is_system: true,
                })
                .await
            }
            Err(e) => Err(e),
        }
    }

    // -----------------------------------------------------------------------
    // Audit
    // -----------------------------------------------------------------------

    /// Newest first.
    pub async fn list_audit(
        &self,
        filter: AuditLogFilter,
        pagination: Pagination,
    ) -> WardenResult<PaginatedResult<AuditEntry>> {
        self.audit_log.list(filter, pagination).await
    }
}
