//! Wiring of the authorization services over one SurrealDB connection,
//! and the subcommands that drive them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use tracing::info;
use uuid::Uuid;
use warden_authz::admin::{AdminService, OverrideInput};
use warden_authz::audit::AuditWorker;
use warden_authz::catalog::PermissionCatalog;
use warden_authz::config::AuthzConfig;
use warden_authz::decision::{DecisionEngine, PermissionChecker};
use warden_authz::error::AuthzError;
use warden_authz::store::GrantStore;
use warden_authz::token::issue_access_token;
use warden_core::error::WardenError;
use warden_core::models::audit::AuditContext;
use warden_core::models::permission::Capability;
use warden_core::models::role::CreateRole;
use warden_core::models::user::CreateUser;
use warden_core::repository::{AuditLogFilter, Pagination};
use warden_db::repository::{
    SurrealAuditLogRepository, SurrealGrantRepository, SurrealPermissionRepository,
    SurrealRoleRepository, SurrealUserRepository,
};

type Catalog = PermissionCatalog<SurrealPermissionRepository<Any>>;
type Store = GrantStore<SurrealRoleRepository<Any>, SurrealGrantRepository<Any>>;
type Admin = AdminService<
    SurrealPermissionRepository<Any>,
    SurrealRoleRepository<Any>,
    SurrealGrantRepository<Any>,
    SurrealUserRepository<Any>,
    SurrealAuditLogRepository<Any>,
>;

/// One operator action, already parsed.
#[derive(Debug)]
pub enum Action {
    Migrate,
    CreateRole {
        name: String,
        description: String,
    },
    CreateUser {
        username: String,
        role: String,
    },
    Check {
        actor: Uuid,
        capability: Capability,
        resource_id: Option<String>,
        context: AuditContext,
    },
    Grant {
        role: String,
        capability: Capability,
    },
    Revoke {
        role: String,
        capability: Capability,
    },
    OverrideSet {
        user: Uuid,
        capability: Capability,
        is_granted: bool,
        reason: String,
        expires_at: Option<DateTime<Utc>>,
    },
    OverrideClear {
        user: Uuid,
        capability: Capability,
    },
    Audit {
        filter: AuditLogFilter,
        pagination: Pagination,
    },
    Token {
        actor: Uuid,
    },
}

pub struct App {
    db: Surreal<Any>,
    config: AuthzConfig,
    catalog: Arc<Catalog>,
    store: Arc<Store>,
    admin: Admin,
}

impl App {
    pub fn new(db: Surreal<Any>, config: AuthzConfig) -> Self {
        let catalog = Arc::new(PermissionCatalog::new(
            SurrealPermissionRepository::new(db.clone()),
            &config,
        ));
        let store = Arc::new(GrantStore::new(
            SurrealRoleRepository::new(db.clone()),
            SurrealGrantRepository::new(db.clone()),
            &config,
        ));
        let admin = AdminService::new(
            Arc::clone(&catalog),
            Arc::clone(&store),
            SurrealUserRepository::new(db.clone()),
            SurrealAuditLogRepository::new(db.clone()),
        );

        Self {
            db,
            config,
            catalog,
            store,
            admin,
        }
    }

    /// Run one action on behalf of `operator` and render its result.
    pub async fn execute(&self, action: Action, operator: Uuid) -> Result<Value, AuthzError> {
        match action {
            Action::Migrate => {
                warden_db::run_migrations(&self.db)
                    .await
                    .map_err(WardenError::from)?;
                let created = self.catalog.initialize().await?;
                let (super_admin, viewer) = self.admin.seed_system_roles(operator).await?;
                info!(permissions_created = created, "Bootstrap complete");
                Ok(json!({
                    "permissions_created": created,
                    "super_admin": render(&super_admin)?,
                    "viewer": render(&viewer)?,
                }))
            }
            Action::CreateRole { name, description } => {
                let role = self
                    .admin
                    .create_role(CreateRole {
                        name,
                        description,
                        is_system: false,
                    })
                    .await?;
                render(&role)
            }
            Action::CreateUser { username, role } => {
                let role = self.admin.role_by_name(&role).await?;
                let user = self
                    .admin
                    .create_user(CreateUser {
                        username,
                        role_id: role.id,
                    })
                    .await?;
                render(&user)
            }
            Action::Check {
                actor,
                capability,
                resource_id,
                context,
            } => {
                let (sink, worker) =
                    AuditWorker::spawn(SurrealAuditLogRepository::new(self.db.clone()), &self.config);
                let engine = DecisionEngine::new(
                    Arc::clone(&self.catalog),
                    Arc::clone(&self.store),
                    SurrealUserRepository::new(self.db.clone()),
                    sink,
                );
                let decision = engine
                    .check_permission(actor, capability, resource_id, context)
                    .await;
                let audit = worker.shutdown().await;
                Ok(json!({
                    "decision": render(&decision)?,
                    "audit": render(&audit)?,
                    "audit_failures": engine.audit_failures(),
                }))
            }
            Action::Grant { role, capability } => {
                let role = self.admin.role_by_name(&role).await?;
                let permission = self.catalog.resolve(capability).await?;
                let changed = self
                    .admin
                    .grant_role_permission(role.id, permission.id, operator)
                    .await?;
                Ok(json!({ "role": role.name, "capability": capability.name(), "changed": changed }))
            }
            Action::Revoke { role, capability } => {
                let role = self.admin.role_by_name(&role).await?;
                let permission = self.catalog.resolve(capability).await?;
                let changed = self
                    .admin
                    .revoke_role_permission(role.id, permission.id, operator)
                    .await?;
                Ok(json!({ "role": role.name, "capability": capability.name(), "changed": changed }))
            }
            Action::OverrideSet {
                user,
                capability,
                is_granted,
                reason,
                expires_at,
            } => {
                let permission = self.catalog.resolve(capability).await?;
                let stored = self
                    .admin
                    .set_user_override(
                        OverrideInput {
                            user_id: user,
                            permission_id: permission.id,
                            is_granted,
                            reason,
                            expires_at,
                        },
                        operator,
                    )
                    .await?;
                render(&stored)
            }
            Action::OverrideClear { user, capability } => {
                let permission = self.catalog.resolve(capability).await?;
                let changed = self
                    .admin
                    .clear_user_override(user, permission.id, operator)
                    .await?;
                Ok(json!({ "user_id": user, "capability": capability.name(), "changed": changed }))
            }
            Action::Audit { filter, pagination } => {
                let page = self.admin.list_audit(filter, pagination).await?;
                Ok(json!({
                    "items": render(&page.items)?,
                    "total": page.total,
                    "offset": page.offset,
                    "limit": page.limit,
                }))
            }
            Action::Token { actor } => {
                let token = issue_access_token(actor, &self.config)?;
                Ok(json!({
                    "access_token": token,
                    "token_type": "Bearer",
                    "expires_in": self.config.access_token_lifetime_secs,
                }))
            }
        }
    }
}

fn render<T: Serialize>(value: &T) -> Result<Value, AuthzError> {
    serde_json::to_value(value).map_err(|e| AuthzError::Core(WardenError::Internal(e.to_string())))
}
