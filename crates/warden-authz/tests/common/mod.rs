//! Shared wiring for the authz integration tests: an isolated in-memory
//! database with the catalog, grant store and admin service on top.

#![allow(dead_code)]

use std::sync::Arc;

use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;
use warden_authz::admin::AdminService;
use warden_authz::audit::{AuditSink, RepositoryAuditSink};
use warden_authz::catalog::PermissionCatalog;
use warden_authz::config::AuthzConfig;
use warden_authz::decision::DecisionEngine;
use warden_authz::store::GrantStore;
use warden_core::models::audit::{AuditEntry, AuditKind};
use warden_core::models::permission::{ActionType, Capability, Permission, ResourceType};
use warden_core::models::role::{CreateRole, Role};
use warden_core::models::user::{CreateUser, User};
use warden_core::repository::{AuditLogFilter, Pagination, UserRepository};
use warden_db::repository::{
    SurrealAuditLogRepository, SurrealGrantRepository, SurrealPermissionRepository,
    SurrealRoleRepository, SurrealUserRepository,
};

pub type Catalog = PermissionCatalog<SurrealPermissionRepository<Db>>;
pub type Store = GrantStore<SurrealRoleRepository<Db>, SurrealGrantRepository<Db>>;
pub type Admin = AdminService<
    SurrealPermissionRepository<Db>,
    SurrealRoleRepository<Db>,
    SurrealGrantRepository<Db>,
    SurrealUserRepository<Db>,
    SurrealAuditLogRepository<Db>,
>;
pub type Engine<U, A> = DecisionEngine<
    SurrealPermissionRepository<Db>,
    SurrealRoleRepository<Db>,
    SurrealGrantRepository<Db>,
    U,
    A,
>;
pub type DbSink = RepositoryAuditSink<SurrealAuditLogRepository<Db>>;

pub struct Harness {
    pub db: Surreal<Db>,
    pub config: AuthzConfig,
    pub catalog: Arc<Catalog>,
    pub store: Arc<Store>,
    pub admin: Admin,
    /// Actor id recorded as `granted_by` on administrative changes.
    pub operator: Uuid,
}

impl Harness {
    /// Fresh database with the default vocabulary seeded.
    pub async fn new() -> Self {
        Self::with_config(AuthzConfig::default()).await
    }

    pub async fn with_config(config: AuthzConfig) -> Self {
        let harness = Self::bare(config).await;
        harness.catalog.initialize().await.unwrap();
        harness
    }

    /// Fresh database with an empty catalog.
    pub async fn bare(config: AuthzConfig) -> Self {
        let db = Surreal::new::<Mem>(()).await.unwrap();
        db.use_ns("test").use_db("test").await.unwrap();
        warden_db::run_migrations(&db).await.unwrap();

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
            operator: Uuid::new_v4(),
        }
    }

    pub fn engine(&self) -> Engine<SurrealUserRepository<Db>, DbSink> {
        self.engine_with(self.sink())
    }

    pub fn engine_with<A: AuditSink>(&self, sink: A) -> Engine<SurrealUserRepository<Db>, A> {
        self.engine_with_users(SurrealUserRepository::new(self.db.clone()), sink)
    }

    pub fn engine_with_users<U: UserRepository, A: AuditSink>(
        &self,
        users: U,
        sink: A,
    ) -> Engine<U, A> {
        DecisionEngine::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.store),
            users,
            sink,
        )
    }

    pub fn sink(&self) -> DbSink {
        RepositoryAuditSink::new(SurrealAuditLogRepository::new(self.db.clone()), &self.config)
    }

    pub async fn permission(&self, resource: ResourceType, action: ActionType) -> Permission {
        self.catalog
            .resolve(Capability::new(resource, action))
            .await
            .unwrap()
    }

    pub async fn role(&self, name: &str) -> Role {
        self.admin
            .create_role(CreateRole {
                name: name.into(),
                description: format!("{name} role"),
                is_system: false,
            })
            .await
            .unwrap()
    }

    pub async fn user(&self, username: &str, role: &Role) -> User {
        self.admin
            .create_user(CreateUser {
                username: username.into(),
                role_id: role.id,
            })
            .await
            .unwrap()
    }

    pub async fn grant(&self, role: &Role, permission: &Permission) {
        self.admin
            .grant_role_permission(role.id, permission.id, self.operator)
            .await
            .unwrap();
    }

    /// Audit entries of one kind, newest first.
    pub async fn audit(&self, kind: AuditKind) -> Vec<AuditEntry> {
        self.admin
            .list_audit(
                AuditLogFilter {
                    kind: Some(kind),
                    ..Default::default()
                },
                Pagination {
                    offset: 0,
                    limit: 1000,
                },
            )
            .await
            .unwrap()
            .items
    }
}
