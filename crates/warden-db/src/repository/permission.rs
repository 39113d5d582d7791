//! SurrealDB implementation of [`PermissionRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::permission::{
    ActionType, Capability, CreatePermission, Permission, ResourceType, UpdatePermission,
};
use warden_core::repository::{PaginatedResult, Pagination, PermissionRepository};

use crate::error::{DbError, REFUSED, parse_uuid};

#[derive(Debug, SurrealValue)]
struct PermissionRow {
    name: String,
    resource_type: String,
    action_type: String,
    description: String,
    is_active: bool,
    is_system: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
pub(crate) struct PermissionRowWithId {
    record_id: String,
    name: String,
    resource_type: String,
    action_type: String,
    description: String,
    is_active: bool,
    is_system: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_resource(s: &str) -> Result<ResourceType, DbError> {
    s.parse()
        .map_err(|_| DbError::Decode(format!("unknown resource type: {s}")))
}

fn parse_action(s: &str) -> Result<ActionType, DbError> {
    s.parse()
        .map_err(|_| DbError::Decode(format!("unknown action type: {s}")))
}

impl PermissionRow {
    fn into_permission(self, id: Uuid) -> Result<Permission, DbError> {
        Ok(Permission {
            id,
            name: self.name,
            resource_type: parse_resource(&self.resource_type)?,
            action_type: parse_action(&self.action_type)?,
            description: self.description,
            is_active: self.is_active,
            is_system: self.is_system,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl PermissionRowWithId {
    pub(crate) fn try_into_permission(self) -> Result<Permission, DbError> {
        Ok(Permission {
            id: parse_uuid(&self.record_id, "permission")?,
            name: self.name,
            resource_type: parse_resource(&self.resource_type)?,
            action_type: parse_action(&self.action_type)?,
            description: self.description,
            is_active: self.is_active,
            is_system: self.is_system,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) fn permission_rows_to_vec(
    rows: Vec<PermissionRowWithId>,
) -> Result<Vec<Permission>, DbError> {
    rows.into_iter()
        .map(|row| row.try_into_permission())
        .collect()
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// SurrealDB implementation of the Permission repository.
#[derive(Clone)]
pub struct SurrealPermissionRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPermissionRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> PermissionRepository for SurrealPermissionRepository<C> {
    async fn create(&self, input: CreatePermission) -> WardenResult<Permission> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let capability = input.capability;

        let result = self
            .db
            .query(
                "CREATE type::record('permission', $id) SET \
                 name = $name, \
                 resource_type = $resource_type, action_type = $action_type, \
                 description = $description, is_system = $is_system",
            )
            .bind(("id", id_str.clone()))
            .bind(("name", capability.name()))
            .bind(("resource_type", capability.resource.as_str()))
            .bind(("action_type", capability.action.as_str()))
            .bind(("description", input.description))
            .bind(("is_system", input.is_system))
            .await
            .map_err(DbError::from)?;

        let mut result = match result.check() {
            Ok(result) => result,
            Err(e) => {
                return Err(match DbError::from_check(e) {
                    DbError::Conflict(_) => WardenError::AlreadyExists {
                        entity: format!("permission {capability}"),
                    },
                    other => other.into(),
                });
            }
        };

        let rows: Vec<PermissionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "permission".into(),
            id: id_str,
        })?;

        Ok(row.into_permission(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<Permission> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('permission', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PermissionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "permission".into(),
            id: id_str,
        })?;

        Ok(row.into_permission(id)?)
    }

    async fn get_by_capability(&self, capability: Capability) -> WardenResult<Permission> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM permission \
                 WHERE resource_type = $resource_type \
                 AND action_type = $action_type",
            )
            .bind(("resource_type", capability.resource.as_str()))
            .bind(("action_type", capability.action.as_str()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "permission".into(),
            id: capability.name(),
        })?;

        Ok(row.try_into_permission()?)
    }

    async fn update(&self, id: Uuid, input: UpdatePermission) -> WardenResult<Permission> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.description.is_some() {
            sets.push("description = $description");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('permission', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));

        if let Some(description) = input.description {
            builder = builder.bind(("description", description));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result.check().map_err(DbError::from_check)?;

        let rows: Vec<PermissionRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "permission".into(),
            id: id_str,
        })?;

        Ok(row.into_permission(id)?)
    }

    async fn delete(&self, id: Uuid) -> WardenResult<()> {
        let permission = self.get_by_id(id).await?;
        if permission.is_system {
            return Err(WardenError::SystemProtected {
                entity: "permission".into(),
                id: permission.name,
            });
        }

        // Grants and overrides must be removed through their audited
        // paths first; the guard runs in the same transaction as the delete.
        self.db
            .query(
                "BEGIN TRANSACTION; \
                 IF array::len((SELECT VALUE id FROM role_grant WHERE permission_id = $id)) > 0 { \
                     THROW $granted; \
                 } ELSE IF array::len((SELECT VALUE id FROM user_override WHERE permission_id = $id)) > 0 { \
                     THROW $overridden; \
                 }; \
                 DELETE type::record('permission', $id); \
                 COMMIT TRANSACTION;",
            )
            .bind(("id", id.to_string()))
            .bind((
                "granted",
                format!("{REFUSED} permission {} is still granted to a role", permission.name),
            ))
            .bind((
                "overridden",
                format!("{REFUSED} permission {} still has user overrides", permission.name),
            ))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from_check)?;

        info!(permission = %permission.name, "Permission deleted");

        Ok(())
    }

    async fn list(&self, pagination: Pagination) -> WardenResult<PaginatedResult<Permission>> {
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM permission GROUP ALL")
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM permission \
                 ORDER BY name ASC \
                 LIMIT $limit START $offset",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;

        Ok(PaginatedResult {
            items: permission_rows_to_vec(rows)?,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
