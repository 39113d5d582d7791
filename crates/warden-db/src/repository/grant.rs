//! SurrealDB implementation of [`GrantRepository`].
//!
//! Role grants and user overrides are keyed deterministically by their
//! (role|user, permission) pair, so concurrent writers to the same pair
//! collide on the same record and storage serializes them. Every
//! mutation runs in one transaction together with its audit entry.

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::audit::CreateAuditEntry;
use warden_core::models::grant::{GrantRolePermission, RoleGrant, SetUserOverride, UserOverride};
use warden_core::models::permission::Permission;
use warden_core::repository::GrantRepository;

use super::audit::{AUDIT_INSERT, AuditContent};
use super::permission::{PermissionRowWithId, permission_rows_to_vec};
use crate::error::{DbError, parse_uuid};

fn pair_key(owner: Uuid, permission_id: Uuid) -> String {
    format!("{owner}_{permission_id}")
}

#[derive(Debug, SurrealValue)]
struct RoleGrantRow {
    role_id: String,
    permission_id: String,
    granted_by: String,
    granted_at: DateTime<Utc>,
}

impl RoleGrantRow {
    fn try_into_grant(self) -> Result<RoleGrant, DbError> {
        Ok(RoleGrant {
            role_id: parse_uuid(&self.role_id, "role")?,
            permission_id: parse_uuid(&self.permission_id, "permission")?,
            granted_by: parse_uuid(&self.granted_by, "granter")?,
            granted_at: self.granted_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct UserOverrideRow {
    user_id: String,
    permission_id: String,
    is_granted: bool,
    granted_by: String,
    reason: String,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserOverrideRow {
    fn try_into_override(self) -> Result<UserOverride, DbError> {
        Ok(UserOverride {
            user_id: parse_uuid(&self.user_id, "user")?,
            permission_id: parse_uuid(&self.permission_id, "permission")?,
            is_granted: self.is_granted,
            granted_by: parse_uuid(&self.granted_by, "granter")?,
            reason: self.reason,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the Grant repository.
#[derive(Clone)]
pub struct SurrealGrantRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealGrantRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn role_grant_exists(&self, key: &str) -> Result<bool, DbError> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('role_grant', $key)")
            .bind(("key", key.to_string()))
            .await?;
        let rows: Vec<RoleGrantRow> = result.take(0)?;
        Ok(!rows.is_empty())
    }
}

impl<C: Connection> GrantRepository for SurrealGrantRepository<C> {
    async fn grant_to_role(
        &self,
        input: GrantRolePermission,
        audit: CreateAuditEntry,
    ) -> WardenResult<bool> {
        let key = pair_key(input.role_id, input.permission_id);

        if self.role_grant_exists(&key).await? {
            return Ok(false);
        }

        let result = self
            .db
            .query(format!(
                "BEGIN TRANSACTION; \
                 CREATE type::record('role_grant', $key) SET \
                 role_id = $role_id, permission_id = $permission_id, \
                 granted_by = $granted_by; \
                 {AUDIT_INSERT} \
                 COMMIT TRANSACTION;"
            ))
            .bind(("key", key.clone()))
            .bind(("role_id", input.role_id.to_string()))
            .bind(("permission_id", input.permission_id.to_string()))
            .bind(("granted_by", input.granted_by.to_string()))
            .bind(("audit_id", Uuid::new_v4().to_string()))
            .bind(("audit", AuditContent::from(audit)))
            .await
            .map_err(DbError::from)?;

        let err = match result.check() {
            Ok(_) => return Ok(true),
            Err(e) => DbError::from_check(e),
        };

        // A concurrent grant of the same pair committed first.
        if matches!(err, DbError::Conflict(_)) && self.role_grant_exists(&key).await? {
            debug!(grant = %key, error = %err, "Role grant already present");
            return Ok(false);
        }

        Err(err.into())
    }

    async fn revoke_from_role(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
        audit: CreateAuditEntry,
    ) -> WardenResult<bool> {
        let key = pair_key(role_id, permission_id);

        if !self.role_grant_exists(&key).await? {
            return Ok(false);
        }

        self.db
            .query(format!(
                "BEGIN TRANSACTION; \
                 DELETE type::record('role_grant', $key); \
                 {AUDIT_INSERT} \
                 COMMIT TRANSACTION;"
            ))
            .bind(("key", key))
            .bind(("audit_id", Uuid::new_v4().to_string()))
            .bind(("audit", AuditContent::from(audit)))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from_check)?;

        Ok(true)
    }

    async fn get_role_permissions(&self, role_id: Uuid) -> WardenResult<Vec<Permission>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM permission \
                 WHERE meta::id(id) IN (\
                     SELECT VALUE permission_id FROM role_grant \
                     WHERE role_id = $role_id\
                 ) \
                 ORDER BY name ASC",
            )
            .bind(("role_id", role_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<PermissionRowWithId> = result.take(0).map_err(DbError::from)?;

        Ok(permission_rows_to_vec(rows)?)
    }

    async fn list_role_grants(&self, role_id: Uuid) -> WardenResult<Vec<RoleGrant>> {
        let mut result = self
            .db
            .query(
                "SELECT * FROM role_grant WHERE role_id = $role_id \
                 ORDER BY granted_at ASC",
            )
            .bind(("role_id", role_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RoleGrantRow> = result.take(0).map_err(DbError::from)?;

        let grants = rows
            .into_iter()
            .map(|row| row.try_into_grant())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(grants)
    }

    async fn set_user_override(
        &self,
        input: SetUserOverride,
        audit: CreateAuditEntry,
    ) -> WardenResult<UserOverride> {
        let key = pair_key(input.user_id, input.permission_id);

        // UPSERT on the pair key: setting again replaces, last writer wins.
        self.db
            .query(format!(
                "BEGIN TRANSACTION; \
                 UPSERT type::record('user_override', $key) SET \
                 user_id = $user_id, permission_id = $permission_id, \
                 is_granted = $is_granted, granted_by = $granted_by, \
                 reason = $reason, expires_at = $expires_at, \
                 updated_at = time::now(); \
                 {AUDIT_INSERT} \
                 COMMIT TRANSACTION;"
            ))
            .bind(("key", key.clone()))
            .bind(("user_id", input.user_id.to_string()))
            .bind(("permission_id", input.permission_id.to_string()))
            .bind(("is_granted", input.is_granted))
            .bind(("granted_by", input.granted_by.to_string()))
            .bind(("reason", input.reason))
            .bind(("expires_at", input.expires_at))
            .bind(("audit_id", Uuid::new_v4().to_string()))
            .bind(("audit", AuditContent::from(audit)))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from_check)?;

        self.get_user_override(input.user_id, input.permission_id)
            .await?
            .ok_or_else(|| WardenError::Internal(format!("override {key} vanished after commit")))
    }

    async fn clear_user_override(
        &self,
        user_id: Uuid,
        permission_id: Uuid,
        audit: CreateAuditEntry,
    ) -> WardenResult<bool> {
        if self.get_user_override(user_id, permission_id).await?.is_none() {
            return Ok(false);
        }

        self.db
            .query(format!(
                "BEGIN TRANSACTION; \
                 DELETE type::record('user_override', $key); \
                 {AUDIT_INSERT} \
                 COMMIT TRANSACTION;"
            ))
            .bind(("key", pair_key(user_id, permission_id)))
            .bind(("audit_id", Uuid::new_v4().to_string()))
            .bind(("audit", AuditContent::from(audit)))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from_check)?;

        Ok(true)
    }

    async fn get_user_override(
        &self,
        user_id: Uuid,
        permission_id: Uuid,
    ) -> WardenResult<Option<UserOverride>> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('user_override', $key)")
            .bind(("key", pair_key(user_id, permission_id)))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserOverrideRow> = result.take(0).map_err(DbError::from)?;

        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.try_into_override())
            .transpose()?)
    }

    async fn list_user_overrides(&self, user_id: Uuid) -> WardenResult<Vec<UserOverride>> {
        let mut result = self
            .db
            .query(
                "SELECT * FROM user_override WHERE user_id = $user_id \
                 ORDER BY created_at ASC",
            )
            .bind(("user_id", user_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserOverrideRow> = result.take(0).map_err(DbError::from)?;

        let overrides = rows
            .into_iter()
            .map(|row| row.try_into_override())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(overrides)
    }
}
