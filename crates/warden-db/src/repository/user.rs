//! SurrealDB implementation of [`UserRepository`].

use chrono::{DateTime, Utc};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::user::{CreateUser, User};
use warden_core::repository::UserRepository;

use crate::error::{DbError, parse_uuid};

#[derive(Debug, SurrealValue)]
struct UserRow {
    username: String,
    role_id: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self, id: Uuid) -> Result<User, DbError> {
        Ok(User {
            id,
            username: self.username,
            role_id: parse_uuid(&self.role_id, "role")?,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the User repository.
#[derive(Clone)]
pub struct SurrealUserRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealUserRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> UserRepository for SurrealUserRepository<C> {
    async fn create(&self, input: CreateUser) -> WardenResult<User> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let username = input.username.clone();

        let result = self
            .db
            .query(
                "CREATE type::record('user', $id) SET \
                 username = $username, role_id = $role_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("username", input.username))
            .bind(("role_id", input.role_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let mut result = match result.check() {
            Ok(result) => result,
            Err(e) => {
                return Err(match DbError::from_check(e) {
                    DbError::Conflict(_) => WardenError::AlreadyExists {
                        entity: format!("user {username}"),
                    },
                    other => other.into(),
                });
            }
        };

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: id_str,
        })?;

        Ok(row.into_user(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> WardenResult<User> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('user', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: id_str,
        })?;

        Ok(row.into_user(id)?)
    }

    async fn assign_role(&self, id: Uuid, role_id: Uuid) -> WardenResult<User> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('user', $id) SET \
                 role_id = $role_id, updated_at = time::now()",
            )
            .bind(("id", id_str.clone()))
            .bind(("role_id", role_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(DbError::from_check)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: id_str,
        })?;

        Ok(row.into_user(id)?)
    }

    async fn set_active(&self, id: Uuid, is_active: bool) -> WardenResult<User> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('user', $id) SET \
                 is_active = $is_active, updated_at = time::now()",
            )
            .bind(("id", id_str.clone()))
            .bind(("is_active", is_active))
            .await
            .map_err(DbError::from)?;
        let mut result = result.check().map_err(DbError::from_check)?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "user".into(),
            id: id_str,
        })?;

        Ok(row.into_user(id)?)
    }
}
