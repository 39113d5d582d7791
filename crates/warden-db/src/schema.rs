//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode. UUIDs are stored as
//! strings, enums as lowercase strings guarded by ASSERT constraints.
//! Every uniqueness invariant of the authorization model is a UNIQUE
//! index, so duplicate grants are rejected by storage and not only by
//! application code.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "authorization_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Permissions (capability catalog)
-- =======================================================================
DEFINE TABLE permission SCHEMAFULL;
DEFINE FIELD name ON TABLE permission TYPE string;
DEFINE FIELD resource_type ON TABLE permission TYPE string \
    ASSERT $value IN ['product', 'category', 'order', 'cart', 'customer', \
    'notification', 'shipping', 'search', 'file', 'user', 'role', \
    'permission', 'audit_log', 'rate_limit', 'system'];
DEFINE FIELD action_type ON TABLE permission TYPE string \
    ASSERT $value IN ['read', 'write', 'delete', 'manage', 'admin'];
DEFINE FIELD description ON TABLE permission TYPE string;
DEFINE FIELD is_active ON TABLE permission TYPE bool DEFAULT true;
DEFINE FIELD is_system ON TABLE permission TYPE bool DEFAULT false;
DEFINE FIELD created_at ON TABLE permission TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE permission TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_permission_name ON TABLE permission \
    COLUMNS name UNIQUE;
DEFINE INDEX idx_permission_capability ON TABLE permission \
    COLUMNS resource_type, action_type UNIQUE;

-- =======================================================================
-- Roles
-- =======================================================================
DEFINE TABLE role SCHEMAFULL;
DEFINE FIELD name ON TABLE role TYPE string;
DEFINE FIELD description ON TABLE role TYPE string;
DEFINE FIELD is_active ON TABLE role TYPE bool DEFAULT true;
DEFINE FIELD is_system ON TABLE role TYPE bool DEFAULT false;
DEFINE FIELD created_at ON TABLE role TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE role TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_role_name ON TABLE role COLUMNS name UNIQUE;

-- =======================================================================
-- Users (actors; one role each)
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD username ON TABLE user TYPE string;
DEFINE FIELD role_id ON TABLE user TYPE string;
DEFINE FIELD is_active ON TABLE user TYPE bool DEFAULT true;
DEFINE FIELD created_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_user_username ON TABLE user COLUMNS username UNIQUE;
DEFINE INDEX idx_user_role ON TABLE user COLUMNS role_id;

-- =======================================================================
-- Role -> Permission grants
-- =======================================================================
DEFINE TABLE role_grant SCHEMAFULL;
DEFINE FIELD role_id ON TABLE role_grant TYPE string;
DEFINE FIELD permission_id ON TABLE role_grant TYPE string;
DEFINE FIELD granted_by ON TABLE role_grant TYPE string;
DEFINE FIELD granted_at ON TABLE role_grant TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_role_grant_pair ON TABLE role_grant \
    COLUMNS role_id, permission_id UNIQUE;
DEFINE INDEX idx_role_grant_permission ON TABLE role_grant \
    COLUMNS permission_id;

-- =======================================================================
-- User -> Permission overrides (explicit allow or deny)
-- =======================================================================
DEFINE TABLE user_override SCHEMAFULL;
DEFINE FIELD user_id ON TABLE user_override TYPE string;
DEFINE FIELD permission_id ON TABLE user_override TYPE string;
DEFINE FIELD is_granted ON TABLE user_override TYPE bool;
DEFINE FIELD granted_by ON TABLE user_override TYPE string;
DEFINE FIELD reason ON TABLE user_override TYPE string;
DEFINE FIELD expires_at ON TABLE user_override TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE user_override TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user_override TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_user_override_pair ON TABLE user_override \
    COLUMNS user_id, permission_id UNIQUE;

-- =======================================================================
-- Audit Log (append-only)
-- =======================================================================
DEFINE TABLE audit_log SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD kind ON TABLE audit_log TYPE string \
    ASSERT $value IN ['decision', 'role_grant_added', \
    'role_grant_removed', 'user_override_set', 'user_override_cleared'];
DEFINE FIELD actor_id ON TABLE audit_log TYPE string;
DEFINE FIELD resource_type ON TABLE audit_log TYPE string;
DEFINE FIELD action_type ON TABLE audit_log TYPE string;
DEFINE FIELD resource_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD outcome ON TABLE audit_log TYPE string \
    ASSERT $value IN ['allow', 'deny', 'success'];
DEFINE FIELD source ON TABLE audit_log TYPE option<string>;
DEFINE FIELD reason ON TABLE audit_log TYPE string;
DEFINE FIELD subject_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD ip_address ON TABLE audit_log TYPE option<string>;
DEFINE FIELD client_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD timestamp ON TABLE audit_log TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_audit_time ON TABLE audit_log COLUMNS timestamp;
DEFINE INDEX idx_audit_actor ON TABLE audit_log \
    COLUMNS actor_id, timestamp;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query(migration.sql).await?.check().map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

            info!(
                version = migration.version,
                "Migration applied successfully"
            );
        }
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::models::permission::{ActionType, ResourceType};

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }

    #[test]
    fn schema_accepts_every_resource_and_action() {
        for resource in ResourceType::ALL {
            assert!(
                SCHEMA_V1.contains(&format!("'{}'", resource.as_str())),
                "resource type {resource} missing from schema ASSERT"
            );
        }
        for action in ActionType::ALL {
            assert!(
                SCHEMA_V1.contains(&format!("'{}'", action.as_str())),
                "action type {action} missing from schema ASSERT"
            );
        }
    }
}
