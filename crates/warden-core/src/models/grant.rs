//! Grant relations: role-wide grants and per-user overrides.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role → Permission link. At most one per (role, permission).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role_id: Uuid,
    pub permission_id: Uuid,
    pub granted_by: Uuid,
    pub granted_at: DateTime<Utc>,
}

/// Per-user exception that takes precedence over the user's role.
///
/// `is_granted = true` is an explicit allow, `false` an explicit deny.
/// At most one per (user, permission); setting it again replaces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOverride {
    pub user_id: Uuid,
    pub permission_id: Uuid,
    pub is_granted: bool,
    pub granted_by: Uuid,
    pub reason: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserOverride {
    /// An override at or past its expiry is treated as absent, never as a
    /// denial.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantRolePermission {
    pub role_id: Uuid,
    pub permission_id: Uuid,
    pub granted_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetUserOverride {
    pub user_id: Uuid,
    pub permission_id: Uuid,
    pub is_granted: bool,
    pub granted_by: Uuid,
    pub reason: String,
    pub expires_at: Option<DateTime<Utc>>,
}
