//! Read side of the grant model, as the decision engine sees it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::grant::UserOverride;
use warden_core::models::permission::Permission;
use warden_core::repository::{GrantRepository, RoleRepository};

use crate::cache::GrantCache;
use crate::config::AuthzConfig;

/// Role and grant repositories behind a [`GrantCache`].
pub struct GrantStore<R: RoleRepository, G: GrantRepository> {
    roles: R,
    grants: G,
    cache: GrantCache,
}

impl<R: RoleRepository, G: GrantRepository> GrantStore<R, G> {
    pub fn new(roles: R, grants: G, config: &AuthzConfig) -> Self {
        Self {
            roles,
            grants,
            cache: GrantCache::new(config.cache_ttl()),
        }
    }

    pub fn roles(&self) -> &R {
        &self.roles
    }

    pub fn grants(&self) -> &G {
        &self.grants
    }

    pub fn cache(&self) -> &GrantCache {
        &self.cache
    }

    /// Active permissions of an active role. An inactive or missing role
    /// grants nothing.
    pub async fn permissions_of(&self, role_id: Uuid) -> WardenResult<Arc<Vec<Permission>>> {
        if let Some(cached) = self.cache.role_permissions(role_id) {
            return Ok(cached);
        }

        let role = match self.roles.get_by_id(role_id).await {
            Ok(role) => Some(role),
            Err(WardenError::NotFound { .. }) => {
                warn!(%role_id, "Actor references a missing role");
                None
            }
            Err(e) => return Err(e),
        };

        let permissions = match role {
            Some(role) if role.is_active => self
                .grants
                .get_role_permissions(role_id)
                .await?
                .into_iter()
                .filter(|p| p.is_active)
                .collect(),
            _ => Vec::new(),
        };

        let permissions = Arc::new(permissions);
        self.cache.put_role_permissions(role_id, Arc::clone(&permissions));
        Ok(permissions)
    }

    /// The user's override for a permission, unless it has expired at
    /// `now`.
    pub async fn override_of(
        &self,
        user_id: Uuid,
        permission_id: Uuid,
        now: DateTime<Utc>,
    ) -> WardenResult<Option<UserOverride>> {
        let stored = match self.cache.user_override(user_id, permission_id) {
            Some(cached) => cached,
            None => {
                let stored = self.grants.get_user_override(user_id, permission_id).await?;
                self.cache.put_user_override(user_id, permission_id, stored.clone());
                stored
            }
        };

        // Expiry is checked on every read, cached or not.
        Ok(stored.filter(|o| !o.is_expired_at(now)))
    }

    pub fn invalidate_role(&self, role_id: Uuid) {
        self.cache.invalidate_role(role_id);
    }

    pub fn invalidate_user(&self, user_id: Uuid) {
        self.cache.invalidate_user(user_id);
    }
}
