//! TTL cache for role grant sets and user overrides.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;
use warden_core::models::grant::UserOverride;
use warden_core::models::permission::Permission;

struct Cached<T> {
    value: T,
    expires_at: Instant,
}

/// Shared between the decision path (reads) and the administrative
/// service (invalidation after commit).
pub struct GrantCache {
    role_permissions: DashMap<Uuid, Cached<Arc<Vec<Permission>>>>,
    /// Keyed by (user, permission). `None` caches "no override stored".
    overrides: DashMap<(Uuid, Uuid), Cached<Option<UserOverride>>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl GrantCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            role_permissions: DashMap::new(),
            overrides: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn role_permissions(&self, role_id: Uuid) -> Option<Arc<Vec<Permission>>> {
        let hit = lookup(&self.role_permissions, &role_id);
        self.count(hit.is_some());
        hit
    }

    pub fn put_role_permissions(&self, role_id: Uuid, permissions: Arc<Vec<Permission>>) {
        if self.is_enabled() {
            self.role_permissions.insert(role_id, self.wrap(permissions));
        }
    }

    /// `Some(None)` is a cached absence; `None` is a miss.
    pub fn user_override(&self, user_id: Uuid, permission_id: Uuid) -> Option<Option<UserOverride>> {
        let hit = lookup(&self.overrides, &(user_id, permission_id));
        self.count(hit.is_some());
        hit
    }

    pub fn put_user_override(
        &self,
        user_id: Uuid,
        permission_id: Uuid,
        value: Option<UserOverride>,
    ) {
        if self.is_enabled() {
            self.overrides
                .insert((user_id, permission_id), self.wrap(value));
        }
    }

    pub fn invalidate_role(&self, role_id: Uuid) {
        self.role_permissions.remove(&role_id);
    }

    pub fn invalidate_user(&self, user_id: Uuid) {
        self.overrides.retain(|(user, _), _| *user != user_id);
    }

    pub fn clear(&self) {
        self.role_permissions.clear();
        self.overrides.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            roles: self.role_permissions.len(),
            overrides: self.overrides.len(),
            hits,
            misses,
            hit_rate,
        }
    }

    fn wrap<T>(&self, value: T) -> Cached<T> {
        Cached {
            value,
            expires_at: Instant::now() + self.ttl,
        }
    }

    fn count(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn lookup<K, T>(map: &DashMap<K, Cached<T>>, key: &K) -> Option<T>
where
    K: Eq + std::hash::Hash,
    T: Clone,
{
    let entry = map.get(key)?;
    if entry.expires_at > Instant::now() {
        return Some(entry.value.clone());
    }
    drop(entry);
    map.remove(key);
    None
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub roles: usize,
    pub overrides: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}
