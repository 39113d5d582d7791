//! Permission catalog: the vocabulary of checkable capabilities.
//!
//! The catalog is an explicitly constructed object. [`initialize`]
//! seeds the default vocabulary (every resource type × action type,
//! system-protected) and loads a resolve snapshot; [`teardown`] drops it.
//! Snapshot entries are served for at most the configured TTL and are
//! invalidated synchronously by this catalog's own mutations.
//!
//! [`initialize`]: PermissionCatalog::initialize
//! [`teardown`]: PermissionCatalog::teardown

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::permission::{
    ActionType, Capability, CreatePermission, Permission, ResourceType, UpdatePermission,
};
use warden_core::repository::{PaginatedResult, Pagination, PermissionRepository};

use crate::config::AuthzConfig;

const LOAD_PAGE_SIZE: u64 = 100;

struct SnapshotEntry {
    permission: Permission,
    loaded_at: Instant,
}

pub struct PermissionCatalog<P: PermissionRepository> {
    repo: P,
    snapshot: DashMap<Capability, SnapshotEntry>,
    ttl: Duration,
    initialized: AtomicBool,
}

impl<P: PermissionRepository> PermissionCatalog<P> {
    pub fn new(repo: P, config: &AuthzConfig) -> Self {
        Self {
            repo,
            snapshot: DashMap::new(),
            ttl: config.cache_ttl(),
            initialized: AtomicBool::new(false),
        }
    }

    /// Seed the default vocabulary and load the snapshot.
    ///
    /// Idempotent: capabilities that already exist are left untouched,
    /// including their active flag. Returns how many were created.
    pub async fn initialize(&self) -> WardenResult<usize> {
        let mut created = 0;
        for resource in ResourceType::ALL {
            for action in ActionType::ALL {
                let capability = Capability::new(resource, action);
                match self
                    .repo
                    .create(CreatePermission {
                        capability,
                        description: default_description(capability),
                        is_system: true,
                    })
                    .await
                {
                    Ok(_) => created += 1,
                    Err(WardenError::AlreadyExists { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        let loaded = self.reload().await?;
        self.initialized.store(true, Ordering::Release);

        info!(created, loaded, "Permission catalog initialized");
        Ok(created)
    }

    /// Drop the snapshot. Resolution keeps working, straight from storage.
    pub fn teardown(&self) {
        self.snapshot.clear();
        self.initialized.store(false, Ordering::Release);
        info!("Permission catalog torn down");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Replace the snapshot with the current contents of storage.
    async fn reload(&self) -> WardenResult<usize> {
        self.snapshot.clear();
        let mut offset = 0;
        loop {
            let page = self
                .repo
                .list(Pagination {
                    offset,
                    limit: LOAD_PAGE_SIZE,
                })
                .await?;
            let fetched = page.items.len() as u64;
            for permission in page.items {
                self.remember(permission);
            }
            offset += fetched;
            if fetched < LOAD_PAGE_SIZE || offset >= page.total {
                break;
            }
        }
        Ok(self.snapshot.len())
    }

    fn remember(&self, permission: Permission) {
        if self.ttl.is_zero() {
            return;
        }
        self.snapshot.insert(
            permission.capability(),
            SnapshotEntry {
                permission,
                loaded_at: Instant::now(),
            },
        );
    }

    /// Resolve a capability to its permission, active or not.
    ///
    /// Fails with `NotFound` if the capability is not in the catalog.
    pub async fn resolve(&self, capability: Capability) -> WardenResult<Permission> {
        if let Some(entry) = self.snapshot.get(&capability) {
            if entry.loaded_at.elapsed() < self.ttl {
                return Ok(entry.permission.clone());
            }
        }

        let permission = self.repo.get_by_capability(capability).await?;
        debug!(%capability, "Catalog snapshot refreshed");
        self.remember(permission.clone());
        Ok(permission)
    }

    pub async fn get(&self, id: Uuid) -> WardenResult<Permission> {
        self.repo.get_by_id(id).await
    }

    /// Add a custom (not system-protected) capability.
    pub async fn create(
        &self,
        capability: Capability,
        description: impl Into<String>,
    ) -> WardenResult<Permission> {
        let permission = self
            .repo
            .create(CreatePermission {
                capability,
                description: description.into(),
                is_system: false,
            })
            .await?;
        info!(permission = %permission.name, "Permission created");
        self.remember(permission.clone());
        Ok(permission)
    }

    /// Soft-delete: the permission stays resolvable but denies everyone.
    pub async fn deactivate(&self, id: Uuid) -> WardenResult<Permission> {
        let permission = self
            .repo
            .update(
                id,
                UpdatePermission {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await?;
        self.snapshot.remove(&permission.capability());
        info!(permission = %permission.name, "Permission deactivated");
        Ok(permission)
    }

    /// Hard delete of a custom permission that nothing grants or
    /// overrides any more.
    pub async fn delete(&self, id: Uuid) -> WardenResult<()> {
        self.repo.delete(id).await?;
        self.snapshot.retain(|_, entry| entry.permission.id != id);
        Ok(())
    }

    pub async fn list(&self, pagination: Pagination) -> WardenResult<PaginatedResult<Permission>> {
        self.repo.list(pagination).await
    }
}

fn default_description(capability: Capability) -> String {
    let resource = capability.resource.as_str().replace('_', " ");
    match capability.action {
        ActionType::Read => format!("View {resource} records"),
        ActionType::Write => format!("Create and edit {resource} records"),
        ActionType::Delete => format!("Delete {resource} records"),
        ActionType::Manage => format!("Manage {resource} settings"),
        ActionType::Admin => format!("Full administrative control over {resource}"),
    }
}
