//! Integration tests for role grants and user overrides using in-memory
//! SurrealDB.

use chrono::{Duration, Utc};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;
use warden_core::error::WardenError;
use warden_core::models::audit::{AuditKind, AuditOutcome, CreateAuditEntry};
use warden_core::models::grant::{GrantRolePermission, SetUserOverride};
use warden_core::models::permission::{
    ActionType, Capability, CreatePermission, Permission, ResourceType, UpdatePermission,
};
use warden_core::models::role::{CreateRole, Role};
use warden_core::models::user::{CreateUser, User};
use warden_core::repository::{
    AuditLogFilter, AuditLogRepository, GrantRepository, Pagination, PermissionRepository,
    RoleRepository, UserRepository,
};
use warden_db::repository::{
    SurrealAuditLogRepository, SurrealGrantRepository, SurrealPermissionRepository,
    SurrealRoleRepository, SurrealUserRepository,
};

struct Fixture {
    db: Surreal<Db>,
    admin: Uuid,
    editor: Role,
    alice: User,
    product_write: Permission,
    product_read: Permission,
}

/// Helper: in-memory DB with an `editor` role, user `alice` holding it,
/// and two product permissions.
async fn setup() -> Fixture {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    warden_db::run_migrations(&db).await.unwrap();

    let perms = SurrealPermissionRepository::new(db.clone());
    let product_write = perms
        .create(CreatePermission {
            capability: Capability::new(ResourceType::Product, ActionType::Write),
            description: "Edit products".into(),
            is_system: true,
        })
        .await
        .unwrap();
    let product_read = perms
        .create(CreatePermission {
            capability: Capability::new(ResourceType::Product, ActionType::Read),
            description: "View products".into(),
            is_system: true,
        })
        .await
        .unwrap();

    let editor = SurrealRoleRepository::new(db.clone())
        .create(CreateRole {
            name: "editor".into(),
            description: "Catalog editor".into(),
            is_system: false,
        })
        .await
        .unwrap();

    let alice = SurrealUserRepository::new(db.clone())
        .create(CreateUser {
            username: "alice".into(),
            role_id: editor.id,
        })
        .await
        .unwrap();

    Fixture {
        db,
        admin: Uuid::new_v4(),
        editor,
        alice,
        product_write,
        product_read,
    }
}

fn grant_audit(fx: &Fixture, kind: AuditKind, perm: &Permission, subject: Uuid) -> CreateAuditEntry {
    CreateAuditEntry::administrative(kind, fx.admin, perm.capability(), subject, "test change")
}

async fn audit_count(db: &Surreal<Db>, kind: AuditKind) -> u64 {
    SurrealAuditLogRepository::new(db.clone())
        .list(
            AuditLogFilter {
                kind: Some(kind),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap()
        .total
}

#[tokio::test]
async fn granting_twice_is_a_no_op() {
    let fx = setup().await;
    let repo = SurrealGrantRepository::new(fx.db.clone());

    let input = GrantRolePermission {
        role_id: fx.editor.id,
        permission_id: fx.product_write.id,
        granted_by: fx.admin,
    };

    let first = repo
        .grant_to_role(
            input.clone(),
            grant_audit(&fx, AuditKind::RoleGrantAdded, &fx.product_write, fx.editor.id),
        )
        .await
        .unwrap();
    let second = repo
        .grant_to_role(
            input,
            grant_audit(&fx, AuditKind::RoleGrantAdded, &fx.product_write, fx.editor.id),
        )
        .await
        .unwrap();

    assert!(first);
    assert!(!second, "second grant must report nothing changed");

    let grants = repo.list_role_grants(fx.editor.id).await.unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].granted_by, fx.admin);

    // Only the effective change is audited.
    assert_eq!(audit_count(&fx.db, AuditKind::RoleGrantAdded).await, 1);
}

#[tokio::test]
async fn concurrent_grants_leave_one_row() {
    let fx = setup().await;
    let repo = SurrealGrantRepository::new(fx.db.clone());

    let grant = |repo: SurrealGrantRepository<Db>| {
        let input = GrantRolePermission {
            role_id: fx.editor.id,
            permission_id: fx.product_read.id,
            granted_by: fx.admin,
        };
        let audit = grant_audit(&fx, AuditKind::RoleGrantAdded, &fx.product_read, fx.editor.id);
        async move { repo.grant_to_role(input, audit).await }
    };

    let (a, b) = tokio::join!(grant(repo.clone()), grant(repo.clone()));
    let a = a.unwrap();
    let b = b.unwrap();
    assert!(a || b, "one of the grants must take effect");

    assert_eq!(repo.list_role_grants(fx.editor.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn revoke_removes_grant_and_audits() {
    let fx = setup().await;
    let repo = SurrealGrantRepository::new(fx.db.clone());

    repo.grant_to_role(
        GrantRolePermission {
            role_id: fx.editor.id,
            permission_id: fx.product_write.id,
            granted_by: fx.admin,
        },
        grant_audit(&fx, AuditKind::RoleGrantAdded, &fx.product_write, fx.editor.id),
    )
    .await
    .unwrap();

    let removed = repo
        .revoke_from_role(
            fx.editor.id,
            fx.product_write.id,
            grant_audit(&fx, AuditKind::RoleGrantRemoved, &fx.product_write, fx.editor.id),
        )
        .await
        .unwrap();
    assert!(removed);
    assert!(repo.get_role_permissions(fx.editor.id).await.unwrap().is_empty());

    let again = repo
        .revoke_from_role(
            fx.editor.id,
            fx.product_write.id,
            grant_audit(&fx, AuditKind::RoleGrantRemoved, &fx.product_write, fx.editor.id),
        )
        .await
        .unwrap();
    assert!(!again);
    assert_eq!(audit_count(&fx.db, AuditKind::RoleGrantRemoved).await, 1);
}

#[tokio::test]
async fn role_permissions_include_inactive_ones() {
    let fx = setup().await;
    let repo = SurrealGrantRepository::new(fx.db.clone());

    for perm in [&fx.product_write, &fx.product_read] {
        repo.grant_to_role(
            GrantRolePermission {
                role_id: fx.editor.id,
                permission_id: perm.id,
                granted_by: fx.admin,
            },
            grant_audit(&fx, AuditKind::RoleGrantAdded, perm, fx.editor.id),
        )
        .await
        .unwrap();
    }

    SurrealPermissionRepository::new(fx.db.clone())
        .update(
            fx.product_write.id,
            UpdatePermission {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let perms = repo.get_role_permissions(fx.editor.id).await.unwrap();
    assert_eq!(perms.len(), 2);
    let write = perms.iter().find(|p| p.id == fx.product_write.id).unwrap();
    assert!(!write.is_active);
}

#[tokio::test]
async fn override_set_twice_keeps_last_write() {
    let fx = setup().await;
    let repo = SurrealGrantRepository::new(fx.db.clone());

    let first = repo
        .set_user_override(
            SetUserOverride {
                user_id: fx.alice.id,
                permission_id: fx.product_write.id,
                is_granted: false,
                granted_by: fx.admin,
                reason: "under review".into(),
                expires_at: Some(Utc::now() + Duration::hours(1)),
            },
            grant_audit(&fx, AuditKind::UserOverrideSet, &fx.product_write, fx.alice.id),
        )
        .await
        .unwrap();
    assert!(!first.is_granted);
    assert!(first.expires_at.is_some());

    let second = repo
        .set_user_override(
            SetUserOverride {
                user_id: fx.alice.id,
                permission_id: fx.product_write.id,
                is_granted: true,
                granted_by: fx.admin,
                reason: "review passed".into(),
                expires_at: None,
            },
            grant_audit(&fx, AuditKind::UserOverrideSet, &fx.product_write, fx.alice.id),
        )
        .await
        .unwrap();
    assert!(second.is_granted);
    assert_eq!(second.reason, "review passed");
    assert!(second.expires_at.is_none());

    let stored = repo.list_user_overrides(fx.alice.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].is_granted);

    // Each set is its own audited change.
    assert_eq!(audit_count(&fx.db, AuditKind::UserOverrideSet).await, 2);
}

#[tokio::test]
async fn expired_override_is_still_stored() {
    let fx = setup().await;
    let repo = SurrealGrantRepository::new(fx.db.clone());

    repo.set_user_override(
        SetUserOverride {
            user_id: fx.alice.id,
            permission_id: fx.product_read.id,
            is_granted: false,
            granted_by: fx.admin,
            reason: "temporary".into(),
            expires_at: Some(Utc::now() - Duration::minutes(5)),
        },
        grant_audit(&fx, AuditKind::UserOverrideSet, &fx.product_read, fx.alice.id),
    )
    .await
    .unwrap();

    let stored = repo
        .get_user_override(fx.alice.id, fx.product_read.id)
        .await
        .unwrap()
        .expect("override row is kept until cleared");
    assert!(stored.is_expired_at(Utc::now()));
}

#[tokio::test]
async fn clear_override_removes_it() {
    let fx = setup().await;
    let repo = SurrealGrantRepository::new(fx.db.clone());

    repo.set_user_override(
        SetUserOverride {
            user_id: fx.alice.id,
            permission_id: fx.product_write.id,
            is_granted: true,
            granted_by: fx.admin,
            reason: "launch week".into(),
            expires_at: None,
        },
        grant_audit(&fx, AuditKind::UserOverrideSet, &fx.product_write, fx.alice.id),
    )
    .await
    .unwrap();

    let cleared = repo
        .clear_user_override(
            fx.alice.id,
            fx.product_write.id,
            grant_audit(&fx, AuditKind::UserOverrideCleared, &fx.product_write, fx.alice.id),
        )
        .await
        .unwrap();
    assert!(cleared);
    assert!(
        repo.get_user_override(fx.alice.id, fx.product_write.id)
            .await
            .unwrap()
            .is_none()
    );

    let again = repo
        .clear_user_override(
            fx.alice.id,
            fx.product_write.id,
            grant_audit(&fx, AuditKind::UserOverrideCleared, &fx.product_write, fx.alice.id),
        )
        .await
        .unwrap();
    assert!(!again);

    let entries = SurrealAuditLogRepository::new(fx.db.clone())
        .list(
            AuditLogFilter {
                kind: Some(AuditKind::UserOverrideCleared),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(entries.total, 1);
    let entry = &entries.items[0];
    assert_eq!(entry.outcome, AuditOutcome::Success);
    assert_eq!(entry.subject_id, Some(fx.alice.id));
    assert_eq!(entry.actor_id, fx.admin);
}

#[tokio::test]
async fn custom_permission_delete_waits_for_audited_removal() {
    let fx = setup().await;
    let perms = SurrealPermissionRepository::new(fx.db.clone());
    let repo = SurrealGrantRepository::new(fx.db.clone());

    let custom = perms
        .create(CreatePermission {
            capability: Capability::new(ResourceType::Search, ActionType::Manage),
            description: "Tune search".into(),
            is_system: false,
        })
        .await
        .unwrap();
    repo.grant_to_role(
        GrantRolePermission {
            role_id: fx.editor.id,
            permission_id: custom.id,
            granted_by: fx.admin,
        },
        grant_audit(&fx, AuditKind::RoleGrantAdded, &custom, fx.editor.id),
    )
    .await
    .unwrap();
    repo.set_user_override(
        SetUserOverride {
            user_id: fx.alice.id,
            permission_id: custom.id,
            is_granted: false,
            granted_by: fx.admin,
            reason: "no".into(),
            expires_at: None,
        },
        grant_audit(&fx, AuditKind::UserOverrideSet, &custom, fx.alice.id),
    )
    .await
    .unwrap();

    // Still granted to a role.
    let err = perms.delete(custom.id).await.unwrap_err();
    assert!(matches!(err, WardenError::ConstraintViolation(ref m) if m.contains("granted")));
    assert_eq!(repo.list_role_grants(fx.editor.id).await.unwrap().len(), 1);

    repo.revoke_from_role(
        fx.editor.id,
        custom.id,
        grant_audit(&fx, AuditKind::RoleGrantRemoved, &custom, fx.editor.id),
    )
    .await
    .unwrap();

    // Still overridden for alice.
    let err = perms.delete(custom.id).await.unwrap_err();
    assert!(matches!(err, WardenError::ConstraintViolation(ref m) if m.contains("overrides")));
    assert_eq!(repo.list_user_overrides(fx.alice.id).await.unwrap().len(), 1);

    repo.clear_user_override(
        fx.alice.id,
        custom.id,
        grant_audit(&fx, AuditKind::UserOverrideCleared, &custom, fx.alice.id),
    )
    .await
    .unwrap();

    perms.delete(custom.id).await.unwrap();
    assert!(perms.get_by_id(custom.id).await.unwrap_err().is_not_found());

    // Every removal left its trace.
    assert_eq!(audit_count(&fx.db, AuditKind::RoleGrantRemoved).await, 1);
    assert_eq!(audit_count(&fx.db, AuditKind::UserOverrideCleared).await, 1);
}

#[tokio::test]
async fn role_holding_grants_cannot_be_deleted() {
    let fx = setup().await;
    let roles = SurrealRoleRepository::new(fx.db.clone());
    let repo = SurrealGrantRepository::new(fx.db.clone());

    let auditor = roles
        .create(CreateRole {
            name: "auditor".into(),
            description: "Reads everything".into(),
            is_system: false,
        })
        .await
        .unwrap();
    repo.grant_to_role(
        GrantRolePermission {
            role_id: auditor.id,
            permission_id: fx.product_read.id,
            granted_by: fx.admin,
        },
        grant_audit(&fx, AuditKind::RoleGrantAdded, &fx.product_read, auditor.id),
    )
    .await
    .unwrap();

    let err = roles.delete(auditor.id).await.unwrap_err();
    assert!(matches!(err, WardenError::ConstraintViolation(_)));
    assert!(roles.get_by_id(auditor.id).await.is_ok());

    repo.revoke_from_role(
        auditor.id,
        fx.product_read.id,
        grant_audit(&fx, AuditKind::RoleGrantRemoved, &fx.product_read, auditor.id),
    )
    .await
    .unwrap();
    roles.delete(auditor.id).await.unwrap();
    assert!(roles.get_by_id(auditor.id).await.unwrap_err().is_not_found());
}

// ---------------------------------------------------------------------------
// Atomicity of a change and its audit entry
// ---------------------------------------------------------------------------

/// Make every further audit insert fail at the storage layer.
async fn reject_audit_writes(db: &Surreal<Db>) {
    db.query(
        "DEFINE FIELD OVERWRITE reason ON TABLE audit_log TYPE string \
         ASSERT $value = '__never__'",
    )
    .await
    .unwrap()
    .check()
    .unwrap();
}

/// `editor` holds `product.read`; alice has a deny override on
/// `product.write`.
async fn setup_with_grant_and_override() -> Fixture {
    let fx = setup().await;
    let repo = SurrealGrantRepository::new(fx.db.clone());
    repo.grant_to_role(
        GrantRolePermission {
            role_id: fx.editor.id,
            permission_id: fx.product_read.id,
            granted_by: fx.admin,
        },
        grant_audit(&fx, AuditKind::RoleGrantAdded, &fx.product_read, fx.editor.id),
    )
    .await
    .unwrap();
    repo.set_user_override(
        SetUserOverride {
            user_id: fx.alice.id,
            permission_id: fx.product_write.id,
            is_granted: false,
            granted_by: fx.admin,
            reason: "frozen".into(),
            expires_at: None,
        },
        grant_audit(&fx, AuditKind::UserOverrideSet, &fx.product_write, fx.alice.id),
    )
    .await
    .unwrap();
    fx
}

#[tokio::test]
async fn grant_is_not_stored_when_its_audit_entry_fails() {
    let fx = setup().await;
    let repo = SurrealGrantRepository::new(fx.db.clone());
    reject_audit_writes(&fx.db).await;

    let result = repo
        .grant_to_role(
            GrantRolePermission {
                role_id: fx.editor.id,
                permission_id: fx.product_write.id,
                granted_by: fx.admin,
            },
            grant_audit(&fx, AuditKind::RoleGrantAdded, &fx.product_write, fx.editor.id),
        )
        .await;

    assert!(result.is_err());
    assert!(repo.list_role_grants(fx.editor.id).await.unwrap().is_empty());
    assert_eq!(audit_count(&fx.db, AuditKind::RoleGrantAdded).await, 0);
}

#[tokio::test]
async fn revoke_is_undone_when_its_audit_entry_fails() {
    let fx = setup_with_grant_and_override().await;
    let repo = SurrealGrantRepository::new(fx.db.clone());
    reject_audit_writes(&fx.db).await;

    let result = repo
        .revoke_from_role(
            fx.editor.id,
            fx.product_read.id,
            grant_audit(&fx, AuditKind::RoleGrantRemoved, &fx.product_read, fx.editor.id),
        )
        .await;

    assert!(result.is_err());
    let grants = repo.list_role_grants(fx.editor.id).await.unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].permission_id, fx.product_read.id);
    assert_eq!(audit_count(&fx.db, AuditKind::RoleGrantRemoved).await, 0);
}

#[tokio::test]
async fn override_is_unchanged_when_its_audit_entry_fails() {
    let fx = setup_with_grant_and_override().await;
    let repo = SurrealGrantRepository::new(fx.db.clone());
    reject_audit_writes(&fx.db).await;

    let result = repo
        .set_user_override(
            SetUserOverride {
                user_id: fx.alice.id,
                permission_id: fx.product_write.id,
                is_granted: true,
                granted_by: fx.admin,
                reason: "thawed".into(),
                expires_at: Some(Utc::now() + Duration::hours(1)),
            },
            grant_audit(&fx, AuditKind::UserOverrideSet, &fx.product_write, fx.alice.id),
        )
        .await;

    assert!(result.is_err());
    let stored = repo
        .get_user_override(fx.alice.id, fx.product_write.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.is_granted);
    assert_eq!(stored.reason, "frozen");
    assert!(stored.expires_at.is_none());
    assert_eq!(audit_count(&fx.db, AuditKind::UserOverrideSet).await, 1);
}

#[tokio::test]
async fn override_survives_a_clear_whose_audit_entry_fails() {
    let fx = setup_with_grant_and_override().await;
    let repo = SurrealGrantRepository::new(fx.db.clone());
    reject_audit_writes(&fx.db).await;

    let result = repo
        .clear_user_override(
            fx.alice.id,
            fx.product_write.id,
            grant_audit(&fx, AuditKind::UserOverrideCleared, &fx.product_write, fx.alice.id),
        )
        .await;

    assert!(result.is_err());
    assert!(
        repo.get_user_override(fx.alice.id, fx.product_write.id)
            .await
            .unwrap()
            .is_some()
    );
    assert_eq!(audit_count(&fx.db, AuditKind::UserOverrideCleared).await, 0);
}
