//! Decision engine.
//!
//! Evaluation order, first match wins:
//! 1. the capability must resolve to an active permission;
//! 2. the actor must exist and be active;
//! 3. a non-expired user override decides (allow or deny);
//! 4. the actor's active role must hold the permission.
//!
//! Storage errors fail closed: the verdict is a denial flagged as an
//! infrastructure failure. Every evaluation produces exactly one audit
//! entry, after the verdict is known.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error};
use uuid::Uuid;
use warden_core::error::{WardenError, WardenResult};
use warden_core::models::audit::{
    AuditContext, AuditKind, AuditOutcome, CreateAuditEntry, DecisionSource,
};
use warden_core::models::permission::Capability;
use warden_core::repository::{
    GrantRepository, PermissionRepository, RoleRepository, UserRepository,
};

use crate::audit::AuditSink;
use crate::catalog::PermissionCatalog;
use crate::store::GrantStore;

pub const REASON_UNKNOWN_CAPABILITY: &str = "unknown or inactive capability";
pub const REASON_UNKNOWN_ACTOR: &str = "unknown actor";
pub const REASON_INACTIVE_ACTOR: &str = "actor is inactive";
pub const REASON_NO_GRANT: &str = "no role or user grant";
pub const REASON_BACKEND_UNAVAILABLE: &str = "authorization backend unavailable";

/// Outcome of one permission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub source: DecisionSource,
    pub reason: String,
    /// The denial was caused by a storage failure, not by policy.
    pub infrastructure_failure: bool,
}

impl Decision {
    fn allow(source: DecisionSource, reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            source,
            reason: reason.into(),
            infrastructure_failure: false,
        }
    }

    fn deny(source: DecisionSource, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            source,
            reason: reason.into(),
            infrastructure_failure: false,
        }
    }

    fn backend_unavailable(err: &WardenError) -> Self {
        Self {
            allowed: false,
            source: DecisionSource::None,
            reason: format!("{REASON_BACKEND_UNAVAILABLE}: {err}"),
            infrastructure_failure: true,
        }
    }

    fn outcome(&self) -> AuditOutcome {
        if self.allowed {
            AuditOutcome::Allow
        } else {
            AuditOutcome::Deny
        }
    }
}

/// Anything that can answer "may this actor do this".
pub trait PermissionChecker: Send + Sync {
    fn check_permission(
        &self,
        actor_id: Uuid,
        capability: Capability,
        resource_id: Option<String>,
        context: AuditContext,
    ) -> impl Future<Output = Decision> + Send;
}

impl<T: PermissionChecker> PermissionChecker for Arc<T> {
    fn check_permission(
        &self,
        actor_id: Uuid,
        capability: Capability,
        resource_id: Option<String>,
        context: AuditContext,
    ) -> impl Future<Output = Decision> + Send {
        (**self).check_permission(actor_id, capability, resource_id, context)
    }
}

pub struct DecisionEngine<P, R, G, U, A>
where
    P: PermissionRepository,
    R: RoleRepository,
    G: GrantRepository,
    U: UserRepository,
    A: AuditSink,
{
    catalog: Arc<PermissionCatalog<P>>,
    store: Arc<GrantStore<R, G>>,
    users: U,
    audit: A,
    audit_failures: AtomicU64,
}

impl<P, R, G, U, A> DecisionEngine<P, R, G, U, A>
where
    P: PermissionRepository,
    R: RoleRepository,
    G: GrantRepository,
    U: UserRepository,
    A: AuditSink,
{
    pub fn new(
        catalog: Arc<PermissionCatalog<P>>,
        store: Arc<GrantStore<R, G>>,
        users: U,
        audit: A,
    ) -> Self {
        Self {
            catalog,
            store,
            users,
            audit,
            audit_failures: AtomicU64::new(0),
        }
    }

    /// Audit entries the sink refused since startup.
    pub fn audit_failures(&self) -> u64 {
        self.audit_failures.load(Ordering::Relaxed)
    }

    async fn evaluate(&self, actor_id: Uuid, capability: Capability) -> WardenResult<Decision> {
        let permission = match self.catalog.resolve(capability).await {
            Ok(p) if p.is_active => p,
            Ok(_) | Err(WardenError::NotFound { .. }) => {
                return Ok(Decision::deny(DecisionSource::None, REASON_UNKNOWN_CAPABILITY));
            }
            Err(e) => return Err(e),
        };

        let actor = match self.users.get_by_id(actor_id).await {
            Ok(user) => user,
            Err(WardenError::NotFound { .. }) => {
                return Ok(Decision::deny(DecisionSource::None, REASON_UNKNOWN_ACTOR));
            }
            Err(e) => return Err(e),
        };
        if !actor.is_active {
            return Ok(Decision::deny(DecisionSource::None, REASON_INACTIVE_ACTOR));
        }

        if let Some(o) = self
            .store
            .override_of(actor.id, permission.id, Utc::now())
            .await?
        {
            return Ok(if o.is_granted {
                Decision::allow(
                    DecisionSource::UserOverride,
                    format!("granted by user override: {}", o.reason),
                )
            } else {
                Decision::deny(
                    DecisionSource::UserOverride,
                    format!("denied by user override: {}", o.reason),
                )
            });
        }

        let granted = self.store.permissions_of(actor.role_id).await?;
        if granted.iter().any(|p| p.id == permission.id) {
            Ok(Decision::allow(DecisionSource::Role, "granted by role"))
        } else {
            Ok(Decision::deny(DecisionSource::None, REASON_NO_GRANT))
        }
    }
}

impl<P, R, G, U, A> PermissionChecker for DecisionEngine<P, R, G, U, A>
where
    P: PermissionRepository,
    R: RoleRepository,
    G: GrantRepository,
    U: UserRepository,
    A: AuditSink,
{
    /// Decide, audit, return. Never fails: errors become denials.
    async fn check_permission(
        &self,
        actor_id: Uuid,
        capability: Capability,
        resource_id: Option<String>,
        context: AuditContext,
    ) -> Decision {
        let decision = match self.evaluate(actor_id, capability).await {
            Ok(decision) => decision,
            Err(e) => {
                error!(
                    error = %e,
                    %actor_id,
                    %capability,
                    "Authorization backend unavailable, denying"
                );
                Decision::backend_unavailable(&e)
            }
        };

        debug!(
            %actor_id,
            %capability,
            resource_id = resource_id.as_deref(),
            allowed = decision.allowed,
            source = %decision.source,
            reason = %decision.reason,
            "Permission checked"
        );

        let entry = CreateAuditEntry {
            kind: AuditKind::Decision,
            actor_id,
            capability,
            resource_id,
            outcome: decision.outcome(),
            source: Some(decision.source),
            reason: decision.reason.clone(),
            subject_id: None,
            context,
        };
        if let Err(e) = self.audit.record(entry).await {
            self.audit_failures.fetch_add(1, Ordering::Relaxed);
            error!(
                error = %e,
                %actor_id,
                %capability,
                allowed = decision.allowed,
                "Failed to record decision audit entry"
            );
        }

        decision
    }
}
