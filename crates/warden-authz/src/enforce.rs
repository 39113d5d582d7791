//! Per-request enforcement: identity extraction, decision, and the
//! translation of a verdict into allow / 401 / 403.

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;
use warden_core::models::audit::{AuditContext, DecisionSource};
use warden_core::models::permission::Capability;

use crate::decision::PermissionChecker;
use crate::error::AuthzError;
use crate::token::TokenVerifier;

/// What the transport layer knows about an incoming request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Actor id from an already-authenticated session, if any.
    pub actor_id: Option<Uuid>,
    /// Raw bearer access token, if the request carried one.
    pub bearer_token: Option<String>,
    pub ip_address: Option<String>,
    pub client_id: Option<String>,
    /// Set by the enforcer once a requirement was satisfied.
    pub authorization: Option<Authorized>,
}

impl RequestContext {
    fn audit_context(&self) -> AuditContext {
        AuditContext {
            ip_address: self.ip_address.clone(),
            client_id: self.client_id.clone(),
        }
    }
}

/// Proof that a request passed a capability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Authorized {
    pub actor_id: Uuid,
    pub capability: Capability,
    pub source: DecisionSource,
}

pub struct Enforcer<E: PermissionChecker> {
    engine: E,
    tokens: Option<TokenVerifier>,
}

impl<E: PermissionChecker> Enforcer<E> {
    /// Without a token verifier only session-provided actor ids are
    /// accepted.
    pub fn new(engine: E, tokens: Option<TokenVerifier>) -> Self {
        Self { engine, tokens }
    }

    fn actor_of(&self, ctx: &RequestContext) -> Result<Uuid, AuthzError> {
        if let Some(actor_id) = ctx.actor_id {
            return Ok(actor_id);
        }
        match (&ctx.bearer_token, &self.tokens) {
            (Some(token), Some(verifier)) => verifier.actor_id(token),
            (Some(_), None) => {
                warn!("Bearer token presented but token verification is not configured");
                Err(AuthzError::Unauthenticated)
            }
            (None, _) => Err(AuthzError::Unauthenticated),
        }
    }

    /// Require one capability. On success the request context carries
    /// the [`Authorized`] proof.
    pub async fn authorize(
        &self,
        ctx: &mut RequestContext,
        capability: Capability,
        resource_id: Option<String>,
    ) -> Result<Authorized, AuthzError> {
        let actor_id = self.actor_of(ctx)?;

        let decision = self
            .engine
            .check_permission(actor_id, capability, resource_id, ctx.audit_context())
            .await;

        if !decision.allowed {
            return Err(if decision.infrastructure_failure {
                AuthzError::InfrastructureError {
                    reason: decision.reason,
                }
            } else {
                AuthzError::PolicyDenied {
                    reason: decision.reason,
                }
            });
        }

        let authorized = Authorized {
            actor_id,
            capability,
            source: decision.source,
        };
        ctx.authorization = Some(authorized.clone());
        Ok(authorized)
    }

    /// Require any one of `capabilities`, tried in order. Stops at the
    /// first allow; otherwise returns the last denial.
    pub async fn authorize_any(
        &self,
        ctx: &mut RequestContext,
        capabilities: &[Capability],
        resource_id: Option<String>,
    ) -> Result<Authorized, AuthzError> {
        let mut last = AuthzError::PolicyDenied {
            reason: "no capability requested".into(),
        };
        for capability in capabilities {
            match self.authorize(ctx, *capability, resource_id.clone()).await {
                Ok(authorized) => return Ok(authorized),
                Err(e) if e.is_denial() => last = e,
                Err(e) => return Err(e),
            }
        }
        Err(last)
    }
}
