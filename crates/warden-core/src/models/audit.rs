//! Audit log domain model.
//!
//! Audit entries are append-only: they record every authorization
//! decision and every administrative grant change, and are the system of
//! record for "why was this allowed".

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::permission::{ActionType, Capability, ResourceType};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Decision,
    RoleGrantAdded,
    RoleGrantRemoved,
    UserOverrideSet,
    UserOverrideCleared,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::Decision => "decision",
            AuditKind::RoleGrantAdded => "role_grant_added",
            AuditKind::RoleGrantRemoved => "role_grant_removed",
            AuditKind::UserOverrideSet => "user_override_set",
            AuditKind::UserOverrideCleared => "user_override_cleared",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "decision" => Some(AuditKind::Decision),
            "role_grant_added" => Some(AuditKind::RoleGrantAdded),
            "role_grant_removed" => Some(AuditKind::RoleGrantRemoved),
            "user_override_set" => Some(AuditKind::UserOverrideSet),
            "user_override_cleared" => Some(AuditKind::UserOverrideCleared),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Allow,
    Deny,
    /// Administrative change committed.
    Success,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Allow => "allow",
            AuditOutcome::Deny => "deny",
            AuditOutcome::Success => "success",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(AuditOutcome::Allow),
            "deny" => Some(AuditOutcome::Deny),
            "success" => Some(AuditOutcome::Success),
            _ => None,
        }
    }
}

/// Which mechanism produced a verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    UserOverride,
    Role,
    None,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionSource::UserOverride => "user_override",
            DecisionSource::Role => "role",
            DecisionSource::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user_override" => Some(DecisionSource::UserOverride),
            "role" => Some(DecisionSource::Role),
            "none" => Some(DecisionSource::None),
            _ => None,
        }
    }
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request metadata captured alongside every audit entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditContext {
    pub ip_address: Option<String>,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub kind: AuditKind,
    pub actor_id: Uuid,
    pub resource_type: ResourceType,
    pub action_type: ActionType,
    /// Advisory only; never evaluated by the decision engine.
    pub resource_id: Option<String>,
    pub outcome: AuditOutcome,
    /// Absent for administrative entries.
    pub source: Option<DecisionSource>,
    pub reason: String,
    /// Role or user changed by an administrative entry.
    pub subject_id: Option<Uuid>,
    pub context: AuditContext,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateAuditEntry {
    pub kind: AuditKind,
    pub actor_id: Uuid,
    pub capability: Capability,
    pub resource_id: Option<String>,
    pub outcome: AuditOutcome,
    pub source: Option<DecisionSource>,
    pub reason: String,
    pub subject_id: Option<Uuid>,
    pub context: AuditContext,
}

impl CreateAuditEntry {
    /// Entry for an administrative grant change performed by `actor_id`
    /// on `subject_id` (a role or a user).
    pub fn administrative(
        kind: AuditKind,
        actor_id: Uuid,
        capability: Capability,
        subject_id: Uuid,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            actor_id,
            capability,
            resource_id: None,
            outcome: AuditOutcome::Success,
            source: None,
            reason: reason.into(),
            subject_id: Some(subject_id),
            context: AuditContext::default(),
        }
    }
}
