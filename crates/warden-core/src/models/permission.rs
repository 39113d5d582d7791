//! Permission domain model and the closed capability vocabulary.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WardenError;

/// Every resource type the administration backend can protect.
///
/// Closed on purpose: a typo in a resource name is a parse error, not a
/// new, unreachable permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Product,
    Category,
    Order,
    Cart,
    Customer,
    Notification,
    Shipping,
    Search,
    File,
    User,
    Role,
    Permission,
    AuditLog,
    RateLimit,
    System,
}

impl ResourceType {
    pub const ALL: [ResourceType; 15] = [
        ResourceType::Product,
        ResourceType::Category,
        ResourceType::Order,
        ResourceType::Cart,
        ResourceType::Customer,
        ResourceType::Notification,
        ResourceType::Shipping,
        ResourceType::Search,
        ResourceType::File,
        ResourceType::User,
        ResourceType::Role,
        ResourceType::Permission,
        ResourceType::AuditLog,
        ResourceType::RateLimit,
        ResourceType::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Product => "product",
            ResourceType::Category => "category",
            ResourceType::Order => "order",
            ResourceType::Cart => "cart",
            ResourceType::Customer => "customer",
            ResourceType::Notification => "notification",
            ResourceType::Shipping => "shipping",
            ResourceType::Search => "search",
            ResourceType::File => "file",
            ResourceType::User => "user",
            ResourceType::Role => "role",
            ResourceType::Permission => "permission",
            ResourceType::AuditLog => "audit_log",
            ResourceType::RateLimit => "rate_limit",
            ResourceType::System => "system",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| WardenError::Validation {
                message: format!("unknown resource type: {s}"),
            })
    }
}

/// The fixed set of actions a permission can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Read,
    Write,
    Delete,
    Manage,
    Admin,
}

impl ActionType {
    pub const ALL: [ActionType; 5] = [
        ActionType::Read,
        ActionType::Write,
        ActionType::Delete,
        ActionType::Manage,
        ActionType::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Read => "read",
            ActionType::Write => "write",
            ActionType::Delete => "delete",
            ActionType::Manage => "manage",
            ActionType::Admin => "admin",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| WardenError::Validation {
                message: format!("unknown action type: {s}"),
            })
    }
}

/// A (resource-type, action-type) pair: one checkable capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    pub resource: ResourceType,
    pub action: ActionType,
}

impl Capability {
    pub const fn new(resource: ResourceType, action: ActionType) -> Self {
        Self { resource, action }
    }

    /// Stable permission name, e.g. `order.write`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.resource.as_str(), self.action.as_str())
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.action)
    }
}

impl FromStr for Capability {
    type Err = WardenError;

    /// Parses the stable name form (`order.write`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (resource, action) = s.split_once('.').ok_or_else(|| WardenError::Validation {
            message: format!("capability must look like <resource>.<action>: {s}"),
        })?;
        Ok(Self::new(resource.parse()?, action.parse()?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    /// Derived from the capability; unique.
    pub name: String,
    pub resource_type: ResourceType,
    pub action_type: ActionType,
    pub description: String,
    pub is_active: bool,
    /// System-protected permissions can be deactivated but never deleted.
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    pub fn capability(&self) -> Capability {
        Capability::new(self.resource_type, self.action_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePermission {
    pub capability: Capability,
    pub description: String,
    pub is_system: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdatePermission {
    pub description: Option<String>,
    pub is_active: Option<bool>,
}
