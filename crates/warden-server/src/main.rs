//! Warden operator binary.
//!
//! Every subcommand prints its result as JSON on stdout. Logs go to stderr
//! as JSON lines, filtered by `RUST_LOG`. Failures print
//! `{"error", "status"}` and exit non-zero.

mod app;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use warden_core::models::audit::{AuditContext, AuditKind, AuditOutcome};
use warden_core::models::permission::{ActionType, Capability, ResourceType};
use warden_core::repository::{AuditLogFilter, Pagination};
use warden_db::DbManager;

use crate::app::{Action, App};
use crate::config::ServerConfig;

/// Warden authorization service
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Actor recorded as the author of administrative changes
    #[arg(long, env = "WARDEN_OPERATOR", default_value_t = Uuid::nil())]
    operator: Uuid,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply schema migrations, seed the permission catalog and the system roles
    Migrate,
    /// Create a custom role
    CreateRole {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Register an actor holding an existing role
    CreateUser {
        username: String,
        /// Role name
        #[arg(long)]
        role: String,
    },
    /// Evaluate one permission check and record it in the audit log
    Check {
        #[arg(long)]
        actor: Uuid,
        /// Capability name, e.g. `order.write`
        capability: Capability,
        #[arg(long)]
        resource_id: Option<String>,
        #[arg(long)]
        ip_address: Option<String>,
        #[arg(long)]
        client_id: Option<String>,
    },
    /// Grant a capability to a role
    Grant {
        /// Role name
        role: String,
        capability: Capability,
    },
    /// Revoke a capability from a role
    Revoke {
        /// Role name
        role: String,
        capability: Capability,
    },
    /// Grant or deny one capability to one actor, overriding their role
    OverrideSet {
        #[arg(long)]
        user: Uuid,
        capability: Capability,
        /// Record a deny instead of a grant
        #[arg(long)]
        deny: bool,
        #[arg(long)]
        reason: String,
        /// RFC 3339 timestamp after which the override no longer applies
        #[arg(long)]
        expires_at: Option<DateTime<Utc>>,
    },
    /// Remove an actor's override for one capability
    OverrideClear {
        #[arg(long)]
        user: Uuid,
        capability: Capability,
    },
    /// Query the audit log, newest first
    Audit {
        #[arg(long)]
        actor: Option<Uuid>,
        #[arg(long, value_parser = parse_kind)]
        kind: Option<AuditKind>,
        #[arg(long)]
        resource: Option<ResourceType>,
        #[arg(long)]
        action: Option<ActionType>,
        #[arg(long, value_parser = parse_outcome)]
        outcome: Option<AuditOutcome>,
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 50)]
        limit: u64,
    },
    /// Issue an access token for an actor
    Token {
        #[arg(long)]
        actor: Uuid,
    },
}

fn parse_kind(s: &str) -> Result<AuditKind, String> {
    AuditKind::parse(s).ok_or_else(|| format!("unknown audit kind: {s}"))
}

fn parse_outcome(s: &str) -> Result<AuditOutcome, String> {
    AuditOutcome::parse(s).ok_or_else(|| format!("unknown audit outcome: {s}"))
}

impl From<Command> for Action {
    fn from(command: Command) -> Self {
        match command {
            Command::Migrate => Action::Migrate,
            Command::CreateRole { name, description } => Action::CreateRole { name, description },
            Command::CreateUser { username, role } => Action::CreateUser { username, role },
            Command::Check {
                actor,
                capability,
                resource_id,
                ip_address,
                client_id,
            } => Action::Check {
                actor,
                capability,
                resource_id,
                context: AuditContext {
                    ip_address,
                    client_id,
                },
            },
            Command::Grant { role, capability } => Action::Grant { role, capability },
            Command::Revoke { role, capability } => Action::Revoke { role, capability },
            Command::OverrideSet {
                user,
                capability,
                deny,
                reason,
                expires_at,
            } => Action::OverrideSet {
                user,
                capability,
                is_granted: !deny,
                reason,
                expires_at,
            },
            Command::OverrideClear { user, capability } => {
                Action::OverrideClear { user, capability }
            }
            Command::Audit {
                actor,
                kind,
                resource,
                action,
                outcome,
                from,
                to,
                offset,
                limit,
            } => Action::Audit {
                filter: AuditLogFilter {
                    actor_id: actor,
                    kind,
                    resource_type: resource,
                    action_type: action,
                    outcome,
                    from,
                    to,
                },
                pagination: Pagination { offset, limit },
            },
            Command::Token { actor } => Action::Token { actor },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warden=info".parse()?))
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::load(cli.config.as_deref()).context("loading configuration")?;

    let db = DbManager::connect(&config.database)
        .await
        .context("connecting to SurrealDB")?;
    let app = App::new(db.client().clone(), config.authz);

    match app.execute(cli.command.into(), cli.operator).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!(error = %e, status = e.status_code(), "Command failed");
            println!(
                "{}",
                json!({ "error": e.to_string(), "status": e.status_code() })
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn override_set_defaults_to_a_grant() {
        let cli = Cli::try_parse_from([
            "warden",
            "override-set",
            "--user",
            "6f1c1d2e-0a3b-4c5d-8e9f-0123456789ab",
            "order.delete",
            "--reason",
            "incident 42",
        ])
        .unwrap();
        match Action::from(cli.command) {
            Action::OverrideSet {
                capability,
                is_granted,
                expires_at,
                ..
            } => {
                assert_eq!(capability.name(), "order.delete");
                assert!(is_granted);
                assert!(expires_at.is_none());
            }
            other => panic!("unexpected action: {other:?}"),
        }
        assert!(cli.operator.is_nil());
    }

    #[test]
    fn unknown_capability_is_a_usage_error() {
        let err = Cli::try_parse_from(["warden", "grant", "editor", "prodcut.read"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn audit_filters_are_optional() {
        let cli =
            Cli::try_parse_from(["warden", "audit", "--outcome", "deny", "--limit", "10"]).unwrap();
        match Action::from(cli.command) {
            Action::Audit { filter, pagination } => {
                assert_eq!(filter.outcome, Some(AuditOutcome::Deny));
                assert!(filter.actor_id.is_none());
                assert_eq!(pagination.limit, 10);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }
}
