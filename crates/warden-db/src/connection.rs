//! SurrealDB connection management.
//!
//! The engine is chosen by the URL scheme: `ws://` / `wss://` for a
//! server, `mem://` for an embedded in-memory store. Credentials are only
//! presented to remote engines.

use serde::Deserialize;
use surrealdb::Surreal;
use surrealdb::engine::any::{self, Any};
use surrealdb::opt::auth::Root;
use tracing::info;

use crate::error::DbError;
use crate::schema::run_migrations;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Engine URL, e.g. `ws://127.0.0.1:8000` or `mem://`.
    pub url: String,
    pub namespace: String,
    pub database: String,
    /// Root credentials. Leave `username` empty to skip sign-in.
    pub username: String,
    pub password: String,
    /// Apply pending schema migrations right after connecting.
    pub migrate_on_connect: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000".into(),
            namespace: "warden".into(),
            database: "main".into(),
            username: "root".into(),
            password: "root".into(),
            migrate_on_connect: false,
        }
    }
}

impl DbConfig {
    /// Embedded in-memory store; nothing survives the process.
    pub fn in_memory() -> Self {
        Self {
            url: "mem://".into(),
            username: String::new(),
            password: String::new(),
            ..Self::default()
        }
    }

    fn is_embedded(&self) -> bool {
        self.url.starts_with("mem:")
    }
}

/// An open connection, namespace and database selected.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Any>,
    embedded: bool,
}

impl DbManager {
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        let embedded = config.is_embedded();
        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            embedded,
            "Connecting to SurrealDB"
        );

        let db = any::connect(config.url.as_str()).await?;

        if !embedded && !config.username.is_empty() {
            db.signin(Root {
                username: config.username.clone(),
                password: config.password.clone(),
            })
            .await?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        if config.migrate_on_connect {
            run_migrations(&db).await?;
        }

        info!(embedded, "SurrealDB ready");

        Ok(Self { db, embedded })
    }

    pub fn client(&self) -> &Surreal<Any> {
        &self.db
    }

    /// Whether the store lives inside this process.
    pub fn is_embedded(&self) -> bool {
        self.embedded
    }
}
