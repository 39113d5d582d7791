//! Server configuration.
//!
//! Sources, lowest priority first: built-in defaults, an optional
//! configuration file, then `WARDEN__`-prefixed environment variables
//! (`WARDEN__DATABASE__URL`, `WARDEN__AUTHZ__CACHE_TTL_SECS`, ...).

use std::path::Path;

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use warden_authz::AuthzConfig;
use warden_db::DbConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub database: DbConfig,
    pub authz: AuthzConfig,
}

impl ServerConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        Self::from_builder(builder.add_source(Environment::with_prefix("WARDEN").separator("__")))
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }
}
