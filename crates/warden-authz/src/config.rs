//! Authorization configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the authorization layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthzConfig {
    /// How long resolved permissions, role grant sets and user overrides
    /// may be served from memory (default: 5). `0` disables caching.
    pub cache_ttl_secs: u64,
    /// Capacity of the queued audit sink (default: 1024).
    pub audit_queue_capacity: usize,
    /// How long a decision may wait for room in a full audit queue before
    /// the entry is rejected (default: 50 ms).
    pub audit_enqueue_timeout_ms: u64,
    /// Upper bound for a single audit write (default: 2000 ms).
    pub audit_write_timeout_ms: u64,
    /// Retries after a failed queued audit write (default: 5).
    pub audit_max_retries: u32,
    /// Delay before the first retry (default: 100 ms).
    pub audit_retry_initial_delay_ms: u64,
    /// Exponential backoff multiplier between retries (default: 2.0).
    pub audit_backoff_multiplier: f64,
    /// Upper bound for the delay between retries (default: 30000 ms).
    pub audit_retry_max_delay_ms: u64,
    /// PEM-encoded Ed25519 public key for access token verification.
    /// Empty disables bearer tokens.
    pub jwt_public_key_pem: String,
    /// PEM-encoded Ed25519 private key. Only needed to issue tokens.
    pub jwt_private_key_pem: String,
    /// Expected `iss` claim.
    pub jwt_issuer: String,
    /// Access token lifetime in seconds (default: 900 = 15 minutes).
    pub access_token_lifetime_secs: u64,
}

impl AuthzConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn audit_enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.audit_enqueue_timeout_ms)
    }

    pub fn audit_write_timeout(&self) -> Duration {
        Duration::from_millis(self.audit_write_timeout_ms)
    }

    pub fn audit_retry_initial_delay(&self) -> Duration {
        Duration::from_millis(self.audit_retry_initial_delay_ms)
    }

    pub fn audit_retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.audit_retry_max_delay_ms)
    }
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 5,
            audit_queue_capacity: 1024,
            audit_enqueue_timeout_ms: 50,
            audit_write_timeout_ms: 2000,
            audit_max_retries: 5,
            audit_retry_initial_delay_ms: 100,
            audit_backoff_multiplier: 2.0,
            audit_retry_max_delay_ms: 30_000,
            jwt_public_key_pem: String::new(),
            jwt_private_key_pem: String::new(),
            jwt_issuer: "warden".into(),
            access_token_lifetime_secs: 900,
        }
    }
}
