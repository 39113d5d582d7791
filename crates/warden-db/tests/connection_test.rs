//! Integration tests for connection management over the embedded engine.

use warden_db::{DbConfig, DbManager};

#[tokio::test]
async fn in_memory_url_connects_and_migrates() {
    let config = DbConfig {
        migrate_on_connect: true,
        ..DbConfig::in_memory()
    };

    let manager = DbManager::connect(&config).await.unwrap();
    assert!(manager.is_embedded());

    let mut result = manager
        .client()
        .query("SELECT count() AS total FROM _migration GROUP ALL")
        .await
        .unwrap();
    let rows: Vec<surrealdb_types::Value> = result.take(0).unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn embedded_engine_ignores_root_credentials() {
    let config = DbConfig {
        username: "root".into(),
        password: "root".into(),
        ..DbConfig::in_memory()
    };

    let manager = DbManager::connect(&config).await.unwrap();

    // Not migrated: the schema tables are absent.
    let mut result = manager.client().query("INFO FOR DB").await.unwrap();
    let info: Option<surrealdb_types::Value> = result.take(0).unwrap();
    assert!(!format!("{info:?}").contains("audit_log"));
}

#[test]
fn default_config_targets_a_server() {
    let config = DbConfig::default();
    assert!(config.url.starts_with("ws://"));
    assert!(!config.migrate_on_connect);
    assert_eq!(DbConfig::in_memory().namespace, config.namespace);
}
