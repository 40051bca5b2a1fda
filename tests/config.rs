//! Configuration file to running catalog

use std::io::Write;
use storage_gateway::{GatewayConfig, Registry, ServiceCatalog, TaskEngine, TaskEngineConfig};
use tempfile::NamedTempFile;
use tokio_test::{assert_err, assert_ok};

const CONFIG: &str = r#"
server:
  address: 127.0.0.1:0
  name: test-gateway
  tasks:
    maxConcurrency: 4
    timeoutSecs: 5
services:
  Primary:
    driver: vfs
    settings:
      region: eu-west
      volumes: [data, logs]
  vfs: {}
"#;

#[tokio::test]
async fn test_file_config_builds_catalog() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();

    let config = assert_ok!(GatewayConfig::from_file(file.path()));
    assert_eq!(config.server.name, "test-gateway");
    assert_eq!(config.server.tasks.max_concurrency, 4);

    let engine_config = TaskEngineConfig::from(&config.server.tasks);
    assert_eq!(engine_config.task_timeout, Some(std::time::Duration::from_secs(5)));

    let registry = Registry::with_builtins();
    let catalog = ServiceCatalog::instantiate(&registry, &config, TaskEngine::new(engine_config))
        .await
        .unwrap();
    assert_eq!(catalog.names(), vec!["primary", "vfs"]);

    // Explicit settings win over registered defaults
    let primary = catalog.lookup("PRIMARY").unwrap();
    assert_eq!(primary.config().get_string("region").as_deref(), Some("eu-west"));
    assert_eq!(primary.config().get_string("instanceId").as_deref(), Some("vfs-0"));

    // Driver name defaults to the service name
    let vfs = catalog.lookup("vfs").unwrap();
    assert_eq!(vfs.driver_name(), "vfs");
    assert_eq!(vfs.config().get_string("region").as_deref(), Some("local"));
}

#[tokio::test]
async fn test_unknown_driver_is_a_configuration_error() {
    let config = GatewayConfig::from_yaml("services:\n  s3:\n    driver: s3fs\n").unwrap();
    let registry = Registry::with_builtins();

    let err = ServiceCatalog::instantiate(&registry, &config, TaskEngine::new(Default::default()))
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("s3"));
}

#[test]
fn test_invalid_address_is_rejected() {
    assert_err!(GatewayConfig::from_yaml("server:\n  address: not-an-address\n"));
}
