//! Service Catalog
//!
//! Built once at startup from the configured services and never mutated
//! afterwards, so lookups need no locking.

use super::service::StorageService;
use crate::config::{ConfigScope, GatewayConfig};
use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::task::TaskEngine;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct ServiceCatalog {
    services: BTreeMap<String, Arc<StorageService>>,
    engine: Arc<TaskEngine>,
}

impl std::fmt::Debug for ServiceCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCatalog")
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ServiceCatalog {
    /// Resolve, configure and initialize every configured service
    ///
    /// Fails on the first service whose driver is unknown, does not satisfy
    /// the required capabilities, or fails to initialize.
    pub async fn instantiate(
        registry: &Registry,
        config: &GatewayConfig,
        engine: Arc<TaskEngine>,
    ) -> Result<Arc<Self>> {
        info!(count = config.services.len(), "Instantiating storage services");

        let mut services = BTreeMap::new();

        for (name, service_config) in &config.services {
            let name = name.to_lowercase();
            let driver_name = service_config
                .driver
                .as_deref()
                .unwrap_or(&name)
                .to_lowercase();

            let mut driver = registry
                .new_storage_driver(&driver_name)
                .map_err(|e| service_error(&name, e))?;

            let defaults = registry.config_defaults(&driver_name);
            let scope = ConfigScope::new(
                &name,
                &driver_name,
                &service_config.settings,
                defaults.as_ref(),
            );

            driver
                .init(&scope)
                .await
                .map_err(|e| service_error(&name, e))?;

            info!(
                service = %name,
                driver = %driver_name,
                capabilities = %driver.capabilities(),
                "Storage service initialized"
            );

            let service =
                StorageService::new(name.clone(), Arc::from(driver), scope, engine.clone());
            services.insert(name, Arc::new(service));
        }

        Ok(Arc::new(Self { services, engine }))
    }

    /// Look up a service by name (case-insensitive)
    pub fn lookup(&self, name: &str) -> Result<Arc<StorageService>> {
        let service = self.services.get(&name.to_lowercase()).cloned();
        if service.is_none() {
            debug!(service = %name, "Service lookup miss");
        }
        service.ok_or_else(|| Error::not_found("service", name))
    }

    /// Every service in name order
    pub fn all(&self) -> impl Iterator<Item = &Arc<StorageService>> {
        self.services.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn engine(&self) -> &Arc<TaskEngine> {
        &self.engine
    }
}

fn service_error(service: &str, err: Error) -> Error {
    Error::Configuration(format!("service {}: {}", service, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Capabilities;
    use crate::task::TaskEngineConfig;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn vfs_settings(region: &str) -> serde_json::Map<String, serde_json::Value> {
        json!({ "region": region }).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_instantiate_and_lookup() {
        let registry = Registry::with_builtins();
        let config = GatewayConfig::default()
            .with_service("Beta", "vfs", vfs_settings("b"))
            .with_service("alpha", "VFS", vfs_settings("a"));
        let engine = TaskEngine::new(TaskEngineConfig::default());

        let catalog = ServiceCatalog::instantiate(&registry, &config, engine)
            .await
            .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.names(), vec!["alpha", "beta"]);

        let beta = catalog.lookup("BETA").unwrap();
        assert_eq!(beta.name(), "beta");
        assert_eq!(beta.driver_name(), "vfs");
        assert_eq!(beta.config().get_string("region").as_deref(), Some("b"));
        assert!(beta.supports(Capabilities::REQUIRED));

        let names: Vec<_> = catalog.all().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_driver_defaults_to_service_name() {
        let registry = Registry::with_builtins();
        let mut config = GatewayConfig::default();
        config.services.insert("vfs".into(), Default::default());

        let catalog = ServiceCatalog::instantiate(
            &registry,
            &config,
            TaskEngine::new(TaskEngineConfig::default()),
        )
        .await
        .unwrap();

        let vfs = catalog.lookup("vfs").unwrap();
        // Registered default fills in the region
        assert_eq!(vfs.config().get_string("region").as_deref(), Some("local"));
    }

    #[tokio::test]
    async fn test_unknown_driver_fails_fast() {
        let registry = Registry::with_builtins();
        let config = GatewayConfig::default().with_service("ebs1", "ebs", Default::default());

        let err = ServiceCatalog::instantiate(
            &registry,
            &config,
            TaskEngine::new(TaskEngineConfig::default()),
        )
        .await
        .unwrap_err();

        assert_matches!(err, Error::Configuration(ref msg) if msg.contains("ebs1"));
    }

    #[tokio::test]
    async fn test_lookup_unknown_service() {
        let registry = Registry::with_builtins();
        let catalog = ServiceCatalog::instantiate(
            &registry,
            &GatewayConfig::default(),
            TaskEngine::new(TaskEngineConfig::default()),
        )
        .await
        .unwrap();

        assert!(catalog.is_empty());
        assert_matches!(catalog.lookup("nope"), Err(Error::NotFound { .. }));
    }
}
