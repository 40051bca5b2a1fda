//! Gateway Configuration
//!
//! The gateway is configured from a YAML file (overridable from the command
//! line). Every configured service receives a [`ConfigScope`]: its explicit
//! settings layered over the defaults that drivers publish through
//! config-registration hooks.
//!
//! ```yaml
//! server:
//!   address: 127.0.0.1:7979
//!   tasks:
//!     maxConcurrency: 16
//!     timeoutSecs: 60
//! services:
//!   local:
//!     driver: vfs
//!     settings:
//!       region: local
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

// =============================================================================
// File Configuration
// =============================================================================

/// Top-level gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Configured services keyed by name
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    /// Name reported in the `x-storage-gateway-server` response header
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default)]
    pub tasks: TaskConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            name: default_server_name(),
            tasks: TaskConfig::default(),
        }
    }
}

/// Task engine settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskConfig {
    /// Maximum concurrently running task bodies (0 = unbounded)
    #[serde(default)]
    pub max_concurrency: usize,
    /// Per-task timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl TaskConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }
}

/// A single configured storage service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Registered driver name; defaults to the service name
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

fn default_address() -> String {
    "127.0.0.1:7979".to_string()
}

fn default_server_name() -> String {
    "storage-gateway".to_string()
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading configuration");
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let mut config: GatewayConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        config.services = config
            .services
            .into_iter()
            .map(|(name, svc)| (name.to_lowercase(), svc))
            .collect();
        Ok(config)
    }

    /// Check the configuration for obvious mistakes
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.services.is_empty() {
            warn!("no storage services configured");
        }

        let mut seen: BTreeMap<String, &str> = BTreeMap::new();
        for (name, svc) in &self.services {
            if let Some(other) = seen.insert(name.to_lowercase(), name) {
                return Err(Error::Configuration(format!(
                    "services {} and {} differ only in case",
                    other, name
                )));
            }
            if name.trim().is_empty() {
                return Err(Error::Configuration("service with empty name".into()));
            }
            if let Some(driver) = &svc.driver {
                if driver.trim().is_empty() {
                    return Err(Error::Configuration(format!(
                        "service {} has an empty driver name",
                        name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Parsed server bind address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.server.address.parse().map_err(|e| {
            Error::Configuration(format!(
                "Invalid server address {}: {}",
                self.server.address, e
            ))
        })
    }

    /// Add a service programmatically
    pub fn with_service(mut self, name: &str, driver: &str, settings: Map<String, Value>) -> Self {
        self.services.insert(
            name.to_lowercase(),
            ServiceConfig {
                driver: Some(driver.to_string()),
                settings,
            },
        );
        self
    }
}

// =============================================================================
// Config Registration
// =============================================================================

/// A configuration key published by a pluggable module
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigKey {
    pub name: String,
    pub default: Value,
    pub description: String,
}

/// Defaults and documentation a module contributes to configuration
///
/// Filled in by config-registration hooks enumerated from the registry. The
/// registration name is the driver name the keys apply to.
#[derive(Debug, Clone, Default)]
pub struct ConfigRegistration {
    name: String,
    keys: Vec<ConfigKey>,
}

impl ConfigRegistration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            keys: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a key with its default value
    pub fn key(&mut self, name: &str, default: impl Into<Value>, description: &str) {
        self.keys.push(ConfigKey {
            name: name.to_lowercase(),
            default: default.into(),
            description: description.to_string(),
        });
    }

    pub fn keys(&self) -> &[ConfigKey] {
        &self.keys
    }

    /// Defaults as a settings map
    pub fn defaults(&self) -> Map<String, Value> {
        self.keys
            .iter()
            .map(|k| (k.name.clone(), k.default.clone()))
            .collect()
    }
}

// =============================================================================
// Config Scope
// =============================================================================

/// The resolved configuration a single service sees
#[derive(Debug, Clone, Default)]
pub struct ConfigScope {
    service: String,
    driver: String,
    settings: Map<String, Value>,
}

impl ConfigScope {
    /// Layer explicit settings over registered defaults
    pub fn new(
        service: &str,
        driver: &str,
        settings: &Map<String, Value>,
        defaults: Option<&Map<String, Value>>,
    ) -> Self {
        let mut merged = defaults.cloned().unwrap_or_default();
        for (k, v) in settings {
            merged.insert(k.to_lowercase(), v.clone());
        }

        Self {
            service: service.to_string(),
            driver: driver.to_lowercase(),
            settings: merged,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.settings.get(&key.to_lowercase())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}
