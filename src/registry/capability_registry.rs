//! Capability Registry
//!
//! Per-kind tables mapping a lower-cased name to a constructor. Every kind
//! has its own reader/writer lock, so registering a router never contends
//! with a storage driver lookup.
//!
//! # Enumeration
//!
//! `storage_drivers()`, `routers()` etc. copy the constructors out under the
//! read lock and release it before constructing anything. Constructors are
//! free to call back into the registry.

use super::events::{Kind, RegistryEvent};
use crate::api::Router;
use crate::config::ConfigRegistration;
use crate::domain::{Capabilities, IntegrationDriver, OsDriver, StorageDriver, StorageExecutor};
use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Capacity of the event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Constructor Types
// =============================================================================

pub type StorageExecutorCtor = Arc<dyn Fn() -> Box<dyn StorageExecutor> + Send + Sync>;
pub type StorageDriverCtor = Arc<dyn Fn() -> Box<dyn StorageDriver> + Send + Sync>;
pub type OsDriverCtor = Arc<dyn Fn() -> Box<dyn OsDriver> + Send + Sync>;
pub type IntegrationDriverCtor = Arc<dyn Fn() -> Box<dyn IntegrationDriver> + Send + Sync>;
pub type RouterCtor = Arc<dyn Fn() -> Box<dyn Router> + Send + Sync>;

/// Fills in a config registration
pub type ConfigRegFn = Arc<dyn Fn(&mut ConfigRegistration) + Send + Sync>;

/// Type-erased constructor. The product must be a `Box<dyn StorageDriver>`.
pub type ModTypeCtor = Arc<dyn Fn() -> Box<dyn Any + Send + Sync> + Send + Sync>;

// =============================================================================
// Constructor Table
// =============================================================================

/// A single kind's name-to-constructor table
struct CtorTable<C> {
    kind: Kind,
    ctors: RwLock<HashMap<String, C>>,
}

impl<C: Clone> CtorTable<C> {
    fn new(kind: Kind) -> Self {
        Self {
            kind,
            ctors: RwLock::new(HashMap::new()),
        }
    }

    /// Insert under the lower-cased name; returns whether an entry was replaced
    fn insert(&self, name: &str, ctor: C) -> bool {
        self.ctors.write().insert(name.to_lowercase(), ctor).is_some()
    }

    fn get(&self, name: &str) -> Option<C> {
        self.ctors.read().get(&name.to_lowercase()).cloned()
    }

    /// Copy of every entry in name order; the lock is released on return
    fn snapshot(&self) -> Vec<(String, C)> {
        let mut entries: Vec<_> = self
            .ctors
            .read()
            .iter()
            .map(|(name, ctor)| (name.clone(), ctor.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.ctors.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn len(&self) -> usize {
        self.ctors.read().len()
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
pub struct RegistryStats {
    pub registrations: AtomicU64,
    pub replacements: AtomicU64,
    pub lookups: AtomicU64,
    pub misses: AtomicU64,
    pub rejections: AtomicU64,
}

impl RegistryStats {
    pub fn snapshot(&self) -> RegistryStatsSnapshot {
        RegistryStatsSnapshot {
            registrations: self.registrations.load(Ordering::Relaxed),
            replacements: self.replacements.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStatsSnapshot {
    pub registrations: u64,
    pub replacements: u64,
    pub lookups: u64,
    pub misses: u64,
    pub rejections: u64,
}

// =============================================================================
// Registry
// =============================================================================

/// Discovery point for every pluggable module kind
pub struct Registry {
    storage_executors: CtorTable<StorageExecutorCtor>,
    storage_drivers: CtorTable<StorageDriverCtor>,
    os_drivers: CtorTable<OsDriverCtor>,
    integration_drivers: CtorTable<IntegrationDriverCtor>,
    routers: CtorTable<RouterCtor>,
    config_regs: CtorTable<ConfigRegFn>,
    mod_types: CtorTable<ModTypeCtor>,
    stats: RegistryStats,
    event_sender: broadcast::Sender<RegistryEvent>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("storage_drivers", &self.storage_drivers.len())
            .field("storage_executors", &self.storage_executors.len())
            .field("routers", &self.routers.len())
            .finish()
    }
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Arc<Self> {
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Arc::new(Self {
            storage_executors: CtorTable::new(Kind::StorageExecutor),
            storage_drivers: CtorTable::new(Kind::StorageDriver),
            os_drivers: CtorTable::new(Kind::OsDriver),
            integration_drivers: CtorTable::new(Kind::IntegrationDriver),
            routers: CtorTable::new(Kind::Router),
            config_regs: CtorTable::new(Kind::ConfigReg),
            mod_types: CtorTable::new(Kind::ModType),
            stats: RegistryStats::default(),
            event_sender,
        })
    }

    /// Create a registry with the built-in drivers and routers registered
    pub fn with_builtins() -> Arc<Self> {
        let registry = Self::new();
        crate::drivers::register_builtins(&registry);
        crate::api::register_routers(&registry);
        registry
    }

    /// Subscribe to registry events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_sender.subscribe()
    }

    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }

    /// Registered names of one kind, sorted
    pub fn names(&self, kind: Kind) -> Vec<String> {
        match kind {
            Kind::StorageExecutor => self.storage_executors.names(),
            Kind::StorageDriver => self.storage_drivers.names(),
            Kind::OsDriver => self.os_drivers.names(),
            Kind::IntegrationDriver => self.integration_drivers.names(),
            Kind::Router => self.routers.names(),
            Kind::ConfigReg => self.config_regs.names(),
            Kind::ModType => self.mod_types.names(),
        }
    }

    fn record_registration<C: Clone>(&self, table: &CtorTable<C>, name: &str, ctor: C) {
        let replaced = table.insert(name, ctor);
        let name = name.to_lowercase();

        self.stats.registrations.fetch_add(1, Ordering::Relaxed);
        if replaced {
            self.stats.replacements.fetch_add(1, Ordering::Relaxed);
            warn!(kind = %table.kind, name = %name, "Replacing existing registration");
        } else {
            debug!(kind = %table.kind, name = %name, "Registered");
        }

        let _ = self.event_sender.send(RegistryEvent::Registered {
            kind: table.kind,
            name,
            replaced,
        });
    }

    fn lookup<C: Clone>(&self, table: &CtorTable<C>, name: &str) -> Result<C> {
        self.stats.lookups.fetch_add(1, Ordering::Relaxed);
        table.get(name).ok_or_else(|| {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            Error::not_found(table.kind.to_string(), name.to_lowercase())
        })
    }

    fn reject(&self, kind: Kind, name: &str, reason: String) -> Error {
        self.stats.rejections.fetch_add(1, Ordering::Relaxed);
        warn!(kind = %kind, name = %name, reason = %reason, "Rejected constructed instance");
        let _ = self.event_sender.send(RegistryEvent::Rejected {
            kind,
            name: name.to_lowercase(),
            reason: reason.clone(),
        });
        Error::InvalidType {
            kind: kind.to_string(),
            name: name.to_lowercase(),
            reason,
        }
    }

    fn check_storage_driver(
        &self,
        kind: Kind,
        name: &str,
        driver: Box<dyn StorageDriver>,
    ) -> Result<Box<dyn StorageDriver>> {
        let missing = driver.capabilities().missing(Capabilities::REQUIRED);
        if missing.is_empty() {
            Ok(driver)
        } else {
            Err(self.reject(kind, name, format!("missing capabilities {}", missing)))
        }
    }

    // =========================================================================
    // Storage Executors
    // =========================================================================

    pub fn register_storage_executor<F>(&self, name: &str, ctor: F)
    where
        F: Fn() -> Box<dyn StorageExecutor> + Send + Sync + 'static,
    {
        let ctor = Arc::new(ctor) as StorageExecutorCtor;
        self.record_registration(&self.storage_executors, name, ctor);
    }

    pub fn new_storage_executor(&self, name: &str) -> Result<Box<dyn StorageExecutor>> {
        let ctor = self.lookup(&self.storage_executors, name)?;
        Ok(ctor())
    }

    pub fn storage_executors(&self) -> impl Iterator<Item = Box<dyn StorageExecutor>> {
        self.storage_executors
            .snapshot()
            .into_iter()
            .map(|(_, ctor)| ctor())
    }

    // =========================================================================
    // Storage Drivers
    // =========================================================================

    pub fn register_storage_driver<F>(&self, name: &str, ctor: F)
    where
        F: Fn() -> Box<dyn StorageDriver> + Send + Sync + 'static,
    {
        let ctor = Arc::new(ctor) as StorageDriverCtor;
        self.record_registration(&self.storage_drivers, name, ctor);
    }

    /// Construct a storage driver and check it offers the required operations
    pub fn new_storage_driver(&self, name: &str) -> Result<Box<dyn StorageDriver>> {
        let ctor = self.lookup(&self.storage_drivers, name)?;
        self.check_storage_driver(Kind::StorageDriver, name, ctor())
    }

    /// One instance per registered name; drivers failing the capability check
    /// are skipped
    pub fn storage_drivers(&self) -> impl Iterator<Item = Box<dyn StorageDriver>> {
        self.storage_drivers
            .snapshot()
            .into_iter()
            .filter_map(|(name, ctor)| {
                let driver = ctor();
                if driver.capabilities().contains(Capabilities::REQUIRED) {
                    Some(driver)
                } else {
                    warn!(name = %name, "Skipping storage driver without required capabilities");
                    None
                }
            })
    }

    // =========================================================================
    // OS Drivers
    // =========================================================================

    pub fn register_os_driver<F>(&self, name: &str, ctor: F)
    where
        F: Fn() -> Box<dyn OsDriver> + Send + Sync + 'static,
    {
        self.record_registration(&self.os_drivers, name, Arc::new(ctor) as OsDriverCtor);
    }

    pub fn new_os_driver(&self, name: &str) -> Result<Box<dyn OsDriver>> {
        let ctor = self.lookup(&self.os_drivers, name)?;
        Ok(ctor())
    }

    pub fn os_drivers(&self) -> impl Iterator<Item = Box<dyn OsDriver>> {
        self.os_drivers.snapshot().into_iter().map(|(_, ctor)| ctor())
    }

    // =========================================================================
    // Integration Drivers
    // =========================================================================

    pub fn register_integration_driver<F>(&self, name: &str, ctor: F)
    where
        F: Fn() -> Box<dyn IntegrationDriver> + Send + Sync + 'static,
    {
        self.record_registration(
            &self.integration_drivers,
            name,
            Arc::new(ctor) as IntegrationDriverCtor,
        );
    }

    pub fn new_integration_driver(&self, name: &str) -> Result<Box<dyn IntegrationDriver>> {
        let ctor = self.lookup(&self.integration_drivers, name)?;
        Ok(ctor())
    }

    pub fn integration_drivers(&self) -> impl Iterator<Item = Box<dyn IntegrationDriver>> {
        self.integration_drivers
            .snapshot()
            .into_iter()
            .map(|(_, ctor)| ctor())
    }

    // =========================================================================
    // Routers
    // =========================================================================

    pub fn register_router<F>(&self, name: &str, ctor: F)
    where
        F: Fn() -> Box<dyn Router> + Send + Sync + 'static,
    {
        self.record_registration(&self.routers, name, Arc::new(ctor) as RouterCtor);
    }

    pub fn new_router(&self, name: &str) -> Result<Box<dyn Router>> {
        let ctor = self.lookup(&self.routers, name)?;
        Ok(ctor())
    }

    pub fn routers(&self) -> impl Iterator<Item = Box<dyn Router>> {
        self.routers.snapshot().into_iter().map(|(_, ctor)| ctor())
    }

    // =========================================================================
    // Config Registrations
    // =========================================================================

    pub fn register_config_reg<F>(&self, name: &str, f: F)
    where
        F: Fn(&mut ConfigRegistration) + Send + Sync + 'static,
    {
        self.record_registration(&self.config_regs, name, Arc::new(f) as ConfigRegFn);
    }

    /// Every config registration, filled in by its hook
    pub fn config_regs(&self) -> impl Iterator<Item = ConfigRegistration> {
        self.config_regs.snapshot().into_iter().map(|(name, f)| {
            let mut reg = ConfigRegistration::new(name);
            f(&mut reg);
            reg
        })
    }

    /// Defaults a config registration publishes for the named driver
    pub fn config_defaults(&self, name: &str) -> Option<Map<String, Value>> {
        let f = self.config_regs.get(name)?;
        let mut reg = ConfigRegistration::new(name);
        f(&mut reg);
        Some(reg.defaults())
    }

    // =========================================================================
    // Mod Types
    // =========================================================================

    pub fn register_mod_type<F>(&self, name: &str, ctor: F)
    where
        F: Fn() -> Box<dyn Any + Send + Sync> + Send + Sync + 'static,
    {
        self.record_registration(&self.mod_types, name, Arc::new(ctor) as ModTypeCtor);
    }

    /// Construct a mod type and down-cast it to a storage driver
    pub fn new_mod_type(&self, name: &str) -> Result<Box<dyn StorageDriver>> {
        let ctor = self.lookup(&self.mod_types, name)?;
        match ctor().downcast::<Box<dyn StorageDriver>>() {
            Ok(driver) => self.check_storage_driver(Kind::ModType, name, *driver),
            Err(_) => Err(self.reject(
                Kind::ModType,
                name,
                "product is not a storage driver".to_string(),
            )),
        }
    }
}
