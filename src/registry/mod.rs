//! Capability Registry - name-to-constructor tables for every pluggable kind

pub mod capability_registry;
pub mod events;

pub use capability_registry::{
    ConfigRegFn, IntegrationDriverCtor, ModTypeCtor, OsDriverCtor, Registry, RegistryStats,
    RegistryStatsSnapshot, RouterCtor, StorageDriverCtor, StorageExecutorCtor,
};
pub use events::{Kind, RegistryEvent};
