//! Built-in Modules
//!
//! The in-memory `vfs` storage driver and its host-side companions.

pub mod host;
pub mod vfs;

pub use host::{VfsExecutor, VfsIntegration, VfsOsDriver};
pub use vfs::VfsDriver;

use crate::domain::StorageDriver;
use crate::registry::Registry;
use std::any::Any;

/// Register every built-in module with the registry
pub fn register_builtins(registry: &Registry) {
    let name = vfs::DRIVER_NAME;

    registry.register_storage_driver(name, || Box::new(VfsDriver::new()));
    registry.register_storage_executor(name, || Box::new(VfsExecutor::new()));
    registry.register_os_driver(name, || Box::new(VfsOsDriver::new()));
    registry.register_integration_driver(name, || Box::new(VfsIntegration::new()));
    registry.register_config_reg(name, vfs::register_config);
    registry.register_mod_type(name, || {
        Box::new(Box::new(VfsDriver::new()) as Box<dyn StorageDriver>) as Box<dyn Any + Send + Sync>
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Kind;

    #[test]
    fn test_builtins_registered() {
        let registry = Registry::new();
        register_builtins(&registry);

        for kind in [
            Kind::StorageDriver,
            Kind::StorageExecutor,
            Kind::OsDriver,
            Kind::IntegrationDriver,
            Kind::ConfigReg,
            Kind::ModType,
        ] {
            assert_eq!(registry.names(kind), vec!["vfs"], "kind {}", kind);
        }

        assert_eq!(registry.new_mod_type("vfs").unwrap().name(), "vfs");
        assert_eq!(registry.storage_executors().count(), 1);
        assert_eq!(registry.os_drivers().count(), 1);
        assert_eq!(registry.integration_drivers().count(), 1);
    }
}
