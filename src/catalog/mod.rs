//! Service Catalog - configured storage services, immutable after startup

pub mod service;
pub mod service_catalog;

pub use service::StorageService;
pub use service_catalog::ServiceCatalog;
