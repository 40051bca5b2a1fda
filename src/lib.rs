//! Storage Gateway
//!
//! A uniform volume and snapshot API in front of any number of pluggable
//! storage backends. Requests addressed to one service run as a single
//! task; requests addressed to all services fan out one task per service
//! and an aggregator task folds the results into a batch response.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           HTTP API (axum)                            │
//! │      volume / snapshot / service routers  →  route selection          │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                        Fan-out Dispatcher                             │
//! │   single-service tasks   │   per-service tasks + aggregator task      │
//! ├──────────────────────────┴───────────────────────────────────────────┤
//! │        Task Engine          │         Service Catalog                 │
//! │  (ids, join, wait_all,      │  (name → driver instance + config)      │
//! │   cancellation, limits)     │                                         │
//! ├─────────────────────────────┴────────────────────────────────────────┤
//! │                       Capability Registry                             │
//! │  storage drivers · executors · OS drivers · integration drivers ·     │
//! │  routers · config registrations · mod types                           │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`registry`]: Name-to-constructor tables for every pluggable kind
//! - [`catalog`]: Configured storage services
//! - [`task`]: Task submission, join and wait-all
//! - [`dispatch`]: Storage operations as tasks, fan-out and batch responses
//! - [`filter`]: Query predicates over object attributes
//! - [`api`]: Routers and the HTTP server
//! - [`drivers`]: Built-in in-memory `vfs` modules
//! - [`domain`]: Storage objects, options and module traits
//! - [`error`]: Error types and handling

pub mod api;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod drivers;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod registry;
pub mod schema;
pub mod task;

// Re-export commonly used types
pub use api::{build_app, ApiServer, AppState, Route, RouteRequest, Router};

pub use catalog::{ServiceCatalog, StorageService};

pub use config::{ConfigRegistration, ConfigScope, GatewayConfig, ServiceConfig, TaskConfig};

pub use dispatch::{BatchResponse, Dispatcher, EmptyPolicy};

pub use domain::{
    Capabilities, Instance, IntegrationDriver, OsDriver, Snapshot, StorageDriver, StorageExecutor,
    Store, Volume,
};

pub use error::{Error, Result};

pub use filter::Filter;

pub use metrics::Metrics;

pub use registry::{Kind, Registry, RegistryEvent};

pub use schema::ResponseSchema;

pub use task::{Task, TaskContext, TaskEngine, TaskEngineConfig, TaskId, TaskState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
