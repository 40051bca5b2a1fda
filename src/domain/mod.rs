//! Domain layer - Storage objects, request options and port definitions
//!
//! This module defines the core traits (ports) that storage drivers and other
//! pluggable components implement, following hexagonal architecture
//! principles.

pub mod model;
pub mod ports;
pub mod store;

pub use model::*;
pub use ports::*;
pub use store::Store;
