//! Registry Events
//!
//! Events emitted by the capability registry so that operators can observe
//! which modules were registered, replaced or rejected.

use serde::{Deserialize, Serialize};

/// Kinds of pluggable modules the registry tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    StorageExecutor,
    StorageDriver,
    OsDriver,
    IntegrationDriver,
    Router,
    ConfigReg,
    ModType,
}

impl Kind {
    pub const ALL: [Kind; 7] = [
        Kind::StorageExecutor,
        Kind::StorageDriver,
        Kind::OsDriver,
        Kind::IntegrationDriver,
        Kind::Router,
        Kind::ConfigReg,
        Kind::ModType,
    ];
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Kind::StorageExecutor => write!(f, "storage executor"),
            Kind::StorageDriver => write!(f, "storage driver"),
            Kind::OsDriver => write!(f, "os driver"),
            Kind::IntegrationDriver => write!(f, "integration driver"),
            Kind::Router => write!(f, "router"),
            Kind::ConfigReg => write!(f, "config registration"),
            Kind::ModType => write!(f, "mod type"),
        }
    }
}

/// Events emitted by the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// A constructor was registered; `replaced` is set when it overwrote one
    Registered {
        kind: Kind,
        name: String,
        replaced: bool,
    },

    /// A constructed instance did not satisfy its kind's capability set
    Rejected {
        kind: Kind,
        name: String,
        reason: String,
    },
}

impl RegistryEvent {
    pub fn kind(&self) -> Kind {
        match self {
            RegistryEvent::Registered { kind, .. } => *kind,
            RegistryEvent::Rejected { kind, .. } => *kind,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RegistryEvent::Registered { name, .. } => name,
            RegistryEvent::Rejected { name, .. } => name,
        }
    }

    /// Check if this event records an overwrite
    pub fn is_replacement(&self) -> bool {
        matches!(self, RegistryEvent::Registered { replaced: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let event = RegistryEvent::Registered {
            kind: Kind::StorageDriver,
            name: "vfs".to_string(),
            replaced: true,
        };
        assert_eq!(event.kind(), Kind::StorageDriver);
        assert_eq!(event.name(), "vfs");
        assert!(event.is_replacement());

        let event = RegistryEvent::Rejected {
            kind: Kind::ModType,
            name: "blob".to_string(),
            reason: "not a storage driver".to_string(),
        };
        assert!(!event.is_replacement());
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(Kind::StorageDriver.to_string(), "storage driver");
        assert_eq!(Kind::ConfigReg.to_string(), "config registration");
    }
}
