//! Response Schemas
//!
//! Task results are checked against a structural schema before a route
//! handler writes them to a client. Object schemas are derived from the
//! domain types with `schemars`; keyed collections nest those objects one or
//! two levels deep.

use crate::domain::{Instance, Snapshot, Volume};
use crate::error::{Error, Result};
use schemars::gen::SchemaGenerator;
use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde_json::Value;
use std::sync::OnceLock;

/// Object type at the leaves of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ObjectKind {
    Volume,
    Snapshot,
    Instance,
}

impl ObjectKind {
    fn required(self) -> &'static [String] {
        static VOLUME: OnceLock<Vec<String>> = OnceLock::new();
        static SNAPSHOT: OnceLock<Vec<String>> = OnceLock::new();
        static INSTANCE: OnceLock<Vec<String>> = OnceLock::new();

        match self {
            ObjectKind::Volume => VOLUME.get_or_init(required_fields::<Volume>),
            ObjectKind::Snapshot => SNAPSHOT.get_or_init(required_fields::<Snapshot>),
            ObjectKind::Instance => INSTANCE.get_or_init(required_fields::<Instance>),
        }
    }

    fn root(self) -> RootSchema {
        let gen = SchemaGenerator::default();
        match self {
            ObjectKind::Volume => gen.into_root_schema_for::<Volume>(),
            ObjectKind::Snapshot => gen.into_root_schema_for::<Snapshot>(),
            ObjectKind::Instance => gen.into_root_schema_for::<Instance>(),
        }
    }
}

fn required_fields<T: JsonSchema>() -> Vec<String> {
    SchemaGenerator::default()
        .into_root_schema_for::<T>()
        .schema
        .object
        .map(|object| object.required.into_iter().collect())
        .unwrap_or_default()
}

// =============================================================================
// Response Schema
// =============================================================================

/// Shape of a task result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseSchema {
    Volume,
    /// Volume ID to volume
    VolumeMap,
    /// Service name to volume map
    ServiceVolumeMap,
    Snapshot,
    SnapshotMap,
    ServiceSnapshotMap,
    Instance,
}

impl ResponseSchema {
    pub fn name(self) -> &'static str {
        match self {
            ResponseSchema::Volume => "volume",
            ResponseSchema::VolumeMap => "volumeMap",
            ResponseSchema::ServiceVolumeMap => "serviceVolumeMap",
            ResponseSchema::Snapshot => "snapshot",
            ResponseSchema::SnapshotMap => "snapshotMap",
            ResponseSchema::ServiceSnapshotMap => "serviceSnapshotMap",
            ResponseSchema::Instance => "instance",
        }
    }

    fn shape(self) -> (ObjectKind, usize) {
        match self {
            ResponseSchema::Volume => (ObjectKind::Volume, 0),
            ResponseSchema::VolumeMap => (ObjectKind::Volume, 1),
            ResponseSchema::ServiceVolumeMap => (ObjectKind::Volume, 2),
            ResponseSchema::Snapshot => (ObjectKind::Snapshot, 0),
            ResponseSchema::SnapshotMap => (ObjectKind::Snapshot, 1),
            ResponseSchema::ServiceSnapshotMap => (ObjectKind::Snapshot, 2),
            ResponseSchema::Instance => (ObjectKind::Instance, 0),
        }
    }

    /// The JSON schema of the leaf object
    pub fn object_schema(self) -> RootSchema {
        self.shape().0.root()
    }

    /// Check a serialized result against this schema
    pub fn validate(self, value: &Value) -> Result<()> {
        let (kind, depth) = self.shape();
        self.validate_level(value, kind, depth, "$")
    }

    fn validate_level(
        self,
        value: &Value,
        kind: ObjectKind,
        depth: usize,
        path: &str,
    ) -> Result<()> {
        let object = value
            .as_object()
            .ok_or_else(|| self.violation(path, "expected an object"))?;

        if depth == 0 {
            for field in kind.required() {
                match object.get(field) {
                    None | Some(Value::Null) => {
                        return Err(self.violation(path, &format!("missing field {}", field)))
                    }
                    _ => {}
                }
            }
            return Ok(());
        }

        for (key, child) in object {
            self.validate_level(child, kind, depth - 1, &format!("{}.{}", path, key))?;
        }
        Ok(())
    }

    fn violation(self, path: &str, reason: &str) -> Error {
        Error::Schema {
            schema: self.name().to_string(),
            reason: format!("{}: {}", path, reason),
        }
    }
}

impl std::fmt::Display for ResponseSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
