//! Storage Objects
//!
//! Backend-agnostic payloads returned by storage drivers. The gateway only
//! transports and filters these; `fields` is the generic attribute map that
//! client query predicates are matched against.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Generic attribute mapping used for filtering
pub type Fields = BTreeMap<String, String>;

// =============================================================================
// Instance
// =============================================================================

/// Identifies a host to a remote storage platform
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceId {
    /// Platform-specific instance ID
    pub id: String,
    /// Driver that produced the ID
    #[serde(default)]
    pub driver: String,
    /// Extra information about the instance ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.driver, self.id)
    }
}

/// Information about the host a storage service sees
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub instance_id: InstanceId,
    #[serde(default)]
    pub name: String,
    /// Name of the provider that owns the instance
    #[serde(default)]
    pub provider_name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub fields: Fields,
}

// =============================================================================
// Volumes
// =============================================================================

/// An object attached to a storage volume
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeAttachment {
    /// Device the attached volume is exposed as
    #[serde(default)]
    pub device_name: String,
    pub instance_id: InstanceId,
    #[serde(default)]
    pub status: String,
    pub volume_id: String,
    #[serde(default)]
    pub fields: Fields,
}

/// A block device as seen by the instance it is connected to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BlockDevice {
    pub device_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<InstanceId>,
    /// Name the device is discovered by locally
    #[serde(default)]
    pub network_name: String,
    #[serde(default)]
    pub provider_name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub volume_id: String,
}

/// A storage volume
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub id: String,
    pub name: String,
    /// Size in GiB
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub iops: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "type")]
    pub volume_type: String,
    #[serde(default)]
    pub availability_zone: String,
    #[serde(default)]
    pub network_name: String,
    #[serde(default)]
    pub attachments: Vec<VolumeAttachment>,
    #[serde(default)]
    pub fields: Fields,
}

impl Volume {
    /// Volume with the given ID and name and no attributes
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder-style attribute setter
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn is_attached(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// A storage-layer snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// RFC 3339 time the snapshot request was submitted
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub status: String,
    pub volume_id: String,
    #[serde(default)]
    pub volume_size: i64,
    #[serde(default)]
    pub fields: Fields,
}

/// Devices visible on the local host, keyed by volume ID
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalDevices {
    pub driver: String,
    #[serde(default)]
    pub device_map: BTreeMap<String, String>,
}

/// A mounted filesystem as reported by an OS driver
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MountInfo {
    pub source: String,
    pub mount_point: String,
    #[serde(default)]
    pub fs_type: String,
    #[serde(default)]
    pub opts: String,
}

// =============================================================================
// Keyed Collections
// =============================================================================

pub type VolumeMap = BTreeMap<String, Volume>;
pub type SnapshotMap = BTreeMap<String, Snapshot>;

/// Volume maps keyed by service name
pub type ServiceVolumeMap = BTreeMap<String, VolumeMap>;

/// Snapshot maps keyed by service name
pub type ServiceSnapshotMap = BTreeMap<String, SnapshotMap>;

// =============================================================================
// Filterable
// =============================================================================

/// Objects that carry an ID and an attribute map
pub trait StorageObject {
    fn object_id(&self) -> &str;
    fn fields(&self) -> &Fields;
}

impl StorageObject for Volume {
    fn object_id(&self) -> &str {
        &self.id
    }

    fn fields(&self) -> &Fields {
        &self.fields
    }
}

impl StorageObject for Snapshot {
    fn object_id(&self) -> &str {
        &self.id
    }

    fn fields(&self) -> &Fields {
        &self.fields
    }
}

impl StorageObject for VolumeAttachment {
    fn object_id(&self) -> &str {
        &self.volume_id
    }

    fn fields(&self) -> &Fields {
        &self.fields
    }
}
