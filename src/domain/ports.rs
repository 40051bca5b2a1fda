//! Domain Ports - Capability traits for every pluggable kind
//!
//! Storage drivers, executors, OS drivers and integration drivers implement
//! these traits and register a constructor with the
//! [`Registry`](crate::registry::Registry). Each storage driver declares an
//! explicit [`Capabilities`] set; operations outside that set are never
//! dispatched to it.

use crate::config::ConfigScope;
use crate::domain::model::{
    Instance, InstanceId, LocalDevices, MountInfo, Snapshot, Volume,
};
use crate::domain::store::Store;
use crate::error::{Error, Result};
use crate::task::TaskContext;
use async_trait::async_trait;
use std::ops::BitOr;
use std::sync::Arc;

// =============================================================================
// Capabilities
// =============================================================================

/// Set of storage operations a driver implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const NONE: Self = Self(0);
    pub const VOLUMES: Self = Self(1 << 0);
    pub const VOLUME_INSPECT: Self = Self(1 << 1);
    pub const VOLUME_CREATE: Self = Self(1 << 2);
    pub const VOLUME_COPY: Self = Self(1 << 3);
    pub const VOLUME_SNAPSHOT: Self = Self(1 << 4);
    pub const VOLUME_ATTACH: Self = Self(1 << 5);
    pub const VOLUME_DETACH: Self = Self(1 << 6);
    pub const VOLUME_REMOVE: Self = Self(1 << 7);
    pub const SNAPSHOTS: Self = Self(1 << 8);
    pub const INSTANCE_INSPECT: Self = Self(1 << 9);

    /// Minimum surface every storage driver must offer
    pub const REQUIRED: Self = Self(Self::VOLUMES.0 | Self::VOLUME_INSPECT.0);

    pub const ALL: Self = Self((1 << 10) - 1);

    const NAMES: [(Capabilities, &'static str); 10] = [
        (Self::VOLUMES, "volumes"),
        (Self::VOLUME_INSPECT, "volume_inspect"),
        (Self::VOLUME_CREATE, "volume_create"),
        (Self::VOLUME_COPY, "volume_copy"),
        (Self::VOLUME_SNAPSHOT, "volume_snapshot"),
        (Self::VOLUME_ATTACH, "volume_attach"),
        (Self::VOLUME_DETACH, "volume_detach"),
        (Self::VOLUME_REMOVE, "volume_remove"),
        (Self::SNAPSHOTS, "snapshots"),
        (Self::INSTANCE_INSPECT, "instance_inspect"),
    ];

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Capabilities in `required` that `self` lacks
    pub fn missing(self, required: Self) -> Self {
        Self(required.0 & !self.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Operation names contained in this set
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(cap, _)| self.contains(*cap))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::fmt::Display for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.names().join(","))
    }
}

// =============================================================================
// Operation Options
// =============================================================================

/// Options for listing volumes
#[derive(Debug, Clone, Default)]
pub struct VolumesOpts {
    /// Include attachment information
    pub attachments: bool,
    pub opts: Store,
}

/// Options for inspecting a volume
#[derive(Debug, Clone, Default)]
pub struct VolumeInspectOpts {
    pub attachments: bool,
    pub opts: Store,
}

/// Options for creating a volume
#[derive(Debug, Clone, Default)]
pub struct VolumeCreateOpts {
    pub availability_zone: Option<String>,
    pub iops: Option<i64>,
    /// Size in GiB
    pub size: Option<i64>,
    pub volume_type: Option<String>,
    pub opts: Store,
}

/// Options for attaching a volume
#[derive(Debug, Clone, Default)]
pub struct VolumeAttachOpts {
    /// Device name hint from the client's executor
    pub next_device: Option<String>,
    pub force: bool,
    pub opts: Store,
}

/// Options for detaching a volume
#[derive(Debug, Clone, Default)]
pub struct VolumeDetachOpts {
    pub force: bool,
    pub opts: Store,
}

// =============================================================================
// Storage Driver Port
// =============================================================================

/// A remote storage platform (block, file or object) the gateway fans out to
///
/// Operations not listed in [`StorageDriver::capabilities`] keep their default
/// body, which reports [`Error::Unsupported`].
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Driver name as registered
    fn name(&self) -> &str;

    /// Operations this driver implements
    fn capabilities(&self) -> Capabilities;

    /// Initialize the driver with its service's configuration scope
    async fn init(&mut self, config: &ConfigScope) -> Result<()>;

    /// Inspect the instance the service is operating for
    async fn instance_inspect(&self, _ctx: &TaskContext, _opts: &Store) -> Result<Instance> {
        Err(unsupported(self.name(), "instance_inspect"))
    }

    /// List volumes
    async fn volumes(&self, ctx: &TaskContext, opts: &VolumesOpts) -> Result<Vec<Volume>>;

    /// Inspect a single volume
    async fn volume_inspect(
        &self,
        ctx: &TaskContext,
        volume_id: &str,
        opts: &VolumeInspectOpts,
    ) -> Result<Volume>;

    async fn volume_create(
        &self,
        _ctx: &TaskContext,
        _name: &str,
        _opts: &VolumeCreateOpts,
    ) -> Result<Volume> {
        Err(unsupported(self.name(), "volume_create"))
    }

    async fn volume_copy(
        &self,
        _ctx: &TaskContext,
        _volume_id: &str,
        _volume_name: &str,
        _opts: &Store,
    ) -> Result<Volume> {
        Err(unsupported(self.name(), "volume_copy"))
    }

    async fn volume_snapshot(
        &self,
        _ctx: &TaskContext,
        _volume_id: &str,
        _snapshot_name: &str,
        _opts: &Store,
    ) -> Result<Snapshot> {
        Err(unsupported(self.name(), "volume_snapshot"))
    }

    async fn volume_attach(
        &self,
        _ctx: &TaskContext,
        _volume_id: &str,
        _opts: &VolumeAttachOpts,
    ) -> Result<Volume> {
        Err(unsupported(self.name(), "volume_attach"))
    }

    async fn volume_detach(
        &self,
        _ctx: &TaskContext,
        _volume_id: &str,
        _opts: &VolumeDetachOpts,
    ) -> Result<()> {
        Err(unsupported(self.name(), "volume_detach"))
    }

    async fn volume_remove(
        &self,
        _ctx: &TaskContext,
        _volume_id: &str,
        _opts: &Store,
    ) -> Result<()> {
        Err(unsupported(self.name(), "volume_remove"))
    }

    /// List snapshots
    async fn snapshots(&self, _ctx: &TaskContext, _opts: &Store) -> Result<Vec<Snapshot>> {
        Err(unsupported(self.name(), "snapshots"))
    }
}

fn unsupported(driver: &str, operation: &str) -> Error {
    Error::Unsupported {
        service: driver.to_string(),
        operation: operation.to_string(),
    }
}

// =============================================================================
// Executor / OS / Integration Ports
// =============================================================================

/// Client-side helper that reports host facts to a storage platform
#[async_trait]
pub trait StorageExecutor: Send + Sync {
    fn name(&self) -> &str;

    async fn init(&mut self, _config: &ConfigScope) -> Result<()> {
        Ok(())
    }

    /// Identify the local host to the storage platform
    async fn instance_id(&self, opts: &Store) -> Result<InstanceId>;

    /// Next available device name, if the platform needs one on attach
    async fn next_device(&self, opts: &Store) -> Result<Option<String>>;

    /// Devices on the local host
    async fn local_devices(&self, opts: &Store) -> Result<LocalDevices>;
}

/// Host operating-system mount operations
#[async_trait]
pub trait OsDriver: Send + Sync {
    fn name(&self) -> &str;

    async fn mounts(&self, opts: &Store) -> Result<Vec<MountInfo>>;

    async fn mount(&self, device: &str, target: &str, opts: &Store) -> Result<()>;

    async fn unmount(&self, target: &str, opts: &Store) -> Result<()>;

    async fn is_mounted(&self, target: &str, opts: &Store) -> Result<bool> {
        Ok(self
            .mounts(opts)
            .await?
            .iter()
            .any(|m| m.mount_point == target))
    }
}

/// Container-runtime integration (volume name to host path plumbing)
#[async_trait]
pub trait IntegrationDriver: Send + Sync {
    fn name(&self) -> &str;

    async fn list(&self, opts: &Store) -> Result<Vec<Volume>>;

    async fn inspect(&self, volume_name: &str, opts: &Store) -> Result<Volume>;

    /// Mount a volume and return the host path
    async fn mount(&self, volume_id: &str, volume_name: &str, opts: &Store) -> Result<String>;

    async fn unmount(&self, volume_id: &str, volume_name: &str, opts: &Store) -> Result<()>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type StorageDriverRef = Arc<dyn StorageDriver>;
pub type StorageExecutorRef = Arc<dyn StorageExecutor>;
pub type OsDriverRef = Arc<dyn OsDriver>;
pub type IntegrationDriverRef = Arc<dyn IntegrationDriver>;
