//! VFS Storage Driver
//!
//! An in-memory storage platform. Volumes, attachments and snapshots live in
//! process memory; nothing is persisted. Used for local runs and tests.
//!
//! Settings (all optional):
//!
//! | key                | default      |                                         |
//! |--------------------|--------------|-----------------------------------------|
//! | `region`           | `local`      | region reported for the instance        |
//! | `availabilityZone` | `local-a`    | zone for new volumes                    |
//! | `instanceId`       | `vfs-0`      | instance ID reported by inspect         |
//! | `latencyMs`        | `0`          | artificial latency per operation        |
//! | `volumes`          | `[]`         | volume names created at init            |
//! | `faults`           | `[]`         | operations that fail with a driver error |

use crate::config::{ConfigRegistration, ConfigScope};
use crate::domain::{
    Capabilities, Instance, InstanceId, Snapshot, Store, StorageDriver, Volume, VolumeAttachOpts,
    VolumeAttachment, VolumeCreateOpts, VolumeDetachOpts, VolumeInspectOpts, VolumesOpts,
};
use crate::error::{Error, Result};
use crate::task::TaskContext;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Registered name of the built-in driver
pub const DRIVER_NAME: &str = "vfs";

/// Default size of new volumes in GiB
const DEFAULT_VOLUME_SIZE: i64 = 16;

// =============================================================================
// Configuration
// =============================================================================

/// Publish the driver's configuration keys and defaults
pub fn register_config(reg: &mut ConfigRegistration) {
    reg.key("region", "local", "Region reported for the instance");
    reg.key("availabilityZone", "local-a", "Availability zone for new volumes");
    reg.key("instanceId", "vfs-0", "Instance ID reported by instance inspect");
    reg.key("latencyMs", 0, "Artificial latency added to every operation");
}

#[derive(Debug, Clone)]
struct VfsConfig {
    service: String,
    region: String,
    availability_zone: String,
    instance_id: String,
    latency: Duration,
    seed_volumes: Vec<String>,
    faults: BTreeSet<String>,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            service: DRIVER_NAME.to_string(),
            region: "local".to_string(),
            availability_zone: "local-a".to_string(),
            instance_id: "vfs-0".to_string(),
            latency: Duration::ZERO,
            seed_volumes: Vec::new(),
            faults: BTreeSet::new(),
        }
    }
}

impl VfsConfig {
    fn from_scope(scope: &ConfigScope) -> Self {
        let defaults = Self::default();
        Self {
            service: scope.service().to_string(),
            region: scope.get_string("region").unwrap_or(defaults.region),
            availability_zone: scope
                .get_string("availabilityZone")
                .unwrap_or(defaults.availability_zone),
            instance_id: scope.get_string("instanceId").unwrap_or(defaults.instance_id),
            latency: Duration::from_millis(scope.get_u64("latencyMs").unwrap_or(0)),
            seed_volumes: scope.get_string_list("volumes"),
            faults: scope.get_string_list("faults").into_iter().collect(),
        }
    }
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Default)]
struct VfsState {
    volumes: BTreeMap<String, Volume>,
    snapshots: BTreeMap<String, Snapshot>,
}

// =============================================================================
// VFS Driver
// =============================================================================

pub struct VfsDriver {
    config: VfsConfig,
    state: RwLock<VfsState>,
    next_id: AtomicU64,
}

impl Default for VfsDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl VfsDriver {
    pub fn new() -> Self {
        Self {
            config: VfsConfig::default(),
            state: RwLock::new(VfsState::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{:06}", prefix, self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn new_volume(
        &self,
        name: &str,
        size: i64,
        zone: &str,
        volume_type: &str,
        iops: i64,
    ) -> Volume {
        let mut volume = Volume::new(self.next_id("vol"), name);
        volume.size = size;
        volume.iops = iops;
        volume.status = "available".to_string();
        volume.volume_type = volume_type.to_string();
        volume.availability_zone = zone.to_string();
        volume.network_name = self.config.service.clone();
        volume
            .with_field("name", name)
            .with_field("region", self.config.region.as_str())
            .with_field("availabilityZone", zone)
            .with_field("type", volume_type)
    }

    /// Wait out the configured latency unless cancelled first
    async fn simulate(&self, ctx: &TaskContext, operation: &str) -> Result<()> {
        if !self.config.latency.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.config.latency) => {}
                _ = ctx.cancelled() => return Err(Error::Cancelled),
            }
        }
        ctx.check()?;

        if self.config.faults.contains(operation) {
            return Err(Error::Driver {
                driver: DRIVER_NAME.to_string(),
                reason: format!("injected fault in {}", operation),
            });
        }
        Ok(())
    }

    fn volume_not_found(volume_id: &str) -> Error {
        Error::not_found("volume", volume_id)
    }
}

#[async_trait]
impl StorageDriver for VfsDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn init(&mut self, config: &ConfigScope) -> Result<()> {
        self.config = VfsConfig::from_scope(config);

        let seeds = self.config.seed_volumes.clone();
        let zone = self.config.availability_zone.clone();
        let mut state = self.state.write().await;
        for name in seeds {
            let volume = self.new_volume(&name, DEFAULT_VOLUME_SIZE, &zone, "standard", 0);
            state.volumes.insert(volume.id.clone(), volume);
        }

        info!(
            service = %self.config.service,
            region = %self.config.region,
            volumes = state.volumes.len(),
            "VFS driver initialized"
        );
        Ok(())
    }

    async fn instance_inspect(&self, ctx: &TaskContext, _opts: &Store) -> Result<Instance> {
        self.simulate(ctx, "instance_inspect").await?;

        let mut fields = BTreeMap::new();
        fields.insert("region".to_string(), self.config.region.clone());

        Ok(Instance {
            instance_id: InstanceId {
                id: self.config.instance_id.clone(),
                driver: DRIVER_NAME.to_string(),
                metadata: None,
            },
            name: self.config.service.clone(),
            provider_name: DRIVER_NAME.to_string(),
            region: self.config.region.clone(),
            fields,
        })
    }

    async fn volumes(&self, ctx: &TaskContext, opts: &VolumesOpts) -> Result<Vec<Volume>> {
        self.simulate(ctx, "volumes").await?;

        let state = self.state.read().await;
        Ok(state
            .volumes
            .values()
            .cloned()
            .map(|mut v| {
                if !opts.attachments {
                    v.attachments.clear();
                }
                v
            })
            .collect())
    }

    async fn volume_inspect(
        &self,
        ctx: &TaskContext,
        volume_id: &str,
        opts: &VolumeInspectOpts,
    ) -> Result<Volume> {
        self.simulate(ctx, "volume_inspect").await?;

        let state = self.state.read().await;
        let mut volume = state
            .volumes
            .get(volume_id)
            .cloned()
            .ok_or_else(|| Self::volume_not_found(volume_id))?;
        if !opts.attachments {
            volume.attachments.clear();
        }
        Ok(volume)
    }

    async fn volume_create(
        &self,
        ctx: &TaskContext,
        name: &str,
        opts: &VolumeCreateOpts,
    ) -> Result<Volume> {
        self.simulate(ctx, "volume_create").await?;

        let size = opts.size.unwrap_or(DEFAULT_VOLUME_SIZE);
        if size <= 0 {
            return Err(Error::InvalidRequest(format!("invalid volume size {}", size)));
        }

        let zone = opts
            .availability_zone
            .clone()
            .unwrap_or_else(|| self.config.availability_zone.clone());
        let volume_type = opts.volume_type.as_deref().unwrap_or("standard");
        let volume = self.new_volume(name, size, &zone, volume_type, opts.iops.unwrap_or(0));

        debug!(service = %self.config.service, volume_id = %volume.id, name, "Created volume");
        self.state
            .write()
            .await
            .volumes
            .insert(volume.id.clone(), volume.clone());
        Ok(volume)
    }

    async fn volume_copy(
        &self,
        ctx: &TaskContext,
        volume_id: &str,
        volume_name: &str,
        _opts: &Store,
    ) -> Result<Volume> {
        self.simulate(ctx, "volume_copy").await?;

        let mut state = self.state.write().await;
        let source = state
            .volumes
            .get(volume_id)
            .cloned()
            .ok_or_else(|| Self::volume_not_found(volume_id))?;

        let copy = self.new_volume(
            volume_name,
            source.size,
            &source.availability_zone,
            &source.volume_type,
            source.iops,
        );
        state.volumes.insert(copy.id.clone(), copy.clone());
        Ok(copy)
    }

    async fn volume_snapshot(
        &self,
        ctx: &TaskContext,
        volume_id: &str,
        snapshot_name: &str,
        opts: &Store,
    ) -> Result<Snapshot> {
        self.simulate(ctx, "volume_snapshot").await?;

        let mut state = self.state.write().await;
        let source = state
            .volumes
            .get(volume_id)
            .ok_or_else(|| Self::volume_not_found(volume_id))?;

        let snapshot = Snapshot {
            id: self.next_id("snap"),
            name: snapshot_name.to_string(),
            description: opts.get_string("description"),
            start_time: chrono::Utc::now().to_rfc3339(),
            status: "completed".to_string(),
            volume_id: volume_id.to_string(),
            volume_size: source.size,
            fields: [
                ("name".to_string(), snapshot_name.to_string()),
                ("volumeID".to_string(), volume_id.to_string()),
            ]
            .into_iter()
            .collect(),
        };
        state.snapshots.insert(snapshot.id.clone(), snapshot.clone());
        Ok(snapshot)
    }

    async fn volume_attach(
        &self,
        ctx: &TaskContext,
        volume_id: &str,
        opts: &VolumeAttachOpts,
    ) -> Result<Volume> {
        self.simulate(ctx, "volume_attach").await?;

        let mut state = self.state.write().await;
        let attached_count = state.volumes.values().filter(|v| v.is_attached()).count();
        let volume = state
            .volumes
            .get_mut(volume_id)
            .ok_or_else(|| Self::volume_not_found(volume_id))?;

        if volume.is_attached() && !opts.force {
            return Err(Error::InvalidRequest(format!(
                "volume {} is already attached",
                volume_id
            )));
        }

        let device_name = opts
            .next_device
            .clone()
            .unwrap_or_else(|| format!("/dev/vfs{}", attached_count));

        volume.attachments = vec![VolumeAttachment {
            device_name,
            instance_id: InstanceId {
                id: self.config.instance_id.clone(),
                driver: DRIVER_NAME.to_string(),
                metadata: None,
            },
            status: "attached".to_string(),
            volume_id: volume_id.to_string(),
            fields: BTreeMap::new(),
        }];
        volume.status = "in-use".to_string();

        Ok(volume.clone())
    }

    async fn volume_detach(
        &self,
        ctx: &TaskContext,
        volume_id: &str,
        _opts: &VolumeDetachOpts,
    ) -> Result<()> {
        self.simulate(ctx, "volume_detach").await?;

        let mut state = self.state.write().await;
        let volume = state
            .volumes
            .get_mut(volume_id)
            .ok_or_else(|| Self::volume_not_found(volume_id))?;

        volume.attachments.clear();
        volume.status = "available".to_string();
        Ok(())
    }

    async fn volume_remove(&self, ctx: &TaskContext, volume_id: &str, opts: &Store) -> Result<()> {
        self.simulate(ctx, "volume_remove").await?;

        let mut state = self.state.write().await;
        let volume = state
            .volumes
            .get(volume_id)
            .ok_or_else(|| Self::volume_not_found(volume_id))?;

        if volume.is_attached() && !opts.get_bool("force") {
            return Err(Error::InvalidRequest(format!(
                "volume {} is attached",
                volume_id
            )));
        }

        state.volumes.remove(volume_id);
        debug!(service = %self.config.service, volume_id, "Removed volume");
        Ok(())
    }

    async fn snapshots(&self, ctx: &TaskContext, _opts: &Store) -> Result<Vec<Snapshot>> {
        self.simulate(ctx, "snapshots").await?;
        Ok(self.state.read().await.snapshots.values().cloned().collect())
    }
}
