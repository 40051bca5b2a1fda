//! VFS Host Modules
//!
//! In-memory counterparts of the host-side module kinds: a storage executor
//! that reports a fixed instance identity, an OS driver with a private mount
//! table, and an integration driver that maps volume names to mount paths.

use super::vfs::DRIVER_NAME;
use crate::domain::{
    InstanceId, IntegrationDriver, LocalDevices, MountInfo, OsDriver, StorageExecutor, Store,
    Volume,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/// Root under which the integration driver mounts volumes
pub const DEFAULT_MOUNT_ROOT: &str = "/var/lib/storage-gateway/volumes";

// =============================================================================
// Executor
// =============================================================================

pub struct VfsExecutor {
    instance_id: String,
    next_device: AtomicU32,
}

impl Default for VfsExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl VfsExecutor {
    pub fn new() -> Self {
        Self {
            instance_id: "vfs-0".to_string(),
            next_device: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl StorageExecutor for VfsExecutor {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    async fn instance_id(&self, opts: &Store) -> Result<InstanceId> {
        Ok(InstanceId {
            id: opts
                .get_string_ptr("instanceId")
                .unwrap_or_else(|| self.instance_id.clone()),
            driver: DRIVER_NAME.to_string(),
            metadata: None,
        })
    }

    async fn next_device(&self, _opts: &Store) -> Result<Option<String>> {
        let n = self.next_device.fetch_add(1, Ordering::Relaxed);
        Ok(Some(format!("/dev/vfs{}", n)))
    }

    async fn local_devices(&self, _opts: &Store) -> Result<LocalDevices> {
        Ok(LocalDevices {
            driver: DRIVER_NAME.to_string(),
            device_map: BTreeMap::new(),
        })
    }
}

// =============================================================================
// OS Driver
// =============================================================================

#[derive(Default)]
pub struct VfsOsDriver {
    mounts: RwLock<Vec<MountInfo>>,
}

impl VfsOsDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OsDriver for VfsOsDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    async fn mounts(&self, _opts: &Store) -> Result<Vec<MountInfo>> {
        Ok(self.mounts.read().clone())
    }

    async fn mount(&self, device: &str, target: &str, opts: &Store) -> Result<()> {
        let mut mounts = self.mounts.write();
        if mounts.iter().any(|m| m.mount_point == target) {
            return Err(Error::InvalidRequest(format!("{} is already mounted", target)));
        }

        mounts.push(MountInfo {
            source: device.to_string(),
            mount_point: target.to_string(),
            fs_type: opts
                .get_string_ptr("fsType")
                .unwrap_or_else(|| "vfs".to_string()),
            opts: opts.get_string("mountOptions"),
        });
        debug!(device, target, "Mounted");
        Ok(())
    }

    async fn unmount(&self, target: &str, _opts: &Store) -> Result<()> {
        let mut mounts = self.mounts.write();
        let before = mounts.len();
        mounts.retain(|m| m.mount_point != target);
        if mounts.len() == before {
            return Err(Error::not_found("mount", target));
        }
        Ok(())
    }
}

// =============================================================================
// Integration Driver
// =============================================================================

pub struct VfsIntegration {
    root: String,
    os: VfsOsDriver,
    mounted: RwLock<BTreeMap<String, Volume>>,
}

impl Default for VfsIntegration {
    fn default() -> Self {
        Self::new()
    }
}

impl VfsIntegration {
    pub fn new() -> Self {
        Self::with_root(DEFAULT_MOUNT_ROOT)
    }

    pub fn with_root(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            os: VfsOsDriver::new(),
            mounted: RwLock::new(BTreeMap::new()),
        }
    }

    fn mount_path(&self, volume_name: &str) -> String {
        format!("{}/{}", self.root.trim_end_matches('/'), volume_name)
    }
}

#[async_trait]
impl IntegrationDriver for VfsIntegration {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    async fn list(&self, _opts: &Store) -> Result<Vec<Volume>> {
        Ok(self.mounted.read().values().cloned().collect())
    }

    async fn inspect(&self, volume_name: &str, _opts: &Store) -> Result<Volume> {
        self.mounted
            .read()
            .get(volume_name)
            .cloned()
            .ok_or_else(|| Error::not_found("volume", volume_name))
    }

    async fn mount(&self, volume_id: &str, volume_name: &str, opts: &Store) -> Result<String> {
        let path = self.mount_path(volume_name);
        self.os.mount(volume_id, &path, opts).await?;

        let volume = Volume::new(volume_id, volume_name).with_field("mountPoint", path.as_str());
        self.mounted.write().insert(volume_name.to_string(), volume);
        Ok(path)
    }

    async fn unmount(&self, _volume_id: &str, volume_name: &str, opts: &Store) -> Result<()> {
        let path = self.mount_path(volume_name);
        self.os.unmount(&path, opts).await?;
        self.mounted.write().remove(volume_name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_executor() {
        let exec = VfsExecutor::new();
        let iid = exec.instance_id(&Store::new()).await.unwrap();
        assert_eq!(iid.to_string(), "vfs=vfs-0");

        let first = exec.next_device(&Store::new()).await.unwrap();
        let second = exec.next_device(&Store::new()).await.unwrap();
        assert_ne!(first, second);
        assert!(exec.local_devices(&Store::new()).await.unwrap().device_map.is_empty());
    }

    #[tokio::test]
    async fn test_os_driver_mount_table() {
        let os = VfsOsDriver::new();
        let opts = Store::new();

        os.mount("/dev/vfs0", "/mnt/a", &opts).await.unwrap();
        assert!(os.is_mounted("/mnt/a", &opts).await.unwrap());
        assert_matches!(
            os.mount("/dev/vfs1", "/mnt/a", &opts).await,
            Err(Error::InvalidRequest(_))
        );

        os.unmount("/mnt/a", &opts).await.unwrap();
        assert!(!os.is_mounted("/mnt/a", &opts).await.unwrap());
        assert_matches!(os.unmount("/mnt/a", &opts).await, Err(Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_integration_mount_cycle() {
        let integration = VfsIntegration::with_root("/tmp/volumes/");
        let opts = Store::new();

        let path = integration.mount("vol-1", "data", &opts).await.unwrap();
        assert_eq!(path, "/tmp/volumes/data");
        assert_eq!(integration.list(&opts).await.unwrap().len(), 1);
        assert_eq!(integration.inspect("data", &opts).await.unwrap().id, "vol-1");

        integration.unmount("vol-1", "data", &opts).await.unwrap();
        assert!(integration.list(&opts).await.unwrap().is_empty());
        assert!(integration.inspect("data", &opts).await.is_err());
    }
}
