//! Storage Dispatcher
//!
//! Every storage operation the gateway offers, expressed as tasks over the
//! service catalog. Operations addressed to one service resolve it
//! synchronously (an unknown service is reported before any task is
//! submitted) and run a single task; the rest fan out across the catalog.

use super::batch::EmptyPolicy;
use super::fanout::{fan_out, FanoutPlan};
use crate::catalog::{ServiceCatalog, StorageService};
use crate::domain::{
    Capabilities, Instance, ServiceSnapshotMap, ServiceVolumeMap, Snapshot, SnapshotMap, Store,
    Volume, VolumeAttachOpts, VolumeCreateOpts, VolumeDetachOpts, VolumeInspectOpts, VolumeMap,
    VolumesOpts,
};
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::schema::ResponseSchema;
use crate::task::{Task, TaskContext};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct Dispatcher {
    catalog: Arc<ServiceCatalog>,
}

impl Dispatcher {
    pub fn new(catalog: Arc<ServiceCatalog>) -> Arc<Self> {
        Arc::new(Self { catalog })
    }

    pub fn catalog(&self) -> &Arc<ServiceCatalog> {
        &self.catalog
    }

    /// Submit one task against a named service
    fn single<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        service: &str,
        operation: &'static str,
        capability: Capabilities,
        schema: Option<ResponseSchema>,
        f: F,
    ) -> Result<Arc<Task<T>>>
    where
        T: Send + Sync + 'static,
        F: FnOnce(TaskContext, Arc<StorageService>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let service = self.catalog.lookup(service)?;
        debug!(service = %service.name(), operation, "Dispatching");

        Ok(service.task_execute(cancel, schema, move |ctx, svc| async move {
            let name = svc.name().to_string();
            let result = match svc.require(capability, operation) {
                Ok(()) => f(ctx, svc).await,
                Err(e) => Err(e),
            };
            result.map_err(|e| Error::backend(&name, operation, e))
        }))
    }

    // =========================================================================
    // Volume Listing
    // =========================================================================

    /// List volumes across every service
    pub fn volumes(
        &self,
        cancel: &CancellationToken,
        opts: VolumesOpts,
        filter: Filter,
    ) -> Arc<Task<ServiceVolumeMap>> {
        let opts = Arc::new(opts);
        let filter = Arc::new(filter);

        fan_out(
            &self.catalog,
            cancel,
            FanoutPlan {
                operation: "volumes",
                capability: Capabilities::VOLUMES,
                item_schema: Some(ResponseSchema::VolumeMap),
                batch_schema: Some(ResponseSchema::ServiceVolumeMap),
                empty_policy: EmptyPolicy::Keep,
            },
            move |ctx, svc| {
                let opts = opts.clone();
                let filter = filter.clone();
                async move { list_volumes(&ctx, &svc, &opts, &filter).await }
            },
        )
    }

    /// List one service's volumes
    pub fn volumes_for_service(
        &self,
        cancel: &CancellationToken,
        service: &str,
        opts: VolumesOpts,
        filter: Filter,
    ) -> Result<Arc<Task<VolumeMap>>> {
        self.single(
            cancel,
            service,
            "volumes",
            Capabilities::VOLUMES,
            Some(ResponseSchema::VolumeMap),
            move |ctx, svc| async move { list_volumes(&ctx, &svc, &opts, &filter).await },
        )
    }

    // =========================================================================
    // Single Volume Operations
    // =========================================================================

    pub fn volume_inspect(
        &self,
        cancel: &CancellationToken,
        service: &str,
        volume_id: String,
        opts: VolumeInspectOpts,
    ) -> Result<Arc<Task<Volume>>> {
        self.single(
            cancel,
            service,
            "volume_inspect",
            Capabilities::VOLUME_INSPECT,
            Some(ResponseSchema::Volume),
            move |ctx, svc| async move {
                svc.driver().volume_inspect(&ctx, &volume_id, &opts).await
            },
        )
    }

    pub fn volume_create(
        &self,
        cancel: &CancellationToken,
        service: &str,
        name: String,
        opts: VolumeCreateOpts,
    ) -> Result<Arc<Task<Volume>>> {
        if name.trim().is_empty() {
            return Err(Error::InvalidRequest("volume name is required".into()));
        }

        self.single(
            cancel,
            service,
            "volume_create",
            Capabilities::VOLUME_CREATE,
            Some(ResponseSchema::Volume),
            move |ctx, svc| async move { svc.driver().volume_create(&ctx, &name, &opts).await },
        )
    }

    pub fn volume_copy(
        &self,
        cancel: &CancellationToken,
        service: &str,
        volume_id: String,
        volume_name: String,
        opts: Store,
    ) -> Result<Arc<Task<Volume>>> {
        self.single(
            cancel,
            service,
            "volume_copy",
            Capabilities::VOLUME_COPY,
            Some(ResponseSchema::Volume),
            move |ctx, svc| async move {
                svc.driver()
                    .volume_copy(&ctx, &volume_id, &volume_name, &opts)
                    .await
            },
        )
    }

    pub fn volume_snapshot(
        &self,
        cancel: &CancellationToken,
        service: &str,
        volume_id: String,
        snapshot_name: String,
        opts: Store,
    ) -> Result<Arc<Task<Snapshot>>> {
        self.single(
            cancel,
            service,
            "volume_snapshot",
            Capabilities::VOLUME_SNAPSHOT,
            Some(ResponseSchema::Snapshot),
            move |ctx, svc| async move {
                svc.driver()
                    .volume_snapshot(&ctx, &volume_id, &snapshot_name, &opts)
                    .await
            },
        )
    }

    pub fn volume_attach(
        &self,
        cancel: &CancellationToken,
        service: &str,
        volume_id: String,
        opts: VolumeAttachOpts,
    ) -> Result<Arc<Task<Volume>>> {
        self.single(
            cancel,
            service,
            "volume_attach",
            Capabilities::VOLUME_ATTACH,
            Some(ResponseSchema::Volume),
            move |ctx, svc| async move {
                svc.driver().volume_attach(&ctx, &volume_id, &opts).await
            },
        )
    }

    pub fn volume_detach(
        &self,
        cancel: &CancellationToken,
        service: &str,
        volume_id: String,
        opts: VolumeDetachOpts,
    ) -> Result<Arc<Task<()>>> {
        self.single(
            cancel,
            service,
            "volume_detach",
            Capabilities::VOLUME_DETACH,
            None,
            move |ctx, svc| async move {
                svc.driver().volume_detach(&ctx, &volume_id, &opts).await
            },
        )
    }

    pub fn volume_remove(
        &self,
        cancel: &CancellationToken,
        service: &str,
        volume_id: String,
        opts: Store,
    ) -> Result<Arc<Task<()>>> {
        self.single(
            cancel,
            service,
            "volume_remove",
            Capabilities::VOLUME_REMOVE,
            None,
            move |ctx, svc| async move {
                svc.driver().volume_remove(&ctx, &volume_id, &opts).await
            },
        )
    }

    // =========================================================================
    // Detach All
    // =========================================================================

    /// Detach every attached volume on every service
    ///
    /// Services that detached nothing are omitted from the result.
    pub fn volume_detach_all(
        &self,
        cancel: &CancellationToken,
        opts: VolumeDetachOpts,
    ) -> Arc<Task<ServiceVolumeMap>> {
        let opts = Arc::new(opts);

        fan_out(
            &self.catalog,
            cancel,
            FanoutPlan {
                operation: "volume_detach_all",
                capability: Capabilities::VOLUMES | Capabilities::VOLUME_DETACH,
                item_schema: Some(ResponseSchema::VolumeMap),
                batch_schema: Some(ResponseSchema::ServiceVolumeMap),
                empty_policy: EmptyPolicy::Omit,
            },
            move |ctx, svc| {
                let opts = opts.clone();
                async move { detach_attached(&ctx, &svc, &opts).await }
            },
        )
    }

    /// Detach every attached volume on one service
    ///
    /// A failure part-way through reports the volumes already detached via
    /// `BatchPartial`.
    pub fn volume_detach_all_for_service(
        &self,
        cancel: &CancellationToken,
        service: &str,
        opts: VolumeDetachOpts,
    ) -> Result<Arc<Task<VolumeMap>>> {
        let service = self.catalog.lookup(service)?;
        service.require(Capabilities::VOLUME_DETACH, "volume_detach_all")?;

        Ok(service.task_execute(
            cancel,
            Some(ResponseSchema::VolumeMap),
            move |ctx, svc| async move { detach_attached(&ctx, &svc, &opts).await },
        ))
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// List snapshots across every service that supports them
    pub fn snapshots(
        &self,
        cancel: &CancellationToken,
        opts: Store,
        filter: Filter,
    ) -> Arc<Task<ServiceSnapshotMap>> {
        let opts = Arc::new(opts);
        let filter = Arc::new(filter);

        fan_out(
            &self.catalog,
            cancel,
            FanoutPlan {
                operation: "snapshots",
                capability: Capabilities::SNAPSHOTS,
                item_schema: Some(ResponseSchema::SnapshotMap),
                batch_schema: Some(ResponseSchema::ServiceSnapshotMap),
                empty_policy: EmptyPolicy::Keep,
            },
            move |ctx, svc| {
                let opts = opts.clone();
                let filter = filter.clone();
                async move { list_snapshots(&ctx, &svc, &opts, &filter).await }
            },
        )
    }

    pub fn snapshots_for_service(
        &self,
        cancel: &CancellationToken,
        service: &str,
        opts: Store,
        filter: Filter,
    ) -> Result<Arc<Task<SnapshotMap>>> {
        self.single(
            cancel,
            service,
            "snapshots",
            Capabilities::SNAPSHOTS,
            Some(ResponseSchema::SnapshotMap),
            move |ctx, svc| async move { list_snapshots(&ctx, &svc, &opts, &filter).await },
        )
    }

    // =========================================================================
    // Instances
    // =========================================================================

    pub fn instance_inspect(
        &self,
        cancel: &CancellationToken,
        service: &str,
        opts: Store,
    ) -> Result<Arc<Task<Instance>>> {
        self.single(
            cancel,
            service,
            "instance_inspect",
            Capabilities::INSTANCE_INSPECT,
            Some(ResponseSchema::Instance),
            move |ctx, svc| async move { svc.driver().instance_inspect(&ctx, &opts).await },
        )
    }
}

// =============================================================================
// Per-Service Bodies
// =============================================================================

async fn list_volumes(
    ctx: &TaskContext,
    svc: &StorageService,
    opts: &VolumesOpts,
    filter: &Filter,
) -> Result<VolumeMap> {
    let volumes = svc.driver().volumes(ctx, opts).await?;
    Ok(filter
        .apply(volumes)
        .into_iter()
        .map(|v| (v.id.clone(), v))
        .collect())
}

async fn list_snapshots(
    ctx: &TaskContext,
    svc: &StorageService,
    opts: &Store,
    filter: &Filter,
) -> Result<SnapshotMap> {
    let snapshots = svc.driver().snapshots(ctx, opts).await?;
    Ok(filter
        .apply(snapshots)
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect())
}

/// Detach each attached volume; on failure report what was detached so far
async fn detach_attached(
    ctx: &TaskContext,
    svc: &StorageService,
    opts: &VolumeDetachOpts,
) -> Result<VolumeMap> {
    let list_opts = VolumesOpts {
        attachments: true,
        opts: opts.opts.clone(),
    };
    let volumes = svc.driver().volumes(ctx, &list_opts).await?;

    let mut detached = VolumeMap::new();
    for volume in volumes.into_iter().filter(Volume::is_attached) {
        ctx.check()?;
        if let Err(e) = svc.driver().volume_detach(ctx, &volume.id, opts).await {
            let first = Arc::new(Error::backend(svc.name(), "volume_detach", e));
            return Err(Error::BatchPartial {
                partial: Box::new(serde_json::to_value(&detached)?),
                failures: [(volume.id.clone(), first.to_string())].into_iter().collect(),
                first,
            });
        }
        detached.insert(volume.id.clone(), volume);
    }

    Ok(detached)
}
