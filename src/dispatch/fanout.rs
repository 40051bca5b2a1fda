//! Fan-out
//!
//! One task per applicable service, plus an aggregator task that joins on
//! all of them and folds their outcomes into a [`BatchResponse`].

use super::batch::{BatchResponse, EmptyPolicy, IsEmpty};
use crate::catalog::{ServiceCatalog, StorageService};
use crate::domain::Capabilities;
use crate::error::{Error, Result};
use crate::schema::ResponseSchema;
use crate::task::{Task, TaskContext, TaskId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Describes one fan-out operation
#[derive(Debug, Clone, Copy)]
pub struct FanoutPlan {
    /// Operation name used in errors and metrics
    pub operation: &'static str,
    /// Services lacking this capability are skipped
    pub capability: Capabilities,
    /// Schema of each service's result
    pub item_schema: Option<ResponseSchema>,
    /// Schema of the aggregated result
    pub batch_schema: Option<ResponseSchema>,
    pub empty_policy: EmptyPolicy,
}

/// Run `op` against every applicable service and aggregate the outcomes
///
/// The returned task succeeds with a map of service name to result when every
/// service succeeded, and fails with `BatchPartial` otherwise.
pub fn fan_out<T, F, Fut>(
    catalog: &ServiceCatalog,
    cancel: &CancellationToken,
    plan: FanoutPlan,
    op: F,
) -> Arc<Task<BTreeMap<String, T>>>
where
    T: Clone + Serialize + IsEmpty + Send + Sync + 'static,
    F: Fn(TaskContext, Arc<StorageService>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let started = Instant::now();
    let op = Arc::new(op);
    let operation = plan.operation;

    let tasks: Vec<(String, Arc<Task<T>>)> = catalog
        .all()
        .filter(|service| {
            let supported = service.supports(plan.capability);
            if !supported {
                debug!(service = %service.name(), operation, "Skipping service without capability");
            }
            supported
        })
        .map(|service| {
            let op = op.clone();
            let task = service.task_execute(cancel, plan.item_schema, move |ctx, svc| async move {
                let name = svc.name().to_string();
                op(ctx, svc)
                    .await
                    .map_err(|e| Error::backend(&name, operation, e))
            });
            (service.name().to_string(), task)
        })
        .collect();

    let ids: Vec<TaskId> = tasks.iter().map(|(_, task)| task.id()).collect();
    let engine = catalog.engine().clone();
    let joiner = engine.clone();

    debug!(operation, services = tasks.len(), "Fan-out submitted");

    engine.execute_join(cancel, plan.batch_schema, move |_ctx| async move {
        joiner.wait_all(&ids).await;

        let mut batch = BatchResponse::new(plan.empty_policy);
        for (service, task) in tasks {
            match task.outcome() {
                Some(Ok(result)) => batch.insert_result(service, result.clone()),
                Some(Err(err)) => batch.insert_failure(service, err.clone()),
                None => batch.insert_error(
                    service,
                    Arc::new(Error::Internal(format!("task {} did not complete", task.id()))),
                ),
            }
        }

        if let Some(metrics) = joiner.metrics() {
            metrics.observe_fanout(operation, started.elapsed());
        }
        debug!(
            operation,
            succeeded = batch.results().len(),
            failed = batch.errors().len(),
            "Fan-out aggregated"
        );

        batch.into_result()
    })
}
