//! Task Engine
//!
//! Submits asynchronous units of work onto the tokio runtime and lets callers
//! join on them by id. Submission returns immediately with an `Arc<Task<T>>`;
//! the body runs in its own spawned task.
//!
//! # Concurrency
//!
//! - Live tasks are tracked in a `DashMap` and dropped from it once terminal.
//!   `wait_all` treats ids it no longer knows as terminal.
//! - With `max_concurrency > 0` a semaphore caps running bodies. Aggregation
//!   bodies submitted through [`TaskEngine::execute_join`] only wait on other
//!   tasks and never hold a permit, so nesting cannot starve the pool.
//! - Cancellation is cooperative: every task gets a child of the caller's
//!   token, which in turn descends from the engine's root token.

use super::context::TaskContext;
use super::handle::{Joinable, Task, TaskId};
use crate::config::TaskConfig;
use crate::error::{Error, Result};
use crate::metrics::{outcome, Metrics};
use crate::schema::ResponseSchema;
use dashmap::DashMap;
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Task engine configuration
#[derive(Debug, Clone, Default)]
pub struct TaskEngineConfig {
    /// Maximum concurrently running task bodies (0 = unbounded)
    pub max_concurrency: usize,
    /// Per-task timeout
    pub task_timeout: Option<Duration>,
}

impl From<&TaskConfig> for TaskEngineConfig {
    fn from(config: &TaskConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            task_timeout: config.timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Bounded,
    Unbounded,
}

// =============================================================================
// Task Engine
// =============================================================================

pub struct TaskEngine {
    next_id: AtomicU64,
    live: Arc<DashMap<TaskId, Arc<dyn Joinable>>>,
    permits: Option<Arc<Semaphore>>,
    task_timeout: Option<Duration>,
    root: CancellationToken,
    metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for TaskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEngine")
            .field("live", &self.live.len())
            .field("bounded", &self.permits.is_some())
            .field("task_timeout", &self.task_timeout)
            .finish()
    }
}

impl TaskEngine {
    /// Create a new task engine
    pub fn new(config: TaskEngineConfig) -> Arc<Self> {
        Self::build(config, None)
    }

    /// Create a task engine that records lifecycle metrics
    pub fn with_metrics(config: TaskEngineConfig, metrics: Arc<Metrics>) -> Arc<Self> {
        Self::build(config, Some(metrics))
    }

    fn build(config: TaskEngineConfig, metrics: Option<Arc<Metrics>>) -> Arc<Self> {
        let permits = (config.max_concurrency > 0)
            .then(|| Arc::new(Semaphore::new(config.max_concurrency)));

        info!(
            max_concurrency = config.max_concurrency,
            task_timeout = ?config.task_timeout,
            "Task engine initialized"
        );

        Arc::new(Self {
            next_id: AtomicU64::new(1),
            live: Arc::new(DashMap::new()),
            permits,
            task_timeout: config.task_timeout,
            root: CancellationToken::new(),
            metrics,
        })
    }

    /// A cancellation token for one request, cancelled on engine shutdown
    pub fn request_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Submit a task body. Returns before the body completes.
    pub fn execute<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        service: Option<&str>,
        schema: Option<ResponseSchema>,
        f: F,
    ) -> Arc<Task<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.submit(cancel, service, schema, Admission::Bounded, f)
    }

    /// Submit a body that only joins other tasks
    ///
    /// Such bodies bypass the concurrency bound and the per-task timeout;
    /// the tasks they wait on are already subject to both.
    pub fn execute_join<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        schema: Option<ResponseSchema>,
        f: F,
    ) -> Arc<Task<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.submit(cancel, None, schema, Admission::Unbounded, f)
    }

    fn submit<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        service: Option<&str>,
        schema: Option<ResponseSchema>,
        admission: Admission,
        f: F,
    ) -> Arc<Task<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let task = Arc::new(Task::new(id, service.map(str::to_string), schema));
        self.live.insert(id, task.clone() as Arc<dyn Joinable>);

        let token = cancel.child_token();
        let ctx = TaskContext::new(id, service.map(str::to_string), token.clone());

        let (permits, timeout) = match admission {
            Admission::Bounded => (self.permits.clone(), self.task_timeout),
            Admission::Unbounded => (None, None),
        };
        let live = self.live.clone();
        let metrics = self.metrics.clone();
        let handle = task.clone();

        if let Some(m) = &metrics {
            m.task_submitted();
        }
        debug!(task_id = id, service = ?service, "Task submitted");

        tokio::spawn(async move {
            let mut panicked = false;

            let outcome: Result<T> = async {
                let _permit = match permits {
                    Some(sem) => Some(tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(Error::Cancelled),
                        permit = sem.acquire_owned() => permit.map_err(|_| Error::Cancelled)?,
                    }),
                    None => None,
                };

                if token.is_cancelled() {
                    return Err(Error::Cancelled);
                }

                handle.mark_running();
                if let Some(m) = &metrics {
                    m.task_started();
                }

                let body = AssertUnwindSafe(async move { f(ctx).await }).catch_unwind();
                let result = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, body).await {
                        Ok(result) => result,
                        Err(_) => {
                            token.cancel();
                            Ok(Err(Error::Timeout(limit)))
                        }
                    },
                    None => body.await,
                };

                if let Some(m) = &metrics {
                    m.task_finished();
                }

                match result {
                    Ok(result) => result,
                    Err(payload) => {
                        panicked = true;
                        Err(Error::Internal(format!(
                            "task {} panicked: {}",
                            id,
                            panic_message(payload.as_ref())
                        )))
                    }
                }
            }
            .await;

            let label = match &outcome {
                Ok(_) => outcome::SUCCESS,
                Err(_) if panicked => outcome::PANICKED,
                Err(Error::Timeout(_)) => outcome::TIMEOUT,
                Err(Error::Cancelled) => outcome::CANCELLED,
                Err(_) => outcome::ERROR,
            };

            match &outcome {
                Err(e) if panicked => warn!(task_id = id, error = %e, "Task body panicked"),
                Err(e) => debug!(task_id = id, error = %e, "Task failed"),
                Ok(_) => debug!(task_id = id, "Task succeeded"),
            }

            handle.complete(outcome.map_err(Arc::new));
            live.remove(&id);

            if let Some(m) = &metrics {
                m.task_completed(label);
            }
        });

        task
    }

    /// Wait until every named task is terminal
    ///
    /// Never fails; outcomes are read from the tasks themselves.
    pub async fn wait_all(&self, ids: &[TaskId]) {
        let receivers: Vec<_> = ids
            .iter()
            .filter_map(|id| self.live.get(id).map(|task| task.completion()))
            .collect();

        join_all(receivers.into_iter().map(|mut rx| async move {
            // A closed channel means the task was dropped after completing
            let _ = rx.wait_for(|done| *done).await;
        }))
        .await;
    }

    /// Whether the id refers to a task that has not finished yet
    pub fn is_live(&self, id: TaskId) -> bool {
        self.live
            .get(&id)
            .map(|task| !task.is_terminal())
            .unwrap_or(false)
    }

    /// Number of tasks not yet terminal
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    /// Cancel every outstanding and future request token
    pub fn shutdown(&self) {
        info!(live = self.live.len(), "Task engine shutting down");
        self.root.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.root.is_cancelled()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::AtomicUsize;

    fn engine() -> Arc<TaskEngine> {
        TaskEngine::new(TaskEngineConfig::default())
    }

    #[tokio::test]
    async fn test_execute_round_trip() {
        let engine = engine();
        let token = engine.request_token();

        let task = engine.execute(&token, Some("vfs"), None, |ctx| async move {
            Ok(format!("{}:{}", ctx.service().unwrap_or_default(), ctx.task_id()))
        });

        let outcome = task.join().await;
        assert_eq!(outcome.unwrap(), format!("vfs:{}", task.id()));
        assert_eq!(task.service(), Some("vfs"));
    }

    #[tokio::test]
    async fn test_ids_are_monotonic() {
        let engine = engine();
        let token = engine.request_token();

        let a = engine.execute(&token, None, None, |_| async { Ok(()) });
        let b = engine.execute(&token, None, None, |_| async { Ok(()) });
        assert!(b.id() > a.id());
    }

    #[tokio::test]
    async fn test_error_outcome() {
        let engine = engine();
        let token = engine.request_token();

        let task = engine.execute(&token, None, None, |_| async {
            Err::<(), _>(Error::not_found("volume", "v1"))
        });

        engine.wait_all(&[task.id()]).await;
        assert!(task.is_terminal());
        assert_matches!(task.error().map(|e| e.as_ref()), Some(Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_wait_all_unknown_ids_are_terminal() {
        let engine = engine();
        engine.wait_all(&[]).await;
        engine.wait_all(&[9_999, 10_000]).await;
        assert!(!engine.is_live(9_999));
    }

    #[tokio::test]
    async fn test_live_tasks_are_dropped_when_terminal() {
        let engine = engine();
        let token = engine.request_token();

        let task = engine.execute(&token, None, None, |_| async { Ok(1u8) });
        task.wait().await;
        // Removal happens right after the terminal transition
        tokio::task::yield_now().await;
        for _ in 0..100 {
            if engine.live_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(engine.live_count(), 0);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let engine = engine();
        let token = engine.request_token();

        let task = engine.execute(&token, None, None, |_| async {
            if true {
                panic!("driver exploded");
            }
            Ok(())
        });

        let err = task.join().await.unwrap_err();
        assert_matches!(err.as_ref(), Error::Internal(msg) if msg.contains("driver exploded"));

        // The engine keeps working
        let next = engine.execute(&token, None, None, |_| async { Ok(5) });
        assert_eq!(next.join().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_timeout_cancels_body() {
        let engine = TaskEngine::new(TaskEngineConfig {
            max_concurrency: 0,
            task_timeout: Some(Duration::from_millis(20)),
        });
        let token = engine.request_token();

        let task = engine.execute(&token, None, None, |_| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        });

        let err = task.join().await.unwrap_err();
        assert_matches!(err.as_ref(), Error::Timeout(_));
    }

    #[tokio::test]
    async fn test_bounded_concurrency() {
        let engine = TaskEngine::new(TaskEngineConfig {
            max_concurrency: 2,
            task_timeout: None,
        });
        let token = engine.request_token();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let running = running.clone();
                let peak = peak.clone();
                engine.execute(&token, None, None, move |_| async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        let ids: Vec<_> = tasks.iter().map(|t| t.id()).collect();
        engine.wait_all(&ids).await;

        assert!(tasks.iter().all(|t| t.is_terminal()));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_nested_join_does_not_starve_bounded_pool() {
        let engine = TaskEngine::new(TaskEngineConfig {
            max_concurrency: 1,
            task_timeout: None,
        });
        let token = engine.request_token();

        let children: Vec<_> = (0..3u32)
            .map(|n| engine.execute(&token, None, None, move |_| async move { Ok(n) }))
            .collect();
        let ids: Vec<_> = children.iter().map(|t| t.id()).collect();

        let inner = engine.clone();
        let aggregate = engine.execute_join(&token, None, move |_| async move {
            inner.wait_all(&ids).await;
            Ok(children
                .iter()
                .filter_map(|t| t.result().copied())
                .sum::<u32>())
        });

        assert_eq!(aggregate.join().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_tokens() {
        let engine = engine();
        let token = engine.request_token();

        let task = engine.execute(&token, None, None, |ctx| async move {
            ctx.cancelled().await;
            ctx.check()
        });

        engine.shutdown();
        assert!(engine.is_shutdown());
        assert_matches!(task.join().await.unwrap_err().as_ref(), Error::Cancelled);
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let metrics = Metrics::new().unwrap();
        let engine = TaskEngine::with_metrics(TaskEngineConfig::default(), metrics.clone());
        let token = engine.request_token();

        let ok = engine.execute(&token, None, None, |_| async { Ok(()) });
        let bad = engine.execute(&token, None, None, |_| async {
            Err::<(), _>(Error::Internal("x".into()))
        });
        engine.wait_all(&[ok.id(), bad.id()]).await;

        // Counters are updated right after the terminal transition
        for _ in 0..100 {
            if metrics.completed(outcome::SUCCESS) + metrics.completed(outcome::ERROR) == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(metrics.submitted(), 2);
        assert_eq!(metrics.completed(outcome::SUCCESS), 1);
        assert_eq!(metrics.completed(outcome::ERROR), 1);
    }
}
