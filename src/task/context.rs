//! Task Context
//!
//! Handed to every task body. Carries the task's identity, the service it
//! runs against (if any) and the cooperative cancellation token.

use super::handle::TaskId;
use crate::error::{Error, Result};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: TaskId,
    service: Option<String>,
    token: CancellationToken,
}

impl TaskContext {
    pub fn new(task_id: TaskId, service: Option<String>, token: CancellationToken) -> Self {
        Self {
            task_id,
            service,
            token,
        }
    }

    /// Context for calling a driver outside of the task engine
    pub fn detached(service: Option<&str>) -> Self {
        Self::new(0, service.map(str::to_string), CancellationToken::new())
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Service this task targets
    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the task has been cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
