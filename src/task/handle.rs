//! Task Handles
//!
//! A [`Task`] is written exactly once by the worker that executes it and read
//! by any number of waiters. The terminal outcome lives in a `OnceLock`; the
//! transition is published through a `watch` channel so that waiters which
//! subscribe late still observe it.

use crate::error::Error;
use crate::schema::ResponseSchema;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;

/// Monotonically assigned task identifier
pub type TaskId = u64;

/// Terminal result of a task. Errors are shared so that every waiter can
/// hold one.
pub type TaskOutcome<T> = std::result::Result<T, Arc<Error>>;

// =============================================================================
// Task State
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Pending = 0,
    Running = 1,
    Succeeded = 2,
    Failed = 3,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskState::Pending,
            1 => TaskState::Running,
            2 => TaskState::Succeeded,
            _ => TaskState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Running => write!(f, "running"),
            TaskState::Succeeded => write!(f, "succeeded"),
            TaskState::Failed => write!(f, "failed"),
        }
    }
}

// =============================================================================
// Task
// =============================================================================

/// An asynchronous unit of work
pub struct Task<T> {
    id: TaskId,
    service: Option<String>,
    schema: Option<ResponseSchema>,
    submitted_at: DateTime<Utc>,
    state: AtomicU8,
    outcome: OnceLock<TaskOutcome<T>>,
    done: watch::Sender<bool>,
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("service", &self.service)
            .field("state", &self.state())
            .finish()
    }
}

impl<T> Task<T> {
    pub(crate) fn new(id: TaskId, service: Option<String>, schema: Option<ResponseSchema>) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            id,
            service,
            schema,
            submitted_at: Utc::now(),
            state: AtomicU8::new(TaskState::Pending as u8),
            outcome: OnceLock::new(),
            done,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    /// Schema the result must satisfy before it is written to a client
    pub fn schema(&self) -> Option<ResponseSchema> {
        self.schema
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn mark_running(&self) {
        let _ = self.state.compare_exchange(
            TaskState::Pending as u8,
            TaskState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Record the terminal outcome. Only the first call has any effect.
    pub(crate) fn complete(&self, outcome: TaskOutcome<T>) -> bool {
        let state = if outcome.is_ok() {
            TaskState::Succeeded
        } else {
            TaskState::Failed
        };

        if self.outcome.set(outcome).is_err() {
            return false;
        }
        self.state.store(state as u8, Ordering::Release);
        self.done.send_replace(true);
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.get().is_some()
    }

    pub fn outcome(&self) -> Option<&TaskOutcome<T>> {
        self.outcome.get()
    }

    pub fn result(&self) -> Option<&T> {
        self.outcome.get()?.as_ref().ok()
    }

    pub fn error(&self) -> Option<&Arc<Error>> {
        self.outcome.get()?.as_ref().err()
    }

    /// Receiver that flips to `true` when the task becomes terminal
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.done.subscribe()
    }

    /// Wait for the terminal outcome
    pub async fn wait(&self) -> &TaskOutcome<T> {
        // Subscribe before checking so a completion in between is not missed
        let mut rx = self.done.subscribe();
        loop {
            if let Some(outcome) = self.outcome.get() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                tokio::task::yield_now().await;
            }
        }
    }

    /// Wait and clone the outcome out of the task
    pub async fn join(&self) -> TaskOutcome<T>
    where
        T: Clone,
    {
        self.wait().await.clone()
    }
}

// =============================================================================
// Joinable
// =============================================================================

/// Type-erased view of a task used by `wait_all`
pub trait Joinable: Send + Sync {
    fn id(&self) -> TaskId;
    fn is_terminal(&self) -> bool;
    fn completion(&self) -> watch::Receiver<bool>;
}

impl<T: Send + Sync> Joinable for Task<T> {
    fn id(&self) -> TaskId {
        self.id
    }

    fn is_terminal(&self) -> bool {
        Task::is_terminal(self)
    }

    fn completion(&self) -> watch::Receiver<bool> {
        self.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_is_one_shot() {
        let task: Task<u32> = Task::new(1, None, None);
        assert_eq!(task.state(), TaskState::Pending);
        assert!(!task.is_terminal());

        assert!(task.complete(Ok(7)));
        assert!(!task.complete(Err(Arc::new(Error::Cancelled))));

        assert_eq!(task.state(), TaskState::Succeeded);
        assert_eq!(task.result(), Some(&7));
        assert!(task.error().is_none());
    }

    #[test]
    fn test_failed_state() {
        let task: Task<u32> = Task::new(2, Some("vfs".into()), None);
        task.mark_running();
        assert_eq!(task.state(), TaskState::Running);

        task.complete(Err(Arc::new(Error::Internal("boom".into()))));
        assert_eq!(task.state(), TaskState::Failed);
        assert!(task.state().is_terminal());
        assert!(task.result().is_none());
        assert_eq!(task.service(), Some("vfs"));
    }

    #[tokio::test]
    async fn test_wait_observes_late_completion() {
        let task = Arc::new(Task::<String>::new(3, None, None));

        let waiter = {
            let task = task.clone();
            tokio::spawn(async move { task.join().await })
        };

        tokio::task::yield_now().await;
        task.complete(Ok("done".to_string()));

        let outcome = waiter.await.unwrap();
        assert_eq!(outcome.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_wait_after_completion_returns_immediately() {
        let task: Task<u8> = Task::new(4, None, None);
        task.complete(Ok(1));
        assert_eq!(*task.wait().await.as_ref().unwrap(), 1);

        let mut rx = task.subscribe();
        assert!(*rx.borrow_and_update());
    }
}
