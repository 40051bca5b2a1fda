//! Task Engine - Submit/await of asynchronous units of work
//!
//! Every backend operation runs as a task. Fan-out aggregation is just
//! another task whose body calls [`TaskEngine::wait_all`].

pub mod context;
pub mod engine;
pub mod handle;

pub use context::TaskContext;
pub use engine::{TaskEngine, TaskEngineConfig};
pub use handle::{Joinable, Task, TaskId, TaskOutcome, TaskState};
