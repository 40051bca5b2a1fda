//! Fan-out Dispatcher - storage operations as tasks over the service catalog

pub mod batch;
pub mod dispatcher;
pub mod fanout;

pub use batch::{BatchResponse, EmptyPolicy, IsEmpty, VolumeBatch};
pub use dispatcher::Dispatcher;
pub use fanout::{fan_out, FanoutPlan};
