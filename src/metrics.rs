//! Gateway Metrics
//!
//! Prometheus collectors for the task lifecycle and fan-out latency. Each
//! [`Metrics`] owns its own registry so that several gateways (or tests) in
//! one process never collide on metric names.

use crate::error::{Error, Result};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Metric name prefix
const NAMESPACE: &str = "storage_gateway";

/// Outcome label values for `tasks_completed_total`
pub mod outcome {
    pub const SUCCESS: &str = "success";
    pub const ERROR: &str = "error";
    pub const TIMEOUT: &str = "timeout";
    pub const CANCELLED: &str = "cancelled";
    pub const PANICKED: &str = "panicked";
}

/// Task and fan-out collectors
pub struct Metrics {
    registry: Registry,
    tasks_submitted: IntCounter,
    tasks_completed: IntCounterVec,
    tasks_in_flight: IntGauge,
    fanout_duration: HistogramVec,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("tasks_submitted", &self.tasks_submitted.get())
            .field("tasks_in_flight", &self.tasks_in_flight.get())
            .finish()
    }
}

impl Metrics {
    /// Create and register all collectors
    pub fn new() -> Result<Arc<Self>> {
        let registry = Registry::new();

        let tasks_submitted = IntCounter::with_opts(
            Opts::new("tasks_submitted_total", "Total number of submitted tasks")
                .namespace(NAMESPACE),
        )
        .map_err(metrics_error)?;

        let tasks_completed = IntCounterVec::new(
            Opts::new("tasks_completed_total", "Terminal tasks by outcome").namespace(NAMESPACE),
            &["outcome"],
        )
        .map_err(metrics_error)?;

        let tasks_in_flight = IntGauge::with_opts(
            Opts::new("tasks_in_flight", "Task bodies currently running").namespace(NAMESPACE),
        )
        .map_err(metrics_error)?;

        let fanout_duration = HistogramVec::new(
            HistogramOpts::new(
                "fanout_duration_seconds",
                "Duration of fan-out operations across all services",
            )
            .namespace(NAMESPACE),
            &["operation"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(tasks_submitted.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(tasks_completed.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(tasks_in_flight.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(fanout_duration.clone()))
            .map_err(metrics_error)?;

        Ok(Arc::new(Self {
            registry,
            tasks_submitted,
            tasks_completed,
            tasks_in_flight,
            fanout_duration,
        }))
    }

    #[inline]
    pub fn task_submitted(&self) {
        self.tasks_submitted.inc();
    }

    #[inline]
    pub fn task_started(&self) {
        self.tasks_in_flight.inc();
    }

    #[inline]
    pub fn task_finished(&self) {
        self.tasks_in_flight.dec();
    }

    #[inline]
    pub fn task_completed(&self, outcome: &str) {
        self.tasks_completed.with_label_values(&[outcome]).inc();
    }

    pub fn observe_fanout(&self, operation: &str, elapsed: Duration) {
        self.fanout_duration
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    pub fn submitted(&self) -> u64 {
        self.tasks_submitted.get()
    }

    pub fn completed(&self, outcome: &str) -> u64 {
        self.tasks_completed.with_label_values(&[outcome]).get()
    }

    pub fn in_flight(&self) -> i64 {
        self.tasks_in_flight.get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all collectors in the Prometheus text format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}
