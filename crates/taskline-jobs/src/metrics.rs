//! Prometheus metrics for engines and workers.
//!
//! Recording goes through the `metrics` facade and is a no-op until the
//! binary installs a recorder.

use crate::stats::Tally;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Metric names.
pub mod names {
    /// Items stored by `push`.
    pub const ENGINE_PUSHED_TOTAL: &str = "taskline_engine_pushed_total";
    /// Items handed out by `pop`.
    pub const ENGINE_POPPED_TOTAL: &str = "taskline_engine_popped_total";
    /// Backend operations that failed.
    pub const ENGINE_ERRORS_TOTAL: &str = "taskline_engine_errors_total";

    /// Worker poll iterations, by outcome.
    pub const WORKER_ITERATIONS_TOTAL: &str = "taskline_worker_iterations_total";
    /// Handler execution time in seconds.
    pub const JOB_DURATION_SECONDS: &str = "taskline_job_duration_seconds";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::ENGINE_PUSHED_TOTAL, "Total number of items pushed");
    describe_counter!(names::ENGINE_POPPED_TOTAL, "Total number of items popped");
    describe_counter!(
        names::ENGINE_ERRORS_TOTAL,
        "Total number of failed engine operations"
    );
    describe_counter!(
        names::WORKER_ITERATIONS_TOTAL,
        "Total number of worker poll iterations by outcome"
    );
    describe_histogram!(
        names::JOB_DURATION_SECONDS,
        "Handler execution duration in seconds"
    );
}

/// Engine metrics recorder.
pub struct EngineMetrics;

impl EngineMetrics {
    /// Record a stored item.
    pub fn pushed(backend: &'static str, queue: &str) {
        counter!(
            names::ENGINE_PUSHED_TOTAL,
            "backend" => backend,
            "queue" => queue.to_string()
        )
        .increment(1);
    }

    /// Record a delivered item.
    pub fn popped(backend: &'static str, queue: &str) {
        counter!(
            names::ENGINE_POPPED_TOTAL,
            "backend" => backend,
            "queue" => queue.to_string()
        )
        .increment(1);
    }

    /// Record a failed operation.
    pub fn error(backend: &'static str, operation: &'static str, kind: &'static str) {
        counter!(
            names::ENGINE_ERRORS_TOTAL,
            "backend" => backend,
            "operation" => operation,
            "kind" => kind
        )
        .increment(1);
    }
}

/// Worker metrics recorder.
pub struct WorkerMetrics;

impl WorkerMetrics {
    /// Record one classified poll iteration.
    pub fn iteration(queue: &str, tally: Tally) {
        counter!(
            names::WORKER_ITERATIONS_TOTAL,
            "queue" => queue.to_string(),
            "outcome" => tally.as_str()
        )
        .increment(1);
    }

    /// Record how long a handler ran.
    pub fn job_duration(queue: &str, tally: Tally, duration: Duration) {
        histogram!(
            names::JOB_DURATION_SECONDS,
            "queue" => queue.to_string(),
            "outcome" => tally.as_str()
        )
        .record(duration.as_secs_f64());
    }
}
