//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Admission (accepted and rejected submissions)
//! - Execution (outcomes, engine duration, queue wait)
//! - Artifact cleanup failures

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Admission Metrics
// =============================================================================

/// Submissions by admission result.
pub static JOBS_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("cutout_jobs_submitted_total", "Total job submissions"),
        &["result"], // "accepted", "busy", "shutting_down"
    )
    .unwrap()
});

/// Time a job spent queued before a slot freed up.
pub static QUEUE_WAIT: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "cutout_queue_wait_seconds",
            "Time jobs spent waiting for an execution slot",
        )
        .buckets(vec![0.0, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &[],
    )
    .unwrap()
});

// =============================================================================
// Execution Metrics
// =============================================================================

/// Finished jobs by outcome.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("cutout_jobs_finished_total", "Total jobs that reached a terminal state"),
        &["result"], // "completed", "failed"
    )
    .unwrap()
});

/// Engine duration in seconds.
pub static TRANSFORM_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "cutout_transform_duration_seconds",
            "Duration of background removal runs",
        )
        .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0]),
        &["result"],
    )
    .unwrap()
});

// =============================================================================
// Artifact Metrics
// =============================================================================

/// Artifacts that could not be deleted.
pub static CLEANUP_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "cutout_cleanup_failures_total",
        "Total artifact deletions that failed",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(JOBS_SUBMITTED.clone()),
        Box::new(QUEUE_WAIT.clone()),
        Box::new(JOBS_FINISHED.clone()),
        Box::new(TRANSFORM_DURATION.clone()),
        Box::new(CLEANUP_FAILURES.clone()),
    ]
}
