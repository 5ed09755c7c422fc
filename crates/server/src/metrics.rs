//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the cutout server:
//! - HTTP request metrics (latency, counts, in flight)
//! - Queue depth and active jobs (collected at scrape time)
//! - Core job metrics, registered alongside

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

use cutout_core::QueueStatus;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "cutout_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("cutout_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "cutout_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Queue Metrics (collected dynamically)
// =============================================================================

/// Jobs waiting for a slot.
pub static QUEUE_LENGTH: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("cutout_queue_length", "Number of jobs waiting for a slot").unwrap()
});

/// Configured queue capacity.
pub static QUEUE_CAPACITY: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("cutout_queue_capacity", "Maximum number of waiting jobs").unwrap()
});

/// Jobs being processed.
pub static JOBS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("cutout_jobs_active", "Number of jobs being processed").unwrap()
});

/// Whether the scheduler accepts jobs (1 = accepting, 0 = shutting down).
pub static SCHEDULER_ACCEPTING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "cutout_scheduler_accepting",
        "Whether new jobs are accepted (1) or not (0)",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Queue
    registry.register(Box::new(QUEUE_LENGTH.clone())).unwrap();
    registry.register(Box::new(QUEUE_CAPACITY.clone())).unwrap();
    registry.register(Box::new(JOBS_ACTIVE.clone())).unwrap();
    registry
        .register(Box::new(SCHEDULER_ACCEPTING.clone()))
        .unwrap();

    // Core metrics (admission, execution, cleanup)
    for metric in cutout_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Update queue gauges from a scheduler snapshot.
///
/// Called right before encoding so the gauges reflect the moment of the scrape.
pub fn collect_queue_metrics(status: &QueueStatus) {
    QUEUE_LENGTH.set(status.queued_jobs as i64);
    QUEUE_CAPACITY.set(status.max_queue_length as i64);
    JOBS_ACTIVE.set(status.active_jobs as i64);
    SCHEDULER_ACCEPTING.set(if status.running { 1 } else { 0 });
}

/// Label used for requests that did not match a route.
pub const UNMATCHED_PATH: &str = "unmatched";

/// Path label for a request: the matched route template, if any.
///
/// Unmatched paths collapse into one label so scanners cannot blow up the
/// label cardinality.
pub fn path_label(matched: Option<&str>) -> &str {
    matched.unwrap_or(UNMATCHED_PATH)
}
