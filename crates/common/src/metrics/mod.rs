//! Metrics and observability utilities
//!
//! Provides Prometheus metric descriptions with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram,
    gauge, histogram, Unit,
};
use std::time::Instant;

/// Metrics prefix for all SPEAR metrics
pub const METRICS_PREFIX: &str = "spear";

/// SLO-aligned histogram buckets for request and run latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Ranking run metrics
    describe_counter!(
        format!("{}_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Total ranking runs, labelled by credit function and convergence"
    );

    describe_histogram!(
        format!("{}_run_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Graph build plus solve latency in seconds"
    );

    describe_histogram!(
        format!("{}_run_iterations", METRICS_PREFIX),
        Unit::Count,
        "Solver iterations per run"
    );

    describe_gauge!(
        format!("{}_run_users", METRICS_PREFIX),
        Unit::Count,
        "Distinct users in the most recent run"
    );

    describe_gauge!(
        format!("{}_run_resources", METRICS_PREFIX),
        Unit::Count,
        "Distinct resources in the most recent run"
    );

    describe_counter!(
        format!("{}_run_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Ranking runs rejected or aborted, labelled by error code"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Summary of one completed ranking run, as seen by metrics
#[derive(Debug, Clone, Copy)]
pub struct RunSample<'a> {
    pub credit: &'a str,
    pub duration_secs: f64,
    pub iterations: usize,
    pub converged: bool,
    pub users: usize,
    pub resources: usize,
}

/// Helper to record a completed ranking run
pub fn record_run(sample: RunSample<'_>) {
    let converged = if sample.converged { "true" } else { "false" };

    counter!(
        format!("{}_runs_total", METRICS_PREFIX),
        "credit" => sample.credit.to_string(),
        "converged" => converged
    )
    .increment(1);

    histogram!(
        format!("{}_run_duration_seconds", METRICS_PREFIX),
        "credit" => sample.credit.to_string()
    )
    .record(sample.duration_secs);

    histogram!(format!("{}_run_iterations", METRICS_PREFIX))
        .record(sample.iterations as f64);

    gauge!(format!("{}_run_users", METRICS_PREFIX)).set(sample.users as f64);
    gauge!(format!("{}_run_resources", METRICS_PREFIX)).set(sample.resources as f64);
}

/// Helper to record a rejected or aborted ranking run
pub fn record_failure(code: &str) {
    counter!(
        format!("{}_run_failures_total", METRICS_PREFIX),
        "code" => code.to_string()
    )
    .increment(1);
}
