//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Pipeline runs (outcomes, stage durations, active runs)
//! - Provisioning (tool installs, cookie refreshes)
//! - External services (catalog, artwork downloads)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Runs started total.
pub static RUNS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("tubetag_runs_started_total", "Total pipeline runs started").unwrap()
});

/// Runs finished total by outcome.
pub static RUNS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("tubetag_runs_finished_total", "Total pipeline runs finished"),
        &["outcome"], // "success" or a failure kind such as "no_match"
    )
    .unwrap()
});

/// Runs currently in flight.
pub static RUNS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("tubetag_runs_active", "Pipeline runs currently in flight").unwrap()
});

/// Stage duration in seconds.
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "tubetag_stage_duration_seconds",
            "Duration of each pipeline stage",
        )
        .buckets(vec![
            0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 900.0,
        ]),
        &["stage"],
    )
    .unwrap()
});

/// Undelivered artifacts removed by the reaper.
pub static ARTIFACTS_REAPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "tubetag_artifacts_reaped_total",
        "Total undelivered artifacts removed after expiry",
    )
    .unwrap()
});

// =============================================================================
// Provisioning Metrics
// =============================================================================

/// Tool provisioning attempts by tool and result.
pub static PROVISION_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tubetag_provision_attempts_total",
            "Total external tool provisioning attempts",
        ),
        &["tool", "result"], // result: "ok", "failed"
    )
    .unwrap()
});

/// Cookie refreshes by result.
pub static CREDENTIAL_REFRESHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tubetag_credential_refreshes_total",
            "Total session cookie refreshes",
        ),
        &["result"], // "ok", "failed"
    )
    .unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// External service request duration.
pub static EXTERNAL_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "tubetag_external_service_duration_seconds",
            "Duration of external service calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["service", "operation"],
    )
    .unwrap()
});

/// External service requests total.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "tubetag_external_service_requests_total",
            "Total external service requests",
        ),
        &["service", "operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Records one external call in the request counter and duration histogram.
pub fn observe_external_call(service: &str, operation: &str, success: bool, seconds: f64) {
    let status = if success { "success" } else { "error" };
    EXTERNAL_SERVICE_REQUESTS
        .with_label_values(&[service, operation, status])
        .inc();
    EXTERNAL_SERVICE_DURATION
        .with_label_values(&[service, operation])
        .observe(seconds);
}

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Pipeline
        Box::new(RUNS_STARTED.clone()),
        Box::new(RUNS_FINISHED.clone()),
        Box::new(RUNS_ACTIVE.clone()),
        Box::new(STAGE_DURATION.clone()),
        Box::new(ARTIFACTS_REAPED.clone()),
        // Provisioning
        Box::new(PROVISION_ATTEMPTS.clone()),
        Box::new(CREDENTIAL_REFRESHES.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_DURATION.clone()),
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
    ]
}
