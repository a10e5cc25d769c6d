//! Prometheus metrics for the request gates.
//!
//! Exposed on a dedicated listener when `METRICS_PORT` is non-zero.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `user_gate_auth_outcomes_total` - Authentication gate results (label: outcome)
//! - `user_gate_rate_limit_decisions_total` - Window checks (labels: policy, decision)
//! - `user_gate_auth_failure_blocks_total` - Requests refused by the brute-force throttle
//!
//! ## Histograms
//! - `user_gate_request_duration_seconds` - Request duration (labels: route, method, status)
//!
//! ## Gauges
//! - `user_gate_tracked_windows` - Rate windows held in memory after the last sweep
//!
//! Recording functions are no-ops until a recorder is installed, so tests and
//! metric-less deployments can call them freely.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const AUTH_OUTCOMES_TOTAL: &str = "user_gate_auth_outcomes_total";
    pub const RATE_LIMIT_DECISIONS_TOTAL: &str = "user_gate_rate_limit_decisions_total";
    pub const AUTH_FAILURE_BLOCKS_TOTAL: &str = "user_gate_auth_failure_blocks_total";
    pub const REQUEST_DURATION_SECONDS: &str = "user_gate_request_duration_seconds";
    pub const TRACKED_WINDOWS: &str = "user_gate_tracked_windows";
}

/// Install the Prometheus exporter and describe all metrics.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::AUTH_OUTCOMES_TOTAL,
        "Authentication gate outcomes by result"
    );
    describe_counter!(
        names::RATE_LIMIT_DECISIONS_TOTAL,
        "Rate limit window checks by policy and decision"
    );
    describe_counter!(
        names::AUTH_FAILURE_BLOCKS_TOTAL,
        "Requests refused after repeated authentication failures"
    );
    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        names::TRACKED_WINDOWS,
        "Rate limit windows currently held in memory"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record one authentication gate outcome ("ok" or an `AuthError` label).
pub fn record_auth_outcome(outcome: &'static str) {
    counter!(names::AUTH_OUTCOMES_TOTAL, "outcome" => outcome).increment(1);
}

/// Record one rate-limit decision.
pub fn record_rate_limit_decision(policy: &str, admitted: bool) {
    let decision = if admitted { "admit" } else { "reject" };
    counter!(names::RATE_LIMIT_DECISIONS_TOTAL, "policy" => policy.to_string(), "decision" => decision)
        .increment(1);
}

/// Record a request refused by the auth failure throttle.
pub fn record_auth_failure_block() {
    counter!(names::AUTH_FAILURE_BLOCKS_TOTAL).increment(1);
}

/// Record HTTP request duration.
pub fn record_request_duration(route: &str, method: &str, status: u16, duration_secs: f64) {
    histogram!(names::REQUEST_DURATION_SECONDS, "route" => route.to_string(), "method" => method.to_string(), "status" => status.to_string())
        .record(duration_secs);
}

/// Update the tracked windows gauge.
pub fn set_tracked_windows(count: usize) {
    gauge!(names::TRACKED_WINDOWS).set(count as f64);
}
