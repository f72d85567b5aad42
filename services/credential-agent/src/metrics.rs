//! Prometheus metrics exposition
//!
//! Counters emitted across the workspace:
//!
//! - `broker_token_requests_total`: labels `resource`, `flow`, `outcome`
//! - `secret_rotations_total`: label `outcome` (`static`, `rotated`, `failed`)
//! - `secret_cleanup_removed_total`
//! - `secret_cleanup_failures_total`
//! - `agent_http_requests_total` (this binary): labels `route`, `status`

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a served HTTP request.
pub fn record_request(route: &'static str, status: u16) {
    metrics::counter!(
        "agent_http_requests_total",
        "route" => route,
        "status" => status.to_string()
    )
    .increment(1);
}
