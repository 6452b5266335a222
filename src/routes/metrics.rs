//! Prometheus metrics endpoint
//!
//! Exposes application metrics in Prometheus format for monitoring.

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use tracing::warn;

use crate::RouterState;

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: Lazy<PrometheusHandle> = Lazy::new(|| {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    if let Err(e) = metrics::set_global_recorder(recorder) {
        warn!(error = %e, "Prometheus recorder not installed, another recorder is active");
    }
    handle
});

/// Initialize metrics (call once at startup)
pub fn init_metrics() {
    // Force initialization of the lazy static
    let _ = &*PROMETHEUS_HANDLE;

    register_metrics();
}

/// Register all custom metrics
fn register_metrics() {
    metrics::describe_counter!(
        "tier_router_requests_total",
        "Outcomes recorded per tier and status"
    );
    metrics::describe_histogram!(
        "tier_router_request_duration_seconds",
        "Tier call duration in seconds"
    );
    metrics::describe_counter!(
        "tier_router_cache_operations_total",
        "Tier cache hits and misses"
    );
    metrics::describe_counter!(
        "tier_router_decisions_total",
        "Routing decisions per chosen tier and complexity"
    );
    metrics::describe_counter!(
        "tier_router_fallbacks_total",
        "Dispatch fallbacks between tiers"
    );
    metrics::describe_counter!(
        "tier_router_tier_disabled_total",
        "Times a tier crossed the failure threshold"
    );
    metrics::describe_counter!(
        "tier_router_tier_reinstated_total",
        "Times a disabled tier was reinstated"
    );
    metrics::describe_gauge!("tier_router_tier_healthy", "1 when the tier is healthy");
    metrics::describe_gauge!(
        "tier_router_tier_consecutive_failures",
        "Current consecutive failure count per tier"
    );
}

/// Refresh per-tier health gauges from current state
fn update_health_gauges(state: &RouterState) {
    for status in state.health.snapshot() {
        let tier = status.tier.as_str();
        metrics::gauge!("tier_router_tier_healthy", "tier" => tier)
            .set(if status.is_healthy { 1.0 } else { 0.0 });
        metrics::gauge!("tier_router_tier_consecutive_failures", "tier" => tier)
            .set(status.consecutive_failures as f64);
    }
}

/// Prometheus metrics endpoint handler
///
/// Returns metrics in Prometheus text format for scraping.
pub async fn prometheus_metrics(State(state): State<Arc<RouterState>>) -> impl IntoResponse {
    update_health_gauges(&state);
    PROMETHEUS_HANDLE.render()
}
