//! Health check endpoints
//!
//! Provides endpoints for monitoring and container orchestration:
//! - `/health` - Aggregate tier health
//! - `/health/ready` - Readiness probe
//! - `/health/live` - Liveness probe

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::tiers::{AggregateHealth, HealthStatus as TierHealth};
use crate::RouterState;

/// Overall service status
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl ServiceStatus {
    fn from_aggregate(aggregate: &AggregateHealth) -> Self {
        if aggregate.healthy_count == 0 {
            ServiceStatus::Unhealthy
        } else if aggregate.healthy_count < aggregate.total_count {
            ServiceStatus::Degraded
        } else {
            ServiceStatus::Healthy
        }
    }

    fn status_code(self) -> StatusCode {
        match self {
            ServiceStatus::Healthy | ServiceStatus::Degraded => StatusCode::OK,
            ServiceStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Full health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: ServiceStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: String,
    pub aggregate: AggregateHealth,
    pub tiers: Vec<TierHealth>,
}

/// Simple health response for liveness/readiness
#[derive(Debug, Serialize)]
pub struct SimpleHealthResponse {
    pub status: ServiceStatus,
}

/// Full health check endpoint
///
/// 200 while at least one tier is healthy, 503 otherwise.
pub async fn health_check(
    State(state): State<Arc<RouterState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let aggregate = state.health.aggregate();
    let status = ServiceStatus::from_aggregate(&aggregate);

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        timestamp: state.clock.now().to_rfc3339(),
        aggregate,
        tiers: state.health.snapshot(),
    };

    (status.status_code(), Json(response))
}

/// Readiness probe endpoint
///
/// Ready while any tier can take traffic.
pub async fn readiness_check(
    State(state): State<Arc<RouterState>>,
) -> (StatusCode, Json<SimpleHealthResponse>) {
    if state.health.aggregate().healthy_count == 0 {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(SimpleHealthResponse {
                status: ServiceStatus::Unhealthy,
            }),
        );
    }

    (
        StatusCode::OK,
        Json(SimpleHealthResponse {
            status: ServiceStatus::Healthy,
        }),
    )
}

/// Liveness probe endpoint
pub async fn liveness_check() -> (StatusCode, Json<SimpleHealthResponse>) {
    (
        StatusCode::OK,
        Json(SimpleHealthResponse {
            status: ServiceStatus::Healthy,
        }),
    )
}
