//! Routing endpoints
//!
//! - `POST /v1/route` - classify a query and pick a tier
//! - `POST /v1/classify` - classification only, no routing
//! - `POST /v1/outcomes` - report the outcome of a tier call
//! - `GET /v1/tiers` - per-tier health and recovery state
//! - `POST /v1/tiers/:tier/reinstate` - operator reinstatement

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analytics::RecordedOutcome;
use crate::error::AppResult;
use crate::tiers::{Classification, HealthStatus, RouteRequest, RoutingDecision, Tier};
use crate::RouterState;

/// Outcome reported by a caller that invoked a tier itself
#[derive(Debug, Clone, Deserialize)]
pub struct OutcomeReport {
    pub tier: String,
    pub success: bool,
    pub response_time_ms: u64,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub cache_hit: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// One tier's health plus recovery schedule
#[derive(Debug, Serialize)]
pub struct TierView {
    #[serde(flatten)]
    pub status: HealthStatus,
    pub priority: u32,
    /// Attempt number of the next recovery probe
    pub next_attempt: u32,
    /// Remaining cooldown, present only while the tier is disabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_ms: Option<u64>,
}

/// Route a query
pub async fn route_query(
    State(state): State<Arc<RouterState>>,
    body: Bytes,
) -> AppResult<Json<RoutingDecision>> {
    let request: RouteRequest = serde_json::from_slice(&body)?;
    let decision = state.router.route(&request)?;
    Ok(Json(decision))
}

/// Classify a query without routing it
pub async fn classify_query(
    State(state): State<Arc<RouterState>>,
    body: Bytes,
) -> AppResult<Json<Classification>> {
    let request: RouteRequest = serde_json::from_slice(&body)?;
    Ok(Json(state.classifier.classify_detailed(&request.query)))
}

/// Record a tier call outcome into health and analytics
pub async fn record_outcome(
    State(state): State<Arc<RouterState>>,
    body: Bytes,
) -> AppResult<StatusCode> {
    let report: OutcomeReport = serde_json::from_slice(&body)?;
    let tier: Tier = report.tier.parse()?;

    state.health.record_outcome(
        tier,
        report.success,
        report.response_time_ms,
        report.error.as_deref(),
    )?;
    state.analytics.record(
        tier,
        RecordedOutcome {
            success: report.success,
            cost: report.cost,
            latency_ms: report.response_time_ms,
            cache_hit: report.cache_hit,
        },
    )?;

    Ok(StatusCode::NO_CONTENT)
}

/// List every configured tier
pub async fn list_tiers(State(state): State<Arc<RouterState>>) -> AppResult<Json<Vec<TierView>>> {
    let mut views = Vec::with_capacity(state.router.specs().len());
    for spec in state.router.specs() {
        views.push(TierView {
            status: state.health.status(spec.tier)?,
            priority: spec.priority,
            next_attempt: state.recovery.next_attempt(spec.tier)?,
            retry_in_ms: state
                .recovery
                .time_until_next_attempt(spec.tier)?
                .map(|d| d.as_millis() as u64),
        });
    }

    Ok(Json(views))
}

/// Explicitly reinstate a tier
pub async fn reinstate_tier(
    State(state): State<Arc<RouterState>>,
    Path(tier): Path<String>,
) -> AppResult<Json<HealthStatus>> {
    let tier: Tier = tier.parse()?;
    let status = state.recovery.reinstate(tier)?;
    info!(tier = %tier, "Tier reinstated by operator");
    Ok(Json(status))
}
