//! Analytics endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analytics::{SystemSummary, TierMetrics};
use crate::tiers::{RoutingDecision, Tier};
use crate::RouterState;

const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Serialize)]
pub struct UsageShare {
    pub tier: Tier,
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub summary: SystemSummary,
    pub tiers: Vec<TierMetrics>,
    pub usage_distribution: Vec<UsageShare>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_performing_tier: Option<Tier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fastest_tier: Option<Tier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cheapest_tier: Option<Tier>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

/// Per-tier metrics and system summary
pub async fn analytics_overview(State(state): State<Arc<RouterState>>) -> Json<AnalyticsResponse> {
    let analytics = &state.analytics;

    Json(AnalyticsResponse {
        summary: analytics.system_summary(),
        tiers: analytics.snapshot(),
        usage_distribution: analytics
            .usage_distribution()
            .into_iter()
            .map(|(tier, percentage)| UsageShare { tier, percentage })
            .collect(),
        best_performing_tier: analytics.best_performing_tier(),
        fastest_tier: analytics.fastest_tier(),
        cheapest_tier: analytics.cheapest_tier(),
    })
}

/// Recent routing decisions, newest first
pub async fn routing_history(
    State(state): State<Arc<RouterState>>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<RoutingDecision>> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Json(state.analytics.history(limit))
}

/// Clear all counters and the routing history
pub async fn reset_analytics(State(state): State<Arc<RouterState>>) -> StatusCode {
    state.analytics.reset();
    info!("Analytics reset");
    StatusCode::NO_CONTENT
}
