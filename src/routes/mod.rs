//! HTTP routes for the tier router
//!
//! This module defines all HTTP endpoints exposed by the router.

pub mod analytics;
pub mod health;
pub mod metrics;
pub mod routing;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::RouterState;

/// Upper bound on handler time
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Create the main application router
pub fn create_router(state: Arc<RouterState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/v1/route", post(routing::route_query))
        .route("/v1/classify", post(routing::classify_query))
        .route("/v1/outcomes", post(routing::record_outcome))
        .route("/v1/tiers", get(routing::list_tiers))
        .route("/v1/tiers/:tier/reinstate", post(routing::reinstate_tier))
        .route(
            "/v1/analytics",
            get(analytics::analytics_overview).delete(analytics::reset_analytics),
        )
        .route("/v1/analytics/history", get(analytics::routing_history));

    // Health checks and metrics
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/health/live", get(health::liveness_check))
        .route("/metrics", get(metrics::prometheus_metrics));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        // Global middleware (applied to all routes, outermost first)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
                .layer(cors)
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}
