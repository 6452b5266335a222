//! HTTP API integration tests
//!
//! Drives the full axum router through `axum-test`:
//! - POST /v1/route, POST /v1/classify, POST /v1/outcomes
//! - GET /v1/tiers, POST /v1/tiers/:tier/reinstate
//! - GET/DELETE /v1/analytics, GET /v1/analytics/history
//! - GET /health, /health/ready, /health/live, /metrics

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tier_router::Tier;

use crate::common::{constants, TestApp};

#[tokio::test]
async fn test_route_simple_query() {
    let app = TestApp::new();

    let response = app
        .server
        .post("/v1/route")
        .json(&json!({ "query": constants::SIMPLE_QUERY }))
        .await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["tier"], "local_llm");
    assert_eq!(json["complexity"], "simple");
    assert_eq!(json["minimum_tier"], "local_llm");
    assert_eq!(json["fallbacks"], json!(["rap_system", "external_llm"]));
    assert_eq!(json["degraded"], false);
    assert!(json["id"].as_str().is_some());
}

#[tokio::test]
async fn test_route_with_minimum_tier_hint() {
    let app = TestApp::new();

    let response = app
        .server
        .post("/v1/route")
        .json(&json!({ "query": constants::SIMPLE_QUERY, "minimum_tier": "external_llm" }))
        .await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["tier"], "external_llm");
}

#[tokio::test]
async fn test_route_rejects_malformed_json() {
    let app = TestApp::new();

    let response = app
        .server
        .post("/v1/route")
        .text("{not json")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert_eq!(json["error"]["code"], "INVALID_JSON");
}

#[tokio::test]
async fn test_outcomes_disable_tier_and_reroute() {
    let app = TestApp::new();

    for _ in 0..5 {
        let response = app
            .server
            .post("/v1/outcomes")
            .json(&json!({
                "tier": "local_llm",
                "success": false,
                "response_time_ms": 1200,
                "error": "connection refused"
            }))
            .await;
        response.assert_status(StatusCode::NO_CONTENT);
    }

    let response = app
        .server
        .post("/v1/route")
        .json(&json!({ "query": constants::SIMPLE_QUERY }))
        .await;
    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["tier"], "rap_system");
    assert_eq!(json["fallbacks"], json!(["external_llm"]));

    let tiers: Value = app.server.get("/v1/tiers").await.json();
    let local = &tiers[0];
    assert_eq!(local["tier"], "local_llm");
    assert_eq!(local["is_healthy"], false);
    assert_eq!(local["consecutive_failures"], 5);
    assert_eq!(local["last_error"], "connection refused");
    assert_eq!(local["next_attempt"], 1);
    assert_eq!(local["retry_in_ms"], 60_000);
    assert!(tiers[1].get("retry_in_ms").is_none());
}

#[tokio::test]
async fn test_outcome_for_unknown_tier_is_rejected() {
    let app = TestApp::new();

    let response = app
        .server
        .post("/v1/outcomes")
        .json(&json!({ "tier": "gpu_cluster", "success": true, "response_time_ms": 10 }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert_eq!(json["error"]["code"], "INVALID_TIER");
}

#[tokio::test]
async fn test_all_tiers_down_returns_503() {
    let app = TestApp::new();
    for tier in Tier::ALL {
        app.disable(tier);
    }

    let response = app
        .server
        .post("/v1/route")
        .json(&json!({ "query": constants::SIMPLE_QUERY }))
        .await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = response.json();
    assert_eq!(json["error"]["code"], "NO_AVAILABLE_PROVIDER");

    app.server
        .get("/health")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    app.server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    app.server.get("/health/live").await.assert_status_ok();
}

#[tokio::test]
async fn test_health_reports_degraded_with_one_tier_down() {
    let app = TestApp::new();
    app.disable(Tier::ExternalLlm);

    let response = app.server.get("/health").await;
    response.assert_status_ok();

    let json: Value = response.json();
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["aggregate"]["healthy_count"], 2);
    assert_eq!(json["aggregate"]["total_count"], 3);
    assert_eq!(json["tiers"].as_array().map(Vec::len), Some(3));
    assert!(json.get("version").is_some());
    assert!(json.get("uptime_seconds").is_some());
}

#[tokio::test]
async fn test_reinstate_endpoint() {
    let app = TestApp::new();
    app.disable(Tier::RapSystem);

    let response = app.server.post("/v1/tiers/rap_system/reinstate").await;
    response.assert_status_ok();

    let json: Value = response.json();
    assert_eq!(json["is_healthy"], true);
    assert_eq!(json["consecutive_failures"], 0);
    assert_eq!(json["disabled_at"], Value::Null);
    assert!(app.state.health.is_healthy(Tier::RapSystem).unwrap());

    let response = app.server.post("/v1/tiers/mainframe/reinstate").await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analytics_success_rate_and_history() {
    let app = TestApp::new();

    // 95 successes and 5 isolated failures
    for i in 0..100 {
        app.server
            .post("/v1/outcomes")
            .json(&json!({
                "tier": "rap_system",
                "success": i % 20 != 0,
                "response_time_ms": 400,
                "cost": 0.01,
                "cache_hit": i % 4 == 0
            }))
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }
    for _ in 0..3 {
        app.server
            .post("/v1/route")
            .json(&json!({ "query": constants::MODERATE_QUERY }))
            .await
            .assert_status_ok();
    }

    let json: Value = app.server.get("/v1/analytics").await.json();
    let rap = json["tiers"]
        .as_array()
        .and_then(|tiers| tiers.iter().find(|t| t["tier"] == "rap_system"))
        .cloned()
        .expect("rap_system metrics");
    assert_eq!(rap["total_requests"], 100);
    assert_eq!(rap["success_rate"], 0.95);
    assert_eq!(rap["total_routed"], 3);
    assert_eq!(json["summary"]["total_requests"], 100);
    assert_eq!(json["summary"]["cache_hit_rate"], 0.25);
    assert_eq!(json["best_performing_tier"], "rap_system");

    let history: Value = app
        .server
        .get("/v1/analytics/history")
        .add_query_param("limit", 2)
        .await
        .json();
    assert_eq!(history.as_array().map(Vec::len), Some(2));
    assert_eq!(history[0]["tier"], "rap_system");
    assert_eq!(history[0]["complexity"], "moderate");
}

#[tokio::test]
async fn test_analytics_reset() {
    let app = TestApp::new();
    app.server
        .post("/v1/route")
        .json(&json!({ "query": constants::SIMPLE_QUERY }))
        .await
        .assert_status_ok();

    app.server
        .delete("/v1/analytics")
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let history: Value = app.server.get("/v1/analytics/history").await.json();
    assert_eq!(history, json!([]));
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_tier_gauges() {
    tier_router::routes::metrics::init_metrics();
    let app = TestApp::new();
    app.disable(Tier::LocalLlm);

    let response = app.server.get("/metrics").await;
    response.assert_status_ok();

    let body = response.text();
    assert!(body.contains("tier_router_tier_healthy"));
}

#[tokio::test]
async fn test_classify_does_not_record_history() {
    let app = TestApp::new();

    let response = app
        .server
        .post("/v1/classify")
        .json(&json!({ "query": constants::MODERATE_QUERY }))
        .await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["complexity"], "moderate");
    assert_eq!(json["signals"], json!(["analytical"]));
    assert!(app.state.analytics.history(10).is_empty());
}
