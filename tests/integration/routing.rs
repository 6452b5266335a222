//! Routing scenarios against a fully wired `RouterState`

use std::sync::Arc;
use std::thread;

use pretty_assertions::assert_eq;
use tier_router::tiers::{EscalationPolicy, RouteRequest};
use tier_router::{AppError, Config, Tier};

use crate::common::{constants, test_config, TestApp};

fn strict_config() -> Config {
    Config {
        escalation_policy: EscalationPolicy::Strict,
        ..test_config()
    }
}

#[tokio::test]
async fn test_all_healthy_simple_query_goes_local() {
    let app = TestApp::new();
    let decision = app
        .state
        .router
        .route(&RouteRequest::new(constants::SIMPLE_QUERY))
        .unwrap();

    assert_eq!(decision.tier, Tier::LocalLlm);
}

#[tokio::test]
async fn test_local_unhealthy_simple_query_goes_to_rap() {
    let app = TestApp::new();
    app.disable(Tier::LocalLlm);

    let decision = app
        .state
        .router
        .route(&RouteRequest::new(constants::SIMPLE_QUERY))
        .unwrap();

    assert_eq!(decision.tier, Tier::RapSystem);
    assert!(!decision.fallbacks.contains(&Tier::LocalLlm));
}

#[tokio::test]
async fn test_all_unhealthy_raises_no_available_provider() {
    let app = TestApp::new();
    for tier in Tier::ALL {
        app.disable(tier);
    }

    let result = app
        .state
        .router
        .route(&RouteRequest::new(constants::SIMPLE_QUERY));
    assert!(matches!(result, Err(AppError::NoAvailableProvider { .. })));
}

#[tokio::test]
async fn test_complex_query_with_external_down_degrades_by_default() {
    let app = TestApp::new();
    app.disable(Tier::ExternalLlm);

    let decision = app
        .state
        .router
        .route(&RouteRequest::new(constants::COMPLEX_QUERY))
        .unwrap();

    assert_eq!(decision.minimum_tier, Tier::ExternalLlm);
    assert_eq!(decision.tier, Tier::RapSystem);
    assert_eq!(decision.fallbacks, vec![Tier::LocalLlm]);
    assert!(decision.degraded);
}

#[tokio::test]
async fn test_complex_query_with_external_down_fails_when_strict() {
    let app = TestApp::with_config(strict_config());
    app.disable(Tier::ExternalLlm);

    let result = app
        .state
        .router
        .route(&RouteRequest::new(constants::COMPLEX_QUERY));

    assert!(matches!(
        result,
        Err(AppError::NoAvailableProvider {
            minimum_tier: Tier::ExternalLlm
        })
    ));
}

#[tokio::test]
async fn test_independent_states_do_not_share_health() {
    let first = TestApp::new();
    let second = TestApp::new();
    first.disable(Tier::LocalLlm);

    assert!(!first.state.health.is_healthy(Tier::LocalLlm).unwrap());
    assert!(second.state.health.is_healthy(Tier::LocalLlm).unwrap());
}

#[tokio::test]
async fn test_concurrent_routing_and_outcomes_keep_invariant() {
    let app = TestApp::new();
    let state = app.state.clone();
    let threshold = state.health.failure_threshold();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                for _ in 0..200 {
                    if i % 2 == 0 {
                        let _ = state.router.route(&RouteRequest::new(constants::SIMPLE_QUERY));
                    } else {
                        state
                            .health
                            .record_outcome(Tier::LocalLlm, false, 5, Some("boom"))
                            .unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let status = state.health.status(Tier::LocalLlm).unwrap();
    assert_eq!(status.consecutive_failures, 800);
    assert!(status.consecutive_failures >= threshold);
    assert!(!status.is_healthy);

    for status in state.health.snapshot() {
        if status.consecutive_failures >= threshold {
            assert!(!status.is_healthy);
        }
    }
}
