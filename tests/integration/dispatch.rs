//! Dispatch integration tests
//!
//! Routes through `RouterState` and executes decisions against a scripted
//! tier client, checking the feedback into health and analytics.

use pretty_assertions::assert_eq;
use tier_router::tiers::RouteRequest;
use tier_router::{AppError, Tier};

use crate::common::{constants, Behavior, ScriptedClient, TestApp};

#[tokio::test]
async fn test_dispatch_feeds_analytics() {
    let app = TestApp::new();
    let client = ScriptedClient::new(&[(
        Tier::LocalLlm,
        Behavior::Answer {
            cost: 0.0,
            cache_hit: true,
        },
    )]);
    let dispatcher = app.state.dispatcher(client.clone());

    let outcome = dispatcher
        .route_and_dispatch(&RouteRequest::new(constants::SIMPLE_QUERY))
        .await
        .unwrap();

    assert_eq!(outcome.tier, Tier::LocalLlm);
    assert_eq!(outcome.response.content, "[local_llm] What is 2+2?");
    assert_eq!(app.state.analytics.cache_hit_rate(), 1.0);
    assert_eq!(app.state.analytics.success_rate(Tier::LocalLlm).unwrap(), 1.0);
}

#[tokio::test]
async fn test_repeated_failures_disable_primary_and_shift_traffic() {
    let app = TestApp::new();
    let client = ScriptedClient::new(&[(
        Tier::RapSystem,
        Behavior::Answer {
            cost: 0.03,
            cache_hit: false,
        },
    )]);
    let dispatcher = app.state.dispatcher(client.clone());

    for _ in 0..5 {
        let outcome = dispatcher
            .route_and_dispatch(&RouteRequest::new(constants::SIMPLE_QUERY))
            .await
            .unwrap();
        assert_eq!(outcome.tier, Tier::RapSystem);
        assert_eq!(outcome.failed_attempts.len(), 1);
    }
    assert!(!app.state.health.is_healthy(Tier::LocalLlm).unwrap());

    // Local is now disabled, so routing goes straight to RAP
    let outcome = dispatcher
        .route_and_dispatch(&RouteRequest::new(constants::SIMPLE_QUERY))
        .await
        .unwrap();
    assert!(outcome.failed_attempts.is_empty());
    assert_eq!(client.calls().iter().filter(|t| **t == Tier::LocalLlm).count(), 5);

    // A disabled tier is not re-enabled by later successes elsewhere
    assert!(!app.state.health.is_healthy(Tier::LocalLlm).unwrap());
    assert_eq!(app.state.analytics.fallback_rate(Tier::LocalLlm).unwrap(), 1.0);
}

#[tokio::test]
async fn test_exhausted_fallbacks_surface_composite_error() {
    let app = TestApp::new();
    let client = ScriptedClient::new(&[
        (Tier::LocalLlm, Behavior::Hang),
        (Tier::RapSystem, Behavior::Fail),
        (Tier::ExternalLlm, Behavior::Fail),
    ]);
    let dispatcher = app.state.dispatcher(client.clone());

    let err = dispatcher
        .route_and_dispatch(&RouteRequest::new(constants::SIMPLE_QUERY))
        .await
        .unwrap_err();

    match err {
        AppError::AllTiersFailed { attempts } => {
            let tiers: Vec<Tier> = attempts.iter().map(|a| a.tier).collect();
            assert_eq!(tiers, vec![Tier::LocalLlm, Tier::RapSystem, Tier::ExternalLlm]);
            assert_eq!(attempts[0].error, "timeout");
        }
        other => panic!("expected AllTiersFailed, got {:?}", other),
    }

    let local = app.state.health.status(Tier::LocalLlm).unwrap();
    assert_eq!(local.response_time_ms, 200);
    assert_eq!(local.last_error.as_deref(), Some("timeout"));
}

#[tokio::test]
async fn test_complex_query_is_not_answered_by_cheaper_tiers() {
    let app = TestApp::new();
    let client = ScriptedClient::new(&[
        (
            Tier::LocalLlm,
            Behavior::Answer {
                cost: 0.0,
                cache_hit: false,
            },
        ),
        (
            Tier::RapSystem,
            Behavior::Answer {
                cost: 0.03,
                cache_hit: false,
            },
        ),
        (Tier::ExternalLlm, Behavior::Fail),
    ]);
    let dispatcher = app.state.dispatcher(client.clone());

    let err = dispatcher
        .route_and_dispatch(&RouteRequest::new(constants::COMPLEX_QUERY))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::AllTiersFailed { ref attempts } if attempts.len() == 1));
    assert_eq!(client.calls(), vec![Tier::ExternalLlm]);
}
