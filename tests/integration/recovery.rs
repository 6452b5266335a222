//! Recovery integration tests
//!
//! Probes run through `HttpTierProbe` against wiremock health endpoints while
//! cooldowns are driven by the manual clock.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tier_router::tiers::{HttpTierProbe, ProbeOutcome, TierProbe};
use tier_router::Tier;
use tokio::sync::watch;
use wiremock::MockServer;

use crate::common::{probe_mocks, test_config_with_probes, wait_until, TestApp};

async fn setup() -> (TestApp, MockServer, HttpTierProbe) {
    let mock_server = MockServer::start().await;
    let config = test_config_with_probes(&mock_server.uri());
    let probe = HttpTierProbe::new(&config.tiers, Duration::from_secs(2)).unwrap();
    (TestApp::with_config(config), mock_server, probe)
}

#[tokio::test]
async fn test_cooldown_gates_recovery_attempts() {
    let (app, _mock_server, _probe) = setup().await;
    app.disable(Tier::LocalLlm);

    app.advance_secs(59);
    assert!(!app.state.recovery.can_attempt_recovery(Tier::LocalLlm, 1).unwrap());

    app.advance_secs(2);
    assert!(app.state.recovery.can_attempt_recovery(Tier::LocalLlm, 1).unwrap());
}

#[tokio::test]
async fn test_successful_probe_reinstates_tier() {
    let (app, mock_server, probe) = setup().await;
    probe_mocks::mock_tier_healthy(&mock_server, Tier::LocalLlm).await;
    app.disable(Tier::LocalLlm);

    // Not yet due
    assert!(app.state.recovery.run_once(&probe).await.is_empty());

    app.advance_secs(61);
    let outcomes = app.state.recovery.run_once(&probe).await;
    assert_eq!(outcomes, vec![(Tier::LocalLlm, ProbeOutcome::Reinstated)]);

    let status = app.state.health.status(Tier::LocalLlm).unwrap();
    assert!(status.is_healthy);
    assert_eq!(status.consecutive_failures, 0);
    assert_eq!(status.disabled_at, None);
}

#[tokio::test]
async fn test_failed_probe_backs_off() {
    let (app, mock_server, probe) = setup().await;
    probe_mocks::mock_tier_down(&mock_server, Tier::ExternalLlm).await;
    app.disable(Tier::ExternalLlm);

    app.advance_secs(61);
    let outcomes = app.state.recovery.run_once(&probe).await;
    assert_eq!(
        outcomes,
        vec![(
            Tier::ExternalLlm,
            ProbeOutcome::StillDisabled { next_attempt: 2 }
        )]
    );
    assert!(!app.state.health.is_healthy(Tier::ExternalLlm).unwrap());

    // Second attempt waits 120s from the failed probe
    app.advance_secs(61);
    assert!(!app.state.recovery.is_due(Tier::ExternalLlm).unwrap());
    app.advance_secs(60);
    assert!(app.state.recovery.is_due(Tier::ExternalLlm).unwrap());
}

#[tokio::test]
async fn test_tier_without_probe_url_stays_disabled() {
    let mock_server = MockServer::start().await;
    let mut config = test_config_with_probes(&mock_server.uri());
    config.tiers[1].probe_url = None;
    let probe = HttpTierProbe::new(&config.tiers, Duration::from_secs(2)).unwrap();
    let app = TestApp::with_config(config);
    app.disable(Tier::RapSystem);

    app.advance_secs(61);
    let outcomes = app.state.recovery.run_once(&probe).await;
    assert_eq!(
        outcomes,
        vec![(Tier::RapSystem, ProbeOutcome::StillDisabled { next_attempt: 2 })]
    );
    let status = app.state.health.status(Tier::RapSystem).unwrap();
    assert!(status
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("no probe configured")));
}

#[tokio::test]
async fn test_recovery_task_reinstates_and_stops_on_shutdown() {
    let (app, mock_server, probe) = setup().await;
    probe_mocks::mock_tier_healthy(&mock_server, Tier::RapSystem).await;
    app.disable(Tier::RapSystem);
    app.advance_secs(61);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let probe: Arc<dyn TierProbe> = Arc::new(probe);
    let handle = app.state.start_recovery(probe, shutdown_rx);

    let health = app.state.health.clone();
    let recovered = wait_until(Duration::from_secs(5), || {
        matches!(health.is_healthy(Tier::RapSystem), Ok(true))
    })
    .await;
    assert!(recovered, "recovery task should reinstate the tier");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("recovery task should stop")
        .unwrap();
}
