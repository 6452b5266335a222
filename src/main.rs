//! Tier Router - multi-tier AI request routing
//!
//! This is the main entry point for the tier router server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use tier_router::routes;
use tier_router::tiers::{HttpTierProbe, TierProbe};
use tier_router::{Config, RouterState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting Tier Router");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        tiers = ?config.tier_list(),
        escalation_policy = ?config.escalation_policy,
        "Configuration loaded successfully"
    );

    // Initialize metrics
    routes::metrics::init_metrics();
    info!("Metrics initialized");

    // Initialize router state
    let state = Arc::new(RouterState::new(config.clone()));
    info!("Router state initialized");

    // Start the recovery task
    let probe: Arc<dyn TierProbe> = Arc::new(HttpTierProbe::new(
        &config.tiers,
        config.recovery.probe_timeout,
    )?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let recovery_task = state.start_recovery(probe, shutdown_rx);

    // Build the router
    let app = routes::create_router(state.clone());

    // Bind to address
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid ROUTER_HOST/ROUTER_PORT")?;
    info!("Listening on {}", addr);

    // Create listener
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the recovery task once the server has drained
    if shutdown_tx.send(true).is_err() {
        debug!("Recovery task already stopped");
    }
    if let Err(e) = recovery_task.await {
        warn!(error = %e, "Recovery task ended abnormally");
    }

    info!("Tier Router shutdown complete");
    Ok(())
}

/// Initialize tracing; `ROUTER_LOG_FORMAT=json` switches to JSON lines
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tier_router=info,tower_http=info".into());

    let json = std::env::var("ROUTER_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    }
}

/// Handle graceful shutdown signals
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating shutdown");
        }
    }
}
