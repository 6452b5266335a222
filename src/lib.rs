//! Tier Router - multi-tier AI request routing
//!
//! Routes each query to a local LLM, the internal RAP system or an external
//! LLM provider based on query complexity and per-tier health, disables
//! tiers that keep failing and brings them back through backoff-gated
//! recovery probes.

pub mod analytics;
pub mod clock;
pub mod config;
pub mod error;
pub mod routes;
pub mod tiers;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::tiers::ComplexityClassifier;

pub use crate::analytics::AnalyticsRecorder;
pub use crate::clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use crate::config::Config;
pub use crate::error::{AppError, AppResult};

pub use crate::tiers::{
    Dispatcher, HealthMonitor, RecoveryScheduler, RouteRequest, RoutingDecision, Tier,
    TierClient, TierProbe, TierRouter,
};

/// Composition root shared across all request handlers
///
/// Every instance owns its own health, recovery and analytics state, so
/// several independent routers can live in one process.
pub struct RouterState {
    pub config: Config,
    pub clock: SharedClock,
    pub health: Arc<HealthMonitor>,
    pub recovery: Arc<RecoveryScheduler>,
    pub analytics: Arc<AnalyticsRecorder>,
    pub classifier: ComplexityClassifier,
    pub router: Arc<TierRouter>,
    pub start_time: Instant,
}

impl RouterState {
    /// Create router state on the system clock
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Config, clock: SharedClock) -> Self {
        let tiers = config.tier_list();

        let health = Arc::new(HealthMonitor::new(
            &tiers,
            config.health.clone(),
            clock.clone(),
        ));
        let recovery = Arc::new(RecoveryScheduler::new(
            health.clone(),
            config.recovery.clone(),
            clock.clone(),
        ));
        let analytics = Arc::new(AnalyticsRecorder::new(&tiers, config.history_capacity));
        let classifier = ComplexityClassifier::new(config.classifier.clone());
        let router = Arc::new(TierRouter::new(
            config.tiers.clone(),
            health.clone(),
            analytics.clone(),
            classifier.clone(),
            config.escalation_policy,
            clock.clone(),
        ));

        Self {
            config,
            clock,
            health,
            recovery,
            analytics,
            classifier,
            router,
            start_time: Instant::now(),
        }
    }

    /// Dispatcher over `client` sharing this state's health and analytics
    pub fn dispatcher(&self, client: Arc<dyn TierClient>) -> Dispatcher {
        Dispatcher::new(
            client,
            self.router.clone(),
            self.health.clone(),
            self.analytics.clone(),
            self.config.dispatch.clone(),
        )
    }

    /// Start the periodic recovery task; it stops when `shutdown` flips to true
    pub fn start_recovery(
        &self,
        probe: Arc<dyn TierProbe>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        self.recovery.spawn(probe, shutdown)
    }
}
