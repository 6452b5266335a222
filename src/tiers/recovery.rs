//! Recovery scheduling with exponential backoff
//!
//! Decides when a disabled tier may be probed again and owns the periodic
//! probe task. The cooldown for probe attempt `n` is
//! `min(base_delay * multiplier^(n-1), max_delay)`, measured from the moment
//! the tier was disabled or, after a failed probe, from that probe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::clock::SharedClock;
use crate::error::{AppError, AppResult};

use super::health::{HealthMonitor, HealthStatus};
use super::types::Tier;

/// Configuration for recovery backoff and the probe loop
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Cooldown before the first probe (default: 60 seconds)
    pub base_delay: Duration,
    /// Multiplier applied per failed probe (default: 2.0)
    pub backoff_multiplier: f64,
    /// Cooldown ceiling (default: 10 minutes)
    pub max_delay: Duration,
    /// How often the probe loop wakes up (default: 60 seconds)
    pub check_interval: Duration,
    /// Upper bound on a single probe (default: 5 seconds)
    pub probe_timeout: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(600),
            check_interval: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

impl RecoveryConfig {
    /// Cooldown required before probe attempt `attempt` (1-based; 0 is treated as 1)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let multiplier = self.backoff_multiplier.max(1.0);
        let raw = self.base_delay.as_secs_f64() * multiplier.powi(exponent.min(i32::MAX as u32) as i32);

        if !raw.is_finite() || raw >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(raw)
        }
    }
}

/// Health check issued against a disabled tier
#[async_trait]
pub trait TierProbe: Send + Sync {
    /// Returns `Ok(())` when the tier answered healthily
    async fn probe(&self, tier: Tier) -> anyhow::Result<()>;
}

/// Result of one recovery probe
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Reinstated,
    StillDisabled { next_attempt: u32 },
    /// Another probe for this tier was already running
    InFlight,
    /// The tier was reinstated while the probe ran; its failure is discarded
    Superseded,
}

/// Per-tier recovery bookkeeping
#[derive(Debug, Default)]
struct RecoveryState {
    /// Failed probes since the tier was last reinstated
    failed_probes: u32,
    last_probe_failure: Option<DateTime<Utc>>,
}

/// Clears a tier's in-flight flag when the probe finishes or is dropped
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Governs when disabled tiers may be retried and reinstates them
pub struct RecoveryScheduler {
    health: Arc<HealthMonitor>,
    config: RecoveryConfig,
    clock: SharedClock,
    states: HashMap<Tier, Mutex<RecoveryState>>,
    in_flight: HashMap<Tier, AtomicBool>,
}

impl RecoveryScheduler {
    pub fn new(health: Arc<HealthMonitor>, config: RecoveryConfig, clock: SharedClock) -> Self {
        let states = health
            .tiers()
            .iter()
            .map(|t| (*t, Mutex::new(RecoveryState::default())))
            .collect();
        let in_flight = health
            .tiers()
            .iter()
            .map(|t| (*t, AtomicBool::new(false)))
            .collect();

        Self {
            health,
            config,
            clock,
            states,
            in_flight,
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    fn with_state<R>(&self, tier: Tier, f: impl FnOnce(&mut RecoveryState) -> R) -> AppResult<R> {
        let lock = self
            .states
            .get(&tier)
            .ok_or_else(|| AppError::InvalidTier(tier.to_string()))?;
        let mut state = lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&mut state))
    }

    /// Whether the cooldown for `attempt` has elapsed.
    ///
    /// A tier that has never been disabled is trivially eligible.
    pub fn can_attempt_recovery(&self, tier: Tier, attempt: u32) -> AppResult<bool> {
        let Some(anchor) = self.cooldown_anchor(tier)? else {
            return Ok(true);
        };

        let elapsed = (self.clock.now() - anchor).to_std().unwrap_or(Duration::ZERO);
        Ok(elapsed >= self.config.backoff_delay(attempt))
    }

    /// Start of the current cooldown, `None` when the tier is not disabled
    fn cooldown_anchor(&self, tier: Tier) -> AppResult<Option<DateTime<Utc>>> {
        let status = self.health.status(tier)?;
        let Some(disabled_at) = status.disabled_at else {
            return Ok(None);
        };
        let last_probe_failure = self.with_state(tier, |s| s.last_probe_failure)?;
        Ok(Some(last_probe_failure.map_or(disabled_at, |t| t.max(disabled_at))))
    }

    /// Attempt number the next probe of `tier` will use
    pub fn next_attempt(&self, tier: Tier) -> AppResult<u32> {
        self.with_state(tier, |s| s.failed_probes.saturating_add(1))
    }

    /// Remaining cooldown before the next probe, `None` if the tier is not disabled
    pub fn time_until_next_attempt(&self, tier: Tier) -> AppResult<Option<Duration>> {
        let Some(anchor) = self.cooldown_anchor(tier)? else {
            return Ok(None);
        };
        let delay = self.config.backoff_delay(self.next_attempt(tier)?);
        let elapsed = (self.clock.now() - anchor).to_std().unwrap_or(Duration::ZERO);
        Ok(Some(delay.saturating_sub(elapsed)))
    }

    /// Disabled tier whose cooldown for its next attempt has elapsed
    pub fn is_due(&self, tier: Tier) -> AppResult<bool> {
        if self.health.is_healthy(tier)? {
            return Ok(false);
        }
        self.can_attempt_recovery(tier, self.next_attempt(tier)?)
    }

    /// Re-enable a tier after a confirmed successful probe
    pub fn reinstate(&self, tier: Tier) -> AppResult<HealthStatus> {
        let status = self.health.reinstate(tier)?;
        self.with_state(tier, |s| *s = RecoveryState::default())?;
        metrics::counter!("tier_router_tier_reinstated_total", "tier" => tier.as_str())
            .increment(1);
        Ok(status)
    }

    /// Count a failed recovery probe; the tier stays disabled with a longer cooldown
    pub fn record_failed_probe(
        &self,
        tier: Tier,
        response_time_ms: u64,
        error: &str,
    ) -> AppResult<u32> {
        self.health
            .record_outcome(tier, false, response_time_ms, Some(error))?;
        let now = self.clock.now();
        let next_attempt = self.with_state(tier, |s| {
            s.failed_probes = s.failed_probes.saturating_add(1);
            s.last_probe_failure = Some(now);
            s.failed_probes.saturating_add(1)
        })?;

        warn!(
            tier = %tier,
            next_attempt,
            next_delay_secs = self.config.backoff_delay(next_attempt).as_secs(),
            error = %error,
            "Recovery probe failed"
        );
        Ok(next_attempt)
    }

    /// Probe one tier, unless a probe for it is already running
    #[instrument(skip_all, fields(tier = %tier))]
    pub async fn probe_tier(&self, probe: &dyn TierProbe, tier: Tier) -> AppResult<ProbeOutcome> {
        let flag = self
            .in_flight
            .get(&tier)
            .ok_or_else(|| AppError::InvalidTier(tier.to_string()))?;
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Probe already in flight, skipping");
            return Ok(ProbeOutcome::InFlight);
        }
        let _guard = InFlightGuard(flag);
        let disabled_at = self.health.status(tier)?.disabled_at;

        let started = Instant::now();
        let result = match tokio::time::timeout(self.config.probe_timeout, probe.probe(tier)).await
        {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!(
                "probe timed out after {}ms",
                self.config.probe_timeout.as_millis()
            )),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                self.health.record_outcome(tier, true, elapsed_ms, None)?;
                self.reinstate(tier)?;
                info!(elapsed_ms, "Recovery probe succeeded");
                Ok(ProbeOutcome::Reinstated)
            }
            Err(e) => {
                let current = self.health.status(tier)?;
                if current.is_healthy || current.disabled_at != disabled_at {
                    debug!(error = %e, "Tier reinstated during probe, discarding failure");
                    return Ok(ProbeOutcome::Superseded);
                }
                let next_attempt = self.record_failed_probe(tier, elapsed_ms, &e.to_string())?;
                Ok(ProbeOutcome::StillDisabled { next_attempt })
            }
        }
    }

    /// Probe every disabled tier whose cooldown has elapsed
    pub async fn run_once(&self, probe: &dyn TierProbe) -> Vec<(Tier, ProbeOutcome)> {
        let due: Vec<Tier> = self
            .health
            .disabled_tiers()
            .into_iter()
            .filter(|tier| matches!(self.is_due(*tier), Ok(true)))
            .collect();

        if due.is_empty() {
            return Vec::new();
        }

        debug!(tiers = ?due, "Probing tiers due for recovery");

        let probes = due.into_iter().map(|tier| async move {
            match self.probe_tier(probe, tier).await {
                Ok(outcome) => Some((tier, outcome)),
                Err(e) => {
                    warn!(tier = %tier, error = %e, "Recovery probe could not run");
                    None
                }
            }
        });

        futures::future::join_all(probes)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Periodic recovery loop; returns once `shutdown` flips to true or its sender is dropped
    pub async fn run(self: Arc<Self>, probe: Arc<dyn TierProbe>, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.check_interval.as_secs(),
            base_delay_secs = self.config.base_delay.as_secs(),
            max_delay_secs = self.config.max_delay.as_secs(),
            "Starting recovery scheduler"
        );

        let mut interval = tokio::time::interval(self.config.check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {
                    self.run_once(probe.as_ref()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Recovery scheduler stopped");
    }

    /// Spawn [`RecoveryScheduler::run`] onto the runtime
    pub fn spawn(
        self: &Arc<Self>,
        probe: Arc<dyn TierProbe>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.clone().run(probe, shutdown))
    }
}
