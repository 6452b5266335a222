//! Per-tier health tracking
//!
//! Tracks liveness, last response time and consecutive failures for every
//! configured tier. A tier that accumulates `failure_threshold` consecutive
//! failures is disabled and stays disabled until it is explicitly reinstated
//! by the recovery scheduler; successful outcomes alone never re-enable it.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::error::{AppError, AppResult};

use super::types::Tier;

/// Configuration for health tracking
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Consecutive failures before a tier is disabled (default: 5)
    pub failure_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
        }
    }
}

/// Health record for a single tier
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthStatus {
    pub tier: Tier,
    pub is_healthy: bool,
    /// Response time of the most recent outcome
    pub response_time_ms: u64,
    pub last_checked: DateTime<Utc>,
    pub consecutive_failures: u32,
    /// Set when the tier was disabled, cleared only by reinstatement
    pub disabled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl HealthStatus {
    fn new(tier: Tier, now: DateTime<Utc>) -> Self {
        Self {
            tier,
            is_healthy: true,
            response_time_ms: 0,
            last_checked: now,
            consecutive_failures: 0,
            disabled_at: None,
            last_error: None,
        }
    }
}

/// System-wide health summary
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AggregateHealth {
    pub healthy_count: usize,
    pub total_count: usize,
    pub percentage: f64,
}

/// Authoritative health state for every configured tier
///
/// The tier map is built once at construction and never changes shape, so
/// each tier's record sits behind its own lock and updates to different tiers
/// never contend.
pub struct HealthMonitor {
    states: HashMap<Tier, RwLock<HealthStatus>>,
    order: Vec<Tier>,
    config: HealthConfig,
    clock: SharedClock,
}

impl HealthMonitor {
    /// Create a monitor for `tiers` (declaration order is preserved)
    pub fn new(tiers: &[Tier], config: HealthConfig, clock: SharedClock) -> Self {
        let now = clock.now();
        let mut order = Vec::with_capacity(tiers.len());
        let mut states = HashMap::with_capacity(tiers.len());
        for tier in tiers {
            if states
                .insert(*tier, RwLock::new(HealthStatus::new(*tier, now)))
                .is_none()
            {
                order.push(*tier);
            }
        }

        Self {
            states,
            order,
            config,
            clock,
        }
    }

    /// Configured tiers in declaration order
    pub fn tiers(&self) -> &[Tier] {
        &self.order
    }

    pub fn failure_threshold(&self) -> u32 {
        self.config.failure_threshold
    }

    pub fn contains(&self, tier: Tier) -> bool {
        self.states.contains_key(&tier)
    }

    fn read(&self, tier: Tier) -> AppResult<RwLockReadGuard<'_, HealthStatus>> {
        let lock = self
            .states
            .get(&tier)
            .ok_or_else(|| AppError::InvalidTier(tier.to_string()))?;
        Ok(lock.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write(&self, tier: Tier) -> AppResult<RwLockWriteGuard<'_, HealthStatus>> {
        let lock = self
            .states
            .get(&tier)
            .ok_or_else(|| AppError::InvalidTier(tier.to_string()))?;
        Ok(lock.write().unwrap_or_else(PoisonError::into_inner))
    }

    /// Record the outcome of a call (or probe) against a tier
    pub fn record_outcome(
        &self,
        tier: Tier,
        success: bool,
        response_time_ms: u64,
        error: Option<&str>,
    ) -> AppResult<()> {
        let now = self.clock.now();
        let mut state = self.write(tier)?;

        state.response_time_ms = response_time_ms;
        state.last_checked = now;

        if success {
            if state.consecutive_failures > 0 {
                debug!(
                    tier = %tier,
                    previous_failures = state.consecutive_failures,
                    "Tier succeeded, resetting failure count"
                );
            }
            state.consecutive_failures = 0;
            state.last_error = None;
            return Ok(());
        }

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_error = error.map(str::to_string);

        if state.is_healthy && state.consecutive_failures >= self.config.failure_threshold {
            state.is_healthy = false;
            state.disabled_at = Some(now);
            metrics::counter!("tier_router_tier_disabled_total", "tier" => tier.as_str())
                .increment(1);
            warn!(
                tier = %tier,
                consecutive_failures = state.consecutive_failures,
                error = error.unwrap_or("unknown"),
                "Failure threshold reached, disabling tier"
            );
        } else {
            debug!(
                tier = %tier,
                consecutive_failures = state.consecutive_failures,
                error = error.unwrap_or("unknown"),
                "Tier failure recorded"
            );
        }

        Ok(())
    }

    /// Read-only snapshot of one tier
    pub fn status(&self, tier: Tier) -> AppResult<HealthStatus> {
        Ok(self.read(tier)?.clone())
    }

    pub fn is_healthy(&self, tier: Tier) -> AppResult<bool> {
        Ok(self.read(tier)?.is_healthy)
    }

    /// Snapshot of every tier in declaration order
    pub fn snapshot(&self) -> Vec<HealthStatus> {
        self.order
            .iter()
            .filter_map(|tier| self.status(*tier).ok())
            .collect()
    }

    /// Tiers currently marked unhealthy, in declaration order
    pub fn disabled_tiers(&self) -> Vec<Tier> {
        self.order
            .iter()
            .copied()
            .filter(|tier| matches!(self.is_healthy(*tier), Ok(false)))
            .collect()
    }

    /// Healthy tier count over configured tier count, computed on every call
    pub fn aggregate(&self) -> AggregateHealth {
        let total_count = self.order.len();
        let healthy_count = self
            .order
            .iter()
            .filter(|tier| matches!(self.is_healthy(**tier), Ok(true)))
            .count();
        let percentage = if total_count == 0 {
            0.0
        } else {
            healthy_count as f64 / total_count as f64 * 100.0
        };

        AggregateHealth {
            healthy_count,
            total_count,
            percentage,
        }
    }

    /// Clear the disabled state of a tier; only the recovery scheduler calls this.
    pub(crate) fn reinstate(&self, tier: Tier) -> AppResult<HealthStatus> {
        let now = self.clock.now();
        let mut state = self.write(tier)?;
        let was_disabled = !state.is_healthy;

        state.is_healthy = true;
        state.consecutive_failures = 0;
        state.disabled_at = None;
        state.last_error = None;
        state.last_checked = now;

        if was_disabled {
            info!(tier = %tier, "Tier reinstated");
        }

        Ok(state.clone())
    }
}
