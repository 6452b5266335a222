//! Tier routing decisions
//!
//! Selects the cheapest healthy tier that satisfies a query's minimum tier,
//! and lists the remaining healthy tiers as fallbacks. Routing only reads
//! health and analytics state; it never mutates tier health.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analytics::AnalyticsRecorder;
use crate::clock::SharedClock;
use crate::error::{AppError, AppResult};

use super::classifier::ComplexityClassifier;
use super::health::HealthMonitor;
use super::types::{QueryComplexity, Tier, TierSpec};

/// What to do when no healthy tier meets the minimum tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPolicy {
    /// Serve from the most capable healthy tier below the minimum
    #[default]
    Degrade,
    /// Fail with `NoAvailableProvider`
    Strict,
}

/// Inbound routing request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteRequest {
    pub query: String,
    /// Caller-forced minimum tier; raises but never lowers the mapped tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_tier: Option<Tier>,
}

impl RouteRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            minimum_tier: None,
        }
    }

    pub fn with_minimum_tier(mut self, tier: Tier) -> Self {
        self.minimum_tier = Some(tier);
        self
    }
}

/// Result of routing one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub id: Uuid,
    pub tier: Tier,
    pub complexity: QueryComplexity,
    pub minimum_tier: Tier,
    pub decided_at: DateTime<Utc>,
    /// Other healthy tiers in preference order, never containing `tier`.
    /// Only a degraded decision lists tiers below `minimum_tier`.
    pub fallbacks: Vec<Tier>,
    /// True when `tier` sits below `minimum_tier`
    pub degraded: bool,
}

/// Routing decision engine
pub struct TierRouter {
    specs: Vec<TierSpec>,
    health: Arc<HealthMonitor>,
    analytics: Arc<AnalyticsRecorder>,
    classifier: ComplexityClassifier,
    policy: EscalationPolicy,
    clock: SharedClock,
}

impl TierRouter {
    pub fn new(
        specs: Vec<TierSpec>,
        health: Arc<HealthMonitor>,
        analytics: Arc<AnalyticsRecorder>,
        classifier: ComplexityClassifier,
        policy: EscalationPolicy,
        clock: SharedClock,
    ) -> Self {
        let mut deduped: Vec<TierSpec> = Vec::with_capacity(specs.len());
        for spec in specs {
            if !deduped.iter().any(|s| s.tier == spec.tier) {
                deduped.push(spec);
            }
        }

        Self {
            specs: deduped,
            health,
            analytics,
            classifier,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> EscalationPolicy {
        self.policy
    }

    pub fn specs(&self) -> &[TierSpec] {
        &self.specs
    }

    /// Configured latency threshold for `tier`, if any
    pub fn latency_threshold(&self, tier: Tier) -> Option<Duration> {
        self.specs
            .iter()
            .find(|s| s.tier == tier)
            .and_then(|s| s.latency_threshold_ms)
            .map(Duration::from_millis)
    }

    fn spec(&self, tier: Tier) -> AppResult<&TierSpec> {
        self.specs
            .iter()
            .find(|s| s.tier == tier)
            .ok_or_else(|| AppError::InvalidTier(tier.to_string()))
    }

    /// Minimum tier for a complexity and an optional caller hint.
    ///
    /// A mapped tier that is not configured rounds up to the next configured
    /// tier, or down to the most capable one when none is above it.
    pub fn minimum_tier(
        &self,
        complexity: QueryComplexity,
        hint: Option<Tier>,
    ) -> AppResult<Tier> {
        if let Some(hint) = hint {
            self.spec(hint)?;
        }

        let mapped = complexity.minimum_tier();
        let configured = self.specs.iter().map(|s| s.tier);
        let resolved = configured
            .clone()
            .filter(|t| *t >= mapped)
            .min()
            .or_else(|| configured.max())
            .ok_or_else(|| AppError::NoAvailableProvider {
                minimum_tier: mapped,
            })?;

        Ok(match hint {
            Some(hint) if hint > resolved => hint,
            _ => resolved,
        })
    }

    /// Healthy tiers ordered by priority, recent latency, then declaration
    fn ranked_healthy(&self) -> Vec<Tier> {
        let mut ranked: Vec<(usize, &TierSpec, f64)> = self
            .specs
            .iter()
            .enumerate()
            .filter(|(_, spec)| matches!(self.health.is_healthy(spec.tier), Ok(true)))
            .map(|(index, spec)| {
                let latency = self.analytics.recent_latency(spec.tier).unwrap_or(0.0);
                (index, spec, latency)
            })
            .collect();

        ranked.sort_by(|a, b| {
            a.1.priority
                .cmp(&b.1.priority)
                .then_with(|| a.2.partial_cmp(&b.2).unwrap_or(Ordering::Equal))
                .then_with(|| a.0.cmp(&b.0))
        });

        ranked.into_iter().map(|(_, spec, _)| spec.tier).collect()
    }

    /// Classify and route a query
    pub fn route(&self, request: &RouteRequest) -> AppResult<RoutingDecision> {
        let classification = self.classifier.classify_detailed(&request.query);
        let complexity = classification.complexity;
        let minimum_tier = self.minimum_tier(complexity, request.minimum_tier)?;

        debug!(
            complexity = %complexity,
            score = classification.score,
            signals = ?classification.signals,
            minimum_tier = %minimum_tier,
            "Query classified"
        );

        let ranked = self.ranked_healthy();
        if ranked.is_empty() {
            warn!(minimum_tier = %minimum_tier, "No healthy tiers");
            return Err(AppError::NoAvailableProvider { minimum_tier });
        }

        let (eligible, mut below): (Vec<Tier>, Vec<Tier>) =
            ranked.into_iter().partition(|t| *t >= minimum_tier);

        let (tier, fallbacks, degraded) = match eligible.split_first() {
            Some((first, rest)) => (*first, rest.to_vec(), false),
            None if self.policy == EscalationPolicy::Strict => {
                warn!(
                    minimum_tier = %minimum_tier,
                    "No healthy tier meets the minimum tier"
                );
                return Err(AppError::NoAvailableProvider { minimum_tier });
            }
            None => {
                // Closest to the minimum first
                below.sort_by(|a, b| b.cmp(a));
                let (closest, fallbacks) = match below.split_first() {
                    Some((closest, rest)) => (*closest, rest.to_vec()),
                    None => return Err(AppError::NoAvailableProvider { minimum_tier }),
                };
                warn!(
                    minimum_tier = %minimum_tier,
                    tier = %closest,
                    "No healthy tier meets the minimum tier, degrading"
                );
                (closest, fallbacks, true)
            }
        };

        let decision = RoutingDecision {
            id: Uuid::new_v4(),
            tier,
            complexity,
            minimum_tier,
            decided_at: self.clock.now(),
            fallbacks,
            degraded,
        };

        self.analytics.record_decision(&decision)?;

        info!(
            decision_id = %decision.id,
            tier = %decision.tier,
            complexity = %complexity,
            fallbacks = ?decision.fallbacks,
            degraded,
            "Routed query"
        );

        Ok(decision)
    }

    /// Static chain for `tier`: configured tiers at or above it in ascending
    /// capability, then the ones below it, closest first. Ignores health.
    pub fn fallback_chain(&self, tier: Tier) -> AppResult<Vec<Tier>> {
        self.spec(tier)?;

        let mut above: Vec<Tier> = self
            .specs
            .iter()
            .map(|s| s.tier)
            .filter(|t| *t >= tier)
            .collect();
        above.sort();

        let mut below: Vec<Tier> = self
            .specs
            .iter()
            .map(|s| s.tier)
            .filter(|t| *t < tier)
            .collect();
        below.sort_by(|a, b| b.cmp(a));

        above.extend(below);
        Ok(above)
    }
}
