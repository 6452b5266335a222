//! Per-tier routing analytics
//!
//! Lock-free counters for every configured tier. Recording never blocks and
//! can be called from any task; reads compute aggregates on demand.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::tiers::{RoutingDecision, Tier};

/// Costs are accumulated as integer millionths
const COST_SCALE: f64 = 1_000_000.0;

/// Weight of the newest sample in the recent latency average
const RECENT_LATENCY_WEIGHT: f64 = 0.2;

/// Outcome of one dispatched request
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RecordedOutcome {
    pub success: bool,
    pub cost: f64,
    pub latency_ms: u64,
    pub cache_hit: bool,
}

#[derive(Debug, Default)]
struct TierCounters {
    routed: AtomicU64,
    requests: AtomicU64,
    successes: AtomicU64,
    errors: AtomicU64,
    cost_micros: AtomicU64,
    latency_ms_total: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    fallbacks: AtomicU64,
    /// Exponentially weighted latency, stored as `f64` bits
    recent_latency_bits: AtomicU64,
}

impl TierCounters {
    fn observe_latency(&self, latency_ms: u64, first: bool) {
        let sample = latency_ms as f64;
        let mut current = self.recent_latency_bits.load(Ordering::Relaxed);
        loop {
            let next = if first {
                sample
            } else {
                let recent = f64::from_bits(current);
                recent + RECENT_LATENCY_WEIGHT * (sample - recent)
            };
            match self.recent_latency_bits.compare_exchange_weak(
                current,
                next.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    fn reset(&self) {
        for counter in [
            &self.routed,
            &self.requests,
            &self.successes,
            &self.errors,
            &self.cost_micros,
            &self.latency_ms_total,
            &self.cache_hits,
            &self.cache_misses,
            &self.fallbacks,
            &self.recent_latency_bits,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Serializable snapshot of one tier's counters
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TierMetrics {
    pub tier: Tier,
    /// Routing decisions that selected this tier
    pub total_routed: u64,
    /// Outcomes recorded against this tier
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_cost: f64,
    pub average_cost: f64,
    pub average_latency_ms: f64,
    /// Latency average weighted toward recent outcomes
    pub recent_latency_ms: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub success_rate: f64,
    /// Times a dispatch fell back away from this tier
    pub fallback_count: u64,
    pub fallback_rate: f64,
}

/// Aggregate over all tiers
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SystemSummary {
    pub total_requests: u64,
    pub overall_success_rate: f64,
    pub average_latency_ms: f64,
    pub cache_hit_rate: f64,
    pub total_cost: f64,
    pub overall_fallback_rate: f64,
}

/// Append-only routing analytics
pub struct AnalyticsRecorder {
    counters: HashMap<Tier, TierCounters>,
    order: Vec<Tier>,
    history: Mutex<VecDeque<RoutingDecision>>,
    history_capacity: usize,
}

fn ratio(numerator: u64, denominator: u64, empty: f64) -> f64 {
    if denominator == 0 {
        empty
    } else {
        numerator as f64 / denominator as f64
    }
}

impl AnalyticsRecorder {
    pub fn new(tiers: &[Tier], history_capacity: usize) -> Self {
        let mut order = Vec::with_capacity(tiers.len());
        let mut counters = HashMap::with_capacity(tiers.len());
        for tier in tiers {
            if counters.insert(*tier, TierCounters::default()).is_none() {
                order.push(*tier);
            }
        }

        Self {
            counters,
            order,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
        }
    }

    fn counters(&self, tier: Tier) -> AppResult<&TierCounters> {
        self.counters
            .get(&tier)
            .ok_or_else(|| AppError::InvalidTier(tier.to_string()))
    }

    /// Record the outcome of a request served (or attempted) by `tier`
    pub fn record(&self, tier: Tier, outcome: RecordedOutcome) -> AppResult<()> {
        let c = self.counters(tier)?;

        let previous = c.requests.fetch_add(1, Ordering::Relaxed);
        if outcome.success {
            c.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            c.errors.fetch_add(1, Ordering::Relaxed);
        }
        let cost_micros = if outcome.cost.is_finite() && outcome.cost > 0.0 {
            (outcome.cost * COST_SCALE).round() as u64
        } else {
            0
        };
        c.cost_micros.fetch_add(cost_micros, Ordering::Relaxed);
        c.latency_ms_total
            .fetch_add(outcome.latency_ms, Ordering::Relaxed);
        c.observe_latency(outcome.latency_ms, previous == 0);
        if outcome.cache_hit {
            c.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            c.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        let status = if outcome.success { "success" } else { "error" };
        metrics::counter!("tier_router_requests_total", "tier" => tier.as_str(), "status" => status)
            .increment(1);
        metrics::histogram!("tier_router_request_duration_seconds", "tier" => tier.as_str())
            .record(outcome.latency_ms as f64 / 1000.0);
        metrics::counter!(
            "tier_router_cache_operations_total",
            "tier" => tier.as_str(),
            "result" => if outcome.cache_hit { "hit" } else { "miss" }
        )
        .increment(1);

        Ok(())
    }

    /// Count a routing decision and append it to the history
    pub fn record_decision(&self, decision: &RoutingDecision) -> AppResult<()> {
        self.counters(decision.tier)?
            .routed
            .fetch_add(1, Ordering::Relaxed);

        metrics::counter!(
            "tier_router_decisions_total",
            "tier" => decision.tier.as_str(),
            "complexity" => decision.complexity.to_string()
        )
        .increment(1);

        if self.history_capacity > 0 {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            if history.len() == self.history_capacity {
                history.pop_front();
            }
            history.push_back(decision.clone());
        }
        Ok(())
    }

    /// Count a dispatch falling back from one tier to another
    pub fn record_fallback(&self, from: Tier, to: Tier) -> AppResult<()> {
        self.counters(to)?;
        self.counters(from)?
            .fallbacks
            .fetch_add(1, Ordering::Relaxed);
        metrics::counter!("tier_router_fallbacks_total", "from" => from.as_str(), "to" => to.as_str())
            .increment(1);
        debug!(from = %from, to = %to, "Fallback recorded");
        Ok(())
    }

    /// Fraction of successful outcomes; 1.0 until evidence arrives
    pub fn success_rate(&self, tier: Tier) -> AppResult<f64> {
        let c = self.counters(tier)?;
        Ok(ratio(
            c.successes.load(Ordering::Relaxed),
            c.requests.load(Ordering::Relaxed),
            1.0,
        ))
    }

    /// Mean latency in milliseconds; 0.0 with no data
    pub fn average_latency(&self, tier: Tier) -> AppResult<f64> {
        let c = self.counters(tier)?;
        Ok(ratio(
            c.latency_ms_total.load(Ordering::Relaxed),
            c.requests.load(Ordering::Relaxed),
            0.0,
        ))
    }

    /// Exponentially weighted latency in milliseconds; 0.0 with no data
    pub fn recent_latency(&self, tier: Tier) -> AppResult<f64> {
        let c = self.counters(tier)?;
        if c.requests.load(Ordering::Relaxed) == 0 {
            return Ok(0.0);
        }
        Ok(f64::from_bits(c.recent_latency_bits.load(Ordering::Relaxed)))
    }

    pub fn average_cost(&self, tier: Tier) -> AppResult<f64> {
        let c = self.counters(tier)?;
        Ok(ratio(
            c.cost_micros.load(Ordering::Relaxed),
            c.requests.load(Ordering::Relaxed),
            0.0,
        ) / COST_SCALE)
    }

    /// Cache hit fraction across all tiers; 0.0 with no data
    pub fn cache_hit_rate(&self) -> f64 {
        let (hits, misses) = self.counters.values().fold((0, 0), |(h, m), c| {
            (
                h + c.cache_hits.load(Ordering::Relaxed),
                m + c.cache_misses.load(Ordering::Relaxed),
            )
        });
        ratio(hits, hits + misses, 0.0)
    }

    /// Fallbacks away from `tier` per outcome recorded against it
    pub fn fallback_rate(&self, tier: Tier) -> AppResult<f64> {
        let c = self.counters(tier)?;
        Ok(ratio(
            c.fallbacks.load(Ordering::Relaxed),
            c.requests.load(Ordering::Relaxed),
            0.0,
        ))
    }

    pub fn overall_fallback_rate(&self) -> f64 {
        let (fallbacks, requests) = self.counters.values().fold((0, 0), |(f, r), c| {
            (
                f + c.fallbacks.load(Ordering::Relaxed),
                r + c.requests.load(Ordering::Relaxed),
            )
        });
        ratio(fallbacks, requests, 0.0)
    }

    /// Share of recorded outcomes per tier, in percent
    pub fn usage_distribution(&self) -> Vec<(Tier, f64)> {
        let total: u64 = self
            .counters
            .values()
            .map(|c| c.requests.load(Ordering::Relaxed))
            .sum();
        self.order
            .iter()
            .map(|tier| {
                let requests = self.counters[tier].requests.load(Ordering::Relaxed);
                (*tier, ratio(requests, total, 0.0) * 100.0)
            })
            .collect()
    }

    pub fn tier_metrics(&self, tier: Tier) -> AppResult<TierMetrics> {
        let c = self.counters(tier)?;
        let requests = c.requests.load(Ordering::Relaxed);
        let cost_micros = c.cost_micros.load(Ordering::Relaxed);
        let fallbacks = c.fallbacks.load(Ordering::Relaxed);

        Ok(TierMetrics {
            tier,
            total_routed: c.routed.load(Ordering::Relaxed),
            total_requests: requests,
            successful_requests: c.successes.load(Ordering::Relaxed),
            failed_requests: c.errors.load(Ordering::Relaxed),
            total_cost: cost_micros as f64 / COST_SCALE,
            average_cost: ratio(cost_micros, requests, 0.0) / COST_SCALE,
            average_latency_ms: ratio(c.latency_ms_total.load(Ordering::Relaxed), requests, 0.0),
            recent_latency_ms: self.recent_latency(tier)?,
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            cache_misses: c.cache_misses.load(Ordering::Relaxed),
            success_rate: ratio(c.successes.load(Ordering::Relaxed), requests, 1.0),
            fallback_count: fallbacks,
            fallback_rate: ratio(fallbacks, requests, 0.0),
        })
    }

    /// Every tier's metrics in declaration order
    pub fn snapshot(&self) -> Vec<TierMetrics> {
        self.order
            .iter()
            .filter_map(|tier| self.tier_metrics(*tier).ok())
            .collect()
    }

    pub fn system_summary(&self) -> SystemSummary {
        let snapshot = self.snapshot();
        let total_requests: u64 = snapshot.iter().map(|m| m.total_requests).sum();
        let successes: u64 = snapshot.iter().map(|m| m.successful_requests).sum();
        let latency: u64 = self
            .counters
            .values()
            .map(|c| c.latency_ms_total.load(Ordering::Relaxed))
            .sum();

        SystemSummary {
            total_requests,
            overall_success_rate: ratio(successes, total_requests, 1.0),
            average_latency_ms: ratio(latency, total_requests, 0.0),
            cache_hit_rate: self.cache_hit_rate(),
            total_cost: snapshot.iter().map(|m| m.total_cost).sum(),
            overall_fallback_rate: self.overall_fallback_rate(),
        }
    }

    /// Tiers that have recorded at least one outcome, in declaration order
    fn observed(&self) -> Vec<TierMetrics> {
        self.snapshot()
            .into_iter()
            .filter(|m| m.total_requests > 0)
            .collect()
    }

    /// Highest success rate, then lowest latency; first declared wins ties
    pub fn best_performing_tier(&self) -> Option<Tier> {
        self.observed()
            .into_iter()
            .reduce(|best, m| {
                let better = m.success_rate > best.success_rate
                    || (m.success_rate == best.success_rate
                        && m.average_latency_ms < best.average_latency_ms);
                if better {
                    m
                } else {
                    best
                }
            })
            .map(|m| m.tier)
    }

    pub fn fastest_tier(&self) -> Option<Tier> {
        self.observed()
            .into_iter()
            .reduce(|best, m| {
                if m.average_latency_ms < best.average_latency_ms {
                    m
                } else {
                    best
                }
            })
            .map(|m| m.tier)
    }

    pub fn cheapest_tier(&self) -> Option<Tier> {
        self.observed()
            .into_iter()
            .reduce(|best, m| {
                if m.average_cost < best.average_cost {
                    m
                } else {
                    best
                }
            })
            .map(|m| m.tier)
    }

    /// Most recent decisions, newest first
    pub fn history(&self, limit: usize) -> Vec<RoutingDecision> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.iter().rev().take(limit).cloned().collect()
    }

    /// Clear every counter and the routing history
    pub fn reset(&self) {
        for c in self.counters.values() {
            c.reset();
        }
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
