//! Dispatching routed queries to tier clients
//!
//! Runs a [`RoutingDecision`] against a [`TierClient`]: the chosen tier is
//! tried first, then healthy fallbacks up to `max_fallback_attempts`. Every
//! attempt runs under a deadline and its outcome is fed back into the health
//! monitor and the analytics recorder. The query is never re-classified.
//!
//! An answer slower than its tier's latency threshold also moves on to the
//! next fallback. It is kept and served if no later tier answers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::analytics::{AnalyticsRecorder, RecordedOutcome};
use crate::error::{AppError, AppResult, FailedAttempt};

use super::health::HealthMonitor;
use super::router::{RouteRequest, RoutingDecision, TierRouter};
use super::types::Tier;

/// Error returned by a tier client
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    #[error("timeout")]
    Timeout,

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Successful answer from a tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierResponse {
    pub content: String,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub cache_hit: bool,
}

/// Client for the actual tier backends
///
/// The router ships no real provider clients; embedders implement this for
/// their local model, RAP system and external API.
#[async_trait]
pub trait TierClient: Send + Sync {
    async fn call(&self, tier: Tier, query: &str) -> Result<TierResponse, DispatchError>;
}

/// Dispatch limits
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Deadline for a single tier call (default: 30s)
    pub timeout: Duration,
    /// Fallback tiers tried after the primary fails (default: 2)
    pub max_fallback_attempts: usize,
    /// Threshold for tiers that set none of their own (default: none)
    pub latency_threshold: Option<Duration>,
    /// Fall back when an answer exceeds its latency threshold (default: true)
    pub fallback_on_latency: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_fallback_attempts: 2,
            latency_threshold: None,
            fallback_on_latency: true,
        }
    }
}

/// A dispatched query and the tier that answered it
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub decision_id: Uuid,
    pub tier: Tier,
    pub response: TierResponse,
    pub latency_ms: u64,
    /// Attempts that failed or answered too slowly, excluding `tier`
    pub failed_attempts: Vec<FailedAttempt>,
    /// True when `tier` sits below the decision's minimum tier
    pub degraded: bool,
}

pub struct Dispatcher {
    client: Arc<dyn TierClient>,
    router: Arc<TierRouter>,
    health: Arc<HealthMonitor>,
    analytics: Arc<AnalyticsRecorder>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn TierClient>,
        router: Arc<TierRouter>,
        health: Arc<HealthMonitor>,
        analytics: Arc<AnalyticsRecorder>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            client,
            router,
            health,
            analytics,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Route a request and dispatch the resulting decision
    pub async fn route_and_dispatch(&self, request: &RouteRequest) -> AppResult<DispatchOutcome> {
        let decision = self.router.route(request)?;
        self.dispatch(&decision, &request.query).await
    }

    /// Execute a decision, walking its fallback list on failure
    #[instrument(skip_all, fields(decision_id = %decision.id, tier = %decision.tier))]
    pub async fn dispatch(
        &self,
        decision: &RoutingDecision,
        query: &str,
    ) -> AppResult<DispatchOutcome> {
        let deadline_ms = self.config.timeout.as_millis() as u64;
        let mut failed_attempts: Vec<FailedAttempt> = Vec::new();
        let mut last_timeout: Option<Tier> = None;
        let mut previous: Option<Tier> = None;
        let mut fallbacks_used = 0;
        let mut slow_answer: Option<(Tier, TierResponse, u64)> = None;
        let candidates = std::iter::once(decision.tier).chain(decision.fallbacks.iter().copied());

        for tier in candidates {
            if let Some(from) = previous {
                if fallbacks_used >= self.config.max_fallback_attempts {
                    debug!(
                        max_fallback_attempts = self.config.max_fallback_attempts,
                        "Fallback attempts exhausted"
                    );
                    break;
                }
                if !matches!(self.health.is_healthy(tier), Ok(true)) {
                    debug!(tier = %tier, "Skipping fallback tier that is no longer healthy");
                    continue;
                }
                fallbacks_used += 1;
                self.analytics.record_fallback(from, tier)?;
                info!(from = %from, to = %tier, "Falling back to next tier");
            }
            previous = Some(tier);

            let started = Instant::now();
            let result = tokio::time::timeout(self.config.timeout, self.client.call(tier, query)).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            let error = match result {
                Ok(Ok(response)) => {
                    self.health.record_outcome(tier, true, latency_ms, None)?;
                    self.analytics.record(
                        tier,
                        RecordedOutcome {
                            success: true,
                            cost: response.cost,
                            latency_ms,
                            cache_hit: response.cache_hit,
                        },
                    )?;
                    match self.latency_threshold(tier) {
                        Some(threshold) if latency_ms > threshold.as_millis() as u64 => {
                            last_timeout = None;
                            if slow_answer.is_none() {
                                slow_answer = Some((tier, response, latency_ms));
                            }
                            format!(
                                "latency {}ms exceeded threshold {}ms",
                                latency_ms,
                                threshold.as_millis()
                            )
                        }
                        _ => {
                            debug!(tier = %tier, latency_ms, "Tier answered");
                            return Ok(outcome(
                                decision,
                                tier,
                                response,
                                latency_ms,
                                failed_attempts,
                            ));
                        }
                    }
                }
                Ok(Err(DispatchError::Timeout)) | Err(_) => {
                    last_timeout = Some(tier);
                    self.record_failure(tier, deadline_ms, "timeout")?;
                    DispatchError::Timeout.to_string()
                }
                Ok(Err(e)) => {
                    last_timeout = None;
                    let message = e.to_string();
                    self.record_failure(tier, latency_ms, &message)?;
                    message
                }
            };

            warn!(tier = %tier, error = %error, "Tier attempt unsuccessful");
            failed_attempts.push(FailedAttempt { tier, error });
        }

        if let Some((tier, response, latency_ms)) = slow_answer {
            info!(tier = %tier, latency_ms, "No faster tier answered, serving slow answer");
            failed_attempts.retain(|a| a.tier != tier);
            return Ok(outcome(decision, tier, response, latency_ms, failed_attempts));
        }

        match (failed_attempts.as_slice(), last_timeout) {
            ([_], Some(tier)) => Err(AppError::Timeout { tier, deadline_ms }),
            _ => Err(AppError::AllTiersFailed {
                attempts: failed_attempts,
            }),
        }
    }

    fn latency_threshold(&self, tier: Tier) -> Option<Duration> {
        if !self.config.fallback_on_latency {
            return None;
        }
        self.router
            .latency_threshold(tier)
            .or(self.config.latency_threshold)
    }

    fn record_failure(&self, tier: Tier, latency_ms: u64, error: &str) -> AppResult<()> {
        self.health
            .record_outcome(tier, false, latency_ms, Some(error))?;
        self.analytics.record(
            tier,
            RecordedOutcome {
                success: false,
                cost: 0.0,
                latency_ms,
                cache_hit: false,
            },
        )
    }
}

fn outcome(
    decision: &RoutingDecision,
    tier: Tier,
    response: TierResponse,
    latency_ms: u64,
    failed_attempts: Vec<FailedAttempt>,
) -> DispatchOutcome {
    DispatchOutcome {
        decision_id: decision.id,
        tier,
        response,
        latency_ms,
        failed_attempts,
        degraded: tier < decision.minimum_tier,
    }
}
