//! Configuration management for the tier router
//!
//! Configuration is loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::tiers::{
    ClassifierConfig, DispatchConfig, EscalationPolicy, HealthConfig, RecoveryConfig, Tier,
    TierSpec,
};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// Configured tiers in declaration order
    pub tiers: Vec<TierSpec>,

    pub health: HealthConfig,
    pub recovery: RecoveryConfig,
    pub dispatch: DispatchConfig,
    pub classifier: ClassifierConfig,

    /// Behaviour when no healthy tier meets the minimum tier
    pub escalation_policy: EscalationPolicy,
    /// Routing decisions kept for the history endpoint
    pub history_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            tiers: crate::tiers::default_tier_specs(),
            health: HealthConfig::default(),
            recovery: RecoveryConfig::default(),
            dispatch: DispatchConfig::default(),
            classifier: ClassifierConfig::default(),
            escalation_policy: EscalationPolicy::default(),
            history_capacity: 100,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let parse = Parser { lookup: &lookup };

        let tier_names = lookup("ROUTER_TIERS")
            .unwrap_or_else(|| "local_llm,rap_system,external_llm".to_string());
        let mut tiers: Vec<TierSpec> = Vec::new();
        for name in tier_names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let tier: Tier = name
                .parse()
                .with_context(|| format!("Invalid tier in ROUTER_TIERS: {}", name))?;
            if tiers.iter().any(|s| s.tier == tier) {
                continue;
            }

            let priority_key = format!("ROUTER_{}_PRIORITY", tier.env_key());
            let mut spec = TierSpec::new(tier)
                .with_priority(parse.or(&priority_key, tier.default_priority())?);
            if let Some(url) = lookup(&format!("ROUTER_{}_PROBE_URL", tier.env_key())) {
                spec = spec.with_probe_url(url);
            }
            let threshold_key = format!("ROUTER_{}_LATENCY_THRESHOLD_MS", tier.env_key());
            if let Some(threshold_ms) = parse.opt(&threshold_key)? {
                spec = spec.with_latency_threshold_ms(threshold_ms);
            }
            tiers.push(spec);
        }
        if tiers.is_empty() {
            bail!("ROUTER_TIERS must name at least one tier");
        }

        let failure_threshold: u32 =
            parse.or("ROUTER_FAILURE_THRESHOLD", defaults.health.failure_threshold)?;
        if failure_threshold == 0 {
            bail!("ROUTER_FAILURE_THRESHOLD must be at least 1");
        }

        let recovery = RecoveryConfig {
            base_delay: Duration::from_millis(parse.or(
                "ROUTER_RECOVERY_BASE_DELAY_MS",
                defaults.recovery.base_delay.as_millis() as u64,
            )?),
            backoff_multiplier: parse.or(
                "ROUTER_RECOVERY_BACKOFF_MULTIPLIER",
                defaults.recovery.backoff_multiplier,
            )?,
            max_delay: Duration::from_millis(parse.or(
                "ROUTER_RECOVERY_MAX_DELAY_MS",
                defaults.recovery.max_delay.as_millis() as u64,
            )?),
            check_interval: Duration::from_secs(parse.or(
                "ROUTER_RECOVERY_INTERVAL_SECS",
                defaults.recovery.check_interval.as_secs(),
            )?),
            probe_timeout: Duration::from_millis(parse.or(
                "ROUTER_PROBE_TIMEOUT_MS",
                defaults.recovery.probe_timeout.as_millis() as u64,
            )?),
        };
        if recovery.check_interval.is_zero() {
            bail!("ROUTER_RECOVERY_INTERVAL_SECS must be at least 1");
        }

        let dispatch = DispatchConfig {
            timeout: Duration::from_millis(parse.or(
                "ROUTER_DISPATCH_TIMEOUT_MS",
                defaults.dispatch.timeout.as_millis() as u64,
            )?),
            max_fallback_attempts: parse.or(
                "ROUTER_MAX_FALLBACK_ATTEMPTS",
                defaults.dispatch.max_fallback_attempts,
            )?,
            latency_threshold: parse
                .opt("ROUTER_LATENCY_THRESHOLD_MS")?
                .map(Duration::from_millis),
            fallback_on_latency: parse.or(
                "ROUTER_FALLBACK_ON_LATENCY",
                defaults.dispatch.fallback_on_latency,
            )?,
        };

        let escalation_policy = if parse.flag("ROUTER_STRICT_MINIMUM_TIER") {
            EscalationPolicy::Strict
        } else {
            EscalationPolicy::Degrade
        };

        Ok(Self {
            host: lookup("ROUTER_HOST").unwrap_or(defaults.host),
            port: parse.or("ROUTER_PORT", defaults.port)?,
            tiers,
            health: HealthConfig { failure_threshold },
            recovery,
            dispatch,
            classifier: defaults.classifier,
            escalation_policy,
            history_capacity: parse.or("ROUTER_HISTORY_CAPACITY", defaults.history_capacity)?,
        })
    }

    /// Configured tiers in declaration order
    pub fn tier_list(&self) -> Vec<Tier> {
        self.tiers.iter().map(|s| s.tier).collect()
    }
}

struct Parser<'a, F> {
    lookup: &'a F,
}

impl<F> Parser<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match (self.lookup)(key) {
            Some(value) => value
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}", key)),
            None => Ok(default),
        }
    }

    fn opt<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        (self.lookup)(key)
            .map(|value| value.trim().parse().with_context(|| format!("Invalid {}", key)))
            .transpose()
    }

    fn flag(&self, key: &str) -> bool {
        (self.lookup)(key)
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false)
    }
}
