//! Core routing types
//!
//! Tiers, query complexity levels and the static tier specification the
//! router is configured with.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Routing destination, ordered by ascending capability.
///
/// The derived ordering is the capability ordering used when filtering
/// candidates against a minimum tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Locally hosted quantized model - free, fast, limited
    LocalLlm,
    /// Retrieval-augmented prompting over the internal knowledge base
    RapSystem,
    /// Hosted third-party LLM API - most capable, most expensive
    ExternalLlm,
}

impl Tier {
    /// Every tier in capability order.
    pub const ALL: [Tier; 3] = [Tier::LocalLlm, Tier::RapSystem, Tier::ExternalLlm];

    /// Priority used when none is configured (cheapest first).
    pub fn default_priority(self) -> u32 {
        match self {
            Tier::LocalLlm => 0,
            Tier::RapSystem => 1,
            Tier::ExternalLlm => 2,
        }
    }

    /// Stable snake_case name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::LocalLlm => "local_llm",
            Tier::RapSystem => "rap_system",
            Tier::ExternalLlm => "external_llm",
        }
    }

    /// Upper-case name used in environment variable keys.
    pub fn env_key(self) -> &'static str {
        match self {
            Tier::LocalLlm => "LOCAL_LLM",
            Tier::RapSystem => "RAP_SYSTEM",
            Tier::ExternalLlm => "EXTERNAL_LLM",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "local_llm" | "local" => Ok(Tier::LocalLlm),
            "rap_system" | "rap" => Ok(Tier::RapSystem),
            "external_llm" | "external" => Ok(Tier::ExternalLlm),
            _ => Err(AppError::InvalidTier(s.to_string())),
        }
    }
}

/// Coarse query complexity used to pick a minimum acceptable tier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum QueryComplexity {
    #[default]
    Simple,
    Moderate,
    Complex,
}

impl QueryComplexity {
    /// Static mapping from complexity to the cheapest tier allowed to serve it.
    pub fn minimum_tier(self) -> Tier {
        match self {
            QueryComplexity::Simple => Tier::LocalLlm,
            QueryComplexity::Moderate => Tier::RapSystem,
            QueryComplexity::Complex => Tier::ExternalLlm,
        }
    }
}

impl fmt::Display for QueryComplexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryComplexity::Simple => write!(f, "simple"),
            QueryComplexity::Moderate => write!(f, "moderate"),
            QueryComplexity::Complex => write!(f, "complex"),
        }
    }
}

/// Static configuration of one tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSpec {
    pub tier: Tier,
    /// Lower is cheaper and preferred
    pub priority: u32,
    /// Health endpoint probed during recovery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_url: Option<String>,
    /// Answers slower than this fall back to the next tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_threshold_ms: Option<u64>,
}

impl TierSpec {
    pub fn new(tier: Tier) -> Self {
        Self {
            tier,
            priority: tier.default_priority(),
            probe_url: None,
            latency_threshold_ms: None,
        }
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_probe_url(mut self, url: impl Into<String>) -> Self {
        self.probe_url = Some(url.into());
        self
    }

    pub fn with_latency_threshold_ms(mut self, threshold_ms: u64) -> Self {
        self.latency_threshold_ms = Some(threshold_ms);
        self
    }
}

/// Tier set in declaration order; the default declares all three tiers.
pub fn default_tier_specs() -> Vec<TierSpec> {
    Tier::ALL.iter().map(|t| TierSpec::new(*t)).collect()
}
