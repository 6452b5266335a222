//! Tier routing module
//!
//! Health tracking, recovery backoff, complexity classification, routing
//! decisions and dispatch for the local LLM, RAP system and external LLM tiers.

pub mod classifier;
pub mod dispatch;
pub mod health;
pub mod probe;
pub mod recovery;
pub mod router;
pub mod types;

pub use classifier::{Classification, ClassifierConfig, ComplexityClassifier};
pub use dispatch::{
    DispatchConfig, DispatchError, DispatchOutcome, Dispatcher, TierClient, TierResponse,
};
pub use health::{AggregateHealth, HealthConfig, HealthMonitor, HealthStatus};
pub use probe::HttpTierProbe;
pub use recovery::{ProbeOutcome, RecoveryConfig, RecoveryScheduler, TierProbe};
pub use router::{EscalationPolicy, RouteRequest, RoutingDecision, TierRouter};
pub use types::{default_tier_specs, QueryComplexity, Tier, TierSpec};
