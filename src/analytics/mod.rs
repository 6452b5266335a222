//! Routing analytics
//!
//! Per-tier request counters, cost and latency aggregates, fallback events
//! and the recent routing history.

pub mod recorder;

pub use recorder::{AnalyticsRecorder, RecordedOutcome, SystemSummary, TierMetrics};
