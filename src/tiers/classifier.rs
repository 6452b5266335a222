//! Query complexity classification
//!
//! Buckets a query into a [`QueryComplexity`] from cheap textual signals.
//! Classification is deterministic and total: any input, including an empty
//! string, yields a complexity.
//!
//! | Signal | Score |
//! |--------|-------|
//! | more than `moderate_token_threshold` tokens | +1 |
//! | more than `complex_token_threshold` tokens | +2 (instead of +1) |
//! | multi-step instructions (numbered lines, "step by step", "first ... then") | +1 |
//! | analytical wording (analyze, compare, evaluate, trade-offs, ...) | +1 |
//! | open-ended design or strategy wording (develop, design, comprehensive, ...) | +2 |
//! | fenced code block | +1 |
//!
//! Score 0 is simple, 1 moderate, 2 or more complex.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tiktoken_rs::CoreBPE;
use tracing::warn;

use super::types::QueryComplexity;

static ENCODER: Lazy<Option<CoreBPE>> = Lazy::new(|| match tiktoken_rs::cl100k_base() {
    Ok(bpe) => Some(bpe),
    Err(e) => {
        warn!(error = %e, "cl100k encoder unavailable, counting whitespace tokens");
        None
    }
});

static NUMBERED_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*\d+[.)]\s+\S").unwrap());

static MULTI_STEP_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\bstep[- ]by[- ]step\b|\bfirst\b.+\bthen\b|\bmulti[- ]step\b").unwrap()
});

static ANALYTICAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(analy[sz]e|analysis|compare|comparison|contrast|evaluate|assess|explain why|trade-?offs?|pros and cons|implications|benefits)\b",
    )
    .unwrap()
});

static OPEN_ENDED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(develop|design|architect|comprehensive|strateg(y|ies|ic)|roadmap|end-to-end|in-depth)\b",
    )
    .unwrap()
});

/// Token thresholds for the length signal
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub moderate_token_threshold: usize,
    pub complex_token_threshold: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            moderate_token_threshold: 40,
            complex_token_threshold: 200,
        }
    }
}

/// Classification result with the signals that fired
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub complexity: QueryComplexity,
    pub score: u32,
    pub token_count: usize,
    pub signals: Vec<&'static str>,
}

/// Deterministic, side-effect-free query classifier
#[derive(Debug, Clone, Default)]
pub struct ComplexityClassifier {
    config: ClassifierConfig,
}

impl ComplexityClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, query: &str) -> QueryComplexity {
        self.classify_detailed(query).complexity
    }

    pub fn classify_detailed(&self, query: &str) -> Classification {
        if query.trim().is_empty() {
            return Classification {
                complexity: QueryComplexity::Simple,
                score: 0,
                token_count: 0,
                signals: Vec::new(),
            };
        }

        let token_count = count_tokens(query);
        let mut score = 0;
        let mut signals = Vec::new();

        if token_count > self.config.complex_token_threshold {
            score += 2;
            signals.push("very_long");
        } else if token_count > self.config.moderate_token_threshold {
            score += 1;
            signals.push("long");
        }

        if NUMBERED_LINE.find_iter(query).count() >= 2 || MULTI_STEP_PHRASE.is_match(query) {
            score += 1;
            signals.push("multi_step");
        }

        if ANALYTICAL.is_match(query) {
            score += 1;
            signals.push("analytical");
        }

        if OPEN_ENDED.is_match(query) {
            score += 2;
            signals.push("open_ended");
        }

        if query.contains("```") {
            score += 1;
            signals.push("code");
        }

        let complexity = match score {
            0 => QueryComplexity::Simple,
            1 => QueryComplexity::Moderate,
            _ => QueryComplexity::Complex,
        };

        Classification {
            complexity,
            score,
            token_count,
            signals,
        }
    }
}

fn count_tokens(text: &str) -> usize {
    match ENCODER.as_ref() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.split_whitespace().count(),
    }
}
