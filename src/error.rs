//! Error types for the tier router
//!
//! This module defines the error taxonomy shared by routing, health tracking,
//! dispatch and the HTTP layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::tiers::Tier;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    /// A tier was referenced that this router instance was not configured with.
    #[error("Invalid tier: {0}")]
    InvalidTier(String),

    #[error("No available provider for minimum tier {minimum_tier}")]
    NoAvailableProvider { minimum_tier: Tier },

    #[error("Tier {tier} did not respond within {deadline_ms}ms")]
    Timeout { tier: Tier, deadline_ms: u64 },

    #[error("All attempted tiers failed: {}", format_attempts(.attempts))]
    AllTiersFailed { attempts: Vec<FailedAttempt> },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// One failed dispatch attempt, reported inside [`AppError::AllTiersFailed`]
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailedAttempt {
    pub tier: Tier,
    pub error: String,
}

fn format_attempts(attempts: &[FailedAttempt]) -> String {
    attempts
        .iter()
        .map(|a| format!("{} ({})", a.tier, a.error))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error details
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

/// Additional error details for routing failures
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<Vec<FailedAttempt>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            AppError::InvalidTier(_) => (
                StatusCode::BAD_REQUEST,
                "INVALID_TIER",
                self.to_string(),
                None,
            ),
            AppError::NoAvailableProvider { minimum_tier } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "NO_AVAILABLE_PROVIDER",
                self.to_string(),
                Some(ErrorDetails {
                    tier: Some(*minimum_tier),
                    attempts: None,
                }),
            ),
            AppError::Timeout { tier, .. } => (
                StatusCode::GATEWAY_TIMEOUT,
                "TIMEOUT",
                self.to_string(),
                Some(ErrorDetails {
                    tier: Some(*tier),
                    attempts: None,
                }),
            ),
            AppError::AllTiersFailed { attempts } => (
                StatusCode::BAD_GATEWAY,
                "ALL_TIERS_FAILED",
                "All attempted tiers failed".to_string(),
                Some(ErrorDetails {
                    tier: None,
                    attempts: Some(attempts.clone()),
                }),
            ),
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                msg.clone(),
                None,
            ),
            AppError::JsonError(_) => (
                StatusCode::BAD_REQUEST,
                "INVALID_JSON",
                "Invalid JSON in request".to_string(),
                None,
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
