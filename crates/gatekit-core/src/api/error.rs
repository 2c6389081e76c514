//! Error taxonomy for the gateway client.
//!
//! Every outcome of a logical call collapses into one `GatewayError`
//! variant, so presentation code can render "try again" / "please sign in
//! again" / "request timed out" without understanding retry internals.
//! Messages are sanitized: raw response bodies and transport internals
//! never reach a caller.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Statuses worth retrying: rate limiting and transient server failures.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

pub fn is_retryable_status(status: StatusCode) -> bool {
    RETRYABLE_STATUSES.contains(&status.as_u16())
}

/// Structured error body the backend returns instead of raw messages.
///
/// Unknown fields are ignored; both snake_case and camelCase correlation
/// keys are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(default, rename = "type")]
    pub problem_type: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default, alias = "correlationId")]
    pub correlation_id: Option<String>,
}

impl ProblemDetails {
    /// Parse a response body, substituting a synthetic detail string when
    /// the body is absent, not a problem document, or carries no
    /// human-readable text of its own.
    pub fn from_body(status: StatusCode, body: &str) -> Self {
        if !body.trim().is_empty() {
            if let Ok(mut problem) = serde_json::from_str::<ProblemDetails>(body) {
                if problem.detail.is_none() && problem.title.is_none() {
                    problem.detail = Some(synthetic_detail(status));
                }
                if problem.status.is_none() {
                    problem.status = Some(status.as_u16());
                }
                return problem;
            }
        }
        Self {
            status: Some(status.as_u16()),
            detail: Some(synthetic_detail(status)),
            ..Self::default()
        }
    }

    /// True when a 401's body says the token itself is expired or invalid,
    /// as opposed to a malformed-request 401. Type values may be bare
    /// ("token-expired") or URI-style (".../errors/token-expired"); only
    /// the final path segment is compared, and it must match exactly.
    pub fn indicates_expired_token(&self) -> bool {
        self.problem_type
            .as_deref()
            .map(|t| {
                let segment = t.rsplit('/').next().unwrap_or(t);
                segment == "token-expired" || segment == "token-invalid"
            })
            .unwrap_or(false)
    }

    /// Best human-readable summary available.
    pub fn message(&self) -> String {
        self.detail
            .clone()
            .or_else(|| self.title.clone())
            .unwrap_or_else(|| "Request failed".to_string())
    }
}

fn synthetic_detail(status: StatusCode) -> String {
    format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown Status")
    )
}

/// Terminal outcome of a logical call.
///
/// Retryable conditions (network, timeout, retryable statuses) only
/// surface here once the retry budget is exhausted.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Network error: {message}")]
    Network {
        message: String,
        correlation_id: String,
    },

    #[error("Request timed out after {timeout:?}")]
    Timeout {
        timeout: Duration,
        correlation_id: String,
    },

    #[error("HTTP {status}: {}", .problem.message())]
    Http {
        status: u16,
        problem: ProblemDetails,
        correlation_id: String,
    },

    #[error("Session expired - please sign in again")]
    AuthExpired { correlation_id: String },

    /// Caller-initiated abandonment; deliberately distinct from `Timeout`
    /// so retry bookkeeping never conflates the two.
    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid response: {message}")]
    InvalidResponse {
        message: String,
        correlation_id: String,
    },
}

impl GatewayError {
    /// Correlation ID for joining client and server logs, when the error
    /// got far enough to have one.
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            GatewayError::Network { correlation_id, .. }
            | GatewayError::Timeout { correlation_id, .. }
            | GatewayError::Http { correlation_id, .. }
            | GatewayError::AuthExpired { correlation_id }
            | GatewayError::InvalidResponse { correlation_id, .. } => Some(correlation_id),
            GatewayError::Cancelled => None,
        }
    }

    /// HTTP status, for errors that carry one.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Http { status, .. } => Some(*status),
            GatewayError::AuthExpired { .. } => Some(401),
            _ => None,
        }
    }
}
