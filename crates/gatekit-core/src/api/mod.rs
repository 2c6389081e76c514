//! Resilient API access for the application backend.
//!
//! This module provides the `GatewayClient` for making authenticated,
//! traced, retried HTTP calls, and the `GatewayError` taxonomy callers
//! match on to render loading/error states.
//!
//! Non-2xx responses are parsed into the problem-details shape the
//! backend emits (type/title/status/detail/correlation_id).

pub mod client;
pub mod error;

pub use client::{GatewayClient, RequestOptions, TokenResponse, CORRELATION_HEADER, DEBUG_TRACE_HEADER};
pub use error::{GatewayError, ProblemDetails, RETRYABLE_STATUSES};
