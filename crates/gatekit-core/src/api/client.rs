//! Resilient gateway client.
//!
//! Turns a logical "make this API call" into a bounded, traceable,
//! retried, authenticated HTTP exchange:
//!
//! - one correlation ID per logical call, stamped on every attempt
//! - per-attempt timeout composed with caller cancellation
//! - fixed backoff schedule for {429, 500, 502, 503, 504}, network
//!   failures, and timeouts; 401 is never retried
//! - a 401 with token-expiry semantics clears the credential store and
//!   broadcasts `TokenExpired` before failing the call
//! - every outcome collapses into one [`GatewayError`]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{CredentialStore, SessionBroadcaster, SessionEventKind};
use crate::config::GatewayConfig;

use super::error::{is_retryable_status, GatewayError, ProblemDetails};

/// Trace header carried by every attempt of a logical call.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Emitted when the local debug-trace flag is set, asking the backend to
/// record verbose traces for this call.
pub const DEBUG_TRACE_HEADER: &str = "x-debug-trace";

/// Response shape of the identity collaborator's token-exchange and
/// token-refresh endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

/// Per-call knobs. `Default` means the configured attempt timeout and no
/// caller cancellation.
#[derive(Debug, Default)]
pub struct RequestOptions {
    /// Overrides the configured per-attempt timeout.
    pub timeout: Option<Duration>,
    /// Caller-initiated cancellation; composes with the attempt timeout
    /// and also covers the backoff waits between retries.
    pub cancel: Option<CancellationToken>,
}

/// Why an attempt failed in a way worth retrying.
enum RetryReason {
    Status(StatusCode, ProblemDetails),
    Network(String),
    Timeout(Duration),
}

impl RetryReason {
    /// Terminal error for when the retry budget runs out.
    fn into_error(self, correlation_id: &str) -> GatewayError {
        match self {
            RetryReason::Status(status, problem) => GatewayError::Http {
                status: status.as_u16(),
                problem,
                correlation_id: correlation_id.to_string(),
            },
            RetryReason::Network(message) => GatewayError::Network {
                message,
                correlation_id: correlation_id.to_string(),
            },
            RetryReason::Timeout(timeout) => GatewayError::Timeout {
                timeout,
                correlation_id: correlation_id.to_string(),
            },
        }
    }

    fn describe(&self) -> String {
        match self {
            RetryReason::Status(status, _) => format!("status {}", status.as_u16()),
            RetryReason::Network(message) => format!("network error: {}", message),
            RetryReason::Timeout(timeout) => format!("timeout after {:?}", timeout),
        }
    }
}

enum AttemptError {
    Retryable(RetryReason),
    Terminal(GatewayError),
}

/// Gateway client for the application backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: String,
    token_path: String,
    refresh_path: String,
    attempt_timeout: Duration,
    backoff: Vec<Duration>,
    debug_trace: bool,
    store: Arc<CredentialStore>,
    events: Arc<SessionBroadcaster>,
}

impl GatewayClient {
    /// Create a client over a shared credential store and session
    /// broadcaster. Both are injected so hosts (and tests) control the
    /// one-session-per-process instances.
    pub fn new(
        config: &GatewayConfig,
        store: Arc<CredentialStore>,
        events: Arc<SessionBroadcaster>,
    ) -> Result<Self> {
        // Attempt timeouts are enforced per attempt in `request`, not on
        // the underlying client, so they compose with cancellation.
        let http = Client::builder().build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token_path: config.token_path.clone(),
            refresh_path: config.refresh_path.clone(),
            attempt_timeout: config.request_timeout(),
            backoff: config.backoff_schedule(),
            debug_trace: config.debug_trace,
            store,
            events,
        })
    }

    /// Issue a logical call and parse the 2xx response body into `T`.
    ///
    /// Exactly one terminal outcome is produced: the parsed value, a
    /// [`GatewayError`], or `Cancelled` when the caller's token fires.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<T, GatewayError> {
        let correlation_id = Uuid::new_v4().to_string();
        let timeout = options.timeout.unwrap_or(self.attempt_timeout);
        let cancel = options.cancel.unwrap_or_default();
        let url = format!("{}{}", self.base_url, path);
        let max_retries = self.backoff.len();

        for attempt in 0..=max_retries {
            debug!(%method, %url, correlation_id, attempt = attempt + 1, "sending request");

            let result = self
                .execute_attempt(&method, &url, body.as_ref(), &correlation_id, timeout, &cancel)
                .await;

            match result {
                Ok(value) => return Ok(value),
                Err(AttemptError::Terminal(err)) => return Err(err),
                Err(AttemptError::Retryable(reason)) => {
                    if attempt == max_retries {
                        warn!(%url, correlation_id, "retry budget exhausted");
                        return Err(reason.into_error(&correlation_id));
                    }
                    let delay = self.backoff[attempt];
                    warn!(
                        %url,
                        correlation_id,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason.describe(),
                        "retrying after backoff"
                    );
                    // A cancel that lands between retries stops the call
                    // without starting another attempt.
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        unreachable!("retry loop produces a terminal outcome")
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        self.request(Method::GET, path, None, RequestOptions::default()).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, GatewayError> {
        self.request(Method::POST, path, Some(body), RequestOptions::default()).await
    }

    /// Exchange a credential grant for tokens, persist them, and announce
    /// the new session.
    pub async fn exchange_token(
        &self,
        body: serde_json::Value,
    ) -> Result<TokenResponse, GatewayError> {
        let path = self.token_path.clone();
        let tokens: TokenResponse = self.post(&path, body).await?;
        self.save_tokens(&tokens);
        Ok(tokens)
    }

    /// Trade the stored refresh token for a new token set.
    ///
    /// With no refresh token on hand the session is unrecoverable: the
    /// store is cleared and `TokenExpired` is broadcast, same as a
    /// server-signalled expiry.
    pub async fn refresh_session(&self) -> Result<TokenResponse, GatewayError> {
        let Some(refresh_token) = self.store.get_refresh_token() else {
            warn!("session refresh requested without a refresh token");
            self.store.clear_tokens();
            self.events.publish(SessionEventKind::TokenExpired);
            return Err(GatewayError::AuthExpired {
                correlation_id: Uuid::new_v4().to_string(),
            });
        };

        let path = self.refresh_path.clone();
        let body = serde_json::json!({ "refresh_token": refresh_token });
        let tokens: TokenResponse = self.post(&path, body).await?;
        self.save_tokens(&tokens);
        Ok(tokens)
    }

    /// Clear all session state and announce the logout. Never fails.
    pub async fn logout(&self) {
        self.store.clear_tokens();
        self.store.clear_identity();
        self.events.publish(SessionEventKind::LoggedOut);
    }

    fn save_tokens(&self, tokens: &TokenResponse) {
        self.store.set_tokens(
            &tokens.access_token,
            tokens.refresh_token.as_deref(),
            tokens.expires_in,
        );
        self.events.publish(SessionEventKind::TokenSaved);
    }

    async fn execute_attempt<T: DeserializeOwned>(
        &self,
        method: &Method,
        url: &str,
        body: Option<&serde_json::Value>,
        correlation_id: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<T, AttemptError> {
        let mut builder = self
            .http
            .request(method.clone(), url)
            .header(CORRELATION_HEADER, correlation_id);

        if self.debug_trace {
            builder = builder.header(DEBUG_TRACE_HEADER, "1");
        }

        // Read fresh on every attempt so a token refreshed mid-sequence
        // is picked up by the next attempt.
        if let Some(token) = self.store.get_access_token() {
            builder = builder.bearer_auth(token);
        }

        if let Some(body) = body {
            builder = builder.json(body);
        }

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            Ok::<_, reqwest::Error>((status, text))
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(%url, correlation_id, "attempt cancelled by caller");
                return Err(AttemptError::Terminal(GatewayError::Cancelled));
            }
            outcome = tokio::time::timeout(timeout, exchange) => outcome,
        };

        let (status, text) = match outcome {
            Err(_) => return Err(AttemptError::Retryable(RetryReason::Timeout(timeout))),
            Ok(Err(e)) => {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    return Err(AttemptError::Retryable(RetryReason::Network(e.to_string())));
                }
                return Err(AttemptError::Terminal(GatewayError::Network {
                    message: e.to_string(),
                    correlation_id: correlation_id.to_string(),
                }));
            }
            Ok(Ok(pair)) => pair,
        };

        if status.is_success() {
            return serde_json::from_str(&text).map_err(|e| {
                AttemptError::Terminal(GatewayError::InvalidResponse {
                    message: format!("could not decode response body: {}", e),
                    correlation_id: correlation_id.to_string(),
                })
            });
        }

        let problem = ProblemDetails::from_body(status, &text);

        // 401 is terminal either way: retrying with the same stale token
        // cannot succeed.
        if status == StatusCode::UNAUTHORIZED {
            if problem.indicates_expired_token() {
                warn!(%url, correlation_id, "token rejected as expired, clearing session");
                self.store.clear_tokens();
                self.events.publish(SessionEventKind::TokenExpired);
                return Err(AttemptError::Terminal(GatewayError::AuthExpired {
                    correlation_id: correlation_id.to_string(),
                }));
            }
            return Err(AttemptError::Terminal(GatewayError::Http {
                status: status.as_u16(),
                problem,
                correlation_id: correlation_id.to_string(),
            }));
        }

        if is_retryable_status(status) {
            return Err(AttemptError::Retryable(RetryReason::Status(status, problem)));
        }

        Err(AttemptError::Terminal(GatewayError::Http {
            status: status.as_u16(),
            problem,
            correlation_id: correlation_id.to_string(),
        }))
    }
}
