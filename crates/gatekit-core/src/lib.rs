//! gatekit-core - resilient API access and session lifecycle for
//! multi-frontend clients.
//!
//! Three cooperating pieces:
//! - [`auth::CredentialStore`]: durable, expiry-aware token storage over
//!   a keychain/file/memory backend chain
//! - [`auth::SessionBroadcaster`]: process-wide session-state events
//! - [`api::GatewayClient`]: retried, traced, cancellable HTTP calls with
//!   structured errors and automatic session invalidation on auth expiry
//!
//! Typical wiring:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use gatekit_core::api::GatewayClient;
//! use gatekit_core::auth::{CredentialStore, SessionBroadcaster, SessionEventKind};
//! use gatekit_core::config::GatewayConfig;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = GatewayConfig::new("https://api.example.com");
//! let store = Arc::new(CredentialStore::new(&config.service_name));
//! let events = Arc::new(SessionBroadcaster::new());
//!
//! let _sub = events.subscribe(|event| {
//!     if event.kind == SessionEventKind::TokenExpired {
//!         // hand off to the UI: show the sign-in screen
//!     }
//! });
//!
//! let client = GatewayClient::new(&config, store, events)?;
//! # let _ = client;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;

pub use api::{GatewayClient, GatewayError, ProblemDetails, RequestOptions, TokenResponse};
pub use auth::{
    CredentialStore, SessionBroadcaster, SessionEvent, SessionEventKind, UserIdentity,
};
pub use config::GatewayConfig;
