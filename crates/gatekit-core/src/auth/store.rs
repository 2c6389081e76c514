//! Expiry-aware credential storage.
//!
//! The store owns all persisted token state. Tokens, expiry, and the
//! biometric flag live in one `CredentialRecord` serialized as a single
//! value, so a write is all-or-nothing: a reader can never observe a new
//! token paired with a stale expiry.
//!
//! Storage failures never escape to callers. Writes that fail on the
//! selected backend are logged and land in an in-memory fallback, trading
//! durability for availability.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::backend::{select_backend, MemoryBackend, StorageBackend};

/// Storage key for the credential record.
const CREDENTIALS_KEY: &str = "credentials";

/// Storage key for the cached user identity.
const IDENTITY_KEY: &str = "identity";

/// Default expiry buffer in seconds.
/// A token that expires during network transit is useless, so anything
/// within this window of expiry is treated as already expired.
pub const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 30;

/// Persisted token state. Always written as one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Seconds since the Unix epoch.
    pub expires_at: i64,
    pub biometric_enabled: bool,
}

/// Cached identity fields for the signed-in user.
///
/// Lifecycle is independent of the credential record: a token refresh
/// leaves it untouched; only logout or an explicit identity change clears it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Durable, expiry-aware storage for access/refresh tokens and the cached
/// user identity.
///
/// Share via `Arc`; all methods take `&self`. Concurrent writes are
/// last-write-wins.
pub struct CredentialStore {
    backend: Box<dyn StorageBackend>,
    fallback: MemoryBackend,
}

impl CredentialStore {
    /// Create a store using the best backend available in this environment
    /// (keychain, then file storage, then memory).
    pub fn new(service: &str) -> Self {
        Self {
            backend: select_backend(service),
            fallback: MemoryBackend::new(),
        }
    }

    /// Create a store over an explicit backend. Used to inject fakes in
    /// tests and by hosts that manage backend selection themselves.
    pub fn with_backend(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend,
            fallback: MemoryBackend::new(),
        }
    }

    /// Create a store that never touches the platform, for tests.
    pub fn in_memory() -> Self {
        Self::with_backend(Box::new(MemoryBackend::new()))
    }

    /// Persist a new token set. `expires_at` is computed here so token and
    /// expiry always come from the same call.
    ///
    /// Never fails: a storage error is logged and the record is kept in
    /// the in-memory fallback for the lifetime of the process.
    pub fn set_tokens(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in_secs: i64,
    ) {
        let record = CredentialRecord {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_at: Utc::now().timestamp() + expires_in_secs,
            biometric_enabled: self
                .load_record()
                .map(|r| r.biometric_enabled)
                .unwrap_or(false),
        };
        self.write_record(&record);
        debug!(expires_at = record.expires_at, "credentials saved");
    }

    /// Toggle the biometric-unlock flag, preserving the token fields.
    /// No-op when no credentials are stored.
    pub fn set_biometric_enabled(&self, enabled: bool) {
        if let Some(mut record) = self.load_record() {
            record.biometric_enabled = enabled;
            self.write_record(&record);
        }
    }

    pub fn biometric_enabled(&self) -> bool {
        self.load_record().map(|r| r.biometric_enabled).unwrap_or(false)
    }

    /// Current access token, if any. Does NOT validate expiry; callers that
    /// care must ask `is_expired` so "no token" and "expired token" stay
    /// distinguishable.
    pub fn get_access_token(&self) -> Option<String> {
        self.load_record().map(|r| r.access_token)
    }

    pub fn get_refresh_token(&self) -> Option<String> {
        self.load_record().and_then(|r| r.refresh_token)
    }

    /// True when the token expires within `buffer_secs` from now, or when
    /// no expiry is recorded at all.
    pub fn is_expired(&self, buffer_secs: i64) -> bool {
        match self.load_record() {
            Some(record) => Utc::now().timestamp() + buffer_secs >= record.expires_at,
            None => true,
        }
    }

    /// True iff a token exists and is outside the default expiry buffer.
    pub fn is_authenticated(&self) -> bool {
        self.get_access_token().is_some() && !self.is_expired(DEFAULT_EXPIRY_BUFFER_SECS)
    }

    /// Remove all credential fields. Idempotent.
    pub fn clear_tokens(&self) {
        self.remove_value(CREDENTIALS_KEY);
        debug!("credentials cleared");
    }

    pub fn set_identity(&self, identity: &UserIdentity) {
        match serde_json::to_string(identity) {
            Ok(value) => self.write_value(IDENTITY_KEY, &value),
            Err(e) => warn!(error = %e, "failed to serialize identity"),
        }
    }

    pub fn get_identity(&self) -> Option<UserIdentity> {
        let raw = self.read_value(IDENTITY_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!(error = %e, "stored identity is unreadable, discarding");
                None
            }
        }
    }

    pub fn clear_identity(&self) {
        self.remove_value(IDENTITY_KEY);
    }

    fn load_record(&self) -> Option<CredentialRecord> {
        let raw = self.read_value(CREDENTIALS_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "stored credentials are unreadable, discarding");
                None
            }
        }
    }

    fn write_record(&self, record: &CredentialRecord) {
        match serde_json::to_string(record) {
            Ok(value) => self.write_value(CREDENTIALS_KEY, &value),
            Err(e) => warn!(error = %e, "failed to serialize credentials"),
        }
    }

    fn write_value(&self, key: &str, value: &str) {
        if let Err(e) = self.backend.write(key, value) {
            warn!(
                backend = self.backend.name(),
                key,
                error = %e,
                "storage write failed, falling back to memory"
            );
            if let Err(e) = self.fallback.write(key, value) {
                warn!(key, error = %e, "memory fallback write failed");
            }
        }
    }

    fn read_value(&self, key: &str) -> Option<String> {
        match self.backend.read(key) {
            Ok(Some(value)) => Some(value),
            Ok(None) => self.fallback.read(key).ok().flatten(),
            Err(e) => {
                warn!(
                    backend = self.backend.name(),
                    key,
                    error = %e,
                    "storage read failed, consulting memory fallback"
                );
                self.fallback.read(key).ok().flatten()
            }
        }
    }

    fn remove_value(&self, key: &str) {
        if let Err(e) = self.backend.remove(key) {
            warn!(backend = self.backend.name(), key, error = %e, "storage remove failed");
        }
        let _ = self.fallback.remove(key);
    }
}
