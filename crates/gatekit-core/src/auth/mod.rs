//! Credential lifecycle and session-state notifications.
//!
//! This module provides:
//! - `CredentialStore`: durable, expiry-aware token and identity storage
//!   over a probed backend chain (keychain, file, memory)
//! - `SessionBroadcaster`: in-process publish/subscribe for session
//!   transitions (token saved, token expired, logged out)
//!
//! Both are process-wide singletons by convention: construct once, share
//! via `Arc`.

pub mod backend;
pub mod events;
pub mod store;

pub use backend::{FileBackend, KeyringBackend, MemoryBackend, StorageBackend, StorageError};
pub use events::{SessionBroadcaster, SessionEvent, SessionEventKind, Subscription};
pub use store::{CredentialRecord, CredentialStore, UserIdentity, DEFAULT_EXPIRY_BUFFER_SECS};
