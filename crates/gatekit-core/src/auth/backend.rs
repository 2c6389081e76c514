//! Storage backends for credential persistence.
//!
//! Three tiers, probed once at construction:
//! 1. `KeyringBackend` - OS keychain (hardware-backed where the platform provides it)
//! 2. `FileBackend` - JSON files under the application data directory
//! 3. `MemoryBackend` - process-lifetime map, degraded mode
//!
//! A backend that fails its capability probe is skipped for the next tier.
//! Backend errors never reach callers of the credential store; they are
//! absorbed there and the write lands in the in-memory fallback.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use keyring::Entry;
use thiserror::Error;
use tracing::{debug, warn};

/// Key used to verify a backend is actually usable before selecting it.
const PROBE_KEY: &str = "storage-probe";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("File storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// A key/value persistence strategy for credential material.
///
/// Values are opaque strings; the store serializes whole records into a
/// single value so that one `write` is one atomic unit.
pub trait StorageBackend: Send + Sync {
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Missing keys are `Ok(None)`, never an error.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Must be idempotent: removing an absent key is `Ok(())`.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    fn name(&self) -> &'static str;
}

/// Tier 1: OS keychain via the `keyring` crate.
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StorageError> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl StorageBackend for KeyringBackend {
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entry(key)?.set_password(value)?;
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "keyring"
    }
}

/// Tier 2: one JSON file per key under an application data directory.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Default location: `<data_dir>/<service>/`.
    pub fn for_service(service: &str) -> Option<Self> {
        dirs::data_dir().map(|d| Self::new(d.join(service)))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl StorageBackend for FileBackend {
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        // Write-then-rename so a crash mid-write never leaves a torn file.
        let tmp = self.dir.join(format!("{}.json.tmp", key));
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, self.path_for(key))?;
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Tier 3: in-process map. Credentials survive only for the lifetime of the
/// running process and are lost on restart.
#[derive(Default)]
pub struct MemoryBackend {
    map: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map = self.map.write().map_err(|_| StorageError::Poisoned)?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let map = self.map.read().map_err(|_| StorageError::Poisoned)?;
        Ok(map.get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut map = self.map.write().map_err(|_| StorageError::Poisoned)?;
        map.remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Verify a backend can actually round-trip a value in this environment.
fn probe(backend: &dyn StorageBackend) -> bool {
    let ok = backend.write(PROBE_KEY, "1").is_ok()
        && matches!(backend.read(PROBE_KEY), Ok(Some(_)))
        && backend.remove(PROBE_KEY).is_ok();
    if !ok {
        debug!(backend = backend.name(), "storage backend failed probe");
    }
    ok
}

/// Select the best available backend for this environment.
///
/// Evaluated once per store construction; the fallback chain is
/// keyring -> file -> memory.
pub fn select_backend(service: &str) -> Box<dyn StorageBackend> {
    let keyring = KeyringBackend::new(service);
    if probe(&keyring) {
        return Box::new(keyring);
    }

    if let Some(file) = FileBackend::for_service(service) {
        if probe(&file) {
            warn!(service, "keychain unavailable, using file storage");
            return Box::new(file);
        }
    }

    warn!(
        service,
        "no persistent storage available, credentials will not survive restart"
    );
    Box::new(MemoryBackend::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_round_trip() {
        let backend = MemoryBackend::new();
        backend.write("k", "v").unwrap();
        assert_eq!(backend.read("k").unwrap().as_deref(), Some("v"));
        backend.remove("k").unwrap();
        assert_eq!(backend.read("k").unwrap(), None);
    }

    #[test]
    fn memory_backend_remove_is_idempotent() {
        let backend = MemoryBackend::new();
        backend.remove("missing").unwrap();
        backend.remove("missing").unwrap();
    }

    #[test]
    fn file_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf());
        backend.write("creds", "{\"a\":1}").unwrap();
        assert_eq!(backend.read("creds").unwrap().as_deref(), Some("{\"a\":1}"));
        backend.remove("creds").unwrap();
        assert_eq!(backend.read("creds").unwrap(), None);
    }

    #[test]
    fn file_backend_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf());
        assert_eq!(backend.read("nothing").unwrap(), None);
        backend.remove("nothing").unwrap();
    }

    #[test]
    fn file_backend_passes_probe() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().to_path_buf());
        assert!(probe(&backend));
    }
}
