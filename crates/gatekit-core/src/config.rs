//! Gateway configuration.
//!
//! Defaults are the shipped policy (30s attempt timeout, 1s/2s/4s backoff);
//! deployments that need different knobs override them here. Configuration
//! is stored at `<config_dir>/<service>/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Per-attempt timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Waits between successive retry attempts, in milliseconds.
/// Three retries on top of the initial attempt.
const DEFAULT_BACKOFF_MS: [u64; 3] = [1000, 2000, 4000];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL all request paths are joined to.
    pub base_url: String,
    /// Service name used for keychain entries and config/data paths.
    pub service_name: String,
    pub request_timeout_secs: u64,
    pub backoff_schedule_ms: Vec<u64>,
    /// When set, every outbound attempt carries the debug-trace header.
    pub debug_trace: bool,
    /// Token-exchange endpoint on the identity collaborator.
    pub token_path: String,
    /// Token-refresh endpoint on the identity collaborator.
    pub refresh_path: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            service_name: "gatekit".to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            backoff_schedule_ms: DEFAULT_BACKOFF_MS.to_vec(),
            debug_trace: false,
            token_path: "/oauth/token".to_string(),
            refresh_path: "/oauth/refresh".to_string(),
        }
    }
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load from disk, or defaults when no config file exists yet.
    pub fn load(service_name: &str) -> Result<Self> {
        let path = Self::config_path(service_name)?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self {
                service_name: service_name.to_string(),
                ..Self::default()
            })
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path(&self.service_name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path(service_name: &str) -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(service_name).join(CONFIG_FILE))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff_schedule(&self) -> Vec<Duration> {
        self.backoff_schedule_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }
}
