//! Sync configuration loaded from TOML with environment overrides.

use crate::throttle::ThrottleConfig;
use crate::{Result, TabStashError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_REMOTE_URL: &str = "TABSTASH_REMOTE_URL";
pub const ENV_API_KEY: &str = "TABSTASH_API_KEY";
pub const ENV_ENCRYPTION_SECRET: &str = "TABSTASH_ENCRYPTION_SECRET";

/// Sync configuration for this install.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the remote record store. Sync is disabled without one.
    pub remote_url: Option<String>,
    /// Project API key sent with every request.
    pub api_key: Option<String>,
    /// Secret the per-user encryption keys are derived from.
    pub encryption_secret: Option<String>,
    pub request_timeout_secs: u64,
    /// Period of the background retry-queue flush.
    pub flush_interval_secs: u64,
    pub throttle: ThrottleConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            api_key: None,
            encryption_secret: None,
            request_timeout_secs: 30,
            flush_interval_secs: 60,
            throttle: ThrottleConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| TabStashError::Config(format!("Invalid sync config: {}", e)))
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Override file values with non-empty values from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_REMOTE_URL) {
            self.remote_url = Some(url);
        }
        if let Some(key) = get(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(secret) = get(ENV_ENCRYPTION_SECRET) {
            self.encryption_secret = Some(secret);
        }
    }

    pub fn sync_configured(&self) -> bool {
        self.remote_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    pub fn require_remote_url(&self) -> Result<&str> {
        self.remote_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| TabStashError::Config("remote_url is not configured".to_string()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}
