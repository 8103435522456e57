//! Configuration management
//!
//! Tunables live in `config.toml` under `$DG_CONFIG_DIR` or the platform
//! config directory (`~/.config/drivegate` on Linux). A missing file means
//! defaults. Credentials never live here; see the environment variables
//! read by the gdrive crate.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "DG_CONFIG_DIR";

/// Upload chunks must be a multiple of this many bytes
pub const CHUNK_ALIGNMENT: u64 = 256 * 1024;

/// Caller-side retry policy for transient failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Items requested per listing page
    pub page_size: u32,
    /// Bytes per resumable upload chunk
    pub chunk_size_bytes: u64,
    /// How many times an interrupted upload session is resumed
    pub upload_resume_attempts: u32,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: 1000,
            chunk_size_bytes: 32 * CHUNK_ALIGNMENT,
            upload_resume_attempts: 3,
            request_timeout_secs: 300,
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::Config("page_size must be at least 1".to_string()));
        }
        if self.chunk_size_bytes == 0 || !self.chunk_size_bytes.is_multiple_of(CHUNK_ALIGNMENT) {
            return Err(Error::Config(format!(
                "chunk_size_bytes must be a positive multiple of {CHUNK_ALIGNMENT}, got {}",
                self.chunk_size_bytes
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Locates and loads the configuration file
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Use `$DG_CONFIG_DIR` or the platform config directory
    pub fn new() -> Result<Self> {
        let dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| Error::Config("cannot determine config directory".to_string()))?
                .join("drivegate"),
        };
        Ok(Self::with_path(dir.join("config.toml")))
    }

    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load and validate; a missing file yields defaults
    pub fn load(&self) -> Result<Config> {
        let config = match std::fs::read_to_string(&self.config_path) {
            Ok(content) => toml::from_str::<Config>(&content).map_err(|e| {
                Error::Config(format!("{}: {e}", self.config_path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, config: &Config) -> Result<()> {
        config.validate()?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("serialize config: {e}")))?;
        std::fs::write(&self.config_path, content)?;
        Ok(())
    }
}
