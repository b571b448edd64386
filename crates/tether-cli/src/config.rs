//! Configuration file for the TETHER CLI.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use tether_core::TunnelConfig;

/// CLI configuration, loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Tunnel settings, handed to the connection registry.
    #[serde(default)]
    pub tunnel: TunnelConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter when RUST_LOG is unset (e.g. "info",
    /// "tether_core=debug").
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from `path`.
    ///
    /// # Errors
    /// Fails if the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read config {}: {e}", path.display()))?;
        let config = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("cannot parse config {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise.
    ///
    /// # Errors
    /// Fails only if the file exists but is unreadable or invalid.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => anyhow::bail!("config file not found: {}", path.display()),
            None => Ok(Self::default()),
        }
    }
}
