//! Probe configuration
//!
//! Loaded from YAML; `.env` is read first so `PROBE_ADDRESS` can point the
//! probe elsewhere without editing the file.

use resocket::core::config::duration_from_millis;
use resocket::{ConnectionConfig, ReconnectionPolicy};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Environment variable overriding `address`
pub const ADDRESS_ENV_VAR: &str = "PROBE_ADDRESS";

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_heartbeat_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

/// resocket-probe configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Endpoint to connect to
    pub address: String,

    /// Subprotocols offered during the handshake
    #[serde(default)]
    pub protocols: Vec<String>,

    #[serde(
        rename = "connect_timeout_ms",
        default = "default_connect_timeout",
        deserialize_with = "duration_from_millis"
    )]
    pub connect_timeout: Duration,

    /// Messages sent after every successful open
    #[serde(default)]
    pub greetings: Vec<String>,

    #[serde(default)]
    pub reconnection: ReconnectionPolicy,

    /// Seconds between status lines
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ProbeConfig {
    /// Load configuration from a YAML file
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        // Don't fail if .env doesn't exist
        dotenv::dotenv().ok();

        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config = Self::from_yaml(&yaml_content)?;

        if let Ok(address) = std::env::var(ADDRESS_ENV_VAR) {
            config.address = address;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse without touching the environment or validating
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.address.starts_with("ws://") && !self.address.starts_with("wss://") {
            return Err(ConfigError::ValidationError(format!(
                "address must use ws:// or wss://, got '{}'",
                self.address
            )));
        }

        self.connection_config()
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Connection settings for the socket
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new(self.address.clone())
            .with_protocols(self.protocols.iter().cloned())
            .with_reconnection(self.reconnection.clone())
            .with_connect_timeout(self.connect_timeout)
    }

    /// Log configuration summary
    pub fn log(&self) {
        let policy = &self.reconnection;
        info!("Probe Configuration:");
        info!("  Address: {}", self.address);
        if !self.protocols.is_empty() {
            info!("  Protocols: {}", self.protocols.join(", "));
        }
        info!("  Connect timeout: {:?}", self.connect_timeout);
        info!("  Greetings: {}", self.greetings.len());
        info!("Reconnection:");
        info!("  Enabled: {}", policy.enabled);
        if policy.enabled {
            info!(
                "  Delay: {:?} -> {:?} (x{})",
                policy.initial_delay, policy.max_delay, policy.backoff_multiplier
            );
            match policy.max_attempts {
                0 => info!("  Max attempts: unlimited"),
                n => info!("  Max attempts: {}", n),
            }
            info!("  Jitter: {}", policy.jitter);
        }
    }
}
