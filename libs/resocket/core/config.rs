use crate::traits::{Result, SocketError};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1000);
const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);
const DEFAULT_MAX_ATTEMPTS: u32 = 10;
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Reconnection behavior after an established connection drops
///
/// Immutable once built. The first dial is never retried, whatever this
/// policy says; it only covers post-establishment drops.
///
/// Deserializes from YAML with millisecond delays; every field is
/// optional:
///
/// ```yaml
/// enabled: true
/// initial_delay_ms: 500
/// max_delay_ms: 10000
/// max_attempts: 0        # unlimited
/// backoff_multiplier: 1.5
/// jitter: false
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconnectionPolicy {
    /// Whether dropped connections are re-established at all
    pub enabled: bool,

    /// Delay before the first reconnection attempt
    #[serde(rename = "initial_delay_ms", deserialize_with = "duration_from_millis")]
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    #[serde(rename = "max_delay_ms", deserialize_with = "duration_from_millis")]
    pub max_delay: Duration,

    /// Attempts allowed before giving up, 0 = unlimited
    pub max_attempts: u32,

    /// Growth factor between consecutive delays, at least 1
    pub backoff_multiplier: f64,

    /// Perturb each delay by up to ±25%
    pub jitter: bool,
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: true,
        }
    }
}

impl ReconnectionPolicy {
    /// Default policy with reconnection switched on
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Policy that never reconnects
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether `attempts` already used up the allowance
    #[inline]
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts > 0 && attempts >= self.max_attempts
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay > self.max_delay {
            return Err(SocketError::Configuration(format!(
                "initial_delay ({:?}) must not exceed max_delay ({:?})",
                self.initial_delay, self.max_delay
            )));
        }

        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(SocketError::Configuration(format!(
                "backoff_multiplier must be >= 1, got {}",
                self.backoff_multiplier
            )));
        }

        Ok(())
    }
}

/// Everything needed to open and keep open one logical connection
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    address: String,
    protocols: Vec<String>,
    reconnection: ReconnectionPolicy,
    connect_timeout: Duration,
}

impl ConnectionConfig {
    /// Create a configuration for `address` with default policy
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            protocols: Vec::new(),
            reconnection: ReconnectionPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_reconnection(mut self, policy: ReconnectionPolicy) -> Self {
        self.reconnection = policy;
        self
    }

    /// Bound on how long a dial may wait for the transport to open
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn protocols(&self) -> &[String] {
        &self.protocols
    }

    pub fn reconnection(&self) -> &ReconnectionPolicy {
        &self.reconnection
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(SocketError::Configuration("address must not be empty".to_string()));
        }

        if self.connect_timeout.is_zero() {
            return Err(SocketError::Configuration(
                "connect_timeout must be greater than 0".to_string(),
            ));
        }

        self.reconnection.validate()
    }
}

/// Deserialize a `Duration` from an integer count of milliseconds
pub fn duration_from_millis<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}
