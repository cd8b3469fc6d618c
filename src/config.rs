//! Configuration management for the rate limiter.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{LimiterError, Result};
use crate::store::ReconnectPolicy;

/// Prefix for environment variable overrides, e.g. `NETRECON_RL_WINDOW_SECONDS`.
pub const ENV_PREFIX: &str = "NETRECON_RL";

/// Rate limiter configuration.
///
/// Owned by the caller and handed to the limiter at construction. It is
/// never re-read during the lifetime of a limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Whether rate limiting is enforced at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Number of admissions allowed per window
    #[serde(default = "default_requests_per_window")]
    pub requests_per_window: u64,

    /// Window length in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// Counter store endpoint
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Namespace prepended to every identifier
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Bound on connection establishment plus the liveness probe
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Bound on each individual store round trip
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// When set, a failed connection is retried at most once per interval
    /// instead of being treated as permanently unavailable
    #[serde(default)]
    pub reprobe_interval_secs: Option<u64>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            requests_per_window: default_requests_per_window(),
            window_seconds: default_window_seconds(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
            connect_timeout_ms: default_connect_timeout_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
            reprobe_interval_secs: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_requests_per_window() -> u64 {
    100
}

fn default_window_seconds() -> u64 {
    60
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}

fn default_key_prefix() -> String {
    "netrecon:rl:".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

fn default_operation_timeout_ms() -> u64 {
    250
}

impl LimiterConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: LimiterConfig = serde_yaml::from_str(yaml).map_err(|e| {
            LimiterError::Config(format!("Failed to parse rate limiter config: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file, then apply
    /// `NETRECON_RL_*` environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading rate limiter configuration");
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| LimiterError::Config(e.to_string()))?;

        let config: LimiterConfig = settings
            .try_deserialize()
            .map_err(|e| LimiterError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the limiter cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.requests_per_window == 0 {
            return Err(LimiterError::Config(
                "requests_per_window must be greater than zero".to_string(),
            ));
        }
        if self.window_seconds == 0 {
            return Err(LimiterError::Config(
                "window_seconds must be greater than zero".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 || self.operation_timeout_ms == 0 {
            return Err(LimiterError::Config(
                "store timeouts must be greater than zero".to_string(),
            ));
        }
        if self.key_prefix.is_empty() {
            return Err(LimiterError::Config("key_prefix must not be empty".to_string()));
        }
        if self.reprobe_interval_secs == Some(0) {
            return Err(LimiterError::Config(
                "reprobe_interval_secs must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// How the store client reacts to a failed connection attempt.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        match self.reprobe_interval_secs {
            Some(secs) => ReconnectPolicy::Reprobe {
                interval: Duration::from_secs(secs),
            },
            None => ReconnectPolicy::Latch,
        }
    }
}
