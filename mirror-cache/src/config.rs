//! Refresh configuration.

use std::time::Duration;

use mirror_core::ConfigError;

use crate::constants::{
    DEFAULT_REFRESH_INTERVAL_MS, DEFAULT_STOP_ON_CONFIG_ERROR, DEVELOPMENT_REFRESH_INTERVAL_MS,
    ENV_REFRESH_INTERVAL_MS, ENV_STOP_ON_CONFIG_ERROR,
};

/// Configuration for a cache's refresh loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Period between scheduled refreshes (default: 1 second)
    pub interval: Duration,

    /// Stop the loop when a refresh hits a configuration error
    /// (default: true). Such errors repeat on every tick.
    pub stop_on_config_error: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_REFRESH_INTERVAL_MS),
            stop_on_config_error: DEFAULT_STOP_ON_CONFIG_ERROR,
        }
    }
}

impl RefreshConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the refresh interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Choose whether configuration errors stop the loop.
    pub fn with_stop_on_config_error(mut self, stop: bool) -> Self {
        self.stop_on_config_error = stop;
        self
    }

    /// Create a configuration for development/testing with a short interval.
    pub fn development() -> Self {
        Self {
            interval: Duration::from_millis(DEVELOPMENT_REFRESH_INTERVAL_MS),
            stop_on_config_error: true,
        }
    }

    /// Create RefreshConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `MIRROR_REFRESH_INTERVAL_MS`: refresh period in milliseconds (default: 1000)
    /// - `MIRROR_STOP_ON_CONFIG_ERROR`: `true`/`false` (default: true)
    ///
    /// Unset variables fall back to defaults; malformed ones are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_REFRESH_INTERVAL_MS) {
            let millis: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_REFRESH_INTERVAL_MS.to_string(),
                value: raw.clone(),
                reason: "expected a whole number of milliseconds".to_string(),
            })?;
            config.interval = Duration::from_millis(millis);
        }

        if let Some(raw) = lookup(ENV_STOP_ON_CONFIG_ERROR) {
            config.stop_on_config_error = match raw.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: ENV_STOP_ON_CONFIG_ERROR.to_string(),
                        value: raw,
                        reason: "expected true or false".to_string(),
                    })
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval.is_zero() {
            return Err(ConfigError::InvalidInterval);
        }
        Ok(())
    }
}
