//! Configuration management for the keyed rate limiter.

use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{LimiterError, Result};

/// Rate used when the configured rate is below one token per second.
pub const DEFAULT_RATE: NonZeroU32 = NonZeroU32::new(10).unwrap();
/// Burst used when the configured burst is below one.
pub const DEFAULT_BURST: u32 = 0;
/// Idle window used when no expiry is configured.
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(3600);
/// Sweep cadence used when no interval is configured.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Main configuration for a process hosting a limiter table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Limiter table configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Limiter table configuration as it appears in a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Tokens added to each bucket per second
    #[serde(default = "default_rate")]
    pub rate: u32,

    /// Bucket capacity
    #[serde(default)]
    pub burst: u32,

    /// Idle time in seconds after which a key is forgotten
    #[serde(default = "default_expiry_secs")]
    pub expiry_secs: u64,

    /// Initial table capacity (sizing hint only)
    #[serde(default)]
    pub capacity_hint: usize,

    /// Sweeper cadence in milliseconds
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            burst: DEFAULT_BURST,
            expiry_secs: default_expiry_secs(),
            capacity_hint: 0,
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

fn default_rate() -> u32 {
    DEFAULT_RATE.get()
}

fn default_expiry_secs() -> u64 {
    DEFAULT_EXPIRY.as_secs()
}

fn default_sweep_interval_ms() -> u64 {
    DEFAULT_SWEEP_INTERVAL.as_millis() as u64
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `keyed_ratelimit=debug`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| LimiterError::Config(format!("Failed to parse limiter config: {}", e)))
    }
}

/// Construction parameters of a limiter table.
///
/// Out-of-range values are never rejected. [`LimiterSettings::sanitized`]
/// swaps them for the `DEFAULT_*` constants instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSettings {
    pub rate: u32,
    pub burst: u32,
    pub expiry: Duration,
    pub capacity_hint: usize,
    pub sweep_interval: Duration,
}

impl LimiterSettings {
    /// Replace zero values with their defaults.
    ///
    /// A zero burst stays zero: a bucket without capacity is a valid
    /// (always denying) configuration.
    pub fn sanitized(self) -> Self {
        Self {
            rate: self.refill_rate().get(),
            burst: if self.burst < 1 { DEFAULT_BURST } else { self.burst },
            expiry: if self.expiry.is_zero() {
                DEFAULT_EXPIRY
            } else {
                self.expiry
            },
            capacity_hint: self.capacity_hint,
            sweep_interval: if self.sweep_interval.is_zero() {
                DEFAULT_SWEEP_INTERVAL
            } else {
                self.sweep_interval
            },
        }
    }

    /// Tokens per second for each bucket, [`DEFAULT_RATE`] below one.
    pub fn refill_rate(&self) -> NonZeroU32 {
        NonZeroU32::new(self.rate).unwrap_or(DEFAULT_RATE)
    }
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self::from(&LimiterConfig::default())
    }
}

impl From<&LimiterConfig> for LimiterSettings {
    fn from(config: &LimiterConfig) -> Self {
        Self {
            rate: config.rate,
            burst: config.burst,
            expiry: Duration::from_secs(config.expiry_secs),
            capacity_hint: config.capacity_hint,
            sweep_interval: Duration::from_millis(config.sweep_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_zero_values() {
        let settings = LimiterSettings {
            rate: 0,
            burst: 0,
            expiry: Duration::ZERO,
            capacity_hint: 0,
            sweep_interval: Duration::ZERO,
        }
        .sanitized();

        assert_eq!(settings.rate, 10);
        assert_eq!(settings.refill_rate().get(), 10);
        assert_eq!(settings.burst, 0);
        assert_eq!(settings.expiry, Duration::from_secs(3600));
        assert_eq!(settings.sweep_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_refill_rate_is_never_zero() {
        let mut settings = LimiterSettings::default();

        settings.rate = 0;
        assert_eq!(settings.refill_rate(), DEFAULT_RATE);

        settings.rate = 7;
        assert_eq!(settings.refill_rate().get(), 7);
    }

    #[test]
    fn test_sanitize_keeps_valid_values() {
        let settings = LimiterSettings {
            rate: 2,
            burst: 1,
            expiry: Duration::from_secs(2),
            capacity_hint: 10,
            sweep_interval: Duration::from_millis(250),
        };

        assert_eq!(settings.sanitized(), settings);
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
limiter:
  rate: 5
  burst: 3
  expiry_secs: 30
logging:
  json: true
"#;

        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limiter.rate, 5);
        assert_eq!(config.limiter.burst, 3);
        assert_eq!(config.limiter.expiry_secs, 30);
        assert_eq!(config.limiter.sweep_interval_ms, 1000);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.json);

        let settings = LimiterSettings::from(&config.limiter);
        assert_eq!(settings.expiry, Duration::from_secs(30));
        assert_eq!(settings.sweep_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_from_yaml_empty_uses_defaults() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config.limiter.rate, DEFAULT_RATE.get());
        assert_eq!(config.limiter.burst, DEFAULT_BURST);
        assert_eq!(config.limiter.expiry_secs, 3600);
    }

    #[test]
    fn test_from_yaml_invalid() {
        let err = AppConfig::from_yaml("limiter: [1, 2").unwrap_err();
        assert!(matches!(err, LimiterError::Config(_)));
    }

    #[test]
    fn test_from_file_missing() {
        let err = AppConfig::from_file("/nonexistent/keyed-ratelimit.yaml").unwrap_err();
        assert!(matches!(err, LimiterError::Io(_)));
    }
}
