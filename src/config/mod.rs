//! Process configuration for jurisharvest
//!
//! Settings are loaded once at process start from environment variables or a
//! TOML file, validated, and then shared read-only through
//! [`HarvestContext`](crate::context::HarvestContext). The only mutable piece of
//! process-wide state, the range cursor, lives in the context's allocator and is
//! merely *seeded* from [`ControlConfig::cursor_seed`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Document store connection parameters
    pub store: StoreConfig,

    /// Control-loop parameters
    pub control: ControlConfig,

    /// Collector (HTTP client) parameters
    pub collector: CollectorConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// OpenSearch connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL without port (e.g. `http://localhost`)
    pub url: String,

    /// Port the store listens on
    pub port: u16,

    /// Index records are written to
    pub index: String,

    /// Username (optional)
    pub username: Option<String>,

    /// Password (optional)
    pub password: Option<String>,

    /// Delay between connection attempts in seconds
    pub retry_connection_delay_secs: u64,

    /// Delay between ping attempts in seconds
    pub retry_ping_delay_secs: u64,
}

/// Control-loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Pause between a failed run attempt and its recovery, in milliseconds
    pub recovery_delay_ms: u64,

    /// Where every replica pool's range cursor starts. `None` means each pool
    /// starts at its task's configured start index.
    pub cursor_seed: Option<i64>,

    /// Upper bound on how long the status aggregator sleeps between stop checks
    pub poll_interval_ms: u64,
}

/// Collector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Maximum requests per second per collector
    pub requests_per_second: u32,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// User agent string
    pub user_agent: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::from("http://localhost"),
            port: 9200,
            index: String::from("jurisprudence"),
            username: None,
            password: None,
            retry_connection_delay_secs: 5,
            retry_ping_delay_secs: 5,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            recovery_delay_ms: 10_000,
            cursor_seed: None,
            poll_interval_ms: 50,
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 2,
            request_timeout_secs: 30,
            user_agent: format!("jurisharvest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl Settings {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let store = StoreConfig {
            url: std::env::var("OPENSEARCH_URL").unwrap_or(defaults.store.url),
            port: env_parse("OPENSEARCH_PORT").unwrap_or(defaults.store.port),
            index: std::env::var("OPENSEARCH_INDEX").unwrap_or(defaults.store.index),
            username: std::env::var("OPENSEARCH_USERNAME").ok(),
            password: std::env::var("OPENSEARCH_PASSWORD").ok(),
            retry_connection_delay_secs: env_parse("JURIS_RETRY_CONNECTION_DELAY")
                .unwrap_or(defaults.store.retry_connection_delay_secs),
            retry_ping_delay_secs: env_parse("JURIS_RETRY_PING_DELAY")
                .unwrap_or(defaults.store.retry_ping_delay_secs),
        };

        let control = ControlConfig {
            recovery_delay_ms: env_parse("JURIS_RECOVERY_DELAY_MS")
                .unwrap_or(defaults.control.recovery_delay_ms),
            cursor_seed: env_parse("JURIS_CURSOR_SEED"),
            poll_interval_ms: env_parse("JURIS_POLL_INTERVAL_MS")
                .unwrap_or(defaults.control.poll_interval_ms),
        };

        let collector = CollectorConfig {
            requests_per_second: env_parse("JURIS_RATE_LIMIT")
                .unwrap_or(defaults.collector.requests_per_second),
            request_timeout_secs: env_parse("JURIS_REQUEST_TIMEOUT")
                .unwrap_or(defaults.collector.request_timeout_secs),
            user_agent: std::env::var("JURIS_USER_AGENT").unwrap_or(defaults.collector.user_agent),
        };

        let logging = LoggingConfig {
            level: std::env::var("JURIS_LOG_LEVEL").unwrap_or(defaults.logging.level),
            format: std::env::var("JURIS_LOG_FORMAT").unwrap_or(defaults.logging.format),
        };

        Ok(Self {
            store,
            control,
            collector,
            logging,
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(settings)
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.store.index.is_empty() {
            return Err(ConfigError::InvalidValue(
                "store.index".to_string(),
                "index name cannot be empty".to_string(),
            ));
        }

        if self.collector.requests_per_second == 0 {
            return Err(ConfigError::InvalidValue(
                "collector.requests_per_second".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        if self.control.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "control.poll_interval_ms".to_string(),
                "must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl StoreConfig {
    /// Full endpoint URL, `{url}:{port}`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.url.trim_end_matches('/'), self.port)
    }

    #[must_use]
    pub fn retry_connection_delay(&self) -> Duration {
        Duration::from_secs(self.retry_connection_delay_secs)
    }

    #[must_use]
    pub fn retry_ping_delay(&self) -> Duration {
        Duration::from_secs(self.retry_ping_delay_secs)
    }
}

impl ControlConfig {
    #[must_use]
    pub fn recovery_delay(&self) -> Duration {
        Duration::from_millis(self.recovery_delay_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl CollectorConfig {
    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration errors, raised by [`Settings::validate`] and by the task
/// configuration builder
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid value
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    /// Two settings that cannot be combined
    #[error("Invalid combination: {0}")]
    InvalidCombination(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.store.endpoint(), "http://localhost:9200");
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let mut settings = Settings::default();
        settings.collector.requests_per_second = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue(field, _)) if field == "collector.requests_per_second"
        ));
    }

    #[test]
    fn test_duration_conversion() {
        let settings = Settings::default();
        assert_eq!(settings.control.recovery_delay(), Duration::from_secs(10));
        assert_eq!(settings.collector.request_timeout(), Duration::from_secs(30));
        assert_eq!(settings.store.retry_ping_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[store]\nindex = \"rulings\"\n\n[control]\ncursor_seed = 40\nrecovery_delay_ms = 5"
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.store.index, "rulings");
        assert_eq!(settings.store.port, 9200);
        assert_eq!(settings.control.cursor_seed, Some(40));
        assert_eq!(settings.control.recovery_delay(), Duration::from_millis(5));
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = Settings::from_file(Path::new("/nonexistent/jurisharvest.toml"));
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        std::env::set_var("OPENSEARCH_PORT", "9300");
        std::env::set_var("JURIS_CURSOR_SEED", "120");
        std::env::set_var("JURIS_RATE_LIMIT", "not-a-number");

        let settings = Settings::from_env().unwrap();

        std::env::remove_var("OPENSEARCH_PORT");
        std::env::remove_var("JURIS_CURSOR_SEED");
        std::env::remove_var("JURIS_RATE_LIMIT");

        assert_eq!(settings.store.port, 9300);
        assert_eq!(settings.control.cursor_seed, Some(120));
        assert_eq!(settings.collector.requests_per_second, 2);
    }
}
