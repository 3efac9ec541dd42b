//! Configuration management for the Perimeter core.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults. This follows the 12-factor app
//! pattern.
//!
//! # Example
//!
//! ```ignore
//! use perimeter_server::config::ServerConfig;
//!
//! // Load from file with env overrides
//! let config = ServerConfig::load("config.yaml")?;
//!
//! // Or load from environment only
//! let config = ServerConfig::from_env()?;
//! ```

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Branch-scope cache settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// External integration (circuit breaker) settings
    #[serde(default)]
    pub integrations: IntegrationSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Metrics settings
    #[serde(default)]
    pub metrics: MetricsSettings,
}

/// Branch-scope cache settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheSettings {
    /// Enable the branch-scope cache. When disabled, every read
    /// aggregates directly from the store.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of cached entries
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,

    /// Entry TTL in seconds (shared with other permission-derived caches)
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl CacheSettings {
    /// TTL as a Duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_capacity() -> u64 {
    100_000
}

fn default_cache_ttl() -> u64 {
    300
}

/// Circuit breaker tuning for the external integrations.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct IntegrationSettings {
    /// Data warehouse sync ("warehouse-sync" circuit)
    #[serde(default)]
    pub warehouse: CircuitSettings,

    /// Banking API ("banking-api" circuit)
    #[serde(default)]
    pub banking: CircuitSettings,
}

/// Tuning for one named circuit.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CircuitSettings {
    /// Consecutive failures that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Milliseconds the circuit stays open before allowing a trial call
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Consecutive trial successes that close the circuit
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Optional per-call timeout in milliseconds. Unset leaves hung calls
    /// uncancelled; only explicit failures open the circuit.
    pub call_timeout_ms: Option<u64>,
}

impl Default for CircuitSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
            success_threshold: default_success_threshold(),
            call_timeout_ms: None,
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_ms() -> u64 {
    30_000
}

fn default_success_threshold() -> u32 {
    2
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
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

/// Metrics settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetricsSettings {
    /// Register metric descriptions at startup
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable
    /// overrides.
    ///
    /// Environment variables are prefixed with `PERIMETER_` and use `__`
    /// as separator. For example:
    /// - `PERIMETER_CACHE__TTL_SECS=60` overrides `cache.ttl_secs`
    /// - `PERIMETER_LOGGING__LEVEL=debug` overrides `logging.level`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&ServerConfig::default())?)
            // Add config file
            .add_source(File::from(path).format(FileFormat::Yaml))
            // Add environment variables with PERIMETER_ prefix
            // Use __ as separator: PERIMETER_CACHE__TTL_SECS -> cache.ttl_secs
            .add_source(
                Environment::with_prefix("PERIMETER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(
                Environment::with_prefix("PERIMETER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.cache.ttl_secs == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "cache.ttl_secs must be greater than 0".to_string(),
            });
        }

        for (name, circuit) in [
            ("integrations.warehouse", &self.integrations.warehouse),
            ("integrations.banking", &self.integrations.banking),
        ] {
            if circuit.failure_threshold == 0 {
                return Err(ConfigLoadError::Invalid {
                    message: format!("{name}.failure_threshold must be greater than 0"),
                });
            }
            if circuit.success_threshold == 0 {
                return Err(ConfigLoadError::Invalid {
                    message: format!("{name}.success_threshold must be greater than 0"),
                });
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }
}
