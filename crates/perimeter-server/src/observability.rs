//! Structured logging and metric registration.
//!
//! Logging uses `tracing-subscriber` with an `EnvFilter` and either a JSON
//! layer (production) or a pretty text layer (development). Metric
//! descriptions are registered once at startup; the host process owns the
//! exporter.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::config::ServerConfig;

/// Configuration for structured logging.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Whether to use JSON format (true) or text format (false)
    pub json_format: bool,
    /// The default log level if RUST_LOG is not set
    pub default_level: Level,
    /// Whether to include span events (enter/exit)
    pub include_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json_format: false,
            default_level: Level::INFO,
            include_spans: false,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration for JSON output.
    pub fn json() -> Self {
        Self {
            json_format: true,
            ..Default::default()
        }
    }

    /// Create a new logging configuration for text output (development).
    pub fn text() -> Self {
        Self {
            json_format: false,
            ..Default::default()
        }
    }

    /// Set the default log level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Include span events in the output.
    pub fn with_spans(mut self) -> Self {
        self.include_spans = true;
        self
    }

    /// Derives a logging configuration from the loaded server config.
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            json_format: config.logging.json,
            default_level: parse_level(&config.logging.level),
            include_spans: false,
        }
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize the logging subsystem with the given configuration.
///
/// This should be called once at application startup. If called multiple
/// times, subsequent calls will have no effect (the subscriber is global).
pub fn init_logging(config: LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_level.to_string()));

    let span_events = if config.include_spans {
        FmtSpan::ENTER | FmtSpan::EXIT
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .json()
                .with_span_events(span_events)
                .with_current_span(true)
                .with_target(true)
                .with_file(false)
                .with_line_number(false),
        );

        // Ignore if a subscriber is already set
        let _ = tracing::subscriber::set_global_default(subscriber);
    } else {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .pretty()
                .with_span_events(span_events)
                .with_target(true),
        );

        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

/// Registers metric descriptions for every Perimeter counter.
///
/// Call once during application startup, after installing the metrics
/// recorder. Optional but provides better documentation in
/// Prometheus/Grafana.
pub fn register_metrics() {
    perimeter_domain::cache::register_cache_metrics();
    perimeter_domain::resilience::register_breaker_metrics();
    metrics::describe_counter!(
        "perimeter_territory_fallback_total",
        "Total number of branch-scope reads served by the direct-store fallback"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert!(!config.json_format);
        assert_eq!(config.default_level, Level::INFO);
        assert!(!config.include_spans);
    }

    #[test]
    fn test_logging_config_builders() {
        assert!(LoggingConfig::json().json_format);
        assert!(!LoggingConfig::text().json_format);
        assert_eq!(
            LoggingConfig::default().with_level(Level::DEBUG).default_level,
            Level::DEBUG
        );
        assert!(LoggingConfig::default().with_spans().include_spans);
    }

    #[test]
    fn test_logging_config_from_server_config() {
        let mut server_config = ServerConfig::default();
        server_config.logging.level = "debug".to_string();
        server_config.logging.json = true;

        let config = LoggingConfig::from_server_config(&server_config);
        assert!(config.json_format);
        assert_eq!(config.default_level, Level::DEBUG);
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        assert_eq!(parse_level("verbose"), Level::INFO);
        assert_eq!(parse_level("ERROR"), Level::ERROR);
        assert_eq!(parse_level("Trace"), Level::TRACE);
    }

    #[test]
    fn test_register_metrics_is_idempotent() {
        // Describe calls must never panic, even without a recorder installed
        register_metrics();
        register_metrics();
    }
}
