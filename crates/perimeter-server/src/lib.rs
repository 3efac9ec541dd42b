//! perimeter-server: Configuration and composition root
//!
//! This crate wires the Perimeter core together for a host application:
//! - Configuration loading (YAML file + environment overrides)
//! - Storage→domain adapters
//! - `AppState` owning the territory filter and breaker registry
//! - Observability initialization (logging, metric descriptions)
//!
//! The HTTP route layer is the host's concern; it consumes `AppState`
//! after authentication and serves `health_report()` from its
//! health-check endpoint.

pub mod adapters;
pub mod config;
pub mod observability;
pub mod state;

pub use adapters::{StoreAssignmentReader, StoreGrantReader};
pub use config::{ConfigLoadError, ServerConfig};
pub use state::{AppState, HealthReport};
