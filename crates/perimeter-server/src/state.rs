//! Application state: the composition root of the Perimeter core.
//!
//! `AppState` owns every long-lived component — storage, cache, territory
//! filter, permission resolver, circuit breakers — and is handed to the
//! host's route layer. Breakers are explicit instances in a registry, not
//! module-level singletons; callers that wrap an external dependency get
//! the breaker passed to them from here.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use perimeter_domain::cache::{MokaScopeCache, NullScopeCache, ScopeCache, ScopeCacheConfig};
use perimeter_domain::permission::PermissionResolver;
use perimeter_domain::resilience::{
    BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitHealth,
};
use perimeter_domain::territory::TerritoryFilter;
use perimeter_storage::{AccessStore, MemoryAccessStore};

use crate::adapters::{StoreAssignmentReader, StoreGrantReader};
use crate::config::{CircuitSettings, ServerConfig};

/// Circuit name for the data-warehouse sync dependency.
pub const WAREHOUSE_CIRCUIT: &str = "warehouse-sync";

/// Circuit name for the banking API dependency.
pub const BANKING_CIRCUIT: &str = "banking-api";

/// Serializable health snapshot for the host's health-check endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub cache_available: bool,
    pub circuits: Vec<CircuitHealth>,
}

/// Builds a breaker config from the tuning in the config file.
fn breaker_config(name: &str, settings: &CircuitSettings) -> CircuitBreakerConfig {
    let mut config = CircuitBreakerConfig::new(name)
        .with_failure_threshold(settings.failure_threshold)
        .with_cooldown(std::time::Duration::from_millis(settings.cooldown_ms))
        .with_success_threshold(settings.success_threshold);
    if let Some(timeout_ms) = settings.call_timeout_ms {
        config = config.with_call_timeout(std::time::Duration::from_millis(timeout_ms));
    }
    config
}

/// Long-lived application state shared across request handlers.
pub struct AppState<S: AccessStore> {
    storage: Arc<S>,
    territory: Arc<TerritoryFilter<StoreAssignmentReader<S>, StoreGrantReader<S>>>,
    breakers: Arc<BreakerRegistry>,
    cache: Arc<dyn ScopeCache>,
}

impl AppState<MemoryAccessStore> {
    /// Builds state over the in-memory storage backend.
    pub fn in_memory(config: &ServerConfig) -> Self {
        Self::from_store(MemoryAccessStore::new_shared(), config)
    }
}

impl<S: AccessStore> AppState<S> {
    /// Builds state over the given storage backend.
    pub fn from_store(storage: Arc<S>, config: &ServerConfig) -> Self {
        let cache: Arc<dyn ScopeCache> = if config.cache.enabled {
            info!(
                capacity = config.cache.max_capacity,
                ttl_secs = config.cache.ttl_secs,
                "branch-scope cache enabled"
            );
            Arc::new(MokaScopeCache::new(
                ScopeCacheConfig::default()
                    .with_max_capacity(config.cache.max_capacity)
                    .with_ttl(config.cache.ttl()),
            ))
        } else {
            info!("branch-scope cache disabled, reads aggregate directly from the store");
            Arc::new(NullScopeCache::new())
        };

        let resolver = PermissionResolver::new(Arc::new(StoreGrantReader::new(storage.clone())));
        let territory = Arc::new(TerritoryFilter::new(
            Arc::new(StoreAssignmentReader::new(storage.clone())),
            resolver,
            cache.clone(),
            config.cache.ttl(),
        ));

        let breakers = Arc::new(BreakerRegistry::new());
        breakers.register(breaker_config(
            WAREHOUSE_CIRCUIT,
            &config.integrations.warehouse,
        ));
        breakers.register(breaker_config(BANKING_CIRCUIT, &config.integrations.banking));

        Self {
            storage,
            territory,
            breakers,
            cache,
        }
    }

    /// The storage backend.
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// The territory filter, called by handlers after authentication and
    /// before executing scoped queries.
    pub fn territory(
        &self,
    ) -> &Arc<TerritoryFilter<StoreAssignmentReader<S>, StoreGrantReader<S>>> {
        &self.territory
    }

    /// The circuit breaker registry.
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// The breaker wrapping warehouse sync calls.
    pub fn warehouse_breaker(&self) -> Arc<CircuitBreaker> {
        self.breakers
            .get(WAREHOUSE_CIRCUIT)
            .expect("warehouse circuit registered at construction")
    }

    /// The breaker wrapping banking API calls.
    pub fn banking_breaker(&self) -> Arc<CircuitBreaker> {
        self.breakers
            .get(BANKING_CIRCUIT)
            .expect("banking circuit registered at construction")
    }

    /// Health snapshot for the host's health-check endpoint.
    pub fn health_report(&self) -> HealthReport {
        HealthReport {
            cache_available: self.cache.is_available(),
            circuits: self.breakers.snapshot(),
        }
    }
}
