//! Branch-scope caching with TTL and pattern invalidation.
//!
//! This module provides the cache in front of territory resolution using
//! Moka for concurrent access with TTL-based eviction.
//!
//! # Architecture
//!
//! The cache is modelled as a capability trait (`ScopeCache`) so callers
//! never branch on availability inline:
//! - `MokaScopeCache` - in-process Moka cache with per-entry TTL
//! - `NullScopeCache` - no-op implementation for tests and deployments
//!   without a cache backend
//!
//! # Failure Semantics
//!
//! Cache unavailability is never an error to the caller: `get` answers a
//! miss, `set`/`delete` are best-effort. A cache outage therefore degrades
//! read paths to direct store aggregation instead of breaking them.
//! `is_available` exists for health reporting only; callers always call
//! `get`/`set` and treat failures as a miss.
//!
//! # Key Design
//!
//! One key per user for branch-ID lists (`user_branches:{user_id}`),
//! deletable individually or via a `prefix*` wildcard covering bulk
//! invalidation after global territory or permission changes.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;

/// Configuration for the branch-scope cache.
#[derive(Debug, Clone)]
pub struct ScopeCacheConfig {
    /// Whether caching is enabled. When disabled, the composition root
    /// wires a `NullScopeCache` instead.
    pub enabled: bool,
    /// Maximum number of entries in the cache.
    pub max_capacity: u64,
    /// TTL applied to entries written without an explicit TTL.
    pub default_ttl: Duration,
}

impl Default for ScopeCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_capacity: 100_000,
            default_ttl: Duration::from_secs(300),
        }
    }
}

impl ScopeCacheConfig {
    /// Enables or disables caching.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the maximum capacity.
    pub fn with_max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Sets the default TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
}

/// Narrow key/value store with TTL used in front of territory resolution.
///
/// All operations are non-throwing: a backing-store failure is logged by
/// the implementation and observed by the caller as a miss (read) or a
/// dropped write. Implementations must be thread-safe.
#[async_trait]
pub trait ScopeCache: Send + Sync {
    /// Returns the cached branch-ID list, or `None` on miss or when the
    /// backing store is unavailable.
    async fn get(&self, key: &str) -> Option<Vec<String>>;

    /// Best-effort write with the given TTL.
    async fn set(&self, key: &str, branch_ids: Vec<String>, ttl: Duration);

    /// Best-effort removal of a single key.
    async fn delete(&self, key: &str);

    /// Best-effort removal of every key matching the pattern. A trailing
    /// `*` matches any suffix; without it the pattern is an exact key.
    async fn delete_by_pattern(&self, pattern: &str);

    /// Whether the backing store is reachable. Health reporting only.
    fn is_available(&self) -> bool;
}

/// Returns true if `key` matches `pattern` (`prefix*` wildcard or exact).
fn key_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

/// Cached value plus the TTL it was written with.
#[derive(Debug, Clone)]
struct ScopeEntry {
    branch_ids: Vec<String>,
    ttl: Duration,
}

/// Expiry policy that honors the TTL each entry was written with.
struct PerEntryTtl;

impl Expiry<String, ScopeEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &ScopeEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// In-process branch-scope cache backed by Moka.
///
/// Uses Moka's async cache for lock-free concurrent access with automatic
/// TTL-based eviction. Fully thread-safe; can be shared across async tasks
/// without external synchronization.
pub struct MokaScopeCache {
    cache: Cache<String, ScopeEntry>,
    config: ScopeCacheConfig,
}

impl std::fmt::Debug for MokaScopeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaScopeCache")
            .field("config", &self.config)
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl MokaScopeCache {
    /// Creates a new cache with the given configuration.
    pub fn new(config: ScopeCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self { cache, config }
    }

    /// Returns the configuration for this cache.
    pub fn config(&self) -> &ScopeCacheConfig {
        &self.config
    }

    /// Returns the approximate number of entries in the cache.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Runs pending maintenance tasks. Useful for testing TTL behavior.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

#[async_trait]
impl ScopeCache for MokaScopeCache {
    /// # Metrics
    ///
    /// Records cache hit/miss to `perimeter_cache_hits_total` and
    /// `perimeter_cache_misses_total`.
    async fn get(&self, key: &str) -> Option<Vec<String>> {
        let result = self.cache.get(key).await;
        if result.is_some() {
            metrics::counter!("perimeter_cache_hits_total").increment(1);
        } else {
            metrics::counter!("perimeter_cache_misses_total").increment(1);
        }
        result.map(|entry| entry.branch_ids)
    }

    async fn set(&self, key: &str, branch_ids: Vec<String>, ttl: Duration) {
        self.cache
            .insert(key.to_string(), ScopeEntry { branch_ids, ttl })
            .await;
    }

    async fn delete(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    async fn delete_by_pattern(&self, pattern: &str) {
        self.cache.run_pending_tasks().await;

        // Moka's iter() returns (Arc<K>, V)
        let keys_to_remove: Vec<String> = self
            .cache
            .iter()
            .filter(|(k, _)| key_matches(pattern, k.as_str()))
            .map(|(k, _)| (*k).clone())
            .collect();

        for key in keys_to_remove {
            self.cache.invalidate(&key).await;
        }
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// No-op cache for tests and environments without a cache backend.
///
/// Every read misses and every write is dropped, so callers exercise the
/// direct-aggregation path without code changes.
#[derive(Debug, Default)]
pub struct NullScopeCache;

impl NullScopeCache {
    /// Creates a new no-op cache.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScopeCache for NullScopeCache {
    async fn get(&self, _key: &str) -> Option<Vec<String>> {
        None
    }

    async fn set(&self, _key: &str, _branch_ids: Vec<String>, _ttl: Duration) {}

    async fn delete(&self, _key: &str) {}

    async fn delete_by_pattern(&self, _pattern: &str) {}

    fn is_available(&self) -> bool {
        false
    }
}

/// Registers scope cache metric descriptions.
///
/// Call once during application startup to register metric descriptions
/// with the metrics recorder. Optional but provides better documentation
/// in Prometheus/Grafana.
pub fn register_cache_metrics() {
    metrics::describe_counter!(
        "perimeter_cache_hits_total",
        "Total number of branch-scope cache hits"
    );
    metrics::describe_counter!(
        "perimeter_cache_misses_total",
        "Total number of branch-scope cache misses"
    );
}
