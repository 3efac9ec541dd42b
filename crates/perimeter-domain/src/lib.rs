//! perimeter-domain: Core access-control and resilience logic
//!
//! This crate contains the core logic of Perimeter:
//! - Branch-scope cache with TTL and pattern invalidation
//! - Permission resolver for scoped capability checks
//! - Territory filter resolving a user's effective branch scope
//! - Circuit breaker for calls to unreliable external dependencies
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              perimeter-domain                │
//! ├─────────────────────────────────────────────┤
//! │  cache/      - Branch-scope caching         │
//! │  permission  - Capability checks            │
//! │  territory/  - Branch-scope resolution      │
//! │  resilience  - Circuit breaker + registry   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The territory filter consults the permission resolver for an
//! unrestricted-access fast path, falls back to aggregating direct branch
//! assignments and area fan-out from the backing store, and caches the
//! result per user. Every public boundary fails closed: errors resolve to
//! denial, never to implicit access.

pub mod cache;
pub mod error;
pub mod permission;
pub mod resilience;
pub mod territory;

// Re-export commonly used types at the crate root
pub use cache::{MokaScopeCache, NullScopeCache, ScopeCache, ScopeCacheConfig};
pub use error::{DomainError, DomainResult};
pub use permission::{GrantReader, GrantRef, PermissionResolver, PermissionScope};
pub use resilience::{
    BreakerError, BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitHealth,
    CircuitState,
};
pub use territory::{AssignmentReader, BranchFilter, BranchScope, TerritoryFilter};
