//! Domain error types for access-control operations.

use thiserror::Error;

/// Domain-specific errors for access-control operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Empty or malformed user/company identifier.
    #[error("invalid identifier: {value:?}")]
    InvalidIdentifier { value: String },

    /// Error while looking up permission grants.
    #[error("permission lookup failed: {message}")]
    PermissionLookup { message: String },

    /// Error while resolving territory assignments.
    #[error("territory lookup failed: {message}")]
    TerritoryLookup { message: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
