//! Storage error types.

use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Branch not found.
    #[error("branch not found: {branch_id}")]
    BranchNotFound { branch_id: String },

    /// Area not found.
    #[error("area not found: {area_id}")]
    AreaNotFound { area_id: String },

    /// Permission definition not found.
    #[error("permission not found: {permission_id}")]
    PermissionNotFound { permission_id: String },

    /// An active grant already exists for this (user, permission, company).
    #[error("duplicate grant for user {user_id}: {permission_id} in company {company_id:?}")]
    DuplicateGrant {
        user_id: String,
        permission_id: String,
        company_id: Option<String>,
    },

    /// Database connection error.
    #[error("database connection error: {message}")]
    ConnectionError { message: String },

    /// Database query error.
    #[error("database query error: {message}")]
    QueryError { message: String },

    /// Internal error.
    #[error("internal storage error: {message}")]
    InternalError { message: String },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
