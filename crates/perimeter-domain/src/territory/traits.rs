//! Traits for storage operations needed by the territory filter.

use async_trait::async_trait;

use crate::error::DomainResult;

/// Trait for territory-assignment reads needed by the territory filter.
#[async_trait]
pub trait AssignmentReader: Send + Sync {
    /// Branch IDs directly assigned to the user.
    async fn direct_branch_ids(&self, user_id: &str) -> DomainResult<Vec<String>>;

    /// Branch IDs reachable through the user's area assignments
    /// (area membership joined to branch membership by the store).
    async fn area_branch_ids(&self, user_id: &str) -> DomainResult<Vec<String>>;
}
