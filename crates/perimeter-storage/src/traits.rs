//! AccessStore trait definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;

/// An operational business location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub id: String,
    /// Unique branch code (e.g., "BR-014").
    pub code: String,
    pub name: String,
}

/// A geographic grouping of branches.
///
/// Assigning a user to an area transitively grants access to every branch
/// that is a member of the area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Area {
    pub id: String,
    pub name: String,
}

/// A capability definition that grants refer to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub id: String,
    /// Resource the capability applies to (e.g., "clients").
    pub resource: String,
    /// Action on the resource (e.g., "read").
    pub action: String,
}

/// Scope qualifier on a permission grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantScope {
    SelfOnly,
    Team,
    Branch,
    Area,
    All,
}

/// An assignment of a capability to a user, qualified by scope and company.
///
/// `company_id: None` is a system-level grant that applies in every company.
/// The store maintains at most one active grant per
/// (user_id, permission_id, company_id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionGrant {
    pub user_id: String,
    pub permission_id: String,
    pub company_id: Option<String>,
    pub scope: GrantScope,
    pub granted_at: chrono::DateTime<chrono::Utc>,
}

/// Abstract storage interface for territory and permission reads.
///
/// Implementations must be thread-safe (Send + Sync) and support
/// async operations. All read methods return rows in a deterministic
/// (sorted) order so repeated reads over unchanged data are identical.
#[async_trait]
pub trait AccessStore: Send + Sync + 'static {
    /// Branch IDs directly assigned to the user.
    async fn direct_branch_ids(&self, user_id: &str) -> StorageResult<Vec<String>>;

    /// Branch IDs reachable through the user's area assignments
    /// (area membership joined to branch membership).
    async fn area_branch_ids(&self, user_id: &str) -> StorageResult<Vec<String>>;

    /// Finds the user's active grant matching resource+action within the
    /// company, or a system-level grant if no company-scoped one exists.
    async fn find_grant(
        &self,
        user_id: &str,
        company_id: &str,
        resource: &str,
        action: &str,
    ) -> StorageResult<Option<PermissionGrant>>;
}
