//! Capability checks against scoped permission grants.
//!
//! The resolver answers whether a user holds a (resource, action)
//! capability within a company, consulting company-scoped grants first and
//! system-level grants second. Lookup errors propagate as `DomainError`;
//! the fail-closed conversion to denial happens at the territory filter
//! boundary so the core stays testable without exercising catch-all paths.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DomainResult;

/// Scope qualifier on a permission grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionScope {
    /// Only the user's own records.
    SelfOnly,
    /// The user's team.
    Team,
    /// A single branch.
    Branch,
    /// All branches under an area.
    Area,
    /// Unrestricted across the company.
    All,
}

/// Resolver-facing view of an active grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRef {
    pub scope: PermissionScope,
}

impl GrantRef {
    /// Creates a new grant reference.
    pub fn new(scope: PermissionScope) -> Self {
        Self { scope }
    }
}

/// Trait for grant lookups needed by the permission resolver.
#[async_trait]
pub trait GrantReader: Send + Sync {
    /// Finds the user's active grant matching resource+action within the
    /// company, or a system-level grant if no company-scoped one exists.
    async fn find_grant(
        &self,
        user_id: &str,
        company_id: &str,
        resource: &str,
        action: &str,
    ) -> DomainResult<Option<GrantRef>>;
}

/// Answers capability questions for (user, company, resource, action).
pub struct PermissionResolver<G> {
    grants: Arc<G>,
}

impl<G> PermissionResolver<G>
where
    G: GrantReader + 'static,
{
    /// Creates a new permission resolver.
    pub fn new(grants: Arc<G>) -> Self {
        Self { grants }
    }

    /// Whether the user holds an active grant for resource+action in the
    /// company, at any scope.
    pub async fn has_permission(
        &self,
        user_id: &str,
        company_id: &str,
        resource: &str,
        action: &str,
    ) -> DomainResult<bool> {
        let grant = self
            .grants
            .find_grant(user_id, company_id, resource, action)
            .await?;

        if grant.is_none() {
            debug!(user_id, company_id, resource, action, "no matching grant");
        }
        Ok(grant.is_some())
    }

    /// Whether the user holds an `all`-scoped grant for resource+action —
    /// the territory filter's unrestricted-access fast path.
    pub async fn has_unrestricted(
        &self,
        user_id: &str,
        company_id: &str,
        resource: &str,
        action: &str,
    ) -> DomainResult<bool> {
        let grant = self
            .grants
            .find_grant(user_id, company_id, resource, action)
            .await?;

        Ok(matches!(
            grant,
            Some(GrantRef {
                scope: PermissionScope::All
            })
        ))
    }
}
