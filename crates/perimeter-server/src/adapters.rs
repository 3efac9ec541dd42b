//! Adapters that bridge the storage layer to the domain layer.
//!
//! The domain layer (perimeter-domain) defines abstract traits for data
//! access:
//! - `AssignmentReader`: territory assignment reads for the filter
//! - `GrantReader`: grant lookups for the permission resolver
//!
//! The storage layer (perimeter-storage) implements `AccessStore` with
//! concrete backends. This module implements the domain traits using
//! `AccessStore`, converting storage errors into domain errors so that
//! every lookup failure surfaces through the fail-closed boundary rather
//! than granting access.

use std::sync::Arc;

use async_trait::async_trait;

use perimeter_domain::error::{DomainError, DomainResult};
use perimeter_domain::permission::{GrantReader, GrantRef, PermissionScope};
use perimeter_domain::territory::AssignmentReader;
use perimeter_storage::{AccessStore, GrantScope};

/// Adapter that implements `AssignmentReader` using an `AccessStore`.
pub struct StoreAssignmentReader<S: AccessStore> {
    storage: Arc<S>,
}

impl<S: AccessStore> StoreAssignmentReader<S> {
    /// Creates a new adapter wrapping the given storage.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl<S: AccessStore> AssignmentReader for StoreAssignmentReader<S> {
    async fn direct_branch_ids(&self, user_id: &str) -> DomainResult<Vec<String>> {
        self.storage
            .direct_branch_ids(user_id)
            .await
            .map_err(|e| DomainError::TerritoryLookup {
                message: format!("storage error: {e}"),
            })
    }

    async fn area_branch_ids(&self, user_id: &str) -> DomainResult<Vec<String>> {
        self.storage
            .area_branch_ids(user_id)
            .await
            .map_err(|e| DomainError::TerritoryLookup {
                message: format!("storage error: {e}"),
            })
    }
}

/// Adapter that implements `GrantReader` using an `AccessStore`.
pub struct StoreGrantReader<S: AccessStore> {
    storage: Arc<S>,
}

impl<S: AccessStore> StoreGrantReader<S> {
    /// Creates a new adapter wrapping the given storage.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

/// Converts a stored grant scope to the domain scope.
fn convert_scope(scope: GrantScope) -> PermissionScope {
    match scope {
        GrantScope::SelfOnly => PermissionScope::SelfOnly,
        GrantScope::Team => PermissionScope::Team,
        GrantScope::Branch => PermissionScope::Branch,
        GrantScope::Area => PermissionScope::Area,
        GrantScope::All => PermissionScope::All,
    }
}

#[async_trait]
impl<S: AccessStore> GrantReader for StoreGrantReader<S> {
    async fn find_grant(
        &self,
        user_id: &str,
        company_id: &str,
        resource: &str,
        action: &str,
    ) -> DomainResult<Option<GrantRef>> {
        let grant = self
            .storage
            .find_grant(user_id, company_id, resource, action)
            .await
            .map_err(|e| DomainError::PermissionLookup {
                message: format!("storage error: {e}"),
            })?;

        Ok(grant.map(|g| GrantRef::new(convert_scope(g.scope))))
    }
}
