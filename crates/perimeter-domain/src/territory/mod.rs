//! Territory filter: resolves a user's effective branch scope.
//!
//! The filter answers which branches a user may operate on within a
//! company, as the deduplicated union of direct branch assignments and
//! area→branch fan-out, cached per user with a TTL.
//!
//! # Resolution Order
//!
//! 1. Permission fast path: an `all`-scoped `clients:read` grant
//!    short-circuits territory computation entirely.
//! 2. Cache hit on the user's branch list.
//! 3. Direct aggregation from the backing store, written back to cache.
//! 4. On any error along the cached path, one direct recomputation that
//!    bypasses the cache; only a failure of that fallback propagates.
//!
//! # Failure Semantics
//!
//! The Result-returning core (`resolve_branch_filter`) propagates errors;
//! the public boundary (`user_branch_filter`, `can_access_branch`,
//! `filter_clients_by_territory`) maps every error to the deny value.
//! Uncertainty never grants access.
//!
//! # Invalidation
//!
//! Any code path mutating a user's branch/area assignments or permission
//! grants must call `invalidate_user_branch_cache` (or the bulk variant
//! after global changes) before the next read. Repeated reads between
//! invalidations are idempotent.

mod traits;
mod types;

pub use traits::AssignmentReader;
pub use types::{BranchFilter, BranchScope};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::ScopeCache;
use crate::error::{DomainError, DomainResult};
use crate::permission::{GrantReader, PermissionResolver};

/// Resource/action consulted for the unrestricted-access fast path.
const CLIENTS_RESOURCE: &str = "clients";
const READ_ACTION: &str = "read";

/// Prefix shared by every per-user branch cache key.
const CACHE_PREFIX: &str = "user_branches:";

/// Resolves a user's effective branch scope and answers membership and
/// filtering queries against it.
pub struct TerritoryFilter<A, G> {
    assignments: Arc<A>,
    resolver: PermissionResolver<G>,
    cache: Arc<dyn ScopeCache>,
    cache_ttl: Duration,
}

impl<A, G> TerritoryFilter<A, G>
where
    A: AssignmentReader + 'static,
    G: GrantReader + 'static,
{
    /// Creates a new territory filter.
    pub fn new(
        assignments: Arc<A>,
        resolver: PermissionResolver<G>,
        cache: Arc<dyn ScopeCache>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            assignments,
            resolver,
            cache,
            cache_ttl,
        }
    }

    /// Cache key for a user's branch list.
    ///
    /// Keyed per user, not per (user, company) — the territory relations
    /// are user-scoped in the owning store. A user belonging to multiple
    /// companies with different territory sets would share one entry; see
    /// DESIGN.md for why this is preserved rather than silently changed.
    fn cache_key(user_id: &str) -> String {
        format!("{CACHE_PREFIX}{user_id}")
    }

    fn validate_ids(user_id: &str, company_id: &str) -> DomainResult<()> {
        if user_id.trim().is_empty() {
            return Err(DomainError::InvalidIdentifier {
                value: user_id.to_string(),
            });
        }
        if company_id.trim().is_empty() {
            return Err(DomainError::InvalidIdentifier {
                value: company_id.to_string(),
            });
        }
        Ok(())
    }

    /// Deduplicated union of direct assignments and area fan-out, read
    /// straight from the backing store. Direct assignments come first;
    /// first occurrence wins on duplicates.
    async fn load_branch_ids(&self, user_id: &str) -> DomainResult<Vec<String>> {
        let direct = self.assignments.direct_branch_ids(user_id).await?;
        let via_areas = self.assignments.area_branch_ids(user_id).await?;

        let mut seen = HashSet::with_capacity(direct.len() + via_areas.len());
        let mut branch_ids = Vec::with_capacity(direct.len() + via_areas.len());
        for id in direct.into_iter().chain(via_areas) {
            if seen.insert(id.clone()) {
                branch_ids.push(id);
            }
        }
        Ok(branch_ids)
    }

    /// Returns the branch IDs the user may operate on.
    ///
    /// Consults the cache first; on a miss, aggregates from the store and
    /// writes back with the configured TTL. If the cached path errors, one
    /// direct recomputation bypassing the cache is attempted before the
    /// error is propagated.
    pub async fn user_branch_ids(
        &self,
        user_id: &str,
        company_id: &str,
    ) -> DomainResult<Vec<String>> {
        Self::validate_ids(user_id, company_id)?;

        let key = Self::cache_key(user_id);
        if let Some(branch_ids) = self.cache.get(&key).await {
            return Ok(branch_ids);
        }

        match self.load_branch_ids(user_id).await {
            Ok(branch_ids) => {
                self.cache
                    .set(&key, branch_ids.clone(), self.cache_ttl)
                    .await;
                Ok(branch_ids)
            }
            Err(err) => {
                warn!(
                    user_id,
                    error = %err,
                    "branch scope aggregation failed, retrying directly against the store"
                );
                metrics::counter!("perimeter_territory_fallback_total").increment(1);
                self.load_branch_ids(user_id).await
            }
        }
    }

    /// Result-returning core of `user_branch_filter`.
    ///
    /// An `all`-scoped `clients:read` grant resolves to `All` without
    /// touching the branch cache. No resolved branches means `None` —
    /// explicit deny, never all-access by default.
    async fn resolve_branch_filter(
        &self,
        user_id: &str,
        company_id: &str,
    ) -> DomainResult<BranchFilter> {
        Self::validate_ids(user_id, company_id)?;

        if self
            .resolver
            .has_unrestricted(user_id, company_id, CLIENTS_RESOURCE, READ_ACTION)
            .await?
        {
            return Ok(BranchFilter::all());
        }

        let branch_ids = self.user_branch_ids(user_id, company_id).await?;
        if branch_ids.is_empty() {
            return Ok(BranchFilter::none());
        }
        Ok(BranchFilter::territory(branch_ids))
    }

    /// Resolves the user's effective branch filter.
    ///
    /// Fail-closed boundary: any error resolves to `BranchFilter::none()`.
    pub async fn user_branch_filter(&self, user_id: &str, company_id: &str) -> BranchFilter {
        match self.resolve_branch_filter(user_id, company_id).await {
            Ok(filter) => filter,
            Err(err) => {
                warn!(
                    user_id,
                    company_id,
                    error = %err,
                    "territory resolution failed, denying access"
                );
                BranchFilter::none()
            }
        }
    }

    /// Whether the user may operate on the given branch. Errors fail
    /// closed (false).
    pub async fn can_access_branch(
        &self,
        user_id: &str,
        company_id: &str,
        branch_id: &str,
    ) -> bool {
        self.user_branch_filter(user_id, company_id)
            .await
            .allows(branch_id)
    }

    /// Intersects candidate branch IDs with the user's resolved filter:
    /// `All` passes everything through, `None` yields an empty list,
    /// `Territory` intersects. Errors fail closed (empty).
    pub async fn filter_clients_by_territory(
        &self,
        user_id: &str,
        company_id: &str,
        candidate_branch_ids: &[String],
    ) -> Vec<String> {
        let filter = self.user_branch_filter(user_id, company_id).await;
        match filter.scope {
            BranchScope::All => candidate_branch_ids.to_vec(),
            BranchScope::None => Vec::new(),
            BranchScope::Territory => candidate_branch_ids
                .iter()
                .filter(|id| filter.allows(id))
                .cloned()
                .collect(),
        }
    }

    /// Drops the user's cached branch list. Must be called by any code
    /// path mutating the user's branch/area assignments or grants; cache
    /// failures are absorbed by the cache layer and never block the
    /// mutation that triggered invalidation.
    pub async fn invalidate_user_branch_cache(&self, user_id: &str) {
        debug!(user_id, "invalidating branch scope cache");
        self.cache.delete(&Self::cache_key(user_id)).await;
    }

    /// Drops every user's cached branch list. Used after bulk or global
    /// territory/permission changes.
    pub async fn invalidate_all_user_branch_caches(&self) {
        debug!("invalidating all branch scope caches");
        self.cache
            .delete_by_pattern(&format!("{CACHE_PREFIX}*"))
            .await;
    }
}
