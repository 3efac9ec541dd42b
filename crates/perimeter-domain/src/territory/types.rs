//! Types for the territory filter.

use serde::{Deserialize, Serialize};

/// Effective branch scope of a user within a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchScope {
    /// Unrestricted access to every branch.
    All,
    /// Access limited to the branches in `BranchFilter::branch_ids`.
    Territory,
    /// No branch access.
    None,
}

impl std::fmt::Display for BranchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BranchScope::All => write!(f, "all"),
            BranchScope::Territory => write!(f, "territory"),
            BranchScope::None => write!(f, "none"),
        }
    }
}

/// The authoritative output of the territory filter.
///
/// Derived (never persisted), cached with a TTL, and recomputed after any
/// permission or territory mutation. `All` and `None` carry an empty
/// branch list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchFilter {
    pub scope: BranchScope,
    pub branch_ids: Vec<String>,
}

impl BranchFilter {
    /// Unrestricted access.
    pub fn all() -> Self {
        Self {
            scope: BranchScope::All,
            branch_ids: Vec::new(),
        }
    }

    /// Explicit deny.
    pub fn none() -> Self {
        Self {
            scope: BranchScope::None,
            branch_ids: Vec::new(),
        }
    }

    /// Access limited to the given branches.
    pub fn territory(branch_ids: Vec<String>) -> Self {
        Self {
            scope: BranchScope::Territory,
            branch_ids,
        }
    }

    /// Whether this filter allows the given branch.
    pub fn allows(&self, branch_id: &str) -> bool {
        match self.scope {
            BranchScope::All => true,
            BranchScope::None => false,
            BranchScope::Territory => self.branch_ids.iter().any(|id| id == branch_id),
        }
    }
}
