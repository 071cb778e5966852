//! Resource lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state shared by every reconciled resource.
///
/// Transitions are forward-only: `ToCreate -> Creating -> Created ->
/// ToDelete -> Deleting -> Deleted`. `Error` is reachable from any active
/// state and is terminal for the reconciler; only an operator or a new
/// API-driven action recovers from it. `Deleted` is momentary: the handler
/// that observes it performs the physical store delete.
///
/// Serializes as PascalCase but accepts lowercase for backward
/// compatibility with objects written by older API versions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum ResourceState {
    /// Accepted by the API, not yet picked up by the reconciler.
    #[default]
    #[serde(alias = "to_create", alias = "tocreate")]
    ToCreate,

    /// Provisioning in progress.
    #[serde(alias = "creating")]
    Creating,

    /// Steady state; drift detection and task execution happen here.
    #[serde(alias = "created")]
    Created,

    /// Deletion requested.
    #[serde(alias = "to_delete", alias = "todelete")]
    ToDelete,

    /// Teardown in progress. Blocked while dependents exist.
    #[serde(alias = "deleting")]
    Deleting,

    /// Teardown finished; next reconciliation removes the object from the store.
    #[serde(alias = "deleted")]
    Deleted,

    /// Domain precondition failed; operator intervention required.
    #[serde(alias = "error")]
    Error,
}

impl ResourceState {
    /// True for states on the deletion path.
    pub fn is_deletion_flow(&self) -> bool {
        matches!(self, Self::ToDelete | Self::Deleting | Self::Deleted)
    }

    /// True for states the reconciler never advances on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ToCreate => "ToCreate",
            Self::Creating => "Creating",
            Self::Created => "Created",
            Self::ToDelete => "ToDelete",
            Self::Deleting => "Deleting",
            Self::Deleted => "Deleted",
            Self::Error => "Error",
        };
        f.write_str(s)
    }
}
