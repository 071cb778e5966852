//! ProjectMember resource
//!
//! Grants a user membership in a project with one role. The role relation
//! is mirrored into the `vcops.io/role` label.

use crate::object::{Object, ResourceStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMemberSpec {
    /// User identity, e.g. "user:alice".
    pub user: String,

    /// Referenced cluster-scoped IamRole.
    pub role: String,
}

pub type ProjectMember = Object<ProjectMemberSpec, ResourceStatus>;

crate::impl_resource!(
    ProjectMember,
    ProjectMemberSpec,
    kind = "ProjectMember",
    plural = "projectmembers",
    namespaced = true
);
