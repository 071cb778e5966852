//! IamPolicy resource
//!
//! Binds an IamRole to a set of subjects within one project.

use crate::object::{Object, ResourceStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IamPolicySpec {
    /// Referenced cluster-scoped IamRole.
    pub role: String,

    /// Subjects granted the role, e.g. "user:alice" or "sa:acme/deployer".
    #[serde(default)]
    pub subjects: Vec<String>,
}

pub type IamPolicy = Object<IamPolicySpec, ResourceStatus>;

crate::impl_resource!(
    IamPolicy,
    IamPolicySpec,
    kind = "IamPolicy",
    plural = "iampolicies",
    namespaced = true
);
