//! IamRole resource

use crate::object::{Object, ResourceStatus};
use serde::{Deserialize, Serialize};

/// One permission rule: which verbs apply to which resource types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    /// Allowed verbs, e.g. "get", "list", "create", "delete", or "*".
    pub verbs: Vec<String>,

    /// Resource plurals the verbs apply to, e.g. "instances", or "*".
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IamRoleSpec {
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

pub type IamRole = Object<IamRoleSpec, ResourceStatus>;

crate::impl_resource!(IamRole, IamRoleSpec, kind = "IamRole", plural = "iamroles", namespaced = false);
