//! ServiceAccount resource
//!
//! Machine identity within a project. The manager mints the credential
//! secret reference on creation; the API layer handles token issuance.

use crate::object::{Object, ResourceStatus, StatusBase};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountStatus {
    #[serde(flatten)]
    pub base: ResourceStatus,

    /// Opaque reference to the generated credential secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
}

impl StatusBase for ServiceAccountStatus {
    fn base(&self) -> &ResourceStatus {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ResourceStatus {
        &mut self.base
    }
}

pub type ServiceAccount = Object<ServiceAccountSpec, ServiceAccountStatus>;

crate::impl_resource!(
    ServiceAccount,
    ServiceAccountSpec,
    kind = "ServiceAccount",
    plural = "serviceaccounts",
    namespaced = true
);
