//! NetworkPort resource
//!
//! One allocatable attachment point on a Network. The owning Network is
//! referenced in the spec and mirrored into the `vcops.io/network` label;
//! an attached Instance is recorded in the `vcops.io/instance` label.

use crate::object::{Object, ResourceStatus, StatusBase};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPortSpec {
    /// Owning Network (same namespace).
    pub network: String,

    /// Requested fixed IP; allocated from the network CIDR when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// Requested MAC address; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPortStatus {
    #[serde(flatten)]
    pub base: ResourceStatus,

    /// Allocated IP address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// Allocated MAC address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

impl StatusBase for NetworkPortStatus {
    fn base(&self) -> &ResourceStatus {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ResourceStatus {
        &mut self.base
    }
}

pub type NetworkPort = Object<NetworkPortSpec, NetworkPortStatus>;

crate::impl_resource!(
    NetworkPort,
    NetworkPortSpec,
    kind = "NetworkPort",
    plural = "networkports",
    namespaced = true
);
