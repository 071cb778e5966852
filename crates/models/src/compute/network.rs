//! Network resource
//!
//! Project-scoped L2/L3 network backed by a hypervisor port group.

use crate::object::{Object, ResourceStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// IPv4 CIDR, e.g. "10.0.10.0/24".
    pub cidr: String,

    /// Gateway address, excluded from port allocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    /// Hypervisor port group VM NICs connect to.
    pub port_group: String,
}

pub type Network = Object<NetworkSpec, ResourceStatus>;

crate::impl_resource!(Network, NetworkSpec, kind = "Network", plural = "networks", namespaced = true);
