//! Region resource
//!
//! A Region maps to one hypervisor datacenter/datastore pair. Zones,
//! Images, Instances and Volumes all hang off a Region via the
//! `vcops.io/region` label.

use crate::object::{Object, ResourceStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegionSpec {
    /// Hypervisor datacenter backing this region.
    pub datacenter: String,

    /// Datastore used for VM and volume placement.
    pub datastore: String,

    /// VM folder instances are cloned into (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub type Region = Object<RegionSpec, ResourceStatus>;

crate::impl_resource!(Region, RegionSpec, kind = "Region", plural = "regions", namespaced = false);
