//! Flavor resource
//!
//! A named vCPU/RAM/disk sizing. Nothing to provision: flavors go straight
//! to Created once validated.

use crate::object::{Object, ResourceStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlavorSpec {
    pub vcpus: u32,
    pub ram_mb: u64,
    pub disk_gb: u64,
}

pub type Flavor = Object<FlavorSpec, ResourceStatus>;

crate::impl_resource!(Flavor, FlavorSpec, kind = "Flavor", plural = "flavors", namespaced = false);
