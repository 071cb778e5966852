//! Instance resource
//!
//! A virtual machine cloned from an Image template, sized by a Flavor and
//! placed into a Zone. Region and Zone relations are mirrored into labels
//! for list-by-label queries.

use crate::object::{Object, ResourceStatus, StatusBase};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    /// Target Region.
    pub region: String,

    /// Explicit Zone; the placement scan picks one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,

    /// Flavor providing vCPU/RAM sizing.
    pub flavor: String,

    /// Image providing the boot template.
    pub image: String,

    /// NetworkPorts (same namespace) wired to this instance.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,

    /// Root disk size; defaults to the flavor's disk size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_disk_gb: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PowerState {
    On,
    Off,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    #[serde(flatten)]
    pub base: ResourceStatus,

    /// Name of the backing VM once cloned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_name: Option<String>,

    /// Host the backing VM currently runs on, as last observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_state: Option<PowerState>,
}

impl StatusBase for InstanceStatus {
    fn base(&self) -> &ResourceStatus {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ResourceStatus {
        &mut self.base
    }
}

pub type Instance = Object<InstanceSpec, InstanceStatus>;

crate::impl_resource!(
    Instance,
    InstanceSpec,
    kind = "Instance",
    plural = "instances",
    namespaced = true
);
