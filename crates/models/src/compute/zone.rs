//! Zone resource
//!
//! A Zone maps to one hypervisor cluster inside a Region and is the unit
//! of instance placement.

use crate::object::{Object, ResourceStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSpec {
    /// Owning Region.
    pub region: String,

    /// Hypervisor cluster backing this zone.
    pub cluster: String,

    /// Whether the placement scan considers this zone.
    #[serde(default = "default_true")]
    pub schedulable: bool,

    /// CPU overprovisioning: capacity = floor(threads * percent / 100).
    #[serde(default = "default_percent")]
    pub core_provision_percent: u32,

    /// RAM overprovisioning: capacity = floor(memory * percent / 100).
    #[serde(default = "default_percent")]
    pub ram_provision_percent: u32,
}

fn default_true() -> bool {
    true
}

fn default_percent() -> u32 {
    100
}

pub type Zone = Object<ZoneSpec, ResourceStatus>;

crate::impl_resource!(Zone, ZoneSpec, kind = "Zone", plural = "zones", namespaced = false);
