//! Image resource
//!
//! A bootable template VM living in one Region's datacenter.

use crate::object::{Object, ResourceStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    /// Region whose datacenter holds the template.
    pub region: String,

    /// Hypervisor template VM name.
    pub template_name: String,

    /// Smallest root disk an instance booted from this image may request.
    #[serde(default)]
    pub min_disk_gb: u64,
}

pub type Image = Object<ImageSpec, ResourceStatus>;

crate::impl_resource!(Image, ImageSpec, kind = "Image", plural = "images", namespaced = false);
