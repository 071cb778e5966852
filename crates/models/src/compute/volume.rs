//! Volume resource
//!
//! A standalone virtual disk in one Region's datastore, attachable to an
//! Instance.

use crate::object::{Object, ResourceStatus, StatusBase};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    /// Target Region.
    pub region: String,

    pub size_gb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeStatus {
    #[serde(flatten)]
    pub base: ResourceStatus,

    /// Name of the backing disk once created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backing_disk: Option<String>,

    /// Instance key the volume is currently attached to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_to: Option<String>,
}

impl StatusBase for VolumeStatus {
    fn base(&self) -> &ResourceStatus {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ResourceStatus {
        &mut self.base
    }
}

pub type Volume = Object<VolumeSpec, VolumeStatus>;

crate::impl_resource!(Volume, VolumeSpec, kind = "Volume", plural = "volumes", namespaced = true);
