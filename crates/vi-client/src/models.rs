//! Hypervisor inventory and task types.

use serde::{Deserialize, Serialize};

/// One host inside a cluster, as seen by the placement scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostInfo {
    pub name: String,
    pub cpu_threads: u32,
    pub memory_mb: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum VmPowerState {
    PoweredOn,
    PoweredOff,
}

/// A VM as observed in the hypervisor inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VmInfo {
    pub name: String,

    /// Host the VM runs on; None while the VM has not been scheduled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    pub power_state: VmPowerState,
}

/// A template VM usable as a clone source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VmTemplate {
    pub name: String,
    pub disk_gb: u64,
}

/// A virtual disk in a datastore.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiskInfo {
    pub name: String,
    pub size_gb: u64,

    /// VM the disk is currently attached to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_to: Option<String>,
}

/// Where to place a cloned VM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VmPlacement {
    pub datacenter: String,
    pub datastore: String,
    pub cluster: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

/// Handle to a long-running hypervisor operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskRef {
    pub id: String,
}

/// Poll result for a [`TaskRef`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
