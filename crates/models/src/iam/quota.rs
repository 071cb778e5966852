//! Quota resource
//!
//! Per-project resource limits. The API layer enforces them on admission;
//! the manager keeps the observed usage counters fresh.

use crate::object::{Object, ResourceStatus, StatusBase};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSpec {
    pub instances: u32,
    pub vcpus: u64,
    pub ram_mb: u64,
    pub volumes: u32,
    pub storage_gb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaUsage {
    pub instances: u32,
    pub vcpus: u64,
    pub ram_mb: u64,
    pub volumes: u32,
    pub storage_gb: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    #[serde(flatten)]
    pub base: ResourceStatus,

    /// Observed usage, refreshed every reconciliation.
    #[serde(default)]
    pub used: QuotaUsage,
}

impl StatusBase for QuotaStatus {
    fn base(&self) -> &ResourceStatus {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ResourceStatus {
        &mut self.base
    }
}

pub type Quota = Object<QuotaSpec, QuotaStatus>;

crate::impl_resource!(Quota, QuotaSpec, kind = "Quota", plural = "quotas", namespaced = true);
