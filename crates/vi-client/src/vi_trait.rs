//! ViClient trait for mocking
//!
//! Abstracts the hypervisor API so unit tests run against an in-memory
//! implementation. All async methods must be `Send` to work with Tokio's
//! work-stealing runtime.

use crate::error::ViError;
use crate::models::*;

/// Hypervisor operations the manager depends on.
///
/// Lookups return `Option` rather than erroring so reconcilers can turn a
/// missing inventory object into a domain precondition failure instead of
/// a transient error.
#[async_trait::async_trait]
pub trait ViClient: Send + Sync {
    // Inventory lookups
    async fn find_datacenter(&self, name: &str) -> Result<Option<String>, ViError>;
    async fn find_datastore(&self, name: &str) -> Result<Option<String>, ViError>;
    async fn find_cluster(&self, name: &str) -> Result<Option<String>, ViError>;
    async fn find_folder(&self, datacenter: &str, name: &str) -> Result<Option<String>, ViError>;
    async fn find_port_group(&self, name: &str) -> Result<Option<String>, ViError>;
    async fn find_template(
        &self,
        datacenter: &str,
        name: &str,
    ) -> Result<Option<VmTemplate>, ViError>;
    async fn list_hosts(&self, cluster: &str) -> Result<Vec<HostInfo>, ViError>;
    async fn find_vm(&self, name: &str) -> Result<Option<VmInfo>, ViError>;
    async fn find_disk(&self, datastore: &str, name: &str) -> Result<Option<DiskInfo>, ViError>;

    // VM lifecycle
    async fn clone_vm(
        &self,
        template: &str,
        name: &str,
        placement: &VmPlacement,
        vcpus: u32,
        ram_mb: u64,
    ) -> Result<TaskRef, ViError>;
    async fn power_on(&self, vm: &str) -> Result<(), ViError>;
    async fn power_off(&self, vm: &str, hard: bool) -> Result<(), ViError>;
    /// Destroys the VM; absent VMs are tolerated (at-least-once retries).
    async fn destroy_vm(&self, vm: &str) -> Result<(), ViError>;

    // Disk lifecycle
    async fn create_disk(
        &self,
        datastore: &str,
        name: &str,
        size_gb: u64,
    ) -> Result<TaskRef, ViError>;
    async fn clone_disk(
        &self,
        datastore: &str,
        source: &str,
        name: &str,
    ) -> Result<TaskRef, ViError>;
    async fn grow_disk(
        &self,
        datastore: &str,
        name: &str,
        size_gb: u64,
    ) -> Result<TaskRef, ViError>;
    async fn attach_disk(&self, vm: &str, datastore: &str, name: &str) -> Result<(), ViError>;
    async fn detach_disk(&self, vm: &str, datastore: &str, name: &str) -> Result<(), ViError>;
    /// Deletes the disk; absent disks are tolerated (at-least-once retries).
    async fn delete_disk(&self, datastore: &str, name: &str) -> Result<(), ViError>;

    // Task polling
    async fn poll_task(&self, task: &TaskRef) -> Result<TaskStatus, ViError>;
}
