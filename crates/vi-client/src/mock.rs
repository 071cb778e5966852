//! Mock ViClient for unit testing
//!
//! In-memory hypervisor inventory with scriptable task completion. By
//! default tasks complete immediately (their effect is applied before the
//! TaskRef is returned); tests exercising the task-polling path call
//! `set_auto_complete(false)` and then `complete_task`/`fail_task`.

use crate::error::ViError;
use crate::models::*;
use crate::vi_trait::ViClient;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

enum PendingOp {
    CloneVm { name: String, cluster: String },
    CreateDisk { datastore: String, name: String, size_gb: u64 },
    CloneDisk { datastore: String, source: String, name: String },
    GrowDisk { datastore: String, name: String, size_gb: u64 },
}

struct TaskState {
    status: TaskStatus,
    pending: Option<PendingOp>,
}

#[derive(Default)]
struct Inner {
    datacenters: BTreeSet<String>,
    datastores: BTreeSet<String>,
    clusters: BTreeMap<String, Vec<HostInfo>>,
    folders: BTreeSet<(String, String)>,
    port_groups: BTreeSet<String>,
    /// (datacenter, template name)
    templates: BTreeMap<(String, String), VmTemplate>,
    vms: BTreeMap<String, VmInfo>,
    /// (datastore, disk name)
    disks: BTreeMap<(String, String), DiskInfo>,
    tasks: BTreeMap<String, TaskState>,
    next_task: u64,
    auto_complete: bool,
}

/// Mock hypervisor for testing.
#[derive(Clone)]
pub struct MockViClient {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MockViClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockViClient {
    pub fn new() -> Self {
        let inner = Inner {
            auto_complete: true,
            ..Default::default()
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// When false, tasks stay pending until `complete_task` is called.
    pub fn set_auto_complete(&self, auto_complete: bool) {
        self.inner.lock().unwrap().auto_complete = auto_complete;
    }

    // Inventory seeding (for test setup)

    pub fn add_datacenter(&self, name: &str) {
        self.inner.lock().unwrap().datacenters.insert(name.to_string());
    }

    pub fn add_datastore(&self, name: &str) {
        self.inner.lock().unwrap().datastores.insert(name.to_string());
    }

    pub fn add_cluster(&self, name: &str, hosts: Vec<HostInfo>) {
        self.inner.lock().unwrap().clusters.insert(name.to_string(), hosts);
    }

    pub fn add_folder(&self, datacenter: &str, name: &str) {
        self.inner
            .lock()
            .unwrap()
            .folders
            .insert((datacenter.to_string(), name.to_string()));
    }

    pub fn add_port_group(&self, name: &str) {
        self.inner.lock().unwrap().port_groups.insert(name.to_string());
    }

    pub fn add_template(&self, datacenter: &str, template: VmTemplate) {
        self.inner
            .lock()
            .unwrap()
            .templates
            .insert((datacenter.to_string(), template.name.clone()), template);
    }

    pub fn add_vm(&self, vm: VmInfo) {
        self.inner.lock().unwrap().vms.insert(vm.name.clone(), vm);
    }

    pub fn add_disk(&self, datastore: &str, disk: DiskInfo) {
        self.inner
            .lock()
            .unwrap()
            .disks
            .insert((datastore.to_string(), disk.name.clone()), disk);
    }

    /// Removes a VM behind the manager's back (for drift tests).
    pub fn remove_vm(&self, name: &str) {
        self.inner.lock().unwrap().vms.remove(name);
    }

    /// Removes a datacenter behind the manager's back (for drift tests).
    pub fn remove_datacenter(&self, name: &str) {
        self.inner.lock().unwrap().datacenters.remove(name);
    }

    // Task scripting

    pub fn complete_task(&self, id: &str) {
        let mut inner = self.inner.lock().unwrap();
        let pending = match inner.tasks.get_mut(id) {
            Some(task) => {
                task.status = TaskStatus { done: true, error: None };
                task.pending.take()
            }
            None => None,
        };
        if let Some(op) = pending {
            Self::apply(&mut inner, op);
        }
    }

    pub fn fail_task(&self, id: &str, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(task) = inner.tasks.get_mut(id) {
            task.status = TaskStatus {
                done: true,
                error: Some(error.to_string()),
            };
            task.pending = None;
        }
    }

    fn apply(inner: &mut Inner, op: PendingOp) {
        match op {
            PendingOp::CloneVm { name, cluster } => {
                let host = inner
                    .clusters
                    .get(&cluster)
                    .and_then(|hosts| hosts.first())
                    .map(|h| h.name.clone());
                inner.vms.insert(
                    name.clone(),
                    VmInfo {
                        name,
                        host,
                        power_state: VmPowerState::PoweredOff,
                    },
                );
            }
            PendingOp::CreateDisk { datastore, name, size_gb } => {
                inner.disks.insert(
                    (datastore, name.clone()),
                    DiskInfo { name, size_gb, attached_to: None },
                );
            }
            PendingOp::CloneDisk { datastore, source, name } => {
                let size_gb = inner
                    .disks
                    .get(&(datastore.clone(), source))
                    .map(|d| d.size_gb)
                    .unwrap_or_default();
                inner.disks.insert(
                    (datastore, name.clone()),
                    DiskInfo { name, size_gb, attached_to: None },
                );
            }
            PendingOp::GrowDisk { datastore, name, size_gb } => {
                if let Some(disk) = inner.disks.get_mut(&(datastore, name)) {
                    disk.size_gb = size_gb;
                }
            }
        }
    }

    fn submit(&self, op: PendingOp) -> TaskRef {
        let mut inner = self.inner.lock().unwrap();
        inner.next_task += 1;
        let id = format!("task-{}", inner.next_task);
        if inner.auto_complete {
            Self::apply(&mut inner, op);
            inner.tasks.insert(
                id.clone(),
                TaskState {
                    status: TaskStatus { done: true, error: None },
                    pending: None,
                },
            );
        } else {
            inner.tasks.insert(
                id.clone(),
                TaskState {
                    status: TaskStatus { done: false, error: None },
                    pending: Some(op),
                },
            );
        }
        TaskRef { id }
    }
}

#[async_trait::async_trait]
impl ViClient for MockViClient {
    async fn find_datacenter(&self, name: &str) -> Result<Option<String>, ViError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.datacenters.get(name).cloned())
    }

    async fn find_datastore(&self, name: &str) -> Result<Option<String>, ViError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.datastores.get(name).cloned())
    }

    async fn find_cluster(&self, name: &str) -> Result<Option<String>, ViError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.clusters.contains_key(name).then(|| name.to_string()))
    }

    async fn find_folder(&self, datacenter: &str, name: &str) -> Result<Option<String>, ViError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .folders
            .contains(&(datacenter.to_string(), name.to_string()))
            .then(|| name.to_string()))
    }

    async fn find_port_group(&self, name: &str) -> Result<Option<String>, ViError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.port_groups.get(name).cloned())
    }

    async fn find_template(
        &self,
        datacenter: &str,
        name: &str,
    ) -> Result<Option<VmTemplate>, ViError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .templates
            .get(&(datacenter.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_hosts(&self, cluster: &str) -> Result<Vec<HostInfo>, ViError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.clusters.get(cluster).cloned().unwrap_or_default())
    }

    async fn find_vm(&self, name: &str) -> Result<Option<VmInfo>, ViError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.vms.get(name).cloned())
    }

    async fn find_disk(&self, datastore: &str, name: &str) -> Result<Option<DiskInfo>, ViError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .disks
            .get(&(datastore.to_string(), name.to_string()))
            .cloned())
    }

    async fn clone_vm(
        &self,
        template: &str,
        name: &str,
        placement: &VmPlacement,
        _vcpus: u32,
        _ram_mb: u64,
    ) -> Result<TaskRef, ViError> {
        {
            let inner = self.inner.lock().unwrap();
            let key = (placement.datacenter.clone(), template.to_string());
            if !inner.templates.contains_key(&key) {
                return Err(ViError::NotFound(format!("template {}", template)));
            }
        }
        Ok(self.submit(PendingOp::CloneVm {
            name: name.to_string(),
            cluster: placement.cluster.clone(),
        }))
    }

    async fn power_on(&self, vm: &str) -> Result<(), ViError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.vms.get_mut(vm) {
            Some(info) => {
                info.power_state = VmPowerState::PoweredOn;
                Ok(())
            }
            None => Err(ViError::NotFound(format!("vm {}", vm))),
        }
    }

    async fn power_off(&self, vm: &str, _hard: bool) -> Result<(), ViError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.vms.get_mut(vm) {
            Some(info) => {
                info.power_state = VmPowerState::PoweredOff;
                Ok(())
            }
            None => Err(ViError::NotFound(format!("vm {}", vm))),
        }
    }

    async fn destroy_vm(&self, vm: &str) -> Result<(), ViError> {
        // Tolerates absent VMs.
        self.inner.lock().unwrap().vms.remove(vm);
        Ok(())
    }

    async fn create_disk(
        &self,
        datastore: &str,
        name: &str,
        size_gb: u64,
    ) -> Result<TaskRef, ViError> {
        Ok(self.submit(PendingOp::CreateDisk {
            datastore: datastore.to_string(),
            name: name.to_string(),
            size_gb,
        }))
    }

    async fn clone_disk(
        &self,
        datastore: &str,
        source: &str,
        name: &str,
    ) -> Result<TaskRef, ViError> {
        Ok(self.submit(PendingOp::CloneDisk {
            datastore: datastore.to_string(),
            source: source.to_string(),
            name: name.to_string(),
        }))
    }

    async fn grow_disk(
        &self,
        datastore: &str,
        name: &str,
        size_gb: u64,
    ) -> Result<TaskRef, ViError> {
        Ok(self.submit(PendingOp::GrowDisk {
            datastore: datastore.to_string(),
            name: name.to_string(),
            size_gb,
        }))
    }

    async fn attach_disk(&self, vm: &str, datastore: &str, name: &str) -> Result<(), ViError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.vms.contains_key(vm) {
            return Err(ViError::NotFound(format!("vm {}", vm)));
        }
        match inner.disks.get_mut(&(datastore.to_string(), name.to_string())) {
            Some(disk) => {
                disk.attached_to = Some(vm.to_string());
                Ok(())
            }
            None => Err(ViError::NotFound(format!("disk {}", name))),
        }
    }

    async fn detach_disk(&self, vm: &str, datastore: &str, name: &str) -> Result<(), ViError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(disk) = inner.disks.get_mut(&(datastore.to_string(), name.to_string())) {
            if disk.attached_to.as_deref() == Some(vm) {
                disk.attached_to = None;
            }
        }
        Ok(())
    }

    async fn delete_disk(&self, datastore: &str, name: &str) -> Result<(), ViError> {
        // Tolerates absent disks.
        self.inner
            .lock()
            .unwrap()
            .disks
            .remove(&(datastore.to_string(), name.to_string()));
        Ok(())
    }

    async fn poll_task(&self, task: &TaskRef) -> Result<TaskStatus, ViError> {
        let inner = self.inner.lock().unwrap();
        inner
            .tasks
            .get(&task.id)
            .map(|t| t.status.clone())
            .ok_or_else(|| ViError::NotFound(format!("task {}", task.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clone_vm_completes_through_task_polling() {
        let vi = MockViClient::new();
        vi.set_auto_complete(false);
        vi.add_datacenter("dc1");
        vi.add_cluster(
            "cl1",
            vec![HostInfo {
                name: "host-a".to_string(),
                cpu_threads: 16,
                memory_mb: 65536,
            }],
        );
        vi.add_template(
            "dc1",
            VmTemplate {
                name: "ubuntu-22".to_string(),
                disk_gb: 20,
            },
        );

        let placement = VmPlacement {
            datacenter: "dc1".to_string(),
            datastore: "ds1".to_string(),
            cluster: "cl1".to_string(),
            folder: None,
        };
        let task = vi
            .clone_vm("ubuntu-22", "web-1", &placement, 2, 4096)
            .await
            .unwrap();

        let status = vi.poll_task(&task).await.unwrap();
        assert!(!status.done);
        assert!(vi.find_vm("web-1").await.unwrap().is_none());

        vi.complete_task(&task.id);
        let status = vi.poll_task(&task).await.unwrap();
        assert!(status.done);
        let vm = vi.find_vm("web-1").await.unwrap().unwrap();
        assert_eq!(vm.host.as_deref(), Some("host-a"));
        assert_eq!(vm.power_state, VmPowerState::PoweredOff);
    }

    #[tokio::test]
    async fn destroy_vm_tolerates_absent_vm() {
        let vi = MockViClient::new();
        vi.destroy_vm("missing").await.unwrap();
    }
}
