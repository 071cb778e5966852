//! Volume reconciler.
//!
//! A standalone disk in the region's datastore. Creation and growth are
//! hypervisor tasks persisted in status; attach/detach are staged as
//! tasks by the API layer and executed in `Created`.

use crate::controller::Reconciler;
use crate::error::ControllerError;
use crate::reconciler::{physical_delete, typed, Context};
use models::{
    DynamicObject, Instance, Metadata, Region, ResourceState, Task, Volume, VolumeSpec, FINALIZER,
    LABEL_INSTANCE, LABEL_PROJECT, LABEL_REGION,
};
use std::sync::Arc;
use tracing::{debug, info, warn};
use vi_client::TaskRef;

const TASK_CREATE: &str = "create";
const TASK_ATTACH: &str = "attach";
const TASK_DETACH: &str = "detach";
const TASK_GROW: &str = "grow";
const TASK_CLONE: &str = "clone";

fn disk_name(volume: &Volume) -> String {
    match &volume.metadata.namespace {
        Some(ns) => format!("{}-{}", ns, volume.metadata.name),
        None => volume.metadata.name.clone(),
    }
}

pub struct VolumeReconciler {
    ctx: Arc<Context>,
}

impl VolumeReconciler {
    pub fn new(ctx: Arc<Context>) -> Arc<Self> {
        Arc::new(Self { ctx })
    }

    async fn region(&self, volume: &Volume) -> Result<Option<Region>, ControllerError> {
        Ok(self.ctx.api::<Region>().get_opt(&volume.spec.region).await?)
    }

    async fn creating(&self, volume: &mut Volume) -> Result<(), ControllerError> {
        if let Some(task) = volume.task().cloned() {
            if task.name == TASK_CREATE {
                return self.poll_create(volume, &task).await;
            }
            volume.set_task(None);
        }

        let Some(region) = self.region(volume).await? else {
            volume.set_error(format!("region {} not found", volume.spec.region));
            return Ok(());
        };
        if region.state() != ResourceState::Created {
            debug!(volume = %volume.metadata.name, "waiting for region");
            return Ok(());
        }
        if volume.spec.size_gb == 0 {
            volume.set_error("sizeGb must be non-zero");
            return Ok(());
        }

        let name = disk_name(volume);
        let task_ref = self
            .ctx
            .vi
            .create_disk(&region.spec.datastore, &name, volume.spec.size_gb)
            .await?;
        info!(volume = %volume.metadata.name, disk = %name, task = %task_ref.id, "disk create started");
        volume.set_task(Some(
            Task::new(TASK_CREATE)
                .with_kwarg("task", task_ref.id)
                .with_kwarg("disk", name),
        ));
        Ok(())
    }

    async fn poll_create(&self, volume: &mut Volume, task: &Task) -> Result<(), ControllerError> {
        let Some(id) = task.kwarg_str("task") else {
            volume.set_task(None);
            return Ok(());
        };
        let status = self
            .ctx
            .vi
            .poll_task(&TaskRef { id: id.to_string() })
            .await?;
        if !status.done {
            debug!(volume = %volume.metadata.name, task = %id, "disk create in progress");
            return Ok(());
        }
        if let Some(error) = status.error {
            volume.set_task(None);
            volume.set_error(format!("disk create failed: {}", error));
            return Ok(());
        }
        let name = task
            .kwarg_str("disk")
            .map(String::from)
            .unwrap_or_else(|| disk_name(volume));
        info!(volume = %volume.metadata.name, disk = %name, "volume provisioned");
        volume.status_mut().backing_disk = Some(name);
        volume.set_task(None);
        volume.set_state(ResourceState::Created);
        Ok(())
    }

    async fn created(&self, volume: &mut Volume) -> Result<(), ControllerError> {
        let region = self.region(volume).await?;
        let region_gone = match &region {
            None => true,
            Some(r) => r.state().is_deletion_flow(),
        };
        if region_gone {
            info!(volume = %volume.metadata.name, "region deleted, self-deleting");
            volume.set_state(ResourceState::ToDelete);
            return Ok(());
        }
        let Some(region) = region else {
            return Ok(());
        };

        let Some(disk) = volume.status.as_ref().and_then(|s| s.backing_disk.clone()) else {
            volume.set_error("created volume has no backing disk name");
            return Ok(());
        };
        if self
            .ctx
            .vi
            .find_disk(&region.spec.datastore, &disk)
            .await?
            .is_none()
        {
            volume.set_error(format!("backing disk {} disappeared", disk));
            return Ok(());
        }

        if let Some(task) = volume.task().cloned() {
            self.run_task(volume, &task, &region, &disk).await?;
        }
        Ok(())
    }

    async fn run_task(
        &self,
        volume: &mut Volume,
        task: &Task,
        region: &Region,
        disk: &str,
    ) -> Result<(), ControllerError> {
        match task.name.as_str() {
            TASK_ATTACH => {
                let Some(instance_name) = task.kwarg_str("instance") else {
                    volume.set_task(None);
                    return Ok(());
                };
                let Some(namespace) = volume.metadata.namespace.clone() else {
                    volume.set_task(None);
                    return Ok(());
                };
                let instance = self
                    .ctx
                    .api_in::<Instance>(&namespace)
                    .get_opt(instance_name)
                    .await?;
                let vm = instance
                    .as_ref()
                    .and_then(|i| i.status.as_ref())
                    .and_then(|s| s.vm_name.clone());
                let Some(vm) = vm else {
                    volume.set_task(None);
                    volume.set_error(format!("instance {} has no backing VM", instance_name));
                    return Ok(());
                };
                self.ctx
                    .vi
                    .attach_disk(&vm, &region.spec.datastore, disk)
                    .await?;
                info!(volume = %volume.metadata.name, instance = %instance_name, "volume attached");
                volume
                    .metadata
                    .set_label(LABEL_INSTANCE, instance_name.to_string());
                volume.status_mut().attached_to = Some(instance_name.to_string());
                volume.set_task(None);
            }
            TASK_DETACH => {
                self.detach(volume, region, disk).await?;
                volume.set_task(None);
            }
            TASK_GROW => {
                self.run_grow(volume, task, region, disk).await?;
            }
            TASK_CLONE => {
                self.run_clone(volume, task, region, disk).await?;
            }
            other => {
                warn!(volume = %volume.metadata.name, task = %other, "unknown task, discarding");
                volume.set_task(None);
            }
        }
        Ok(())
    }

    async fn run_grow(
        &self,
        volume: &mut Volume,
        task: &Task,
        region: &Region,
        disk: &str,
    ) -> Result<(), ControllerError> {
        // Second leg: a hypervisor task handle is already parked.
        if let Some(id) = task.kwarg_str("task") {
            let status = self
                .ctx
                .vi
                .poll_task(&TaskRef { id: id.to_string() })
                .await?;
            if !status.done {
                return Ok(());
            }
            volume.set_task(None);
            if let Some(error) = status.error {
                volume.set_error(format!("disk grow failed: {}", error));
            }
            return Ok(());
        }

        let Some(size_gb) = task.kwarg_u64("sizeGb") else {
            volume.set_task(None);
            return Ok(());
        };
        if size_gb < volume.spec.size_gb {
            volume.set_task(None);
            volume.set_error("disks can only grow");
            return Ok(());
        }
        let task_ref = self
            .ctx
            .vi
            .grow_disk(&region.spec.datastore, disk, size_gb)
            .await?;
        info!(volume = %volume.metadata.name, size_gb, task = %task_ref.id, "disk grow started");
        volume.spec.size_gb = size_gb;
        volume.set_task(Some(
            Task::new(TASK_GROW)
                .with_kwarg("sizeGb", size_gb)
                .with_kwarg("task", task_ref.id),
        ));
        Ok(())
    }

    /// Clones the backing disk into a new Volume in the same namespace
    /// and region. First leg submits the hypervisor copy; the second leg
    /// polls it and materializes the new object.
    async fn run_clone(
        &self,
        volume: &mut Volume,
        task: &Task,
        region: &Region,
        disk: &str,
    ) -> Result<(), ControllerError> {
        let Some(target) = task.kwarg_str("name").map(String::from) else {
            volume.set_task(None);
            return Ok(());
        };
        let target_disk = match &volume.metadata.namespace {
            Some(ns) => format!("{}-{}", ns, target),
            None => target.clone(),
        };

        if let Some(id) = task.kwarg_str("task") {
            let status = self
                .ctx
                .vi
                .poll_task(&TaskRef { id: id.to_string() })
                .await?;
            if !status.done {
                return Ok(());
            }
            volume.set_task(None);
            if let Some(error) = status.error {
                volume.set_error(format!("disk clone failed: {}", error));
                return Ok(());
            }

            let mut metadata = match &volume.metadata.namespace {
                Some(ns) => Metadata::namespaced(&target, ns),
                None => Metadata::named(&target),
            };
            metadata.add_finalizer(FINALIZER);
            metadata.set_label(LABEL_REGION, volume.spec.region.clone());
            if let Some(ns) = volume.metadata.namespace.clone() {
                metadata.set_label(LABEL_PROJECT, ns);
            }
            let mut copy = Volume::new(
                metadata,
                VolumeSpec {
                    region: volume.spec.region.clone(),
                    size_gb: volume.spec.size_gb,
                },
            );
            copy.status_mut().backing_disk = Some(target_disk);
            copy.set_state(ResourceState::Created);
            match self.ctx.api::<Volume>().create(&copy).await {
                Ok(_) => {
                    info!(volume = %volume.metadata.name, copy = %target, "volume cloned");
                }
                // A previous pass already materialized the copy.
                Err(e) if e.is_conflict() => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(());
        }

        let task_ref = self
            .ctx
            .vi
            .clone_disk(&region.spec.datastore, disk, &target_disk)
            .await?;
        info!(volume = %volume.metadata.name, copy = %target, task = %task_ref.id, "disk clone started");
        volume.set_task(Some(
            Task::new(TASK_CLONE)
                .with_kwarg("name", target)
                .with_kwarg("task", task_ref.id),
        ));
        Ok(())
    }

    async fn detach(
        &self,
        volume: &mut Volume,
        region: &Region,
        disk: &str,
    ) -> Result<(), ControllerError> {
        let attached_to = volume.status.as_ref().and_then(|s| s.attached_to.clone());
        let Some(instance_name) = attached_to else {
            return Ok(());
        };
        let Some(namespace) = volume.metadata.namespace.clone() else {
            return Ok(());
        };
        let vm = self
            .ctx
            .api_in::<Instance>(&namespace)
            .get_opt(&instance_name)
            .await?
            .and_then(|i| i.status)
            .and_then(|s| s.vm_name);
        if let Some(vm) = vm {
            self.ctx
                .vi
                .detach_disk(&vm, &region.spec.datastore, disk)
                .await?;
        }
        info!(volume = %volume.metadata.name, instance = %instance_name, "volume detached");
        volume.metadata.labels.remove(LABEL_INSTANCE);
        volume.status_mut().attached_to = None;
        Ok(())
    }

    async fn deleting(&self, volume: &mut Volume) -> Result<(), ControllerError> {
        let region = self.region(volume).await?;
        if let Some(region) = &region {
            if let Some(disk) = volume.status.as_ref().and_then(|s| s.backing_disk.clone()) {
                self.detach(volume, region, &disk).await?;
                self.ctx
                    .vi
                    .delete_disk(&region.spec.datastore, &disk)
                    .await?;
            }
        }
        // Region already gone: nothing left to tear down physically.
        volume.set_task(None);
        volume.set_state(ResourceState::Deleted);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Reconciler for VolumeReconciler {
    async fn reconcile(
        &self,
        key: &str,
        object: Option<DynamicObject>,
    ) -> Result<(), ControllerError> {
        let Some(object) = object else {
            return Ok(());
        };
        let mut volume: Volume = typed(key, &object)?;
        let state = volume.state();
        let before = volume.clone();
        let api = self.ctx.api::<Volume>();

        match state {
            ResourceState::ToCreate => {
                volume.metadata.add_finalizer(FINALIZER);
                let region = volume.spec.region.clone();
                volume.metadata.set_label(LABEL_REGION, region);
                if let Some(ns) = volume.metadata.namespace.clone() {
                    volume.metadata.set_label(LABEL_PROJECT, ns);
                }
                volume.set_state(ResourceState::Creating);
            }
            ResourceState::Creating => self.creating(&mut volume).await?,
            ResourceState::Created => self.created(&mut volume).await?,
            ResourceState::ToDelete => {
                // Attached volumes detach as the first teardown step.
                let attached = volume
                    .status
                    .as_ref()
                    .and_then(|s| s.attached_to.as_deref())
                    .is_some();
                if attached && volume.task().is_none() {
                    volume.set_task(Some(Task::new(TASK_DETACH)));
                }
                volume.set_state(ResourceState::Deleting);
            }
            ResourceState::Deleting => self.deleting(&mut volume).await?,
            ResourceState::Deleted => return physical_delete(&api, volume).await,
            ResourceState::Error => return Ok(()),
        }

        if volume != before {
            api.save(&volume).await?;
        }
        Ok(())
    }
}
