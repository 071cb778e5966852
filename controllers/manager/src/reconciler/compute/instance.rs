//! Instance reconciler.
//!
//! Drives a VM clone from an Image template, placed into a Zone either
//! explicitly or by the first-fit capacity scan. The clone is a
//! hypervisor task persisted in status, so a restarted manager resumes
//! polling instead of cloning twice. Power actions arrive as tasks staged
//! by the API layer; the reconciler executes them in `Created`.

use crate::controller::Reconciler;
use crate::error::ControllerError;
use crate::placement::{zone_fits, VmFootprint};
use crate::reconciler::{physical_delete, typed, Context};
use models::{
    DynamicObject, Flavor, Image, Instance, NetworkPort, PowerState, Region, ResourceMeta,
    ResourceState, Task, Zone, FINALIZER, LABEL_INSTANCE, LABEL_PROJECT, LABEL_REGION, LABEL_ZONE,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vi_client::{TaskRef, VmPlacement, VmPowerState};

const TASK_CLONE: &str = "clone";
const TASK_START: &str = "start";
const TASK_STOP: &str = "stop";
const TASK_RESTART: &str = "restart";
const TASK_POWER_OFF: &str = "power_off";

/// Name of the backing VM in the hypervisor.
fn vm_name(instance: &Instance) -> String {
    match &instance.metadata.namespace {
        Some(ns) => format!("{}-{}", ns, instance.metadata.name),
        None => instance.metadata.name.clone(),
    }
}

pub struct InstanceReconciler {
    ctx: Arc<Context>,
}

impl InstanceReconciler {
    pub fn new(ctx: Arc<Context>) -> Arc<Self> {
        Arc::new(Self { ctx })
    }

    /// First-fit scan over the region's schedulable zones, recomputed
    /// fresh on every pass.
    async fn find_best_zone(
        &self,
        region: &str,
        flavor: &Flavor,
        self_key: &str,
    ) -> Result<Option<Zone>, ControllerError> {
        let mut zones = self
            .ctx
            .api::<Zone>()
            .list(&[(LABEL_REGION, region)])
            .await?;
        zones.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));

        let instances = self
            .ctx
            .api::<Instance>()
            .list(&[(LABEL_REGION, region)])
            .await?;
        let flavors: HashMap<String, Flavor> = self
            .ctx
            .api::<Flavor>()
            .list(&[])
            .await?
            .into_iter()
            .map(|f| (f.metadata.name.clone(), f))
            .collect();

        for zone in zones {
            if zone.state() != ResourceState::Created {
                continue;
            }
            let hosts = self.ctx.vi.list_hosts(&zone.spec.cluster).await?;
            let existing: Vec<VmFootprint> = instances
                .iter()
                .filter(|i| i.key() != self_key)
                .filter(|i| i.metadata.label(LABEL_ZONE) == Some(zone.metadata.name.as_str()))
                // Only VM-backed instances consume capacity.
                .filter(|i| {
                    i.status
                        .as_ref()
                        .map(|s| s.vm_name.is_some())
                        .unwrap_or(false)
                })
                .filter_map(|i| {
                    flavors.get(&i.spec.flavor).map(|f| VmFootprint {
                        host: i.status.as_ref().and_then(|s| s.host.clone()),
                        vcpus: f.spec.vcpus,
                        ram_mb: f.spec.ram_mb,
                    })
                })
                .collect();
            if zone_fits(&zone, &hosts, &existing, flavor.spec.vcpus, flavor.spec.ram_mb) {
                return Ok(Some(zone));
            }
        }
        Ok(None)
    }

    /// Writes or clears the instance label on every port named in the
    /// spec, so port deletion blocks while wired.
    async fn wire_ports(&self, instance: &Instance, attach: bool) -> Result<(), ControllerError> {
        let Some(namespace) = &instance.metadata.namespace else {
            return Ok(());
        };
        let api = self.ctx.api_in::<NetworkPort>(namespace);
        for port_name in &instance.spec.ports {
            let Some(mut port) = api.get_opt(port_name).await? else {
                continue;
            };
            let current = port.metadata.label(LABEL_INSTANCE).map(String::from);
            if attach {
                if current.as_deref() == Some(instance.metadata.name.as_str()) {
                    continue;
                }
                port.metadata
                    .set_label(LABEL_INSTANCE, instance.metadata.name.clone());
            } else {
                if current.as_deref() != Some(instance.metadata.name.as_str()) {
                    continue;
                }
                port.metadata.labels.remove(LABEL_INSTANCE);
            }
            api.save(&port).await?;
        }
        Ok(())
    }

    async fn creating(&self, instance: &mut Instance) -> Result<(), ControllerError> {
        if let Some(task) = instance.task().cloned() {
            if task.name == TASK_CLONE {
                return self.poll_clone(instance, &task).await;
            }
            // Stale task from a previous life; clear and restart.
            instance.set_task(None);
        }

        let Some(region) = self.ctx.api::<Region>().get_opt(&instance.spec.region).await? else {
            instance.set_error(format!("region {} not found", instance.spec.region));
            return Ok(());
        };
        if region.state() != ResourceState::Created {
            debug!(instance = %instance.metadata.name, "waiting for region");
            return Ok(());
        }
        let Some(flavor) = self.ctx.api::<Flavor>().get_opt(&instance.spec.flavor).await? else {
            instance.set_error(format!("flavor {} not found", instance.spec.flavor));
            return Ok(());
        };
        let Some(image) = self.ctx.api::<Image>().get_opt(&instance.spec.image).await? else {
            instance.set_error(format!("image {} not found", instance.spec.image));
            return Ok(());
        };
        if image.state() != ResourceState::Created {
            debug!(instance = %instance.metadata.name, "waiting for image");
            return Ok(());
        }

        let root_disk_gb = instance.spec.root_disk_gb.unwrap_or(flavor.spec.disk_gb);
        if root_disk_gb < image.spec.min_disk_gb {
            instance.set_error(format!(
                "root disk {}GB below image minimum {}GB",
                root_disk_gb, image.spec.min_disk_gb
            ));
            return Ok(());
        }

        let zone = match &instance.spec.zone {
            Some(name) => {
                let Some(zone) = self.ctx.api::<Zone>().get_opt(name).await? else {
                    instance.set_error(format!("zone {} not found", name));
                    return Ok(());
                };
                zone
            }
            None => {
                match self
                    .find_best_zone(&instance.spec.region, &flavor, &instance.key())
                    .await?
                {
                    Some(zone) => zone,
                    None => {
                        instance.set_error(format!(
                            "no zone in region {} has capacity for {}",
                            instance.spec.region, instance.spec.flavor
                        ));
                        return Ok(());
                    }
                }
            }
        };
        instance
            .metadata
            .set_label(LABEL_ZONE, zone.metadata.name.clone());

        let template = self
            .ctx
            .vi
            .find_template(&region.spec.datacenter, &image.spec.template_name)
            .await?;
        let Some(template) = template else {
            instance.set_error(format!("template {} not found", image.spec.template_name));
            return Ok(());
        };

        let name = vm_name(instance);
        let placement = VmPlacement {
            datacenter: region.spec.datacenter.clone(),
            datastore: region.spec.datastore.clone(),
            cluster: zone.spec.cluster.clone(),
            folder: region.spec.folder.clone(),
        };
        let task_ref = self
            .ctx
            .vi
            .clone_vm(
                &template.name,
                &name,
                &placement,
                flavor.spec.vcpus,
                flavor.spec.ram_mb,
            )
            .await?;
        info!(instance = %instance.metadata.name, vm = %name, task = %task_ref.id, "clone started");
        instance.status_mut().vm_name = Some(name.clone());
        instance.set_task(Some(
            Task::new(TASK_CLONE)
                .with_kwarg("task", task_ref.id)
                .with_kwarg("vmName", name),
        ));
        Ok(())
    }

    async fn poll_clone(
        &self,
        instance: &mut Instance,
        task: &Task,
    ) -> Result<(), ControllerError> {
        let Some(id) = task.kwarg_str("task") else {
            // Malformed task; drop it so provisioning restarts cleanly.
            instance.set_task(None);
            return Ok(());
        };
        let status = self
            .ctx
            .vi
            .poll_task(&TaskRef { id: id.to_string() })
            .await?;
        if !status.done {
            debug!(instance = %instance.metadata.name, task = %id, "clone in progress");
            return Ok(());
        }
        if let Some(error) = status.error {
            instance.set_task(None);
            instance.set_error(format!("clone failed: {}", error));
            return Ok(());
        }

        let name = task
            .kwarg_str("vmName")
            .map(String::from)
            .unwrap_or_else(|| vm_name(instance));
        if let Some(vm) = self.ctx.vi.find_vm(&name).await? {
            instance.status_mut().host = vm.host;
        }
        self.wire_ports(instance, true).await?;
        self.ctx.vi.power_on(&name).await?;

        info!(instance = %instance.metadata.name, vm = %name, "instance provisioned");
        let status = instance.status_mut();
        status.vm_name = Some(name);
        status.power_state = Some(PowerState::On);
        instance.set_task(None);
        instance.set_state(ResourceState::Created);
        Ok(())
    }

    async fn created(&self, instance: &mut Instance) -> Result<(), ControllerError> {
        // An instance whose region is going away deletes itself.
        let region = self.ctx.api::<Region>().get_opt(&instance.spec.region).await?;
        let region_gone = match &region {
            None => true,
            Some(r) => r.state().is_deletion_flow(),
        };
        if region_gone {
            info!(instance = %instance.metadata.name, "region deleted, self-deleting");
            instance.set_state(ResourceState::ToDelete);
            return Ok(());
        }

        let Some(name) = instance.status.as_ref().and_then(|s| s.vm_name.clone()) else {
            instance.set_error("created instance has no backing VM name");
            return Ok(());
        };
        let Some(vm) = self.ctx.vi.find_vm(&name).await? else {
            instance.set_error(format!("backing VM {} disappeared", name));
            return Ok(());
        };
        {
            let status = instance.status_mut();
            status.host = vm.host.clone();
            status.power_state = Some(match vm.power_state {
                VmPowerState::PoweredOn => PowerState::On,
                VmPowerState::PoweredOff => PowerState::Off,
            });
        }

        if let Some(task) = instance.task().cloned() {
            self.run_power_task(instance, &task, &name).await?;
        }
        Ok(())
    }

    async fn run_power_task(
        &self,
        instance: &mut Instance,
        task: &Task,
        vm: &str,
    ) -> Result<(), ControllerError> {
        match task.name.as_str() {
            TASK_START => {
                self.ctx.vi.power_on(vm).await?;
                instance.status_mut().power_state = Some(PowerState::On);
            }
            TASK_STOP => {
                let hard = task.kwarg_bool("hard").unwrap_or(false);
                self.ctx.vi.power_off(vm, hard).await?;
                instance.status_mut().power_state = Some(PowerState::Off);
            }
            TASK_RESTART => {
                let hard = task.kwarg_bool("hard").unwrap_or(false);
                self.ctx.vi.power_off(vm, hard).await?;
                self.ctx.vi.power_on(vm).await?;
                instance.status_mut().power_state = Some(PowerState::On);
            }
            other => {
                warn!(instance = %instance.metadata.name, task = %other, "unknown task, discarding");
            }
        }
        instance.set_task(None);
        Ok(())
    }

    async fn deleting(&self, instance: &mut Instance) -> Result<(), ControllerError> {
        if let Some(name) = instance.status.as_ref().and_then(|s| s.vm_name.clone()) {
            if let Some(vm) = self.ctx.vi.find_vm(&name).await? {
                if vm.power_state == VmPowerState::PoweredOn {
                    let hard = instance
                        .task()
                        .and_then(|t| t.kwarg_bool("hard"))
                        .unwrap_or(false);
                    self.ctx.vi.power_off(&name, hard).await?;
                }
                self.ctx.vi.destroy_vm(&name).await?;
            }
        }
        self.wire_ports(instance, false).await?;
        instance.set_task(None);
        instance.set_state(ResourceState::Deleted);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Reconciler for InstanceReconciler {
    async fn reconcile(
        &self,
        key: &str,
        object: Option<DynamicObject>,
    ) -> Result<(), ControllerError> {
        let Some(object) = object else {
            return Ok(());
        };
        let mut instance: Instance = typed(key, &object)?;
        let state = instance.state();
        let before = instance.clone();
        let api = self.ctx.api::<Instance>();

        match state {
            ResourceState::ToCreate => {
                instance.metadata.add_finalizer(FINALIZER);
                let region = instance.spec.region.clone();
                instance.metadata.set_label(LABEL_REGION, region);
                if let Some(ns) = instance.metadata.namespace.clone() {
                    instance.metadata.set_label(LABEL_PROJECT, ns);
                }
                instance.set_state(ResourceState::Creating);
            }
            ResourceState::Creating => self.creating(&mut instance).await?,
            ResourceState::Created => self.created(&mut instance).await?,
            ResourceState::ToDelete => {
                // Pre-stage a soft power-off; the API layer may have set
                // harder parameters already.
                if instance.task().is_none() {
                    instance.set_task(Some(
                        Task::new(TASK_POWER_OFF)
                            .with_kwarg("hard", false)
                            .with_kwarg("timeout", 300),
                    ));
                }
                instance.set_state(ResourceState::Deleting);
            }
            ResourceState::Deleting => self.deleting(&mut instance).await?,
            ResourceState::Deleted => return physical_delete(&api, instance).await,
            ResourceState::Error => return Ok(()),
        }

        if instance != before {
            api.save(&instance).await?;
        }
        Ok(())
    }
}
