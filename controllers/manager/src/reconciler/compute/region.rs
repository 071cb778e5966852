//! Region reconciler.
//!
//! A Region is valid once its datacenter and datastore exist in the
//! hypervisor inventory. Deletion blocks while any Zone, Image, Instance
//! or Volume still references the region.

use crate::controller::Reconciler;
use crate::error::ControllerError;
use crate::reconciler::{physical_delete, typed, Context};
use models::{
    DynamicObject, Image, Instance, Region, ResourceMeta, ResourceState, Volume, Zone, FINALIZER,
    LABEL_REGION,
};
use std::sync::Arc;
use tracing::{debug, info};

pub struct RegionReconciler {
    ctx: Arc<Context>,
}

impl RegionReconciler {
    pub fn new(ctx: Arc<Context>) -> Arc<Self> {
        Arc::new(Self { ctx })
    }

    async fn creating(&self, region: &mut Region) -> Result<(), ControllerError> {
        let spec = &region.spec;
        if self.ctx.vi.find_datacenter(&spec.datacenter).await?.is_none() {
            region.set_error(format!("datacenter {} not found", spec.datacenter));
            return Ok(());
        }
        if self.ctx.vi.find_datastore(&spec.datastore).await?.is_none() {
            region.set_error(format!("datastore {} not found", spec.datastore));
            return Ok(());
        }
        if let Some(folder) = &spec.folder {
            if self
                .ctx
                .vi
                .find_folder(&spec.datacenter, folder)
                .await?
                .is_none()
            {
                region.set_error(format!("folder {} not found", folder));
                return Ok(());
            }
        }
        info!(region = %region.metadata.name, "region provisioned");
        region.set_state(ResourceState::Created);
        Ok(())
    }

    async fn created(&self, region: &mut Region) -> Result<(), ControllerError> {
        // Drift: the backing inventory may disappear underneath us.
        if self
            .ctx
            .vi
            .find_datacenter(&region.spec.datacenter)
            .await?
            .is_none()
        {
            region.set_error(format!(
                "datacenter {} disappeared from inventory",
                region.spec.datacenter
            ));
        }
        Ok(())
    }

    /// Counts everything still referencing this region.
    async fn dependents(&self, name: &str) -> Result<usize, ControllerError> {
        let mut total = 0;
        for path in [Zone::PLURAL, Image::PLURAL, Instance::PLURAL, Volume::PLURAL] {
            total += self.ctx.count_labeled(path, LABEL_REGION, name).await?;
        }
        Ok(total)
    }

    async fn deleting(&self, region: &mut Region) -> Result<(), ControllerError> {
        let blockers = self.dependents(&region.metadata.name).await?;
        if blockers > 0 {
            debug!(region = %region.metadata.name, blockers, "deletion blocked by dependents");
            return Ok(());
        }
        region.set_state(ResourceState::Deleted);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Reconciler for RegionReconciler {
    async fn reconcile(
        &self,
        key: &str,
        object: Option<DynamicObject>,
    ) -> Result<(), ControllerError> {
        let Some(object) = object else {
            return Ok(());
        };
        let mut region: Region = typed(key, &object)?;
        let state = region.state();
        let before = region.clone();
        let api = self.ctx.api::<Region>();

        match state {
            ResourceState::ToCreate => {
                region.metadata.add_finalizer(FINALIZER);
                region.set_state(ResourceState::Creating);
            }
            ResourceState::Creating => self.creating(&mut region).await?,
            ResourceState::Created => self.created(&mut region).await?,
            ResourceState::ToDelete => region.set_state(ResourceState::Deleting),
            ResourceState::Deleting => self.deleting(&mut region).await?,
            ResourceState::Deleted => return physical_delete(&api, region).await,
            ResourceState::Error => return Ok(()),
        }

        if region != before {
            api.save(&region).await?;
        }
        Ok(())
    }
}
