//! Zone reconciler.
//!
//! A Zone binds one hypervisor cluster into a Region. Deletion blocks
//! while instances are still placed in the zone.

use crate::controller::Reconciler;
use crate::error::ControllerError;
use crate::reconciler::{physical_delete, typed, Context};
use models::{
    DynamicObject, Instance, Region, ResourceMeta, ResourceState, Zone, FINALIZER, LABEL_REGION,
    LABEL_ZONE,
};
use std::sync::Arc;
use tracing::{debug, info};

pub struct ZoneReconciler {
    ctx: Arc<Context>,
}

impl ZoneReconciler {
    pub fn new(ctx: Arc<Context>) -> Arc<Self> {
        Arc::new(Self { ctx })
    }

    async fn creating(&self, zone: &mut Zone) -> Result<(), ControllerError> {
        let region = self.ctx.api::<Region>().get_opt(&zone.spec.region).await?;
        match region {
            None => {
                zone.set_error(format!("region {} not found", zone.spec.region));
                return Ok(());
            }
            Some(r) if r.state() != ResourceState::Created => {
                // Region still provisioning; re-checked next cycle.
                debug!(zone = %zone.metadata.name, region = %zone.spec.region, "waiting for region");
                return Ok(());
            }
            Some(_) => {}
        }
        if self.ctx.vi.find_cluster(&zone.spec.cluster).await?.is_none() {
            zone.set_error(format!("cluster {} not found", zone.spec.cluster));
            return Ok(());
        }
        info!(zone = %zone.metadata.name, "zone provisioned");
        zone.set_state(ResourceState::Created);
        Ok(())
    }

    async fn created(&self, zone: &mut Zone) -> Result<(), ControllerError> {
        if self.ctx.vi.find_cluster(&zone.spec.cluster).await?.is_none() {
            zone.set_error(format!(
                "cluster {} disappeared from inventory",
                zone.spec.cluster
            ));
        }
        Ok(())
    }

    async fn deleting(&self, zone: &mut Zone) -> Result<(), ControllerError> {
        let blockers = self
            .ctx
            .count_labeled(Instance::PLURAL, LABEL_ZONE, &zone.metadata.name)
            .await?;
        if blockers > 0 {
            debug!(zone = %zone.metadata.name, blockers, "deletion blocked by instances");
            return Ok(());
        }
        zone.set_state(ResourceState::Deleted);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Reconciler for ZoneReconciler {
    async fn reconcile(
        &self,
        key: &str,
        object: Option<DynamicObject>,
    ) -> Result<(), ControllerError> {
        let Some(object) = object else {
            return Ok(());
        };
        let mut zone: Zone = typed(key, &object)?;
        let state = zone.state();
        let before = zone.clone();
        let api = self.ctx.api::<Zone>();

        match state {
            ResourceState::ToCreate => {
                zone.metadata.add_finalizer(FINALIZER);
                let region = zone.spec.region.clone();
                zone.metadata.set_label(LABEL_REGION, region);
                zone.set_state(ResourceState::Creating);
            }
            ResourceState::Creating => self.creating(&mut zone).await?,
            ResourceState::Created => self.created(&mut zone).await?,
            ResourceState::ToDelete => zone.set_state(ResourceState::Deleting),
            ResourceState::Deleting => self.deleting(&mut zone).await?,
            ResourceState::Deleted => return physical_delete(&api, zone).await,
            ResourceState::Error => return Ok(()),
        }

        if zone != before {
            api.save(&zone).await?;
        }
        Ok(())
    }
}
