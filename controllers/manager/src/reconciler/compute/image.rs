//! Image reconciler.
//!
//! An Image points at a template VM in its Region's datacenter.

use crate::controller::Reconciler;
use crate::error::ControllerError;
use crate::reconciler::{physical_delete, typed, Context};
use models::{DynamicObject, Image, Region, ResourceState, FINALIZER, LABEL_REGION};
use std::sync::Arc;
use tracing::{debug, info};

pub struct ImageReconciler {
    ctx: Arc<Context>,
}

impl ImageReconciler {
    pub fn new(ctx: Arc<Context>) -> Arc<Self> {
        Arc::new(Self { ctx })
    }

    async fn creating(&self, image: &mut Image) -> Result<(), ControllerError> {
        let region = self.ctx.api::<Region>().get_opt(&image.spec.region).await?;
        let Some(region) = region else {
            image.set_error(format!("region {} not found", image.spec.region));
            return Ok(());
        };
        if region.state() != ResourceState::Created {
            debug!(image = %image.metadata.name, region = %region.metadata.name, "waiting for region");
            return Ok(());
        }
        let template = self
            .ctx
            .vi
            .find_template(&region.spec.datacenter, &image.spec.template_name)
            .await?;
        let Some(template) = template else {
            image.set_error(format!("template {} not found", image.spec.template_name));
            return Ok(());
        };
        // The template's own disk is the floor for bootable root disks.
        if image.spec.min_disk_gb < template.disk_gb {
            image.spec.min_disk_gb = template.disk_gb;
        }
        info!(image = %image.metadata.name, "image provisioned");
        image.set_state(ResourceState::Created);
        Ok(())
    }

    async fn created(&self, image: &mut Image) -> Result<(), ControllerError> {
        let Some(region) = self.ctx.api::<Region>().get_opt(&image.spec.region).await? else {
            image.set_error(format!("region {} disappeared", image.spec.region));
            return Ok(());
        };
        if self
            .ctx
            .vi
            .find_template(&region.spec.datacenter, &image.spec.template_name)
            .await?
            .is_none()
        {
            image.set_error(format!(
                "template {} disappeared from inventory",
                image.spec.template_name
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Reconciler for ImageReconciler {
    async fn reconcile(
        &self,
        key: &str,
        object: Option<DynamicObject>,
    ) -> Result<(), ControllerError> {
        let Some(object) = object else {
            return Ok(());
        };
        let mut image: Image = typed(key, &object)?;
        let state = image.state();
        let before = image.clone();
        let api = self.ctx.api::<Image>();

        match state {
            ResourceState::ToCreate => {
                image.metadata.add_finalizer(FINALIZER);
                let region = image.spec.region.clone();
                image.metadata.set_label(LABEL_REGION, region);
                image.set_state(ResourceState::Creating);
            }
            ResourceState::Creating => self.creating(&mut image).await?,
            ResourceState::Created => self.created(&mut image).await?,
            ResourceState::ToDelete => image.set_state(ResourceState::Deleting),
            ResourceState::Deleting => image.set_state(ResourceState::Deleted),
            ResourceState::Deleted => return physical_delete(&api, image).await,
            ResourceState::Error => return Ok(()),
        }

        if image != before {
            api.save(&image).await?;
        }
        Ok(())
    }
}
