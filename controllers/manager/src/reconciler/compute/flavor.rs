//! Flavor reconciler.
//!
//! Nothing to provision: a Flavor goes straight to Created once its sizing
//! is sane.

use crate::controller::Reconciler;
use crate::error::ControllerError;
use crate::reconciler::{physical_delete, typed, Context};
use models::{DynamicObject, Flavor, ResourceState, FINALIZER};
use std::sync::Arc;

pub struct FlavorReconciler {
    ctx: Arc<Context>,
}

impl FlavorReconciler {
    pub fn new(ctx: Arc<Context>) -> Arc<Self> {
        Arc::new(Self { ctx })
    }
}

#[async_trait::async_trait]
impl Reconciler for FlavorReconciler {
    async fn reconcile(
        &self,
        key: &str,
        object: Option<DynamicObject>,
    ) -> Result<(), ControllerError> {
        let Some(object) = object else {
            return Ok(());
        };
        let mut flavor: Flavor = typed(key, &object)?;
        let before = flavor.clone();
        let api = self.ctx.api::<Flavor>();

        match flavor.state() {
            ResourceState::ToCreate => {
                flavor.metadata.add_finalizer(FINALIZER);
                if flavor.spec.vcpus == 0 || flavor.spec.ram_mb == 0 || flavor.spec.disk_gb == 0 {
                    flavor.set_error("vcpus, ramMb and diskGb must all be non-zero");
                } else {
                    flavor.set_state(ResourceState::Created);
                }
            }
            ResourceState::Creating | ResourceState::Created => {}
            ResourceState::ToDelete => flavor.set_state(ResourceState::Deleting),
            ResourceState::Deleting => flavor.set_state(ResourceState::Deleted),
            ResourceState::Deleted => return physical_delete(&api, flavor).await,
            ResourceState::Error => return Ok(()),
        }

        if flavor != before {
            api.save(&flavor).await?;
        }
        Ok(())
    }
}
