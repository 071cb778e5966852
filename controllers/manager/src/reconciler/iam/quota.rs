//! Quota reconciler.
//!
//! Admission enforcement lives in the API layer; the manager keeps the
//! observed usage counters fresh so operators and the API see current
//! consumption. Counters are recomputed from scratch every pass.

use crate::controller::Reconciler;
use crate::error::ControllerError;
use crate::reconciler::{physical_delete, typed, Context};
use models::{
    DynamicObject, Flavor, Instance, Quota, QuotaUsage, ResourceState, Volume, FINALIZER,
    LABEL_PROJECT,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub struct QuotaReconciler {
    ctx: Arc<Context>,
}

impl QuotaReconciler {
    pub fn new(ctx: Arc<Context>) -> Arc<Self> {
        Arc::new(Self { ctx })
    }

    async fn refresh(&self, quota: &mut Quota) -> Result<(), ControllerError> {
        let Some(namespace) = quota.metadata.namespace.clone() else {
            quota.set_error("quota must be namespaced");
            return Ok(());
        };
        let instances = self.ctx.api_in::<Instance>(&namespace).list(&[]).await?;
        let volumes = self.ctx.api_in::<Volume>(&namespace).list(&[]).await?;
        let flavors: HashMap<String, Flavor> = self
            .ctx
            .api::<Flavor>()
            .list(&[])
            .await?
            .into_iter()
            .map(|f| (f.metadata.name.clone(), f))
            .collect();

        let mut used = QuotaUsage::default();
        for instance in &instances {
            used.instances += 1;
            if let Some(flavor) = flavors.get(&instance.spec.flavor) {
                used.vcpus += u64::from(flavor.spec.vcpus);
                used.ram_mb += flavor.spec.ram_mb;
            }
        }
        for volume in &volumes {
            used.volumes += 1;
            used.storage_gb += volume.spec.size_gb;
        }

        debug!(
            quota = %quota.metadata.name,
            instances = used.instances,
            volumes = used.volumes,
            "usage refreshed"
        );
        quota.status_mut().used = used;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Reconciler for QuotaReconciler {
    async fn reconcile(
        &self,
        key: &str,
        object: Option<DynamicObject>,
    ) -> Result<(), ControllerError> {
        let Some(object) = object else {
            return Ok(());
        };
        let mut quota: Quota = typed(key, &object)?;
        let before = quota.clone();
        let api = self.ctx.api::<Quota>();

        match quota.state() {
            ResourceState::ToCreate | ResourceState::Creating => {
                quota.metadata.add_finalizer(FINALIZER);
                if let Some(ns) = quota.metadata.namespace.clone() {
                    quota.metadata.set_label(LABEL_PROJECT, ns);
                }
                quota.set_state(ResourceState::Created);
                self.refresh(&mut quota).await?;
            }
            ResourceState::Created => self.refresh(&mut quota).await?,
            ResourceState::ToDelete => quota.set_state(ResourceState::Deleting),
            ResourceState::Deleting => quota.set_state(ResourceState::Deleted),
            ResourceState::Deleted => return physical_delete(&api, quota).await,
            ResourceState::Error => return Ok(()),
        }

        if quota != before {
            api.save(&quota).await?;
        }
        Ok(())
    }
}
