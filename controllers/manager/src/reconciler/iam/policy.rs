//! IamPolicy reconciler.

use crate::controller::Reconciler;
use crate::error::ControllerError;
use crate::reconciler::{physical_delete, typed, Context};
use models::{
    DynamicObject, IamPolicy, IamRole, ResourceState, FINALIZER, LABEL_PROJECT, LABEL_ROLE,
};
use std::sync::Arc;

pub struct IamPolicyReconciler {
    ctx: Arc<Context>,
}

impl IamPolicyReconciler {
    pub fn new(ctx: Arc<Context>) -> Arc<Self> {
        Arc::new(Self { ctx })
    }

    async fn validate(&self, policy: &mut IamPolicy) -> Result<(), ControllerError> {
        if self
            .ctx
            .api::<IamRole>()
            .get_opt(&policy.spec.role)
            .await?
            .is_none()
        {
            policy.set_error(format!("role {} not found", policy.spec.role));
            return Ok(());
        }
        if policy.spec.subjects.is_empty() {
            policy.set_error("policy has no subjects");
            return Ok(());
        }
        policy.set_state(ResourceState::Created);
        Ok(())
    }

    /// Drift: a policy whose role was removed becomes inert, surfaced as
    /// an error for the operator.
    async fn created(&self, policy: &mut IamPolicy) -> Result<(), ControllerError> {
        if self
            .ctx
            .api::<IamRole>()
            .get_opt(&policy.spec.role)
            .await?
            .is_none()
        {
            policy.set_error(format!("role {} disappeared", policy.spec.role));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Reconciler for IamPolicyReconciler {
    async fn reconcile(
        &self,
        key: &str,
        object: Option<DynamicObject>,
    ) -> Result<(), ControllerError> {
        let Some(object) = object else {
            return Ok(());
        };
        let mut policy: IamPolicy = typed(key, &object)?;
        let before = policy.clone();
        let api = self.ctx.api::<IamPolicy>();

        match policy.state() {
            ResourceState::ToCreate => {
                policy.metadata.add_finalizer(FINALIZER);
                let role = policy.spec.role.clone();
                policy.metadata.set_label(LABEL_ROLE, role);
                if let Some(ns) = policy.metadata.namespace.clone() {
                    policy.metadata.set_label(LABEL_PROJECT, ns);
                }
                self.validate(&mut policy).await?;
            }
            ResourceState::Creating => self.validate(&mut policy).await?,
            ResourceState::Created => self.created(&mut policy).await?,
            ResourceState::ToDelete => policy.set_state(ResourceState::Deleting),
            ResourceState::Deleting => policy.set_state(ResourceState::Deleted),
            ResourceState::Deleted => return physical_delete(&api, policy).await,
            ResourceState::Error => return Ok(()),
        }

        if policy != before {
            api.save(&policy).await?;
        }
        Ok(())
    }
}
