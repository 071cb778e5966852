//! ProjectMember reconciler.

use crate::controller::Reconciler;
use crate::error::ControllerError;
use crate::reconciler::{physical_delete, typed, Context};
use models::{
    DynamicObject, IamRole, ProjectMember, ResourceState, FINALIZER, LABEL_PROJECT, LABEL_ROLE,
};
use std::sync::Arc;

pub struct ProjectMemberReconciler {
    ctx: Arc<Context>,
}

impl ProjectMemberReconciler {
    pub fn new(ctx: Arc<Context>) -> Arc<Self> {
        Arc::new(Self { ctx })
    }

    async fn validate(&self, member: &mut ProjectMember) -> Result<(), ControllerError> {
        if member.spec.user.is_empty() {
            member.set_error("member has no user");
            return Ok(());
        }
        if self
            .ctx
            .api::<IamRole>()
            .get_opt(&member.spec.role)
            .await?
            .is_none()
        {
            member.set_error(format!("role {} not found", member.spec.role));
            return Ok(());
        }
        member.set_state(ResourceState::Created);
        Ok(())
    }

    async fn created(&self, member: &mut ProjectMember) -> Result<(), ControllerError> {
        if self
            .ctx
            .api::<IamRole>()
            .get_opt(&member.spec.role)
            .await?
            .is_none()
        {
            member.set_error(format!("role {} disappeared", member.spec.role));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Reconciler for ProjectMemberReconciler {
    async fn reconcile(
        &self,
        key: &str,
        object: Option<DynamicObject>,
    ) -> Result<(), ControllerError> {
        let Some(object) = object else {
            return Ok(());
        };
        let mut member: ProjectMember = typed(key, &object)?;
        let before = member.clone();
        let api = self.ctx.api::<ProjectMember>();

        match member.state() {
            ResourceState::ToCreate => {
                member.metadata.add_finalizer(FINALIZER);
                let role = member.spec.role.clone();
                member.metadata.set_label(LABEL_ROLE, role);
                if let Some(ns) = member.metadata.namespace.clone() {
                    member.metadata.set_label(LABEL_PROJECT, ns);
                }
                self.validate(&mut member).await?;
            }
            ResourceState::Creating => self.validate(&mut member).await?,
            ResourceState::Created => self.created(&mut member).await?,
            ResourceState::ToDelete => member.set_state(ResourceState::Deleting),
            ResourceState::Deleting => member.set_state(ResourceState::Deleted),
            ResourceState::Deleted => return physical_delete(&api, member).await,
            ResourceState::Error => return Ok(()),
        }

        if member != before {
            api.save(&member).await?;
        }
        Ok(())
    }
}
