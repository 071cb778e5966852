//! IamRole reconciler.
//!
//! Validates the rule set; deletion blocks while policies or project
//! members still reference the role.

use crate::controller::Reconciler;
use crate::error::ControllerError;
use crate::reconciler::{physical_delete, typed, Context};
use models::{
    DynamicObject, IamPolicy, IamRole, ProjectMember, ResourceMeta, ResourceState, FINALIZER,
    LABEL_ROLE,
};
use std::sync::Arc;
use tracing::debug;

pub struct IamRoleReconciler {
    ctx: Arc<Context>,
}

impl IamRoleReconciler {
    pub fn new(ctx: Arc<Context>) -> Arc<Self> {
        Arc::new(Self { ctx })
    }

    fn validate(role: &mut IamRole) {
        if role.spec.rules.is_empty() {
            role.set_error("role has no rules");
            return;
        }
        for rule in &role.spec.rules {
            if rule.verbs.is_empty() || rule.resources.is_empty() {
                role.set_error("rule with empty verbs or resources");
                return;
            }
        }
        role.set_state(ResourceState::Created);
    }

    async fn deleting(&self, role: &mut IamRole) -> Result<(), ControllerError> {
        let name = &role.metadata.name;
        let blockers = self
            .ctx
            .count_labeled(IamPolicy::PLURAL, LABEL_ROLE, name)
            .await?
            + self
                .ctx
                .count_labeled(ProjectMember::PLURAL, LABEL_ROLE, name)
                .await?;
        if blockers > 0 {
            debug!(role = %name, blockers, "deletion blocked by references");
            return Ok(());
        }
        role.set_state(ResourceState::Deleted);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Reconciler for IamRoleReconciler {
    async fn reconcile(
        &self,
        key: &str,
        object: Option<DynamicObject>,
    ) -> Result<(), ControllerError> {
        let Some(object) = object else {
            return Ok(());
        };
        let mut role: IamRole = typed(key, &object)?;
        let before = role.clone();
        let api = self.ctx.api::<IamRole>();

        match role.state() {
            ResourceState::ToCreate => {
                role.metadata.add_finalizer(FINALIZER);
                Self::validate(&mut role);
            }
            ResourceState::Creating | ResourceState::Created => {}
            ResourceState::ToDelete => role.set_state(ResourceState::Deleting),
            ResourceState::Deleting => self.deleting(&mut role).await?,
            ResourceState::Deleted => return physical_delete(&api, role).await,
            ResourceState::Error => return Ok(()),
        }

        if role != before {
            api.save(&role).await?;
        }
        Ok(())
    }
}
