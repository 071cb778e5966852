//! ServiceAccount reconciler.
//!
//! Mints the credential secret reference; token issuance itself belongs
//! to the API layer.

use crate::controller::Reconciler;
use crate::error::ControllerError;
use crate::reconciler::{physical_delete, typed, Context};
use models::{DynamicObject, ResourceState, ServiceAccount, FINALIZER, LABEL_PROJECT};
use std::sync::Arc;
use tracing::info;

fn mint_secret_ref(account: &ServiceAccount) -> String {
    let namespace = account.metadata.namespace.as_deref().unwrap_or("default");
    format!(
        "secret://{}/{}/{}",
        namespace,
        account.metadata.name,
        uuid::Uuid::new_v4()
    )
}

pub struct ServiceAccountReconciler {
    ctx: Arc<Context>,
}

impl ServiceAccountReconciler {
    pub fn new(ctx: Arc<Context>) -> Arc<Self> {
        Arc::new(Self { ctx })
    }
}

#[async_trait::async_trait]
impl Reconciler for ServiceAccountReconciler {
    async fn reconcile(
        &self,
        key: &str,
        object: Option<DynamicObject>,
    ) -> Result<(), ControllerError> {
        let Some(object) = object else {
            return Ok(());
        };
        let mut account: ServiceAccount = typed(key, &object)?;
        let before = account.clone();
        let api = self.ctx.api::<ServiceAccount>();

        match account.state() {
            ResourceState::ToCreate | ResourceState::Creating => {
                account.metadata.add_finalizer(FINALIZER);
                if let Some(ns) = account.metadata.namespace.clone() {
                    account.metadata.set_label(LABEL_PROJECT, ns);
                }
                let secret_ref = mint_secret_ref(&account);
                info!(account = %account.metadata.name, "service account credential minted");
                account.status_mut().secret_ref = Some(secret_ref);
                account.set_state(ResourceState::Created);
            }
            ResourceState::Created => {
                // A lost credential reference gets re-minted.
                if account.status.as_ref().and_then(|s| s.secret_ref.as_ref()).is_none() {
                    let secret_ref = mint_secret_ref(&account);
                    account.status_mut().secret_ref = Some(secret_ref);
                }
            }
            ResourceState::ToDelete => account.set_state(ResourceState::Deleting),
            ResourceState::Deleting => account.set_state(ResourceState::Deleted),
            ResourceState::Deleted => return physical_delete(&api, account).await,
            ResourceState::Error => return Ok(()),
        }

        if account != before {
            api.save(&account).await?;
        }
        Ok(())
    }
}
