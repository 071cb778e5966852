//! Per-resource reconciliation state machines.
//!
//! Every reconciler follows the same frame: convert the cached object to
//! its typed model, dispatch on the observed lifecycle state, and persist
//! only when the handler changed something. Domain precondition failures
//! are recorded on the object via `set_error` and are not `Err`s; errors
//! returned from a handler are transient (store/hypervisor I/O) and get
//! retried by the next event or resync.

pub mod compute;
pub mod iam;

use crate::error::ControllerError;
use models::{DynamicObject, ResourceMeta};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use store_client::{Api, StoreClient, StoreError};
use vi_client::ViClient;

/// Shared clients handed to every reconciler.
pub struct Context {
    pub store: Arc<dyn StoreClient>,
    pub vi: Arc<dyn ViClient>,
}

impl Context {
    pub fn new(store: Arc<dyn StoreClient>, vi: Arc<dyn ViClient>) -> Arc<Self> {
        Arc::new(Self { store, vi })
    }

    /// Cluster-scoped or cross-namespace API for one resource type.
    pub fn api<T>(&self) -> Api<T>
    where
        T: ResourceMeta + Serialize + DeserializeOwned,
    {
        Api::all(self.store.clone())
    }

    /// API scoped to one namespace.
    pub fn api_in<T>(&self, namespace: &str) -> Api<T>
    where
        T: ResourceMeta + Serialize + DeserializeOwned,
    {
        Api::namespaced(self.store.clone(), namespace)
    }

    /// Number of objects under `path` carrying one label. Deletion of a
    /// resource with dependents blocks on this reaching zero.
    pub async fn count_labeled(
        &self,
        path: &str,
        key: &str,
        value: &str,
    ) -> Result<usize, StoreError> {
        Ok(self.store.list(path, None, &[(key, value)]).await?.items.len())
    }
}

/// Converts a cached object into its typed model.
pub(crate) fn typed<T: DeserializeOwned>(
    key: &str,
    object: &DynamicObject,
) -> Result<T, ControllerError> {
    object.to_typed().map_err(|source| ControllerError::InvalidObject {
        key: key.to_string(),
        source,
    })
}

/// Physically removes an object: drops the manager finalizer, persists,
/// then issues the store delete. Reached only from the `Deleted` state so
/// a crash in between retries the removal without redoing teardown.
pub(crate) async fn physical_delete<T>(
    api: &Api<T>,
    mut object: T,
) -> Result<(), ControllerError>
where
    T: ResourceMeta + Serialize + DeserializeOwned,
{
    if object.metadata().has_finalizer(models::FINALIZER) {
        object.metadata_mut().remove_finalizer(models::FINALIZER);
        object = api.save(&object).await?;
    }
    let namespace = object.metadata().namespace.clone();
    match api.delete(namespace.as_deref(), &object.metadata().name).await {
        Ok(()) => Ok(()),
        // Already removed by a concurrent retry.
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}
