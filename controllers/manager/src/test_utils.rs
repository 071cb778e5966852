//! Shared fixtures for reconciler tests.
//!
//! `TestEnv` wires a mock store and mock hypervisor into a reconciler
//! context; `step` drives one reconciliation for a key the way a
//! controller worker would, feeding the store's current copy as the
//! cache snapshot.

use crate::controller::Reconciler;
use crate::reconciler::Context;
use models::{DynamicObject, ResourceMeta};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use store_client::{Api, MockStoreClient, StoreClient};
use vi_client::{HostInfo, MockViClient, VmTemplate};

pub struct TestEnv {
    pub store: MockStoreClient,
    pub vi: MockViClient,
    pub ctx: Arc<Context>,
}

impl TestEnv {
    pub fn new() -> Self {
        let store = MockStoreClient::new();
        let vi = MockViClient::new();
        let ctx = Context::new(Arc::new(store.clone()), Arc::new(vi.clone()));
        Self { store, vi, ctx }
    }

    pub fn api<T>(&self) -> Api<T>
    where
        T: ResourceMeta + Serialize + DeserializeOwned,
    {
        self.ctx.api::<T>()
    }

    pub async fn create<T>(&self, obj: &T) -> T
    where
        T: ResourceMeta + Serialize + DeserializeOwned,
    {
        self.api::<T>().create(obj).await.unwrap()
    }

    pub async fn fetch<T>(&self, key: &str) -> Option<T>
    where
        T: ResourceMeta + Serialize + DeserializeOwned,
    {
        let (namespace, name) = split_key(key);
        self.store
            .get(T::PLURAL, namespace, name)
            .await
            .ok()
            .map(|o| o.to_typed().unwrap())
    }

    /// Drives one reconciliation for `key`, passing the store's current
    /// copy (or `None` if it no longer exists).
    pub async fn step<T, R>(&self, reconciler: &R, key: &str)
    where
        T: ResourceMeta,
        R: Reconciler + ?Sized,
    {
        let (namespace, name) = split_key(key);
        let object: Option<DynamicObject> =
            self.store.get(T::PLURAL, namespace, name).await.ok();
        reconciler.reconcile(key, object).await.unwrap();
    }

    /// Fetches, applies `mutate`, saves. Stands in for the API layer
    /// acting on the object.
    pub async fn mutate<T>(&self, key: &str, mutate: impl FnOnce(&mut T))
    where
        T: ResourceMeta + Serialize + DeserializeOwned,
    {
        let mut obj: T = self.fetch(key).await.unwrap();
        mutate(&mut obj);
        self.api::<T>().save(&obj).await.unwrap();
    }

    /// Standard backing inventory: datacenter dc1, datastore ds1,
    /// cluster cl1 with one 8-thread/16GB host, template ubuntu-22.
    pub fn seed_inventory(&self) {
        self.vi.add_datacenter("dc1");
        self.vi.add_datastore("ds1");
        self.vi.add_cluster(
            "cl1",
            vec![HostInfo {
                name: "host-a".to_string(),
                cpu_threads: 8,
                memory_mb: 16384,
            }],
        );
        self.vi.add_template(
            "dc1",
            VmTemplate {
                name: "ubuntu-22".to_string(),
                disk_gb: 10,
            },
        );
    }
}

fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.split_once('/') {
        Some((ns, name)) => (Some(ns), name),
        None => (None, key),
    }
}
