//! List+watch loop feeding an [`ObjectCache`] and a [`WorkQueue`].
//!
//! The informer maintains the local view of one resource type:
//!  - a periodic full list replaces the cache wholesale and re-enqueues
//!    every object, so missed watch events are repaired at the next
//!    resync at the latest;
//!  - between lists, a watch stream applies incremental updates.
//!
//! A broken watch backs off, then forces a fresh list before
//! reconnecting, since its bookmark may have expired server-side.

use crate::cache::ObjectCache;
use crate::workqueue::WorkQueue;
use futures::StreamExt;
use models::{object_key, DynamicObject};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use store_client::{EventType, StoreClient, StoreError, WatchEvent};
use tokio::sync::watch;
use tracing::{debug, info, warn};

const DEFAULT_RESYNC: Duration = Duration::from_secs(300);
const DEFAULT_WATCH_BACKOFF: Duration = Duration::from_secs(30);

/// Watches one resource type and keeps its cache and queue current.
pub struct Informer {
    store: Arc<dyn StoreClient>,
    path: String,
    selectors: Vec<(String, String)>,
    cache: ObjectCache,
    queue: WorkQueue,
    resync: Duration,
    watch_backoff: Duration,
    synced: Arc<AtomicBool>,
    resource_version: Arc<Mutex<Option<String>>>,
}

impl Informer {
    pub fn new(store: Arc<dyn StoreClient>, path: impl Into<String>) -> Self {
        Self {
            store,
            path: path.into(),
            selectors: Vec::new(),
            cache: ObjectCache::new(),
            queue: WorkQueue::new(),
            resync: DEFAULT_RESYNC,
            watch_backoff: DEFAULT_WATCH_BACKOFF,
            synced: Arc::new(AtomicBool::new(false)),
            resource_version: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_selector(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.selectors.push((key.into(), value.into()));
        self
    }

    pub fn with_resync(mut self, resync: Duration) -> Self {
        self.resync = resync;
        self
    }

    pub fn cache(&self) -> ObjectCache {
        self.cache.clone()
    }

    pub fn queue(&self) -> WorkQueue {
        self.queue.clone()
    }

    /// True once the first full list has populated the cache.
    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    /// Blocks until the initial list completes.
    pub async fn wait_for_sync(&self) {
        while !self.has_synced() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Runs the list and watch loops until `stop` flips to true.
    pub async fn run(self: Arc<Self>, stop: watch::Receiver<bool>) {
        let lister = tokio::spawn(self.clone().list_loop(stop.clone()));
        let watcher = tokio::spawn(self.clone().watch_loop(stop));
        let _ = tokio::join!(lister, watcher);
        info!(path = %self.path, "informer stopped");
    }

    async fn list_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        loop {
            if let Err(error) = self.relist().await {
                warn!(path = %self.path, %error, "full list failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(self.resync) => {}
                _ = stop.changed() => return,
            }
        }
    }

    /// Replaces the cache with the store's current contents and enqueues
    /// every key, so reconcilers re-examine all objects.
    async fn relist(&self) -> Result<(), StoreError> {
        let selectors = self.selector_refs();
        let list = self.store.list(&self.path, None, &selectors).await?;

        let mut objects = HashMap::with_capacity(list.items.len());
        for item in list.items {
            objects.insert(object_key(&item.metadata), item);
        }
        let keys: Vec<String> = objects.keys().cloned().collect();
        debug!(path = %self.path, count = keys.len(), "full list");

        self.cache.reset(objects);
        *self.resource_version.lock().unwrap() = Some(list.metadata.resource_version);
        self.synced.store(true, Ordering::SeqCst);
        for key in keys {
            self.queue.add(key);
        }
        Ok(())
    }

    async fn watch_loop(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        loop {
            if *stop.borrow() {
                return;
            }
            let rv = self.resource_version.lock().unwrap().clone();
            let Some(rv) = rv else {
                // Initial list has not landed yet.
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(100)) => continue,
                    _ = stop.changed() => return,
                }
            };

            match self
                .store
                .watch(&self.path, None, Some(&rv), &self.selector_refs())
                .await
            {
                Ok(mut stream) => loop {
                    tokio::select! {
                        _ = stop.changed() => return,
                        item = stream.next() => match item {
                            Some(Ok(event)) => self.apply(event),
                            Some(Err(error)) => {
                                warn!(path = %self.path, %error, "watch stream failed");
                                if self.recover(&mut stop).await.is_err() {
                                    return;
                                }
                                break;
                            }
                            None => {
                                debug!(path = %self.path, "watch stream closed");
                                if self.recover(&mut stop).await.is_err() {
                                    return;
                                }
                                break;
                            }
                        }
                    }
                },
                Err(error) => {
                    warn!(path = %self.path, %error, "watch connect failed");
                    if self.recover(&mut stop).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Backs off after a watch failure, then relists to obtain a fresh
    /// bookmark. Errors only when stopped mid-backoff.
    async fn recover(&self, stop: &mut watch::Receiver<bool>) -> Result<(), ()> {
        tokio::select! {
            _ = tokio::time::sleep(self.watch_backoff) => {}
            _ = stop.changed() => return Err(()),
        }
        if let Err(error) = self.relist().await {
            warn!(path = %self.path, %error, "relist after watch failure failed");
        }
        Ok(())
    }

    fn apply(&self, event: WatchEvent) {
        let key = object_key(&event.object.metadata);
        if let Some(rv) = &event.object.metadata.resource_version {
            *self.resource_version.lock().unwrap() = Some(rv.clone());
        }
        match event.event_type {
            EventType::Added | EventType::Modified => {
                self.cache.add(key.clone(), event.object);
            }
            EventType::Deleted => {
                self.cache.delete(&key);
            }
        }
        self.queue.add(key);
    }

    fn selector_refs(&self) -> Vec<(&str, &str)> {
        self.selectors
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::Metadata;
    use serde_json::json;
    use store_client::MockStoreClient;

    fn obj(name: &str) -> DynamicObject {
        DynamicObject {
            api_version: "vcops.io/v1".to_string(),
            kind: "Test".to_string(),
            metadata: Metadata::named(name),
            spec: json!({}),
            status: None,
        }
    }

    #[tokio::test]
    async fn initial_list_populates_cache_and_queue() {
        let store = MockStoreClient::new();
        store.create("tests", None, &obj("a")).await.unwrap();
        store.create("tests", None, &obj("b")).await.unwrap();

        let informer = Arc::new(Informer::new(Arc::new(store), "tests"));
        let (_stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(informer.clone().run(stop_rx));

        informer.wait_for_sync().await;
        assert_eq!(informer.cache().len(), 2);

        let queue = informer.queue();
        let mut keys = vec![queue.get().await.unwrap(), queue.get().await.unwrap()];
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);

        handle.abort();
    }

    #[tokio::test]
    async fn watch_events_update_cache_and_enqueue() {
        let store = MockStoreClient::new();
        let informer = Arc::new(Informer::new(Arc::new(store.clone()), "tests"));
        let (_stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(informer.clone().run(stop_rx));
        informer.wait_for_sync().await;

        store.create("tests", None, &obj("a")).await.unwrap();
        let queue = informer.queue();
        assert_eq!(queue.get().await.as_deref(), Some("a"));
        assert!(informer.cache().get("a").is_some());
        queue.done("a");

        store.delete("tests", None, "a").await.unwrap();
        assert_eq!(queue.get().await.as_deref(), Some("a"));
        assert!(informer.cache().get("a").is_none());

        handle.abort();
    }

    #[tokio::test]
    async fn resync_repairs_cache_drift() {
        let store = MockStoreClient::new();
        // Seed before the informer starts so there is no watch event.
        store.create("tests", None, &obj("a")).await.unwrap();

        let informer = Arc::new(
            Informer::new(Arc::new(store.clone()), "tests")
                .with_resync(Duration::from_millis(50)),
        );
        let (_stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(informer.clone().run(stop_rx));
        informer.wait_for_sync().await;

        // Each resync re-enqueues the object.
        let queue = informer.queue();
        for _ in 0..3 {
            let key = queue.get().await.unwrap();
            assert_eq!(key, "a");
            queue.done(&key);
        }

        handle.abort();
    }

    #[tokio::test]
    async fn stop_terminates_both_loops() {
        let store = MockStoreClient::new();
        let informer = Arc::new(Informer::new(Arc::new(store), "tests"));
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(informer.clone().run(stop_rx));
        informer.wait_for_sync().await;

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("informer must stop promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn selector_scopes_list_and_watch() {
        let store = MockStoreClient::new();
        let mut tagged = obj("tagged");
        tagged.metadata.set_label("vcops.io/region", "us-east");
        store.create("tests", None, &tagged).await.unwrap();
        store.create("tests", None, &obj("other")).await.unwrap();

        let informer = Arc::new(
            Informer::new(Arc::new(store.clone()), "tests")
                .with_selector("vcops.io/region", "us-east"),
        );
        let (_stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(informer.clone().run(stop_rx));
        informer.wait_for_sync().await;

        assert_eq!(informer.cache().len(), 1);
        assert!(informer.cache().get("tagged").is_some());

        handle.abort();
    }
}
