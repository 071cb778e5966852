//! Generic reconciliation controller.
//!
//! Binds an [`Informer`] to a [`Reconciler`] through a worker pool.
//! Workers pull keys from the informer's queue, look the object up in
//! the cache (absence means it was deleted) and hand it to the
//! reconciler. A panicking reconciliation is contained to its key; the
//! queue's in-flight bookkeeping is restored by a drop guard either way.

use crate::error::ControllerError;
use crate::informer::Informer;
use crate::workqueue::WorkQueue;
use futures::FutureExt;
use models::{DynamicObject, ResourceState};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Per-resource reconciliation logic.
///
/// `object` is the cached copy at dispatch time; `None` means the object
/// no longer exists in the store. Implementations must be idempotent:
/// the same key may be delivered many times for one logical change.
#[async_trait::async_trait]
pub trait Reconciler: Send + Sync {
    async fn reconcile(
        &self,
        key: &str,
        object: Option<DynamicObject>,
    ) -> Result<(), ControllerError>;
}

/// Runs one resource type's reconciliation loop.
pub struct Controller {
    name: String,
    informer: Arc<Informer>,
    reconciler: Arc<dyn Reconciler>,
    workers: usize,
}

impl Controller {
    pub fn new(
        name: impl Into<String>,
        informer: Informer,
        reconciler: Arc<dyn Reconciler>,
    ) -> Self {
        Self {
            name: name.into(),
            informer: Arc::new(informer),
            reconciler,
            workers: 1,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Runs the informer and worker pool until `stop` flips to true,
    /// then drains in-flight work before returning.
    pub async fn run(self: Arc<Self>, stop: watch::Receiver<bool>) {
        let informer_task = tokio::spawn(self.informer.clone().run(stop.clone()));

        self.informer.wait_for_sync().await;
        info!(controller = %self.name, "cache synced, starting workers");

        // Stopping shuts the queue down so blocked workers wake and exit.
        let queue = self.informer.queue();
        let shutdown_task = {
            let queue = queue.clone();
            let mut stop = stop.clone();
            tokio::spawn(async move {
                let _ = stop.changed().await;
                queue.shut_down();
            })
        };

        let mut workers = Vec::with_capacity(self.workers);
        for i in 0..self.workers {
            workers.push(tokio::spawn(self.clone().worker(i)));
        }
        for worker in workers {
            let _ = worker.await;
        }

        shutdown_task.abort();
        let _ = informer_task.await;
        info!(controller = %self.name, "stopped");
    }

    async fn worker(self: Arc<Self>, index: usize) {
        let queue = self.informer.queue();
        let cache = self.informer.cache();
        while let Some(key) = queue.get().await {
            let _guard = DoneGuard {
                queue: &queue,
                key: &key,
            };
            let object = cache.get(&key).map(mark_pending_deletion);

            let outcome = AssertUnwindSafe(self.reconciler.reconcile(&key, object))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_conflict() => {
                    // Someone else wrote first; the watch event for their
                    // write re-enqueues this key with fresh data.
                    debug!(controller = %self.name, %key, "write conflict, will retry");
                }
                Ok(Err(error)) => {
                    error!(controller = %self.name, %key, %error, "reconciliation failed");
                }
                Err(_) => {
                    error!(controller = %self.name, %key, worker = index, "reconciliation panicked");
                }
            }
        }
    }
}

/// Re-queues the key on drop so a panicking reconciliation cannot leave
/// it stuck in the processing set.
struct DoneGuard<'a> {
    queue: &'a WorkQueue,
    key: &'a str,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.queue.done(self.key);
    }
}

/// Deletion handling shared by every controller: once the store has
/// stamped a deletion timestamp, the observed state is overridden to
/// `ToDelete` unless the object is already in its deletion flow. The
/// per-resource state machines then only ever see deletion as a state.
fn mark_pending_deletion(mut object: DynamicObject) -> DynamicObject {
    if object.metadata.deletion_timestamp.is_some() {
        let in_deletion = object
            .observed_state()
            .map(|s| s.is_deletion_flow())
            .unwrap_or(false);
        if !in_deletion {
            object.force_state(ResourceState::ToDelete);
        }
    }
    object
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use models::Metadata;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use store_client::{MockStoreClient, StoreClient, StoreError};

    fn obj(name: &str) -> DynamicObject {
        DynamicObject {
            api_version: "vcops.io/v1".to_string(),
            kind: "Test".to_string(),
            metadata: Metadata::named(name),
            spec: json!({}),
            status: None,
        }
    }

    /// Records every dispatch for assertions.
    struct Recording {
        seen: Mutex<Vec<(String, Option<DynamicObject>)>>,
    }

    impl Recording {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }

        fn keys(&self) -> Vec<String> {
            self.seen.lock().unwrap().iter().map(|(k, _)| k.clone()).collect()
        }
    }

    #[async_trait::async_trait]
    impl Reconciler for Recording {
        async fn reconcile(
            &self,
            key: &str,
            object: Option<DynamicObject>,
        ) -> Result<(), ControllerError> {
            self.seen.lock().unwrap().push((key.to_string(), object));
            Ok(())
        }
    }

    async fn eventually<F: Fn() -> bool>(cond: F) {
        for _ in 0..100 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not met within deadline");
    }

    #[tokio::test]
    async fn dispatches_cached_objects_to_reconciler() {
        let store = MockStoreClient::new();
        store.create("tests", None, &obj("a")).await.unwrap();

        let reconciler = Recording::new();
        let informer = Informer::new(Arc::new(store), "tests");
        let controller = Arc::new(Controller::new("test", informer, reconciler.clone()));

        let (_stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(controller.run(stop_rx));

        eventually(|| reconciler.keys().contains(&"a".to_string())).await;
        {
            let seen = reconciler.seen.lock().unwrap();
            let (_, object) = &seen[0];
            assert_eq!(object.as_ref().unwrap().metadata.name, "a");
        }
        handle.abort();
    }

    #[tokio::test]
    async fn absent_object_dispatched_as_none() {
        let store = MockStoreClient::new();
        store.create("tests", None, &obj("a")).await.unwrap();

        let reconciler = Recording::new();
        let informer = Informer::new(Arc::new(store.clone()), "tests");
        let controller = Arc::new(Controller::new("test", informer, reconciler.clone()));

        let (_stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(controller.run(stop_rx));
        eventually(|| !reconciler.keys().is_empty()).await;

        store.delete("tests", None, "a").await.unwrap();
        eventually(|| {
            reconciler
                .seen
                .lock()
                .unwrap()
                .iter()
                .any(|(k, o)| k == "a" && o.is_none())
        })
        .await;
        handle.abort();
    }

    #[tokio::test]
    async fn deletion_timestamp_overrides_observed_state() {
        let mut object = obj("a");
        object.metadata.deletion_timestamp = Some(Utc::now());
        object.status = Some(json!({ "state": "Created" }));

        let marked = mark_pending_deletion(object);
        assert_eq!(marked.observed_state(), Some(ResourceState::ToDelete));

        // Already deleting: left alone.
        let mut object = obj("b");
        object.metadata.deletion_timestamp = Some(Utc::now());
        object.status = Some(json!({ "state": "Deleting" }));
        let marked = mark_pending_deletion(object);
        assert_eq!(marked.observed_state(), Some(ResourceState::Deleting));
    }

    #[tokio::test]
    async fn panicking_reconciliation_does_not_stall_other_keys() {
        struct PanicsOnA {
            inner: Arc<Recording>,
        }

        #[async_trait::async_trait]
        impl Reconciler for PanicsOnA {
            async fn reconcile(
                &self,
                key: &str,
                object: Option<DynamicObject>,
            ) -> Result<(), ControllerError> {
                if key == "a" {
                    panic!("boom");
                }
                self.inner.reconcile(key, object).await
            }
        }

        let store = MockStoreClient::new();
        store.create("tests", None, &obj("a")).await.unwrap();
        store.create("tests", None, &obj("b")).await.unwrap();

        let recording = Recording::new();
        let reconciler = Arc::new(PanicsOnA {
            inner: recording.clone(),
        });
        let informer = Informer::new(Arc::new(store), "tests");
        let controller = Arc::new(Controller::new("test", informer, reconciler));

        let (_stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(controller.run(stop_rx));

        eventually(|| recording.keys().contains(&"b".to_string())).await;
        handle.abort();
    }

    #[tokio::test]
    async fn conflict_errors_are_swallowed() {
        struct AlwaysConflicts;

        #[async_trait::async_trait]
        impl Reconciler for AlwaysConflicts {
            async fn reconcile(
                &self,
                _key: &str,
                _object: Option<DynamicObject>,
            ) -> Result<(), ControllerError> {
                Err(ControllerError::Store(StoreError::Conflict(
                    "stale".to_string(),
                )))
            }
        }

        let store = MockStoreClient::new();
        store.create("tests", None, &obj("a")).await.unwrap();

        let informer = Informer::new(Arc::new(store), "tests");
        let controller = Arc::new(Controller::new("test", informer, Arc::new(AlwaysConflicts)));

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(controller.run(stop_rx));
        tokio::time::sleep(Duration::from_millis(200)).await;

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("controller must stop")
            .unwrap();
    }

    #[tokio::test]
    async fn stop_drains_worker_pool() {
        let store = MockStoreClient::new();
        let reconciler = Recording::new();
        let informer = Informer::new(Arc::new(store), "tests");
        let controller =
            Arc::new(Controller::new("test", informer, reconciler).with_workers(4));

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(controller.run(stop_rx));
        tokio::time::sleep(Duration::from_millis(100)).await;

        stop_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("all workers must exit")
            .unwrap();
    }
}
