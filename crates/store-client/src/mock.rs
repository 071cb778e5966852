//! Mock store client for unit testing
//!
//! In-memory implementation of [`StoreClient`] with real optimistic
//! concurrency (a global monotonically increasing revision, conflict on
//! stale resourceVersion and on duplicate create) and live watch streams
//! fed from a broadcast channel.
//!
//! Watches only deliver events raised after subscription; callers follow
//! the informer discipline of list-then-watch, so this matches how the
//! manager consumes the real store.

use crate::error::StoreError;
use crate::objects::{EventType, ListMeta, ObjectList, WatchEvent};
use crate::store_trait::{StoreClient, WatchStream};
use futures::StreamExt;
use models::{object_key, DynamicObject};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

#[derive(Default)]
struct Inner {
    revision: u64,
    /// path -> (namespace/name or name) -> object
    buckets: HashMap<String, BTreeMap<String, DynamicObject>>,
}

/// Mock store for testing.
#[derive(Clone)]
pub struct MockStoreClient {
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<(String, WatchEvent)>,
}

impl Default for MockStoreClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStoreClient {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            events,
        }
    }

    /// Every stored object under one path, in key order (for assertions).
    pub fn stored(&self, path: &str) -> Vec<DynamicObject> {
        let inner = self.inner.lock().unwrap();
        inner
            .buckets
            .get(path)
            .map(|b| b.values().cloned().collect())
            .unwrap_or_default()
    }

    /// True if the object exists (for assertions).
    pub fn contains(&self, path: &str, key: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .buckets
            .get(path)
            .map(|b| b.contains_key(key))
            .unwrap_or(false)
    }

    fn emit(&self, path: &str, event_type: EventType, object: DynamicObject) {
        // No receivers is fine; watches come and go.
        let _ = self.events.send((
            path.to_string(),
            WatchEvent { event_type, object },
        ));
    }
}

fn matches_selectors(obj: &DynamicObject, selectors: &[(String, String)]) -> bool {
    selectors
        .iter()
        .all(|(k, v)| obj.metadata.labels.get(k).map(String::as_str) == Some(v.as_str()))
}

fn matches_namespace(obj: &DynamicObject, namespace: Option<&str>) -> bool {
    match namespace {
        Some(ns) => obj.metadata.namespace.as_deref() == Some(ns),
        None => true,
    }
}

#[async_trait::async_trait]
impl StoreClient for MockStoreClient {
    async fn list(
        &self,
        path: &str,
        namespace: Option<&str>,
        selectors: &[(&str, &str)],
    ) -> Result<ObjectList, StoreError> {
        let selectors: Vec<(String, String)> = selectors
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let inner = self.inner.lock().unwrap();
        let items = inner
            .buckets
            .get(path)
            .map(|bucket| {
                bucket
                    .values()
                    .filter(|o| matches_namespace(o, namespace))
                    .filter(|o| matches_selectors(o, &selectors))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(ObjectList {
            items,
            metadata: ListMeta {
                resource_version: inner.revision.to_string(),
            },
        })
    }

    async fn watch(
        &self,
        path: &str,
        namespace: Option<&str>,
        _resource_version: Option<&str>,
        selectors: &[(&str, &str)],
    ) -> Result<WatchStream, StoreError> {
        let path = path.to_string();
        let namespace = namespace.map(|s| s.to_string());
        let selectors: Vec<(String, String)> = selectors
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let rx = self.events.subscribe();
        let stream = futures::stream::unfold(
            (rx, path, namespace, selectors),
            |(mut rx, path, namespace, selectors)| async move {
                loop {
                    match rx.recv().await {
                        Ok((event_path, event)) => {
                            if event_path != path
                                || !matches_namespace(&event.object, namespace.as_deref())
                                || !matches_selectors(&event.object, &selectors)
                            {
                                continue;
                            }
                            return Some((Ok(event), (rx, path, namespace, selectors)));
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            },
        );
        Ok(stream.boxed())
    }

    async fn get(
        &self,
        path: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, StoreError> {
        let key = match namespace {
            Some(ns) => format!("{}/{}", ns, name),
            None => name.to_string(),
        };
        let inner = self.inner.lock().unwrap();
        inner
            .buckets
            .get(path)
            .and_then(|b| b.get(&key))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", path, key)))
    }

    async fn create(
        &self,
        path: &str,
        _namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let mut object = object.clone();
        let key = object_key(&object.metadata);
        let created = {
            let mut inner = self.inner.lock().unwrap();
            let bucket = inner.buckets.entry(path.to_string()).or_default();
            if bucket.contains_key(&key) {
                return Err(StoreError::Conflict(format!(
                    "{}/{} already exists",
                    path, key
                )));
            }
            inner.revision += 1;
            object.metadata.resource_version = Some(inner.revision.to_string());
            object.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
            inner
                .buckets
                .entry(path.to_string())
                .or_default()
                .insert(key, object.clone());
            object
        };
        self.emit(path, EventType::Added, created.clone());
        Ok(created)
    }

    async fn replace(
        &self,
        path: &str,
        namespace: Option<&str>,
        name: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let key = match namespace {
            Some(ns) => format!("{}/{}", ns, name),
            None => name.to_string(),
        };
        let mut object = object.clone();
        let saved = {
            let mut inner = self.inner.lock().unwrap();
            let current_rv = {
                let bucket = inner.buckets.get(path);
                let stored = bucket
                    .and_then(|b| b.get(&key))
                    .ok_or_else(|| StoreError::NotFound(format!("{}/{}", path, key)))?;
                stored.metadata.resource_version.clone()
            };
            if object.metadata.resource_version != current_rv {
                return Err(StoreError::Conflict(format!(
                    "{}/{}: stale resourceVersion",
                    path, key
                )));
            }
            inner.revision += 1;
            object.metadata.resource_version = Some(inner.revision.to_string());
            inner
                .buckets
                .entry(path.to_string())
                .or_default()
                .insert(key, object.clone());
            object
        };
        self.emit(path, EventType::Modified, saved.clone());
        Ok(saved)
    }

    async fn delete(
        &self,
        path: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), StoreError> {
        let key = match namespace {
            Some(ns) => format!("{}/{}", ns, name),
            None => name.to_string(),
        };
        let removed = {
            let mut inner = self.inner.lock().unwrap();
            inner
                .buckets
                .get_mut(path)
                .and_then(|b| b.remove(&key))
                .ok_or_else(|| StoreError::NotFound(format!("{}/{}", path, key)))?
        };
        self.emit(path, EventType::Deleted, removed);
        Ok(())
    }
}
