//! Thread-safe keyed snapshot of watched objects.
//!
//! One coarse lock over the whole map: watch-driven updates and full
//! relist replacement never interleave, so readers see either the fully
//! old or the fully new map, never a torn one.

use models::DynamicObject;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Latest observed object per key (`namespace/name` or bare `name`).
///
/// Entries are last-write-wins by arrival order. Stale entries for deleted
/// objects are not proactively purged; the periodic full relist replaces
/// the entire map and self-heals any drift.
#[derive(Clone, Default)]
pub struct ObjectCache {
    inner: Arc<Mutex<HashMap<String, DynamicObject>>>,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<DynamicObject> {
        self.inner.lock().unwrap().get(key).cloned()
    }

    pub fn add(&self, key: String, object: DynamicObject) {
        self.inner.lock().unwrap().insert(key, object);
    }

    pub fn delete(&self, key: &str) {
        self.inner.lock().unwrap().remove(key);
    }

    /// Atomically replaces the entire map with what a full list returned.
    pub fn reset(&self, objects: HashMap<String, DynamicObject>) {
        *self.inner.lock().unwrap() = objects;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::Metadata;
    use serde_json::json;

    fn obj(name: &str) -> DynamicObject {
        DynamicObject {
            api_version: "vcops.io/v1".to_string(),
            kind: "Test".to_string(),
            metadata: Metadata::named(name),
            spec: json!({}),
            status: None,
        }
    }

    #[test]
    fn add_get_delete() {
        let cache = ObjectCache::new();
        cache.add("a".to_string(), obj("a"));
        assert!(cache.get("a").is_some());
        assert!(!cache.is_empty());
        cache.delete("a");
        assert!(cache.get("a").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn reset_replaces_whole_map() {
        let cache = ObjectCache::new();
        cache.add("a".to_string(), obj("a"));
        cache.add("b".to_string(), obj("b"));

        let mut fresh = HashMap::new();
        fresh.insert("c".to_string(), obj("c"));
        cache.reset(fresh);

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn reset_is_atomic_under_concurrent_reads() {
        // A reader must observe either the fully old or the fully new map.
        let cache = ObjectCache::new();
        let mut old = HashMap::new();
        old.insert("x".to_string(), obj("old"));
        old.insert("y".to_string(), obj("old"));
        cache.reset(old);

        let reader = {
            let cache = cache.clone();
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    // Both keys read in one pass must come from the same
                    // generation of the map.
                    let map = cache.inner.lock().unwrap();
                    let x = map.get("x").map(|o| o.metadata.name.clone());
                    let y = map.get("y").map(|o| o.metadata.name.clone());
                    assert_eq!(x, y, "torn read across a reset");
                }
            })
        };

        for _ in 0..100 {
            let mut fresh = HashMap::new();
            fresh.insert("x".to_string(), obj("new"));
            fresh.insert("y".to_string(), obj("new"));
            cache.reset(fresh);
        }
        reader.join().unwrap();
    }
}
