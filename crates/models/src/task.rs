//! Persisted long-running operation handle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single in-progress long-running operation against external
/// infrastructure, persisted in a resource's status.
///
/// At most one task is attached to a resource at a time. The kwargs map
/// carries whatever the reconciler needs to resume after a restart, most
/// commonly a remembered hypervisor task handle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Operation name (e.g. "clone", "stop", "attach_volume").
    pub name: String,

    /// Resumable operation parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kwargs: BTreeMap<String, serde_json::Value>,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kwargs: BTreeMap::new(),
        }
    }

    pub fn with_kwarg(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.kwargs.insert(key.to_string(), value.into());
        self
    }

    pub fn kwarg_str(&self, key: &str) -> Option<&str> {
        self.kwargs.get(key).and_then(|v| v.as_str())
    }

    pub fn kwarg_u64(&self, key: &str) -> Option<u64> {
        self.kwargs.get(key).and_then(|v| v.as_u64())
    }

    pub fn kwarg_bool(&self, key: &str) -> Option<bool> {
        self.kwargs.get(key).and_then(|v| v.as_bool())
    }
}
