//! Object envelope and metadata shared by every stored resource.

use crate::state::ResourceState;
use crate::task::Task;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Store-level object metadata.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Unique name within the resource's scope.
    pub name: String,

    /// Tenant/project scoping; absent for cluster-scoped resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Opaque monotonically-advancing optimistic-concurrency token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// Indexable key/value tags; also encode non-primary-key relations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Presence signals a pending deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,

    /// Markers blocking physical deletion until cleanup removes them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
}

impl Metadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn namespaced(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn set_label(&mut self, key: &str, value: impl Into<String>) {
        self.labels.insert(key.to_string(), value.into());
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    pub fn add_finalizer(&mut self, finalizer: &str) {
        if !self.has_finalizer(finalizer) {
            self.finalizers.push(finalizer.to_string());
        }
    }

    pub fn remove_finalizer(&mut self, finalizer: &str) {
        self.finalizers.retain(|f| f != finalizer);
    }
}

/// Typed envelope for one stored resource.
///
/// `spec` is desired state (user/API authored), `status` is observed state
/// (controller authored only).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Object<S, St> {
    pub api_version: String,
    pub kind: String,
    pub metadata: Metadata,
    #[serde(bound(serialize = "S: Serialize", deserialize = "S: Deserialize<'de>"))]
    pub spec: S,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(bound(serialize = "St: Serialize", deserialize = "St: Deserialize<'de>"))]
    pub status: Option<St>,
}

/// Untyped object as carried by the informer, cache and raw store client.
pub type DynamicObject = Object<Value, Value>;

/// Cache/workqueue key: `namespace/name` for namespaced resources, bare
/// `name` otherwise.
pub fn object_key(metadata: &Metadata) -> String {
    match &metadata.namespace {
        Some(ns) => format!("{}/{}", ns, metadata.name),
        None => metadata.name.clone(),
    }
}

/// Static description of a resource type: kind, store path segment, scope.
pub trait ResourceMeta {
    const KIND: &'static str;
    const PLURAL: &'static str;
    const NAMESPACED: bool;

    fn metadata(&self) -> &Metadata;
    fn metadata_mut(&mut self) -> &mut Metadata;

    fn key(&self) -> String {
        object_key(self.metadata())
    }
}

/// Implements [`ResourceMeta`] plus a constructor for a typed `Object` alias.
#[macro_export]
macro_rules! impl_resource {
    ($ty:ty, $spec:ty, kind = $kind:literal, plural = $plural:literal, namespaced = $ns:literal) => {
        impl $crate::ResourceMeta for $ty {
            const KIND: &'static str = $kind;
            const PLURAL: &'static str = $plural;
            const NAMESPACED: bool = $ns;

            fn metadata(&self) -> &$crate::Metadata {
                &self.metadata
            }

            fn metadata_mut(&mut self) -> &mut $crate::Metadata {
                &mut self.metadata
            }
        }

        impl $ty {
            /// New object in the default (ToCreate) state.
            pub fn new(metadata: $crate::Metadata, spec: $spec) -> Self {
                Self {
                    api_version: "vcops.io/v1".to_string(),
                    kind: $kind.to_string(),
                    metadata,
                    spec,
                    status: None,
                }
            }
        }
    };
}

/// Common status fields shared by every reconciled resource.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    #[serde(default)]
    pub state: ResourceState,

    /// Setting this is what moves a resource into the Error state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// At most one in-progress long-running operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
}

/// Access to the embedded [`ResourceStatus`] for resources whose status
/// carries extra fields.
pub trait StatusBase: Default {
    fn base(&self) -> &ResourceStatus;
    fn base_mut(&mut self) -> &mut ResourceStatus;
}

impl StatusBase for ResourceStatus {
    fn base(&self) -> &ResourceStatus {
        self
    }

    fn base_mut(&mut self) -> &mut ResourceStatus {
        self
    }
}

impl<S, St: StatusBase> Object<S, St> {
    /// Status, created on first mutation.
    pub fn status_mut(&mut self) -> &mut St {
        self.status.get_or_insert_with(St::default)
    }

    pub fn state(&self) -> ResourceState {
        self.status
            .as_ref()
            .map(|s| s.base().state)
            .unwrap_or_default()
    }

    pub fn set_state(&mut self, state: ResourceState) {
        self.status_mut().base_mut().state = state;
    }

    /// Records a domain precondition failure, which implicitly moves the
    /// resource into the Error state.
    pub fn set_error(&mut self, message: impl Into<String>) {
        let base = self.status_mut().base_mut();
        base.error_message = Some(message.into());
        base.state = ResourceState::Error;
    }

    pub fn task(&self) -> Option<&Task> {
        self.status.as_ref().and_then(|s| s.base().task.as_ref())
    }

    pub fn set_task(&mut self, task: Option<Task>) {
        self.status_mut().base_mut().task = task;
    }
}

impl DynamicObject {
    /// State as observed on an untyped object, if the status carries one.
    pub fn observed_state(&self) -> Option<ResourceState> {
        self.status
            .as_ref()
            .and_then(|s| s.get("state"))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Forces the state on an untyped object, creating the status if absent.
    pub fn force_state(&mut self, state: ResourceState) {
        let status = self
            .status
            .get_or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(map) = status {
            map.insert(
                "state".to_string(),
                serde_json::to_value(state).unwrap_or(Value::Null),
            );
        }
    }

    /// Converts into a typed model.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(self)?)
    }

    /// Builds an untyped object from a typed model.
    pub fn from_typed<T: Serialize>(typed: &T) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(typed)?)
    }
}
