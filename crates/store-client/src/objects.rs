//! Wire types for list and watch responses.

use models::DynamicObject;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    /// Store revision the list was served at; a watch started from this
    /// version sees every subsequent change.
    #[serde(default)]
    pub resource_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ObjectList {
    #[serde(default)]
    pub items: Vec<DynamicObject>,
    #[serde(default)]
    pub metadata: ListMeta,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub object: DynamicObject,
}
