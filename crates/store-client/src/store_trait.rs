//! StoreClient trait for mocking
//!
//! Abstracts the object store so unit tests run against an in-memory
//! implementation. All async methods must be `Send` to work with Tokio's
//! work-stealing runtime. Payloads are untyped [`DynamicObject`]s; the
//! typed [`crate::Api`] wrapper handles conversion.

use crate::error::StoreError;
use crate::objects::{ObjectList, WatchEvent};
use futures::stream::BoxStream;
use models::DynamicObject;

/// Stream of watch events for one resource type.
pub type WatchStream = BoxStream<'static, Result<WatchEvent, StoreError>>;

/// Raw operations against the versioned object store.
#[async_trait::async_trait]
pub trait StoreClient: Send + Sync {
    /// List objects of one resource type, optionally scoped to a namespace
    /// and filtered by label selectors (logical AND).
    async fn list(
        &self,
        path: &str,
        namespace: Option<&str>,
        selectors: &[(&str, &str)],
    ) -> Result<ObjectList, StoreError>;

    /// Open a watch stream starting after `resource_version`.
    async fn watch(
        &self,
        path: &str,
        namespace: Option<&str>,
        resource_version: Option<&str>,
        selectors: &[(&str, &str)],
    ) -> Result<WatchStream, StoreError>;

    async fn get(
        &self,
        path: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, StoreError>;

    /// Fails with [`StoreError::Conflict`] if the name already exists.
    async fn create(
        &self,
        path: &str,
        namespace: Option<&str>,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    /// Fails with [`StoreError::Conflict`] on a stale resourceVersion.
    async fn replace(
        &self,
        path: &str,
        namespace: Option<&str>,
        name: &str,
        object: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    async fn delete(
        &self,
        path: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), StoreError>;
}
