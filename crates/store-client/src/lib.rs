//! Versioned Object Store Client
//!
//! Client for the external cluster-state store: list/watch/get/create/
//! replace/delete over namespaced and cluster-scoped resources, with
//! optimistic concurrency (resourceVersion) and watch-from-version
//! streaming. The manager is a client of this store, never its
//! implementation.
//!
//! - [`StoreClient`] is the raw, object-safe trait (untyped payloads).
//! - [`HttpStoreClient`] is the production implementation.
//! - [`Api`] is a thin typed wrapper used by the reconcilers.
//! - [`MockStoreClient`] is an in-memory implementation for unit tests.

pub mod api;
pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod objects;
mod store_trait;

pub use api::Api;
pub use client::HttpStoreClient;
pub use error::StoreError;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockStoreClient;
pub use objects::{EventType, ListMeta, ObjectList, WatchEvent};
pub use store_trait::{StoreClient, WatchStream};
