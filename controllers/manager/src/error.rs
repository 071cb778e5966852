//! Controller-specific error types.

use store_client::StoreError;
use thiserror::Error;
use vi_client::ViError;

/// Errors that can occur in the Manager's controllers.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Object store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Hypervisor error
    #[error("hypervisor error: {0}")]
    Vi(#[from] ViError),

    /// Object could not be converted to its typed model
    #[error("invalid object {key}: {source}")]
    InvalidObject {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ControllerError {
    /// Lost an optimistic-concurrency race; expected, retried by the next
    /// reconciliation, never logged as an error.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }
}
