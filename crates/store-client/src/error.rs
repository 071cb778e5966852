//! Store client error types.

use thiserror::Error;

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP transport failure
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Payload (de)serialization failure
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Object does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Lost an optimistic-concurrency race (stale resourceVersion or
    /// duplicate create). Expected during normal operation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Any other store-side error
    #[error("store api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Watch stream ended without an error from the store
    #[error("watch stream closed")]
    WatchClosed,
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
