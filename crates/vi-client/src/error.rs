//! Hypervisor client error types.

use thiserror::Error;

/// Errors surfaced by hypervisor operations.
#[derive(Debug, Error)]
pub enum ViError {
    /// HTTP transport failure
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Payload (de)serialization failure
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Referenced inventory object does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Request rejected by the hypervisor
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Hypervisor-side task failure
    #[error("task failed: {0}")]
    Task(String),
}
