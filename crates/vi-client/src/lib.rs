//! Virtual Infrastructure Client
//!
//! Synchronous-RPC-with-task-polling client for the hypervisor backing the
//! VCops manager: inventory lookups, VM clone/power/destroy, disk
//! create/clone/grow/attach/detach/delete. Long-running operations return
//! a [`TaskRef`] that callers poll; everything is safe to retry
//! (at-least-once semantics, idempotent from the caller's side).

pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod models;
mod vi_trait;

pub use client::HttpViClient;
pub use error::ViError;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockViClient;
pub use models::*;
pub use vi_trait::ViClient;
