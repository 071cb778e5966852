//! VCops Resource Model Definitions
//!
//! Typed models for every resource the Manager reconciles, plus the shared
//! envelope (`Object`), metadata, state machine and task types. Relations
//! between resources are encoded as labels so that label-selector list
//! queries double as the relational index.

pub mod labels;
pub mod object;
pub mod state;
pub mod task;

pub mod compute;
pub mod iam;

pub use labels::*;
pub use object::*;
pub use state::*;
pub use task::*;

pub use compute::*;
pub use iam::*;
