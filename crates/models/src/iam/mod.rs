//! Identity and access management resource models.

pub mod policy;
pub mod project_member;
pub mod quota;
pub mod role;
pub mod service_account;

pub use policy::*;
pub use project_member::*;
pub use quota::*;
pub use role::*;
pub use service_account::*;
