//! IAM resource reconcilers.
//!
//! None of these provision external infrastructure; they validate
//! references, mint credentials, and keep usage counters fresh.

pub mod policy;
pub mod project_member;
pub mod quota;
pub mod role;
pub mod service_account;


pub use policy::IamPolicyReconciler;
pub use project_member::ProjectMemberReconciler;
pub use quota::QuotaReconciler;
pub use role::IamRoleReconciler;
pub use service_account::ServiceAccountReconciler;
