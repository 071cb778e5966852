//! Well-known label keys and the controller finalizer.
//!
//! Relations between resources are stored as labels on the owning object,
//! never as foreign keys. Listing with a label selector is therefore the
//! relational index ("all instances in zone X" is a single list call).

/// Project (tenant) owning a namespaced resource.
pub const LABEL_PROJECT: &str = "vcops.io/project";

/// Region a Zone, Image, Instance or Volume belongs to.
pub const LABEL_REGION: &str = "vcops.io/region";

/// Zone an Instance was placed in.
pub const LABEL_ZONE: &str = "vcops.io/zone";

/// Network a NetworkPort belongs to.
pub const LABEL_NETWORK: &str = "vcops.io/network";

/// Instance a NetworkPort or Volume is currently attached to.
pub const LABEL_INSTANCE: &str = "vcops.io/instance";

/// Role referenced by an IamPolicy or ProjectMember.
pub const LABEL_ROLE: &str = "vcops.io/role";

/// Finalizer placed on every managed resource. Physical deletion only
/// happens after the manager removes it.
pub const FINALIZER: &str = "vcops.io/manager";
