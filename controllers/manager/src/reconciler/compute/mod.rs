//! Compute resource reconcilers.

pub mod flavor;
pub mod image;
pub mod instance;
pub mod network;
pub mod network_port;
pub mod region;
pub mod volume;
pub mod zone;

#[cfg(test)]
mod region_test;
#[cfg(test)]
mod volume_test;

pub use flavor::FlavorReconciler;
pub use image::ImageReconciler;
pub use instance::InstanceReconciler;
pub use network::NetworkReconciler;
pub use network_port::NetworkPortReconciler;
pub use region::RegionReconciler;
pub use volume::VolumeReconciler;
pub use zone::ZoneReconciler;
