//! Compute and networking resource models.

pub mod flavor;
pub mod image;
pub mod instance;
pub mod network;
pub mod network_port;
pub mod region;
pub mod volume;
pub mod zone;

pub use flavor::*;
pub use image::*;
pub use instance::*;
pub use network::*;
pub use network_port::*;
pub use region::*;
pub use volume::*;
pub use zone::*;
