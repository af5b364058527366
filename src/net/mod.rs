//! Network protocol support
//!
//! Only the link layer: the diagnostic sends and checks raw Ethernet frames.

pub mod ethernet;

pub use ethernet::{FrameBuffer, MacAddress, PayloadKind};
