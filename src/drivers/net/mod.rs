//! Network device drivers

pub mod error;
pub mod ethernet;

pub use error::NetworkError;
