//! Serial console drivers

pub mod cadence_uart;

pub use cadence_uart::*;
