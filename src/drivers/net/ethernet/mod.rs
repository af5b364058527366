//! Ethernet MAC drivers, by vendor

pub mod cadence;
