//! Interrupt controllers

pub mod scu_gic;
