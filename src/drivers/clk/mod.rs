//! Clock and reset control

pub mod zynq_slcr;
