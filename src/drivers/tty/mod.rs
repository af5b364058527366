//! Terminal drivers

pub mod serial;
