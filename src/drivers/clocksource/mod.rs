//! Timers and clock sources

pub mod global_timer;
