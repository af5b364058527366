//! Synchronization primitives
//!
//! State shared with interrupt handlers (the GIC handler table) lives behind
//! an IRQ-disabling [`Mutex`]; everything else uses `spin::Mutex`.

pub mod mutex;

pub use mutex::Mutex;
