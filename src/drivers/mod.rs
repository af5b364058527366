//! Device drivers subsystem
//!
//! Organized by device class:
//! - `tty`: serial console
//! - `net`: Ethernet MAC
//! - `irqchip`: interrupt controller
//! - `clocksource`: timers
//! - `clk`: system-level clock control

pub mod clk;
pub mod clocksource;
pub mod irqchip;
pub mod net;
pub mod tty;

/// Console writer used by `print!`
pub mod uart {
    pub use crate::drivers::tty::serial::cadence_uart::*;
}
