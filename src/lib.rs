//! Bare-metal diagnostic driver for the Zynq-7000 Gigabit Ethernet MAC.
//!
//! Brings up GEM0 and its PHY at 1000 Mb/s, then repeatedly transmits one
//! Ethernet frame through the DMA engine and waits for it to come back
//! through an external loopback, reporting every step on the UART console.
//!
//! The GEM core (`drivers::net::ethernet::cadence`) reaches hardware only
//! through the traits in [`hal`]; the board implementations live in
//! [`drivers`] and [`arch`]. Host builds compile everything except the
//! ARMv7 architecture code and run the tests against a simulated board.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod config;
pub mod drivers;
pub mod hal;
pub mod net;
pub mod sync;
pub mod wait;

#[cfg(test)]
pub(crate) mod testing;

use core::fmt;

/// Bring up the serial console
///
/// Output printed before this is dropped.
pub fn init() {
    drivers::uart::WRITER.lock().init();
}

/// Print implementation that acquires the UART writer lock
#[doc(hidden)]
#[cfg(not(test))]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    // The writer itself never fails
    let _ = drivers::uart::WRITER.lock().write_fmt(args);
}

/// Host tests log to the captured test output instead of the UART
#[doc(hidden)]
#[cfg(test)]
pub fn _print(args: fmt::Arguments) {
    std::print!("{}", args);
}

/// Print macro for console output
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::_print(format_args!($($arg)*)));
}

/// Println macro for console output
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}
