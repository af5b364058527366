//! Cortex-A9 MPCore global timer.
//!
//! A 64-bit up-counter shared by both cores, clocked at half the CPU clock
//! (333.33 MHz with the 666.67 MHz CPU of the ZC702). It backs the
//! microsecond [`Clock`] used for every poll loop and inter-transaction delay.
//!
//! ## Register Layout
//!
//! | Offset | Register | Purpose |
//! |--------|----------|---------|
//! | +0x00  | CNT_LO   | Counter bits 31:0 |
//! | +0x04  | CNT_HI   | Counter bits 63:32 |
//! | +0x08  | CTRL     | Bit 0 enables the counter |
//!
//! ## References
//!
//! - Cortex-A9 MPCore TRM, Section 4.3 "Global timer"
//! - Zynq-7000 TRM (UG585), Section 8.3

use crate::hal::Clock;
use core::ptr;

const GLOBAL_TIMER_BASE: usize = 0xF8F0_0200;

/// Counter frequency: CPU_3x2x clock, half of the 666.67 MHz CPU clock
pub const GLOBAL_TIMER_HZ: u64 = 333_333_333;

mod offset {
    pub const CNT_LO: usize = 0x00;
    pub const CNT_HI: usize = 0x04;
    pub const CTRL: usize = 0x08;
}

const CTRL_ENABLE: u32 = 1 << 0;

/// Convert counter ticks to microseconds
///
/// `GLOBAL_TIMER_HZ * 3` is one tick short of 10^9, so `ticks * 3 / 1000`
/// stays within a microsecond per 10^9 elapsed.
#[inline]
pub const fn ticks_to_us(ticks: u64) -> u64 {
    ticks.saturating_mul(3) / 1000
}

/// Handle to the global timer
#[derive(Debug, Clone, Copy)]
pub struct GlobalTimer {
    base: usize,
}

impl GlobalTimer {
    pub const fn new() -> Self {
        Self {
            base: GLOBAL_TIMER_BASE,
        }
    }

    /// Start the counter if the first-stage bootloader left it stopped
    pub fn init(&self) {
        let ctrl = self.read(offset::CTRL);
        if ctrl & CTRL_ENABLE == 0 {
            self.write(offset::CTRL, ctrl | CTRL_ENABLE);
        }
    }

    /// Full 64-bit count; re-reads the high word to catch a low-word carry
    pub fn read_counter(&self) -> u64 {
        loop {
            let hi1 = self.read(offset::CNT_HI);
            let lo = self.read(offset::CNT_LO);
            let hi2 = self.read(offset::CNT_HI);
            if hi1 == hi2 {
                return ((hi1 as u64) << 32) | (lo as u64);
            }
        }
    }

    fn read(&self, offset: usize) -> u32 {
        // SAFETY: base is the global timer in the Cortex-A9 private region,
        // mapped as device memory; reads have no side effects
        unsafe { ptr::read_volatile((self.base + offset) as *const u32) }
    }

    fn write(&self, offset: usize, value: u32) {
        // SAFETY: see read
        unsafe { ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }
}

impl Default for GlobalTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for GlobalTimer {
    fn now_us(&self) -> u64 {
        ticks_to_us(self.read_counter())
    }

    /// Busy-wait; the counter never wraps in practice (1700+ years)
    fn delay_us(&self, microseconds: u64) {
        let target = self.now_us().saturating_add(microseconds);
        while self.now_us() < target {
            core::hint::spin_loop();
        }
    }
}
