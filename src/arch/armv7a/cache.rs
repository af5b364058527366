//! Data cache maintenance by address range
//!
//! Two levels on the Zynq-7000: the Cortex-A9 L1 D-cache (CP15 operations by
//! MVA) and the PL310 L2 controller (operations by physical address; the MMU
//! mapping is flat so MVA == PA). Both use 32-byte lines.
//!
//! The order of the line operations comes from [`maintenance`]: inner
//! before outer when cleaning, and partial lines at either end of an
//! invalidated range are cleaned and invalidated through L1 first so bytes
//! sharing the line with the range survive.
//!
//! ## References
//!
//! - ARM Architecture Reference Manual ARMv7-A, B4.2.1 "Cache and branch
//!   predictor maintenance operations"
//! - CoreLink Level 2 Cache Controller L2C-310 TRM, Section 3.3.10

use super::dsb;
use crate::arch::maintenance::{self, Level, LineOp, Step};
use crate::hal::CacheMaintenance;
use core::arch::asm;
use core::ptr::{read_volatile, write_volatile};

pub const LINE_SIZE: usize = 32;

const L2CC_BASE: usize = 0xF8F0_2000;

mod l2cc {
    pub const CTRL: usize = 0x100;
    pub const SYNC: usize = 0x730;
    pub const INV_PA: usize = 0x770;
    pub const INV_WAY: usize = 0x77C;
    pub const CLEAN_PA: usize = 0x7B0;
    pub const CLEAN_INV_PA: usize = 0x7F0;
}

const L2_ALL_WAYS: u32 = 0xFFFF;

fn l2_write(offset: usize, value: u32) {
    // SAFETY: L2CC_BASE is the PL310 register block, mapped as device memory
    unsafe { write_volatile((L2CC_BASE + offset) as *mut u32, value) }
}

fn l2_read(offset: usize) -> u32 {
    // SAFETY: see l2_write
    unsafe { read_volatile((L2CC_BASE + offset) as *const u32) }
}

fn l2_sync() {
    l2_write(l2cc::SYNC, 0);
    while l2_read(l2cc::SYNC) & 1 != 0 {
        core::hint::spin_loop();
    }
}

fn l1_clean_line(mva: usize) {
    // SAFETY: DCCMVAC only writes back a line; it never loses data
    unsafe { asm!("mcr p15, 0, {}, c7, c10, 1", in(reg) mva, options(nostack)) };
}

fn l1_invalidate_line(mva: usize) {
    // SAFETY: DCIMVAC; callers only pass lines fully owned by the DMA buffer
    unsafe { asm!("mcr p15, 0, {}, c7, c6, 1", in(reg) mva, options(nostack)) };
}

fn l1_clean_invalidate_line(mva: usize) {
    // SAFETY: DCCIMVAC writes the line back before dropping it
    unsafe { asm!("mcr p15, 0, {}, c7, c14, 1", in(reg) mva, options(nostack)) };
}

/// L1 + PL310 data cache of the Zynq-7000
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuCache;

impl CpuCache {
    /// Enable the PL310 after invalidating every way, if the boot loader
    /// left it off
    pub fn enable_l2(&self) {
        if l2_read(l2cc::CTRL) & 1 != 0 {
            return;
        }
        l2_write(l2cc::INV_WAY, L2_ALL_WAYS);
        while l2_read(l2cc::INV_WAY) & L2_ALL_WAYS != 0 {
            core::hint::spin_loop();
        }
        l2_sync();
        l2_write(l2cc::CTRL, 1);
        dsb();
    }
}

/// Execute one maintenance step on this CPU
fn run(step: Step) {
    match step {
        Step::Line(Level::L1, LineOp::Clean, line) => l1_clean_line(line),
        Step::Line(Level::L1, LineOp::Invalidate, line) => l1_invalidate_line(line),
        Step::Line(Level::L1, LineOp::CleanInvalidate, line) => l1_clean_invalidate_line(line),
        Step::Line(Level::L2, LineOp::Clean, line) => l2_write(l2cc::CLEAN_PA, line as u32),
        Step::Line(Level::L2, LineOp::Invalidate, line) => l2_write(l2cc::INV_PA, line as u32),
        Step::Line(Level::L2, LineOp::CleanInvalidate, line) => {
            l2_write(l2cc::CLEAN_INV_PA, line as u32)
        }
        Step::Complete(Level::L1) => dsb(),
        Step::Complete(Level::L2) => l2_sync(),
    }
}

impl CacheMaintenance for CpuCache {
    fn flush_range(&self, addr: usize, len: usize) {
        maintenance::flush_steps(addr, len, LINE_SIZE, run);
    }

    fn invalidate_range(&self, addr: usize, len: usize) {
        maintenance::invalidate_steps(addr, len, LINE_SIZE, run);
    }
}
