//! Zynq-7000 System Level Control Registers
//!
//! Raw register access only; the lock/unlock protocol around writes is
//! enforced by `cadence::clock::Slcr`.
//!
//! ## References
//!
//! - Zynq-7000 TRM (UG585), Section 4.3 and Appendix B "slcr"

use crate::hal::SystemControl;
use core::ptr::{read_volatile, write_volatile};

const SLCR_BASE: usize = 0xF800_0000;

/// Size of the SLCR block
const SLCR_SIZE: usize = 0x1000;

pub struct ZynqSlcr {
    base: usize,
}

impl ZynqSlcr {
    pub const fn new() -> Self {
        Self { base: SLCR_BASE }
    }
}

impl Default for ZynqSlcr {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemControl for ZynqSlcr {
    fn read(&self, offset: usize) -> u32 {
        debug_assert!(offset < SLCR_SIZE && offset % 4 == 0);
        // SAFETY: offset is a word inside the SLCR block, mapped as device
        // memory; reads have no side effects
        unsafe { read_volatile((self.base + offset) as *const u32) }
    }

    fn write(&mut self, offset: usize, value: u32) {
        debug_assert!(offset < SLCR_SIZE && offset % 4 == 0);
        // SAFETY: as for read; `&mut self` serialises writers
        unsafe { write_volatile((self.base + offset) as *mut u32, value) }
    }
}
