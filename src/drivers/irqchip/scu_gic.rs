//! SCU GIC (PL390) driver for the Zynq-7000 Cortex-A9 MPCore.
//!
//! - Distributor: routing, priority, trigger type and per-ID enable
//! - CPU interface: acknowledge and end-of-interrupt
//! - Handler table: one `fn()` per interrupt ID, filled by
//!   [`InterruptController::connect`] and consulted by [`handle_irq`]
//!
//! The controller lives in [`GIC`], behind the IRQ-masking
//! [`crate::sync::Mutex`] because the IRQ vector reads the handler table.
//! Drivers reach it through [`SharedGic`], which takes the lock per call so
//! no guard is held while the driver waits for its own interrupts.
//!
//! Interrupts with no handler are recorded in [`UNHANDLED`] from the vector
//! and reported once per ID by [`report_unhandled`] in thread context; the
//! console lock is never taken with IRQs masked.
//!
//! ## References
//!
//! - Zynq-7000 TRM (UG585), Chapter 7 "Interrupts"
//! - ARM Generic Interrupt Controller Architecture Specification v1.0

use crate::hal::{HalError, InterruptController};
use crate::sync::Mutex;
use core::ptr::{read_volatile, write_volatile};
use core::sync::atomic::{AtomicU32, Ordering};

/// Distributor base (SCU private region + 0x1000)
const GICD_BASE: usize = 0xF8F0_1000;

/// CPU interface base (SCU private region + 0x100)
const GICC_BASE: usize = 0xF8F0_0100;

/// Interrupt IDs the Zynq-7000 GIC implements
pub const IRQ_COUNT: usize = 96;

/// Returned by the acknowledge register when nothing is pending
pub const SPURIOUS: u32 = 1023;

#[allow(dead_code)]
mod gicd_offsets {
    pub const CTLR: usize = 0x000;
    pub const ISENABLER: usize = 0x100;
    pub const ICENABLER: usize = 0x180;
    pub const ICPENDR: usize = 0x280;
    pub const IPRIORITYR: usize = 0x400;
    pub const ITARGETSR: usize = 0x800;
    pub const ICFGR: usize = 0xC00;
}

#[allow(dead_code)]
mod gicc_offsets {
    pub const CTLR: usize = 0x000;
    pub const PMR: usize = 0x004;
    pub const BPR: usize = 0x008;
    pub const IAR: usize = 0x00C;
    pub const EOIR: usize = 0x010;
}

/// ICFGR encodings (two bits per ID, upper bit selects edge)
mod int_cfg {
    pub const LEVEL_HIGH: u32 = 0b01;
}

/// Zynq-7000 shared peripheral interrupt IDs, UG585 Table 7-4
pub mod irq {
    pub const GEM0: u32 = 54;
    pub const GEM1: u32 = 77;
    pub const UART1: u32 = 82;
}

pub static GIC: Mutex<ScuGic> = Mutex::new(ScuGic::new());

pub struct ScuGic {
    gicd_base: usize,
    gicc_base: usize,
    handlers: [Option<fn()>; IRQ_COUNT],
    initialized: bool,
}

impl ScuGic {
    pub const fn new() -> Self {
        ScuGic {
            gicd_base: GICD_BASE,
            gicc_base: GICC_BASE,
            handlers: [None; IRQ_COUNT],
            initialized: false,
        }
    }

    /// Route every SPI to CPU 0, level triggered, mid priority; enable both
    /// interfaces with all priorities unmasked
    pub fn init(&mut self) {
        self.gicd_write(gicd_offsets::CTLR, 0);

        for int_id in 32..IRQ_COUNT as u32 {
            self.gicd_write(gicd_offsets::ICENABLER + (int_id as usize / 32) * 4, 1 << (int_id % 32));
            self.set_priority(int_id, 0xA0);
            self.set_target(int_id, 0x01);
            self.set_config(int_id, int_cfg::LEVEL_HIGH);
        }

        self.gicd_write(gicd_offsets::CTLR, 1);
        self.gicc_write(gicc_offsets::PMR, 0xF0);
        self.gicc_write(gicc_offsets::BPR, 0);
        self.gicc_write(gicc_offsets::CTLR, 1);

        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Handler currently connected to `int_id`
    pub fn handler(&self, int_id: u32) -> Option<fn()> {
        self.handlers.get(int_id as usize).copied().flatten()
    }

    pub fn enable_interrupt(&self, int_id: u32) {
        if !self.initialized || int_id as usize >= IRQ_COUNT {
            return;
        }
        let reg_offset = gicd_offsets::ISENABLER + (int_id as usize / 32) * 4;
        self.gicd_write(reg_offset, 1 << (int_id % 32));
    }

    pub fn disable_interrupt(&self, int_id: u32) {
        if !self.initialized || int_id as usize >= IRQ_COUNT {
            return;
        }
        let reg_offset = gicd_offsets::ICENABLER + (int_id as usize / 32) * 4;
        self.gicd_write(reg_offset, 1 << (int_id % 32));
    }

    /// Read IAR; the low ten bits are the interrupt ID, 1023 when spurious
    pub fn acknowledge_interrupt(&self) -> u32 {
        self.gicc_read(gicc_offsets::IAR)
    }

    /// `iar` is the unmodified value returned by the acknowledge
    pub fn end_of_interrupt(&self, iar: u32) {
        self.gicc_write(gicc_offsets::EOIR, iar);
    }

    fn set_priority(&self, int_id: u32, priority: u8) {
        // SAFETY: IPRIORITYR is byte addressable, one byte per ID
        unsafe {
            let addr = (self.gicd_base + gicd_offsets::IPRIORITYR + int_id as usize) as *mut u8;
            write_volatile(addr, priority);
        }
    }

    fn set_target(&self, int_id: u32, cpu_mask: u8) {
        // SAFETY: ITARGETSR is byte addressable, one byte per ID
        unsafe {
            let addr = (self.gicd_base + gicd_offsets::ITARGETSR + int_id as usize) as *mut u8;
            write_volatile(addr, cpu_mask);
        }
    }

    fn set_config(&self, int_id: u32, config: u32) {
        let reg_offset = gicd_offsets::ICFGR + (int_id as usize / 16) * 4;
        let shift = (int_id % 16) * 2;
        let mut val = self.gicd_read(reg_offset);
        val &= !(0b11 << shift);
        val |= config << shift;
        self.gicd_write(reg_offset, val);
    }

    fn gicd_read(&self, offset: usize) -> u32 {
        // SAFETY: GICD_BASE is the distributor of the Cortex-A9 private
        // region, mapped as device memory; offset is a register in it
        unsafe { read_volatile((self.gicd_base + offset) as *const u32) }
    }

    fn gicd_write(&self, offset: usize, value: u32) {
        // SAFETY: see gicd_read
        unsafe { write_volatile((self.gicd_base + offset) as *mut u32, value) }
    }

    fn gicc_read(&self, offset: usize) -> u32 {
        // SAFETY: GICC_BASE is the CPU interface of the private region
        unsafe { read_volatile((self.gicc_base + offset) as *const u32) }
    }

    fn gicc_write(&self, offset: usize, value: u32) {
        // SAFETY: see gicc_read
        unsafe { write_volatile((self.gicc_base + offset) as *mut u32, value) }
    }
}

impl Default for ScuGic {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptController for ScuGic {
    fn connect(&mut self, id: u32, handler: fn()) -> Result<(), HalError> {
        let slot = self
            .handlers
            .get_mut(id as usize)
            .ok_or(HalError::InvalidState)?;
        *slot = Some(handler);
        Ok(())
    }

    fn enable(&mut self, id: u32) {
        self.enable_interrupt(id);
    }

    fn disable(&mut self, id: u32) {
        self.disable_interrupt(id);
    }

    fn disconnect(&mut self, id: u32) {
        if let Some(slot) = self.handlers.get_mut(id as usize) {
            *slot = None;
        }
    }
}

/// [`InterruptController`] over the global [`GIC`], one lock per operation
pub struct SharedGic;

impl InterruptController for SharedGic {
    fn connect(&mut self, id: u32, handler: fn()) -> Result<(), HalError> {
        GIC.lock().connect(id, handler)
    }

    fn enable(&mut self, id: u32) {
        GIC.lock().enable(id);
    }

    fn disable(&mut self, id: u32) {
        GIC.lock().disable(id);
    }

    fn disconnect(&mut self, id: u32) {
        GIC.lock().disconnect(id);
    }
}

const BITMAP_WORDS: usize = IRQ_COUNT.div_ceil(32);

/// Interrupt IDs that fired with no handler connected
pub struct UnhandledIrqs {
    seen: [AtomicU32; BITMAP_WORDS],
    pending: [AtomicU32; BITMAP_WORDS],
}

impl UnhandledIrqs {
    pub const fn new() -> Self {
        Self {
            seen: [const { AtomicU32::new(0) }; BITMAP_WORDS],
            pending: [const { AtomicU32::new(0) }; BITMAP_WORDS],
        }
    }

    /// Note `id`; returns true the first time it is seen
    pub fn record(&self, id: u32) -> bool {
        let (word, bit) = (id as usize / 32, 1 << (id % 32));
        let Some(seen) = self.seen.get(word) else {
            return false;
        };
        let first = seen.fetch_or(bit, Ordering::Relaxed) & bit == 0;
        if first {
            self.pending[word].fetch_or(bit, Ordering::Release);
        }
        first
    }

    /// Hand each recorded ID to `report` once, lowest first
    pub fn drain(&self, mut report: impl FnMut(u32)) {
        for (word, pending) in self.pending.iter().enumerate() {
            let mut bits = pending.swap(0, Ordering::Acquire);
            while bits != 0 {
                let bit = bits.trailing_zeros();
                report(word as u32 * 32 + bit);
                bits &= bits - 1;
            }
        }
    }
}

impl Default for UnhandledIrqs {
    fn default() -> Self {
        Self::new()
    }
}

pub static UNHANDLED: UnhandledIrqs = UnhandledIrqs::new();

/// Print the unhandled interrupt IDs recorded since the last call
///
/// Thread context only.
pub fn report_unhandled() {
    UNHANDLED.drain(|id| crate::println!("[WARN] Unhandled interrupt {}", id));
}

/// Service one IRQ exception: acknowledge, run the connected handler with
/// the lock released, signal end of interrupt
pub fn handle_irq() {
    let (iar, handler) = {
        let gic = GIC.lock();
        let iar = gic.acknowledge_interrupt();
        (iar, gic.handler(iar & 0x3FF))
    };
    if iar & 0x3FF == SPURIOUS {
        return;
    }

    match handler {
        Some(handler) => handler(),
        None => {
            UNHANDLED.record(iar & 0x3FF);
        }
    }

    GIC.lock().end_of_interrupt(iar);
}
