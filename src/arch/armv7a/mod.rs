//! ARMv7-A (Cortex-A9) support
//!
//! Exception entry, the flat section-mapped MMU setup and the data cache
//! maintenance the GEM driver needs on a non-coherent platform.

pub mod cache;
pub mod exceptions;
pub mod mmu;

use core::arch::asm;

/// Unmask IRQs in CPSR
pub fn enable_irq() {
    // SAFETY: only changes interrupt delivery on this CPU; handlers are
    // installed before this is called
    unsafe { asm!("cpsie i", options(nostack)) };
}

pub fn disable_irq() {
    // SAFETY: only masks interrupt delivery on this CPU
    unsafe { asm!("cpsid i", options(nostack)) };
}

/// Sleep until the next interrupt
#[inline]
pub fn wait_for_interrupt() {
    // SAFETY: wfi has no architectural side effects beyond the sleep
    unsafe { asm!("wfi", options(nomem, nostack)) };
}

#[inline]
pub fn dsb() {
    // SAFETY: barrier only
    unsafe { asm!("dsb", options(nostack)) };
}

#[inline]
pub fn isb() {
    // SAFETY: barrier only
    unsafe { asm!("isb", options(nostack)) };
}
