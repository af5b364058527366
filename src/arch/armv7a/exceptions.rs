//! Exception handlers called from the vector table in `boot.s`
//!
//! IRQs go to the GIC dispatcher. Every other exception is fatal for a
//! diagnostic run: print what happened and where, then park the core.

use super::wait_for_interrupt;
use crate::drivers::irqchip::scu_gic;
use crate::println;

/// Exception kinds, as passed in r0 by the assembly stubs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ExceptionKind {
    Undefined = 1,
    SupervisorCall = 2,
    PrefetchAbort = 3,
    DataAbort = 4,
    Fiq = 5,
}

impl ExceptionKind {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::Undefined),
            2 => Some(Self::SupervisorCall),
            3 => Some(Self::PrefetchAbort),
            4 => Some(Self::DataAbort),
            5 => Some(Self::Fiq),
            _ => None,
        }
    }
}

fn read_dfsr() -> u32 {
    let value: u32;
    // SAFETY: reading the data fault status register has no side effects
    unsafe { core::arch::asm!("mrc p15, 0, {}, c5, c0, 0", out(reg) value, options(nomem, nostack)) };
    value
}

fn read_dfar() -> u32 {
    let value: u32;
    // SAFETY: reading the data fault address register has no side effects
    unsafe { core::arch::asm!("mrc p15, 0, {}, c6, c0, 0", out(reg) value, options(nomem, nostack)) };
    value
}

#[unsafe(no_mangle)]
extern "C" fn irq_handler_rust() {
    scu_gic::handle_irq();
}

#[unsafe(no_mangle)]
extern "C" fn fault_handler_rust(kind: u32, lr: u32) -> ! {
    match ExceptionKind::from_u32(kind) {
        Some(ExceptionKind::DataAbort) => println!(
            "[FAIL] Data abort at {:#010x}: address {:#010x}, status {:#x}",
            lr.wrapping_sub(8),
            read_dfar(),
            read_dfsr()
        ),
        Some(kind) => println!("[FAIL] {:?} exception, lr={:#010x}", kind, lr),
        None => println!("[FAIL] Unknown exception {}, lr={:#010x}", kind, lr),
    }
    loop {
        wait_for_interrupt();
    }
}
