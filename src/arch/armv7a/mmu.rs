//! ARMv7-A short-descriptor MMU setup
//!
//! One level of 1 MiB sections, identity mapped (VA == PA), so addresses
//! handed to the GEM DMA engine are usable as-is.
//!
//! ## Memory Layout
//!
//! | Range | Attributes |
//! |-------|------------|
//! | 0x0000_0000 - 0x3FFF_FFFF (DDR) | Normal, write-back write-allocate |
//! | descriptor arena section(s) | Device, execute-never |
//! | 0x4000_0000 - 0xFFEF_FFFF (PL, IOP, SLCR, private) | Device, execute-never |
//! | 0xFFF0_0000 - 0xFFFF_FFFF (OCM high) | Normal, write-back write-allocate |
//!
//! ## References
//!
//! - ARM Architecture Reference Manual ARMv7-A, B3.5 "Short-descriptor
//!   translation table format"
//! - Zynq-7000 TRM (UG585), Table 4-1 "System-Level Address Map"

use super::{dsb, isb};
use core::arch::asm;
use core::ptr::addr_of_mut;

const SECTION_SHIFT: usize = 20;
pub const SECTION_SIZE: usize = 1 << SECTION_SHIFT;
const TABLE_ENTRIES: usize = 4096;

/// End of DDR as seen by the CPU
const DDR_END: usize = 0x4000_0000;

/// Start of the high on-chip memory section
const OCM_HIGH: usize = 0xFFF0_0000;

// Section descriptor fields, ARM ARM Figure B3-4
const SECTION: u32 = 0b10;
const B: u32 = 1 << 2;
const C: u32 = 1 << 3;
const XN: u32 = 1 << 4;
const AP_RW: u32 = 0b11 << 10;
const TEX_001: u32 = 0b001 << 12;

/// Normal memory, inner and outer write-back write-allocate
pub const NORMAL_WB: u32 = SECTION | AP_RW | TEX_001 | C | B;

/// Shareable device memory, never executed
pub const DEVICE: u32 = SECTION | AP_RW | XN | B;

/// SCTLR bits
mod sctlr {
    pub const M: u32 = 1 << 0; // MMU
    pub const C: u32 = 1 << 2; // Data cache
    pub const Z: u32 = 1 << 11; // Branch prediction
    pub const I: u32 = 1 << 12; // Instruction cache
}

/// Domain 0 as client: permissions are checked
const DACR_CLIENT_D0: u32 = 0b01;

#[repr(C, align(16384))]
struct TranslationTable([u32; TABLE_ENTRIES]);

static mut TRANSLATION_TABLE: TranslationTable = TranslationTable([0; TABLE_ENTRIES]);

/// Section descriptor for the section starting at `addr`
fn section_entry(addr: usize, uncached: &core::ops::Range<usize>) -> u32 {
    let attrs = if uncached.contains(&addr) {
        DEVICE
    } else if addr < DDR_END || addr >= OCM_HIGH {
        NORMAL_WB
    } else {
        DEVICE
    };
    addr as u32 | attrs
}

/// Build the flat map and turn on the MMU, caches and branch prediction
///
/// `uncached_base..uncached_base + uncached_len` (rounded out to whole
/// sections) is mapped as device memory for the descriptor rings.
///
/// # Safety
///
/// Must be called once, early, with IRQs masked and the MMU off.
pub unsafe fn init(uncached_base: usize, uncached_len: usize) {
    let start = uncached_base & !(SECTION_SIZE - 1);
    let end = (uncached_base + uncached_len).next_multiple_of(SECTION_SIZE);
    let uncached = start..end;

    // SAFETY: single caller before anything else uses the table
    let table = unsafe { &mut (*addr_of_mut!(TRANSLATION_TABLE)).0 };
    for (index, entry) in table.iter_mut().enumerate() {
        *entry = section_entry(index << SECTION_SHIFT, &uncached);
    }
    dsb();

    let ttbr0 = table.as_ptr() as u32;
    // SAFETY: the table maps everything the program touches with the same
    // addresses, so enabling translation does not move anything
    unsafe {
        asm!("mcr p15, 0, {}, c8, c7, 0", in(reg) 0u32, options(nostack)); // TLBIALL
        asm!("mcr p15, 0, {}, c2, c0, 2", in(reg) 0u32, options(nostack)); // TTBCR: TTBR0 only
        asm!("mcr p15, 0, {}, c2, c0, 0", in(reg) ttbr0, options(nostack)); // TTBR0
        asm!("mcr p15, 0, {}, c3, c0, 0", in(reg) DACR_CLIENT_D0, options(nostack)); // DACR
        asm!("mcr p15, 0, {}, c7, c5, 0", in(reg) 0u32, options(nostack)); // ICIALLU
        asm!("mcr p15, 0, {}, c7, c5, 6", in(reg) 0u32, options(nostack)); // BPIALL
    }
    dsb();
    isb();

    let mut control: u32;
    // SAFETY: read-modify-write of SCTLR enabling translation and caches
    unsafe {
        asm!("mrc p15, 0, {}, c1, c0, 0", out(reg) control, options(nomem, nostack));
        control |= sctlr::M | sctlr::C | sctlr::Z | sctlr::I;
        asm!("mcr p15, 0, {}, c1, c0, 0", in(reg) control, options(nostack));
    }
    isb();
}
