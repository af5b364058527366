//! GEM reference clock
//!
//! GEM0's 125 MHz transmit clock is derived from the IO PLL by the SLCR
//! `GEM0_CLK_CTRL` register. The SLCR block is write protected: every
//! modification has to be bracketed by an unlock and a lock key write.
//! [`Slcr::unlocked`] is the only way to get a writable handle, so the
//! bracket cannot be forgotten.
//!
//! ## References
//!
//! - Zynq-7000 TRM (UG585), Appendix B.28 "System Level Control Registers"

use crate::hal::SystemControl;

// ============================================================================
// SLCR Registers
// ============================================================================

/// Write `LOCK_KEY` here to write-protect the block
pub const SLCR_LOCK: usize = 0x004;
/// Write `UNLOCK_KEY` here to allow register writes
pub const SLCR_UNLOCK: usize = 0x008;

pub const LOCK_KEY: u32 = 0x767B;
pub const UNLOCK_KEY: u32 = 0xDF0D;

/// GEM0 reference clock control
pub const GEM0_CLK_CTRL: usize = 0x140;

/// Bits of `GEM0_CLK_CTRL` left alone when reprogramming the divisors
const CLK_CTRL_KEEP: u32 = 0xFC0F_C0FF;
const DIVISOR0_SHIFT: u32 = 8;
const DIVISOR1_SHIFT: u32 = 20;

/// 1 GHz IO PLL / 8 / 1 = 125 MHz for gigabit
pub const GEM0_DIVISOR0: u32 = 8;
pub const GEM0_DIVISOR1: u32 = 1;

/// Write-protected SLCR block
pub struct Slcr<'a, S: SystemControl + ?Sized> {
    regs: &'a mut S,
}

/// SLCR handle valid between the unlock and lock writes
pub struct UnlockedSlcr<'a, S: SystemControl + ?Sized> {
    regs: &'a mut S,
}

impl<'a, S: SystemControl + ?Sized> Slcr<'a, S> {
    pub fn new(regs: &'a mut S) -> Self {
        Self { regs }
    }

    pub fn read(&self, offset: usize) -> u32 {
        self.regs.read(offset)
    }

    /// Unlock, run `f`, lock again
    pub fn unlocked<R>(&mut self, f: impl FnOnce(&mut UnlockedSlcr<'_, S>) -> R) -> R {
        self.regs.write(SLCR_UNLOCK, UNLOCK_KEY);
        let result = f(&mut UnlockedSlcr {
            regs: &mut *self.regs,
        });
        self.regs.write(SLCR_LOCK, LOCK_KEY);
        result
    }
}

impl<S: SystemControl + ?Sized> UnlockedSlcr<'_, S> {
    pub fn read(&self, offset: usize) -> u32 {
        self.regs.read(offset)
    }

    /// Keep the bits in `keep`, OR in `bits`, return the value written
    pub fn modify(&mut self, offset: usize, keep: u32, bits: u32) -> u32 {
        let value = (self.regs.read(offset) & keep) | bits;
        self.regs.write(offset, value);
        value
    }
}

/// Program the GEM0 reference clock divisors
///
/// Returns the new `GEM0_CLK_CTRL` value.
pub fn configure_gem0_clock<S: SystemControl + ?Sized>(
    slcr: &mut Slcr<'_, S>,
    divisor0: u32,
    divisor1: u32,
) -> u32 {
    let bits = (divisor1 << DIVISOR1_SHIFT) | (divisor0 << DIVISOR0_SHIFT);
    slcr.unlocked(|regs| regs.modify(GEM0_CLK_CTRL, CLK_CTRL_KEEP, bits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimSlcr;

    #[test]
    fn test_clock_write_is_bracketed_by_keys() {
        let mut regs = SimSlcr::new();
        regs.preset(GEM0_CLK_CTRL, 0x0050_0801);

        let value = configure_gem0_clock(&mut Slcr::new(&mut regs), GEM0_DIVISOR0, GEM0_DIVISOR1);

        assert_eq!(value, 0x0010_0801);
        assert_eq!(
            regs.writes(),
            &[
                (SLCR_UNLOCK, UNLOCK_KEY),
                (GEM0_CLK_CTRL, 0x0010_0801),
                (SLCR_LOCK, LOCK_KEY)
            ]
        );
    }

    #[test]
    fn test_clock_preserves_unrelated_bits() {
        let mut regs = SimSlcr::new();
        regs.preset(GEM0_CLK_CTRL, 0xFFFF_FFFF);

        let value = configure_gem0_clock(&mut Slcr::new(&mut regs), 8, 1);

        assert_eq!(value, CLK_CTRL_KEEP | (1 << 20) | (8 << 8));
    }
}
