//! Spinlock that masks IRQs while held
//!
//! The GIC handler table is read from the IRQ vector and written from the
//! main loop when a handler is connected. If the main loop held a plain
//! spinlock and the GEM interrupt fired, the IRQ path would spin on a lock
//! its own CPU owns. Masking IRQs for the lifetime of the guard rules that
//! out:
//!
//! 1. Save CPSR, set the I bit
//! 2. Take the spinlock
//! 3. On drop: release the lock, restore the saved I bit
//!
//! Keep critical sections short; completion interrupts are held off while
//! the guard lives.
//!
//! On targets other than ARMv7 the IRQ masking compiles to nothing.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// Mutex that masks IRQs while locked
///
/// ```ignore
/// static GIC: Mutex<ScuGic> = Mutex::new(ScuGic::new());
///
/// GIC.lock().enable_interrupt(irq::GEM0);
/// // IRQs unmasked again here
/// ```
pub struct Mutex<T> {
    inner: UnsafeCell<T>,
    locked: AtomicBool,
}

// SAFETY: the `locked` flag serialises access to `inner`, and IRQs are masked
// on the owning CPU while it is held
unsafe impl<T: Send> Sync for Mutex<T> {}
unsafe impl<T: Send> Send for Mutex<T> {}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: UnsafeCell::new(value),
            locked: AtomicBool::new(false),
        }
    }

    /// Mask IRQs and spin until the lock is ours
    pub fn lock(&self) -> MutexGuard<'_, T> {
        let irq_state = IrqState::disable();

        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }

        MutexGuard {
            mutex: self,
            irq_state,
        }
    }
}

/// Guard returned by [`Mutex::lock`]; restores the IRQ mask on drop
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
    irq_state: IrqState,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: lock is held
        unsafe { &*self.mutex.inner.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: lock is held
        unsafe { &mut *self.mutex.inner.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.locked.store(false, Ordering::Release);
        self.irq_state.restore();
    }
}

/// CPSR I bit
#[cfg(target_arch = "arm")]
const CPSR_IRQ_MASK: u32 = 1 << 7;

/// IRQ mask as it was before the lock was taken
struct IrqState {
    #[cfg_attr(not(target_arch = "arm"), allow(dead_code))]
    cpsr: u32,
}

impl IrqState {
    #[cfg(target_arch = "arm")]
    fn disable() -> Self {
        let cpsr: u32;
        // SAFETY: reading CPSR and setting the I bit only affects IRQ delivery
        // on this CPU; we run in a privileged mode
        unsafe {
            core::arch::asm!("mrs {}, cpsr", out(reg) cpsr, options(nomem, nostack));
            core::arch::asm!("cpsid i", options(nostack));
        }
        Self { cpsr }
    }

    #[cfg(target_arch = "arm")]
    fn restore(&self) {
        if self.cpsr & CPSR_IRQ_MASK == 0 {
            // SAFETY: IRQs were unmasked when the lock was taken
            unsafe { core::arch::asm!("cpsie i", options(nostack)) };
        }
    }

    #[cfg(not(target_arch = "arm"))]
    fn disable() -> Self {
        Self { cpsr: 0 }
    }

    #[cfg(not(target_arch = "arm"))]
    fn restore(&self) {}
}
