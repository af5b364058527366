//! Architecture-specific code
//!
//! Only the Zynq-7000's Cortex-A9 (ARMv7-A) is supported; host builds only
//! get the target-independent [`maintenance`] ordering.

#[cfg(target_arch = "arm")]
pub mod armv7a;
pub mod maintenance;
