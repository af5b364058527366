//! Cadence GEM (Zynq-7000 Gigabit Ethernet MAC)
//!
//! | Module | Role |
//! |--------|------|
//! | [`gem`] | Register-level controller (the board [`Mac`](crate::hal::Mac)) |
//! | [`clock`] | GEM0 reference clock via the SLCR |
//! | [`phy`] | PHY discovery and link bring-up |
//! | [`dma`] | Uncached descriptor arena |
//! | [`bd`] | Buffer descriptor rings |
//! | [`intr`] | Interrupt dispatch and completion handlers |
//! | [`xfer`] | One send/receive transaction |
//! | [`setup`] | The full diagnostic run |

pub mod bd;
pub mod clock;
pub mod dma;
pub mod gem;
pub mod intr;
pub mod phy;
pub mod setup;
pub mod xfer;

pub use gem::GemController;
pub use setup::{Resources, RunSummary, initialize};
