//! Network driver errors
//!
//! One `Copy` error type for everything the GEM core can report
//! synchronously. Asynchronous device errors never surface here: the error
//! handler counts and records them, and the orchestrator logs the
//! classification (see `cadence::intr`).
//!
//! ## Taxonomy
//!
//! - **Configuration**: unknown device, oversized payload, ring setup, PHY not
//!   found, interrupt connection. Abort initialization.
//! - **Register access**: MDIO or MAC register failure. Fatal or tolerated
//!   depending on [`RegisterPolicy`](crate::config::RegisterPolicy).
//! - **Timeouts**: link never came up, frame never left, frame never arrived.

use crate::drivers::net::ethernet::cadence::bd::RingError;
use crate::hal::HalError;
use core::fmt;

/// Which half of the link poll ran out of budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStage {
    AutoNegotiation,
    LinkStatus,
}

/// Register operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOp {
    PhyRead { phy_addr: u8, reg: u8 },
    PhyWrite { phy_addr: u8, reg: u8 },
    StationAddress,
}

/// Errors that can occur while bringing up or driving the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkError {
    /// No MAC configuration matches the requested device id
    DeviceNotFound { device_id: u16 },

    /// Configured payload does not fit the frame buffer
    PayloadTooLarge { size: usize, max: usize },

    /// No PHY answered on any MDIO address
    PhyNotFound,

    /// Ring creation or a ring operation was rejected
    Ring(RingError),

    /// The descriptor arena cannot hold both rings
    ArenaTooSmall { required: usize, available: usize },

    /// MDIO or MAC register access failed
    RegisterAccess { op: RegisterOp, cause: HalError },

    /// The interrupt controller refused the handler
    InterruptSetup { irq: u32 },

    /// Link did not come up within the poll budget
    LinkDown { stage: LinkStage },

    /// Transmit-complete interrupt never arrived
    TransmitTimeout,

    /// Frame-received interrupt never arrived
    ReceiveTimeout,
}

impl From<RingError> for NetworkError {
    fn from(e: RingError) -> Self {
        NetworkError::Ring(e)
    }
}

impl fmt::Display for LinkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkStage::AutoNegotiation => write!(f, "autonegotiation"),
            LinkStage::LinkStatus => write!(f, "link status"),
        }
    }
}

impl fmt::Display for RegisterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterOp::PhyRead { phy_addr, reg } => {
                write!(f, "PHY {} register {} read", phy_addr, reg)
            }
            RegisterOp::PhyWrite { phy_addr, reg } => {
                write!(f, "PHY {} register {} write", phy_addr, reg)
            }
            RegisterOp::StationAddress => write!(f, "station address write"),
        }
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::DeviceNotFound { device_id } => {
                write!(f, "No MAC configuration for device {}", device_id)
            }
            NetworkError::PayloadTooLarge { size, max } => {
                write!(f, "Payload of {} bytes exceeds the {} byte maximum", size, max)
            }
            NetworkError::PhyNotFound => write!(f, "PHY not found"),
            NetworkError::Ring(e) => write!(f, "Ring error: {}", e),
            NetworkError::ArenaTooSmall {
                required,
                available,
            } => write!(
                f,
                "Descriptor arena too small ({} bytes, need {})",
                available, required
            ),
            NetworkError::RegisterAccess { op, cause } => write!(f, "{} failed: {}", op, cause),
            NetworkError::InterruptSetup { irq } => {
                write!(f, "Failed to connect interrupt {}", irq)
            }
            NetworkError::LinkDown { stage } => {
                write!(f, "Link did not come up ({} timed out)", stage)
            }
            NetworkError::TransmitTimeout => write!(f, "Transmit timeout"),
            NetworkError::ReceiveTimeout => write!(f, "Receive timeout"),
        }
    }
}
