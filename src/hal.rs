//! Hardware abstraction layer consumed by the GEM core
//!
//! The bring-up sequencer, ring manager, completion handlers and transaction
//! orchestrator only ever touch hardware through these traits. The Zynq-7000
//! implementations live in [`crate::drivers`] and [`crate::arch`]; the host
//! test-suite plugs in a simulated set.
//!
//! ## Traits
//!
//! | Trait | Hardware | Board implementation |
//! |-------|----------|----------------------|
//! | [`Mac`] | GEM MAC, MDIO master, DMA queue pointers | `GemController` |
//! | [`InterruptMask`] | GEM interrupt disable register | `GemController` |
//! | [`InterruptController`] | SCU GIC | `Gic` |
//! | [`CacheMaintenance`] | L1 D-cache + PL310 L2 | `CpuCache` |
//! | [`Clock`] | Cortex-A9 global timer | `GlobalTimer` |
//! | [`SystemControl`] | SLCR block | `ZynqSlcr` |

use crate::net::ethernet::MacAddress;
use core::fmt;

/// Direction of a descriptor ring, an interrupt source or an error report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Receive,
    Transmit,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Receive => write!(f, "receive"),
            Direction::Transmit => write!(f, "transmit"),
        }
    }
}

/// Operating speed programmed into the MAC
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSpeed {
    Speed10,
    Speed100,
    Speed1000,
}

impl LinkSpeed {
    pub const fn mbps(self) -> u32 {
        match self {
            LinkSpeed::Speed10 => 10,
            LinkSpeed::Speed100 => 100,
            LinkSpeed::Speed1000 => 1000,
        }
    }
}

/// MDC clock divisor (GEM `net_cfg[20:18]`)
///
/// MDC must stay below 2.5 MHz; with the 111 MHz CPU_1x clock the largest
/// divisor is the only safe choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MdcDivisor {
    Div8 = 0,
    Div16 = 1,
    Div32 = 2,
    Div48 = 3,
    Div64 = 4,
    Div96 = 5,
    Div128 = 6,
    Div224 = 7,
}

/// Failure reported by a register-access primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// The MDIO state machine did not go idle in time
    MdioBusy,

    /// The PHY did not answer (bus floated or no device)
    NoResponse,

    /// The controller refused the operation in its current state
    InvalidState,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HalError::MdioBusy => write!(f, "MDIO busy"),
            HalError::NoResponse => write!(f, "no response"),
            HalError::InvalidState => write!(f, "invalid controller state"),
        }
    }
}

/// Static description of one MAC instance (vendor `LookupConfig` entry)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacConfig {
    pub device_id: u16,
    pub base_addr: usize,
    /// DMA snoops the CPU caches; no flush/invalidate required
    pub cache_coherent: bool,
}

/// GEM interrupt source bits (`intr_status`, `intr_en`, `intr_dis`)
pub mod irq_source {
    pub const MGMT_DONE: u32 = 1 << 0;
    pub const FRAME_RX: u32 = 1 << 1;
    pub const RX_USED_READ: u32 = 1 << 2;
    pub const TX_USED_READ: u32 = 1 << 3;
    pub const TX_UNDERRUN: u32 = 1 << 4;
    pub const RETRY_LIMIT: u32 = 1 << 5;
    pub const TX_EXHAUSTED: u32 = 1 << 6;
    pub const TX_COMPLETE: u32 = 1 << 7;
    pub const RX_OVERRUN: u32 = 1 << 10;
    pub const HRESP_NOT_OK: u32 = 1 << 11;

    pub const TX_ERROR: u32 = TX_EXHAUSTED | RETRY_LIMIT | TX_UNDERRUN | TX_USED_READ;
    pub const RX_ERROR: u32 = HRESP_NOT_OK | RX_USED_READ | RX_OVERRUN;
    /// Sources enabled while the MAC runs
    pub const COMPLETION_AND_ERRORS: u32 = TX_COMPLETE | FRAME_RX | TX_ERROR | RX_ERROR;

    /// Every source the driver ever enables
    pub const ALL: u32 = 0x07FF_FEFF;
}

/// Masking of MAC interrupt sources
///
/// Split out of [`Mac`] because it is the one operation interrupt context
/// performs on the device: the write-only disable register needs no
/// exclusive access.
pub trait InterruptMask {
    fn disable_interrupts(&self, mask: u32);
}

/// MAC/DMA register-access primitives
pub trait Mac: InterruptMask {
    fn config(&self) -> MacConfig;

    /// Raw module revision (`module_id[27:16]`)
    fn module_revision(&self) -> u32;

    /// Quiesce the controller and program the DMA receive buffer size
    ///
    /// Disables TX/RX and every interrupt source, clears the latched status
    /// and the queue pointers, then sizes each RX buffer to hold at least
    /// `rx_buffer_size` bytes. Returns the size actually programmed.
    fn reset(&mut self, rx_buffer_size: usize) -> usize;

    fn set_mac_address(&mut self, mac: MacAddress) -> Result<(), HalError>;

    fn set_mdio_divisor(&mut self, divisor: MdcDivisor);

    /// Clause 22 read of `reg` on the PHY at `phy_addr`
    fn phy_read(&mut self, phy_addr: u8, reg: u8) -> Result<u16, HalError>;

    /// Clause 22 write of `reg` on the PHY at `phy_addr`
    fn phy_write(&mut self, phy_addr: u8, reg: u8, value: u16) -> Result<(), HalError>;

    fn set_operating_speed(&mut self, speed: LinkSpeed);

    /// Publish a descriptor ring base address to the DMA engine
    fn set_queue_base(&mut self, direction: Direction, base: usize);

    /// Enable transmitter, receiver and the completion/error interrupts
    fn start(&mut self);

    /// Disable transmitter, receiver and every interrupt source
    fn stop(&mut self);

    /// Kick the transmitter (`net_ctrl.start_tx`)
    fn transmit(&mut self);
}

/// Data cache maintenance by address range
///
/// `flush_range` writes dirty lines back so the DMA engine reads current data;
/// `invalidate_range` discards lines so the CPU re-reads what the DMA wrote.
pub trait CacheMaintenance {
    fn flush_range(&self, addr: usize, len: usize);
    fn invalidate_range(&self, addr: usize, len: usize);
}

/// Interrupt controller primitives
pub trait InterruptController {
    /// Route interrupt `id` to `handler`
    fn connect(&mut self, id: u32, handler: fn()) -> Result<(), HalError>;
    fn enable(&mut self, id: u32);
    fn disable(&mut self, id: u32);
    fn disconnect(&mut self, id: u32);
}

/// Monotonic microsecond clock with busy-wait delays
pub trait Clock {
    fn now_us(&self) -> u64;

    fn delay_us(&self, microseconds: u64);

    fn delay_ms(&self, milliseconds: u64) {
        self.delay_us(milliseconds.saturating_mul(1000));
    }
}

/// Raw 32-bit access to the system-level control register block
///
/// Callers go through `cadence::clock::Slcr`, which enforces the
/// unlock → modify → lock sequence.
pub trait SystemControl {
    fn read(&self, offset: usize) -> u32;
    fn write(&mut self, offset: usize, value: u32);
}
