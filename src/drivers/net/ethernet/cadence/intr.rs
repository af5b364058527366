//! Interrupt completion handlers
//!
//! The GEM raises one interrupt line for everything. [`dispatch`] decodes the
//! interrupt status into [`MacEvent`]s and hands them to a
//! [`MacEventHandler`]; [`CompletionHandlers`] is the handler the driver
//! installs.
//!
//! Handlers run in interrupt context. They never block, allocate or print:
//! they mask interrupt sources, issue cache maintenance and bump the atomics
//! in [`CompletionCounters`]. The orchestrator reads the counters from thread
//! context and reports recorded device errors after each transaction.
//!
//! ## Memory Ordering
//!
//! Handlers finish their side effects (cache invalidation) before a `Release`
//! increment; the orchestrator polls with `Acquire` loads. Observing a nonzero
//! counter therefore implies the RX buffer is safe to read.

use crate::hal::{CacheMaintenance, Direction, InterruptMask, irq_source};
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

// ============================================================================
// Status Register Bits
// ============================================================================

/// `rx_status` (offset 0x20)
pub mod rx_status {
    pub const BUFFER_NOT_AVAILABLE: u32 = 1 << 0;
    pub const FRAME_RECEIVED: u32 = 1 << 1;
    pub const OVERRUN: u32 = 1 << 2;
    pub const HRESP_NOT_OK: u32 = 1 << 3;
}

/// `tx_status` (offset 0x14)
pub mod tx_status {
    pub const USED_BIT_READ: u32 = 1 << 0;
    pub const COLLISION: u32 = 1 << 1;
    pub const RETRY_LIMIT_EXCEEDED: u32 = 1 << 2;
    pub const GO: u32 = 1 << 3;
    pub const BUFFER_EXHAUSTED: u32 = 1 << 4;
    pub const COMPLETE: u32 = 1 << 5;
    pub const UNDERRUN: u32 = 1 << 6;
    pub const HRESP_NOT_OK: u32 = 1 << 8;
}

/// What the MAC interrupt reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacEvent {
    TxComplete,
    RxComplete,
    /// `status` is the raw `tx_status` or `rx_status` value
    Error { direction: Direction, status: u32 },
}

/// Receiver of decoded MAC interrupts
pub trait MacEventHandler {
    fn handle(&self, event: MacEvent, irq: &dyn InterruptMask);
}

/// Decode an interrupt status word and deliver its events in hardware order
///
/// `read_status` must read and acknowledge the per-direction status register.
/// A transmit error that arrives together with transmit-complete is reported
/// as completion only.
pub fn dispatch(
    status: u32,
    mut read_status: impl FnMut(Direction) -> u32,
    handler: &dyn MacEventHandler,
    irq: &dyn InterruptMask,
) {
    if status & irq_source::TX_COMPLETE != 0 {
        read_status(Direction::Transmit);
        handler.handle(MacEvent::TxComplete, irq);
    } else if status & irq_source::TX_ERROR != 0 {
        let status = read_status(Direction::Transmit);
        handler.handle(
            MacEvent::Error {
                direction: Direction::Transmit,
                status,
            },
            irq,
        );
    }

    if status & irq_source::FRAME_RX != 0 {
        read_status(Direction::Receive);
        handler.handle(MacEvent::RxComplete, irq);
    }

    if status & irq_source::RX_ERROR != 0 {
        let status = read_status(Direction::Receive);
        handler.handle(
            MacEvent::Error {
                direction: Direction::Receive,
                status,
            },
            irq,
        );
    }
}

/// Counters shared between the handlers and the orchestrator
///
/// Only "became nonzero" is meaningful; nothing relies on exact totals.
#[derive(Debug)]
pub struct CompletionCounters {
    transmitted: AtomicU32,
    received: AtomicU32,
    errors: AtomicU32,
    rx_error_bits: AtomicU32,
    tx_error_bits: AtomicU32,
}

impl CompletionCounters {
    pub const fn new() -> Self {
        Self {
            transmitted: AtomicU32::new(0),
            received: AtomicU32::new(0),
            errors: AtomicU32::new(0),
            rx_error_bits: AtomicU32::new(0),
            tx_error_bits: AtomicU32::new(0),
        }
    }

    /// Zero everything; call only while no transfer is in flight
    pub fn reset(&self) {
        self.transmitted.store(0, Ordering::Release);
        self.received.store(0, Ordering::Release);
        self.errors.store(0, Ordering::Release);
        self.rx_error_bits.store(0, Ordering::Release);
        self.tx_error_bits.store(0, Ordering::Release);
    }

    pub fn transmitted(&self) -> u32 {
        self.transmitted.load(Ordering::Acquire)
    }

    pub fn received(&self) -> u32 {
        self.received.load(Ordering::Acquire)
    }

    pub fn errors(&self) -> u32 {
        self.errors.load(Ordering::Acquire)
    }

    /// Status bits recorded by error events since the last call
    pub fn take_error_bits(&self, direction: Direction) -> u32 {
        match direction {
            Direction::Receive => self.rx_error_bits.swap(0, Ordering::AcqRel),
            Direction::Transmit => self.tx_error_bits.swap(0, Ordering::AcqRel),
        }
    }

    fn record_error(&self, direction: Direction, status: u32) {
        match direction {
            Direction::Receive => self.rx_error_bits.fetch_or(status, Ordering::Release),
            Direction::Transmit => self.tx_error_bits.fetch_or(status, Ordering::Release),
        };
        self.errors.fetch_add(1, Ordering::Release);
    }
}

impl Default for CompletionCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// The driver's interrupt handlers
pub struct CompletionHandlers<'a> {
    counters: &'a CompletionCounters,
    cache: &'a (dyn CacheMaintenance + Sync),
    rx_buffer: usize,
    rx_buffer_len: usize,
    cache_coherent: bool,
}

impl<'a> CompletionHandlers<'a> {
    /// `rx_buffer..rx_buffer + rx_buffer_len` is invalidated on every
    /// frame-received event unless the platform is `cache_coherent`
    pub fn new(
        counters: &'a CompletionCounters,
        cache: &'a (dyn CacheMaintenance + Sync),
        rx_buffer: usize,
        rx_buffer_len: usize,
        cache_coherent: bool,
    ) -> Self {
        Self {
            counters,
            cache,
            rx_buffer,
            rx_buffer_len,
            cache_coherent,
        }
    }
}

impl MacEventHandler for CompletionHandlers<'_> {
    fn handle(&self, event: MacEvent, irq: &dyn InterruptMask) {
        match event {
            MacEvent::TxComplete => {
                irq.disable_interrupts(irq_source::TX_COMPLETE | irq_source::TX_ERROR);
                self.counters.transmitted.fetch_add(1, Ordering::Release);
            }
            MacEvent::RxComplete => {
                irq.disable_interrupts(irq_source::FRAME_RX | irq_source::RX_ERROR);
                if !self.cache_coherent {
                    self.cache
                        .invalidate_range(self.rx_buffer, self.rx_buffer_len);
                }
                self.counters.received.fetch_add(1, Ordering::Release);
            }
            MacEvent::Error { direction, status } => {
                // No recovery: the next transaction starts the DMA engine again
                self.counters.record_error(direction, status);
            }
        }
    }
}

/// Asynchronous device error, decoded from a status register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    DmaBusError,
    Overrun,
    BufferUnavailable,
    Underrun,
    BufferExhausted,
    RetryLimitExceeded,
    Collision,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::DmaBusError => write!(f, "DMA bus error"),
            DeviceError::Overrun => write!(f, "overrun"),
            DeviceError::BufferUnavailable => write!(f, "buffer not available"),
            DeviceError::Underrun => write!(f, "underrun"),
            DeviceError::BufferExhausted => write!(f, "buffer exhausted mid frame"),
            DeviceError::RetryLimitExceeded => write!(f, "retry limit exceeded"),
            DeviceError::Collision => write!(f, "collision"),
        }
    }
}

const RX_CLASSES: &[(u32, DeviceError)] = &[
    (rx_status::HRESP_NOT_OK, DeviceError::DmaBusError),
    (rx_status::OVERRUN, DeviceError::Overrun),
    (rx_status::BUFFER_NOT_AVAILABLE, DeviceError::BufferUnavailable),
];

const TX_CLASSES: &[(u32, DeviceError)] = &[
    (tx_status::HRESP_NOT_OK, DeviceError::DmaBusError),
    (tx_status::UNDERRUN, DeviceError::Underrun),
    (tx_status::BUFFER_EXHAUSTED, DeviceError::BufferExhausted),
    (tx_status::RETRY_LIMIT_EXCEEDED, DeviceError::RetryLimitExceeded),
    (tx_status::COLLISION, DeviceError::Collision),
    (tx_status::USED_BIT_READ, DeviceError::BufferUnavailable),
];

/// Every error condition flagged in `status`, most severe first
pub fn classify(direction: Direction, status: u32) -> impl Iterator<Item = DeviceError> {
    let table = match direction {
        Direction::Receive => RX_CLASSES,
        Direction::Transmit => TX_CLASSES,
    };
    table
        .iter()
        .filter(move |(bit, _)| status & bit != 0)
        .map(|&(_, class)| class)
}
