//! Driver configuration
//!
//! Everything the diagnostic run can be tuned with. Hardware addresses and
//! register layouts are not here; they are constants next to the driver that
//! uses them.

use crate::drivers::net::error::NetworkError;
use crate::net::ethernet::{MAX_PAYLOAD, MacAddress, PayloadKind};
use crate::wait::PollBudget;

/// What bring-up does when an MDIO or MAC register access fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterPolicy {
    /// Log the failure and carry on with whatever value was read
    Tolerate,

    /// Log the failure and abort bring-up
    Abort,
}

/// How the orchestrator treats the receive side of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxCompletion {
    /// Wait for the received counter, reclaim and free the RX descriptor
    Await,

    /// Leave the RX descriptor armed and return once the frame went out
    Detached,
}

#[derive(Debug, Clone, Copy)]
pub struct DriverConfig {
    /// Station address programmed into the MAC and used as frame source
    pub mac_address: MacAddress,

    /// Destination of the diagnostic frame
    pub destination: MacAddress,

    pub payload_size: usize,
    pub payload_kind: PayloadKind,

    pub rx_ring_depth: usize,
    pub tx_ring_depth: usize,

    /// Offset of the TX ring inside the descriptor arena (RX sits at 0)
    pub tx_ring_offset: usize,

    /// Settle time after reprogramming the GEM reference clock
    pub clock_settle_us: u64,

    /// BMSR polling for autonegotiation-complete, then again for link-up
    pub link_poll: PollBudget,

    pub tx_timeout_us: u64,
    pub rx_timeout_us: u64,

    pub register_policy: RegisterPolicy,
    pub rx_completion: RxCompletion,

    /// Number of send/receive transactions the initialization driver runs
    pub cycles: u32,
    pub cycle_delay_ms: u64,
}

impl DriverConfig {
    pub const fn new() -> Self {
        Self {
            mac_address: MacAddress::new([0x00, 0x0A, 0x35, 0x01, 0x02, 0x03]),
            destination: MacAddress::new([0x04, 0x92, 0x26, 0xD8, 0x17, 0xFC]),
            payload_size: 1000,
            payload_kind: if cfg!(feature = "incrementing-payload") {
                PayloadKind::Incrementing
            } else {
                PayloadKind::Message
            },
            rx_ring_depth: 32,
            tx_ring_depth: 32,
            tx_ring_offset: 0x10000,
            clock_settle_us: 1_000_000,
            // One poll per second, like a human watching the link LED; a
            // gigabit autonegotiation takes 2-3 s.
            link_poll: PollBudget::new(10, 1_000_000),
            tx_timeout_us: 100_000,
            rx_timeout_us: 100_000,
            register_policy: RegisterPolicy::Abort,
            rx_completion: RxCompletion::Await,
            cycles: 10,
            cycle_delay_ms: 1000,
        }
    }
}

impl DriverConfig {
    /// Reject settings the driver cannot honour
    pub fn validate(&self) -> Result<(), NetworkError> {
        if self.payload_size > MAX_PAYLOAD {
            return Err(NetworkError::PayloadTooLarge {
                size: self.payload_size,
                max: MAX_PAYLOAD,
            });
        }
        Ok(())
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::new()
    }
}
