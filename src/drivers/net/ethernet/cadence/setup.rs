//! Initialization driver
//!
//! Runs the whole diagnostic: link bring-up, ring creation, interrupt
//! registration, a fixed number of send/receive transactions and teardown.
//! Synchronous configuration errors abort before the interrupt is connected;
//! once it is, every exit path stops the MAC and disconnects the interrupt.

use super::bd::{Descriptor, DescriptorRing, RING_ALIGNMENT, TX_USED};
use super::dma::DmaArena;
use super::intr::CompletionCounters;
use super::phy::{LinkState, bring_up};
use super::xfer::GemDevice;
use crate::config::DriverConfig;
use crate::drivers::net::error::NetworkError;
use crate::hal::{CacheMaintenance, Clock, Direction, InterruptController, Mac, SystemControl};
use crate::net::ethernet::FrameBuffer;
use crate::println;

/// Everything besides the MAC and the interrupt controller the run needs
pub struct Resources<'a, C, K, S>
where
    C: Clock + ?Sized,
    K: CacheMaintenance + ?Sized,
    S: SystemControl + ?Sized,
{
    pub clock: &'a C,
    pub cache: &'a K,
    pub slcr: &'a mut S,
    pub arena: DmaArena,
    pub tx_frame: &'a mut FrameBuffer,
    pub rx_frame: &'a mut FrameBuffer,
    /// Must be the counters the connected interrupt handler updates
    pub counters: &'a CompletionCounters,
    pub config: DriverConfig,
}

/// Result of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub link: LinkState,
    pub completed: u32,
    pub failed: u32,
}

/// Bring up the MAC, run the configured transactions, tear down
///
/// `isr` is connected to `interrupt_id` for the duration of the run; it must
/// dispatch into handlers sharing `resources.counters`. A receive timeout
/// fails only its own transaction; any other transaction error ends the run.
pub fn initialize<I, M, C, K, S>(
    intc: &mut I,
    mut mac: M,
    device_id: u16,
    interrupt_id: u32,
    isr: fn(),
    resources: Resources<'_, C, K, S>,
) -> Result<RunSummary, NetworkError>
where
    I: InterruptController + ?Sized,
    M: Mac,
    C: Clock + ?Sized,
    K: CacheMaintenance + ?Sized,
    S: SystemControl + ?Sized,
{
    let Resources {
        clock,
        cache,
        slcr,
        arena,
        tx_frame,
        rx_frame,
        counters,
        config,
    } = resources;

    let mac_config = mac.config();
    if mac_config.device_id != device_id {
        println!("[FAIL] No MAC configuration for device {}", device_id);
        return Err(NetworkError::DeviceNotFound { device_id });
    }
    println!(
        "[GEM] Device {} at {:#010x}{}",
        device_id,
        mac_config.base_addr,
        if mac_config.cache_coherent {
            " (coherent DMA)"
        } else {
            ""
        }
    );

    config.validate().inspect_err(|e| println!("[FAIL] {}", e))?;

    let link = bring_up(&mut mac, slcr, clock, &config)?;
    let (rx_ring, tx_ring) = create_rings(arena, &config)?;

    intc.connect(interrupt_id, isr).map_err(|e| {
        println!("[FAIL] Connecting interrupt {}: {}", interrupt_id, e);
        NetworkError::InterruptSetup { irq: interrupt_id }
    })?;
    intc.enable(interrupt_id);

    let mut device = GemDevice::new(
        mac, clock, cache, counters, rx_ring, tx_ring, tx_frame, rx_frame, config,
    );

    let mut summary = RunSummary {
        link,
        completed: 0,
        failed: 0,
    };
    let mut fatal = None;
    for cycle in 1..=config.cycles {
        match device.send_and_receive() {
            Ok(report) => {
                summary.completed += 1;
                println!(
                    "[XFER] Cycle {}/{} ok ({} bytes out, {} device errors)",
                    cycle, config.cycles, report.tx_len, report.device_errors
                );
            }
            Err(NetworkError::ReceiveTimeout) => {
                summary.failed += 1;
                println!("[WARN] Cycle {}/{}: receive timeout", cycle, config.cycles);
            }
            Err(e) => {
                summary.failed += 1;
                println!("[FAIL] Cycle {}/{}: {}", cycle, config.cycles, e);
                fatal = Some(e);
                break;
            }
        }
        if cycle < config.cycles {
            clock.delay_ms(config.cycle_delay_ms);
        }
    }

    device.stop();
    intc.disable(interrupt_id);
    intc.disconnect(interrupt_id);
    println!(
        "[GEM] Stopped after {} ok / {} failed transactions",
        summary.completed, summary.failed
    );

    match fatal {
        Some(e) => Err(e),
        None => Ok(summary),
    }
}

/// Carve both rings out of the arena and clone their templates
pub fn create_rings(
    arena: DmaArena,
    config: &DriverConfig,
) -> Result<(DescriptorRing, DescriptorRing), NetworkError> {
    let (rx_region, tx_region) = arena.partition(config.tx_ring_offset)?;

    let rx_bus = rx_region.base();
    let mut rx_ring =
        DescriptorRing::create(rx_region, rx_bus, RING_ALIGNMENT, config.rx_ring_depth)?;
    rx_ring.clone_template(Descriptor::zeroed(), Direction::Receive)?;

    let tx_bus = tx_region.base();
    let mut tx_ring =
        DescriptorRing::create(tx_region, tx_bus, RING_ALIGNMENT, config.tx_ring_depth)?;
    let tx_template = Descriptor {
        word0: 0,
        word1: TX_USED,
    };
    tx_ring.clone_template(tx_template, Direction::Transmit)?;

    println!(
        "[RING] RX {} slots at {:#010x}, TX {} slots at {:#010x}",
        rx_ring.capacity(),
        rx_ring.base(),
        tx_ring.capacity(),
        tx_ring.base()
    );
    Ok((rx_ring, tx_ring))
}
