//! Single-frame send/receive
//!
//! [`GemDevice::send_and_receive`] runs one diagnostic transaction:
//!
//! 1. Reset the completion counters
//! 2. Build the TX frame (header, length field, payload) and flush it
//! 3. Clear and flush the RX buffer, arm one RX descriptor
//! 4. Bind, enqueue and flush one TX descriptor
//! 5. Publish both ring bases, start the MAC, kick the transmitter
//! 6. Wait for transmit-complete, reclaim and free the TX descriptor
//! 7. Wait for frame-received, reclaim and free the RX descriptor, decode
//!    the header (skipped with [`RxCompletion::Detached`])
//! 8. Report device errors recorded by the interrupt handlers
//!
//! Both waits are deadline bounded. An RX descriptor that did not complete
//! stays armed and serves the next transaction.

use super::bd::DescriptorRing;
use super::intr::{CompletionCounters, classify};
use crate::config::{DriverConfig, RxCompletion};
use crate::drivers::net::error::NetworkError;
use crate::hal::{CacheMaintenance, Clock, Direction, Mac};
use crate::net::ethernet::{
    FrameBuffer, FrameHeader, HEADER_SIZE, MAX_PAYLOAD, clear, fill_payload, format_header,
    format_type,
};
use crate::println;
use crate::wait::{Deadline, spin_until};
use core::sync::atomic::{Ordering, fence};

/// Cortex-A9 L1 and PL310 line size
pub const CACHE_LINE: usize = 32;

/// Frame that came back during a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedFrame {
    pub len: usize,
    pub header: Option<FrameHeader>,
}

/// Outcome of a successful transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    pub tx_len: usize,
    pub received: Option<ReceivedFrame>,
    /// Error interrupts taken during the transaction
    pub device_errors: u32,
}

/// A brought-up GEM with its rings and frame buffers
pub struct GemDevice<'a, M, C, K>
where
    M: Mac,
    C: Clock + ?Sized,
    K: CacheMaintenance + ?Sized,
{
    mac: M,
    clock: &'a C,
    cache: &'a K,
    counters: &'a CompletionCounters,
    rx_ring: DescriptorRing,
    tx_ring: DescriptorRing,
    tx_frame: &'a mut FrameBuffer,
    rx_frame: &'a mut FrameBuffer,
    config: DriverConfig,
    rx_armed: bool,
}

impl<'a, M, C, K> GemDevice<'a, M, C, K>
where
    M: Mac,
    C: Clock + ?Sized,
    K: CacheMaintenance + ?Sized,
{
    /// Both rings must already have their templates cloned
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mac: M,
        clock: &'a C,
        cache: &'a K,
        counters: &'a CompletionCounters,
        rx_ring: DescriptorRing,
        tx_ring: DescriptorRing,
        tx_frame: &'a mut FrameBuffer,
        rx_frame: &'a mut FrameBuffer,
        config: DriverConfig,
    ) -> Self {
        Self {
            mac,
            clock,
            cache,
            counters,
            rx_ring,
            tx_ring,
            tx_frame,
            rx_frame,
            config,
            rx_armed: false,
        }
    }

    /// Run one transaction; see the module documentation
    #[must_use = "a failed transaction leaves descriptors with the hardware"]
    pub fn send_and_receive(&mut self) -> Result<TransferReport, NetworkError> {
        self.counters.reset();
        self.recycle_rx()?;

        let tx_len = self.build_tx_frame()?;
        self.arm_rx()?;
        self.enqueue_tx(tx_len)?;

        self.mac.set_queue_base(Direction::Receive, self.rx_ring.bus_addr());
        self.mac.set_queue_base(Direction::Transmit, self.tx_ring.bus_addr());
        self.mac.start();
        self.mac.transmit();

        let result = self.complete(tx_len);
        let device_errors = self.report_device_errors();
        result.map(|received| TransferReport {
            tx_len,
            received,
            device_errors,
        })
    }

    pub fn stop(&mut self) {
        self.mac.stop();
    }

    pub fn mac(&self) -> &M {
        &self.mac
    }

    pub fn rx_ring(&self) -> &DescriptorRing {
        &self.rx_ring
    }

    pub fn tx_ring(&self) -> &DescriptorRing {
        &self.tx_ring
    }

    /// RX descriptor is with the hardware, waiting for a frame
    pub fn rx_armed(&self) -> bool {
        self.rx_armed
    }

    pub fn rx_frame(&self) -> &FrameBuffer {
        &*self.rx_frame
    }

    pub fn tx_frame(&self) -> &FrameBuffer {
        &*self.tx_frame
    }

    fn coherent(&self) -> bool {
        self.mac.config().cache_coherent
    }

    fn build_tx_frame(&mut self) -> Result<usize, NetworkError> {
        let size = self.config.payload_size;
        let too_large = NetworkError::PayloadTooLarge {
            size,
            max: MAX_PAYLOAD,
        };
        if size > MAX_PAYLOAD {
            println!("[FAIL] {}", too_large);
            return Err(too_large);
        }

        let frame = &mut *self.tx_frame;
        format_header(frame, self.config.destination, self.config.mac_address);
        let payload = fill_payload(frame, size, self.config.payload_kind);
        // Length field carries the payload size (802.3 framing)
        let length = u16::try_from(payload).map_err(|_| too_large)?;
        format_type(frame, length);
        let len = HEADER_SIZE + payload;

        if !self.coherent() {
            self.cache.flush_range(self.tx_frame.addr(), len);
        }
        Ok(len)
    }

    /// Pick up an RX descriptor left armed by an earlier transaction
    fn recycle_rx(&mut self) -> Result<(), NetworkError> {
        if !self.rx_armed {
            return Ok(());
        }
        let done = self.rx_ring.reclaim_from_hardware(1)?;
        if !done.is_empty() {
            let len = self.rx_ring.length(done.first())?;
            println!("[XFER] Late frame from an earlier transaction ({} bytes)", len);
            self.rx_armed = false;
        }
        self.rx_ring.free(done)?;
        Ok(())
    }

    fn arm_rx(&mut self) -> Result<(), NetworkError> {
        if self.rx_armed {
            return Ok(());
        }
        clear(&mut *self.rx_frame);
        if !self.coherent() {
            self.cache
                .flush_range(self.rx_frame.addr(), self.rx_frame.capacity());
        }

        let span = self.rx_ring.allocate(1)?;
        self.rx_ring.set_address(span.first(), self.rx_frame.addr())?;
        self.rx_ring.enqueue_to_hardware(span)?;
        self.rx_armed = true;
        Ok(())
    }

    fn enqueue_tx(&mut self, len: usize) -> Result<(), NetworkError> {
        let span = self.tx_ring.allocate(1)?;
        let slot = span.first();
        let bound = self
            .tx_ring
            .set_address(slot, self.tx_frame.addr())
            .and_then(|()| self.tx_ring.set_length(slot, len))
            .and_then(|()| self.tx_ring.clear_used(slot))
            .and_then(|()| self.tx_ring.mark_last(slot));
        if let Err(e) = bound {
            self.tx_ring.unallocate(span)?;
            return Err(e.into());
        }
        self.tx_ring.enqueue_to_hardware(span)?;

        if !self.coherent() {
            self.cache.flush_range(self.tx_ring.slot_addr(slot), CACHE_LINE);
        }
        Ok(())
    }

    fn complete(&mut self, tx_len: usize) -> Result<Option<ReceivedFrame>, NetworkError> {
        let counters = self.counters;
        let deadline = Deadline::after(self.clock, self.config.tx_timeout_us);
        if spin_until(self.clock, deadline, || counters.transmitted() > 0).is_err() {
            println!("[FAIL] No transmit-complete interrupt");
            return Err(NetworkError::TransmitTimeout);
        }

        let done = self.tx_ring.reclaim_from_hardware(1)?;
        if done.is_empty() {
            println!("[WARN] Transmit complete but no TX descriptor finished");
        }
        self.tx_ring.free(done)?;
        println!("[XFER] Sent {} byte frame", tx_len);

        if self.config.rx_completion == RxCompletion::Detached {
            return Ok(None);
        }

        let deadline = Deadline::after(self.clock, self.config.rx_timeout_us);
        if spin_until(self.clock, deadline, || counters.received() > 0).is_err() {
            println!("[WARN] No frame received, RX descriptor stays armed");
            return Err(NetworkError::ReceiveTimeout);
        }
        fence(Ordering::Acquire);

        let done = self.rx_ring.reclaim_from_hardware(1)?;
        if done.is_empty() {
            println!("[WARN] Frame-received interrupt but no RX descriptor finished");
            self.rx_ring.free(done)?;
            return Ok(None);
        }
        let len = self.rx_ring.length(done.first())?;
        self.rx_ring.free(done)?;
        self.rx_armed = false;

        let header = FrameHeader::parse(&*self.rx_frame, len);
        match header {
            Some(header) => println!("[XFER] Received {} bytes: {}", len, header),
            None => println!("[XFER] Received {} byte runt", len),
        }
        Ok(Some(ReceivedFrame { len, header }))
    }

    fn report_device_errors(&self) -> u32 {
        let errors = self.counters.errors();
        for direction in [Direction::Receive, Direction::Transmit] {
            let bits = self.counters.take_error_bits(direction);
            for class in classify(direction, bits) {
                println!("[WARN] {} error: {}", direction, class);
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::intr::rx_status;
    use crate::hal::irq_source;
    use crate::net::ethernet::{MacAddress, SENTINEL};
    use crate::testing::{CacheOp, POWER_ON_RX_BUFFER_SIZE, SimPhy, SimWorld, TestBench};

    fn length_field(frame: &FrameBuffer) -> usize {
        let bytes = frame.as_bytes();
        u16::from_be_bytes([bytes[12], bytes[13]]) as usize
    }

    #[test]
    fn test_send_and_receive_round_trip() {
        let bench = TestBench::new(SimWorld::new(SimPhy::at(0)));
        let mut device = bench.device(DriverConfig::new());

        let report = device.send_and_receive().expect("transaction");

        assert_eq!(report.tx_len, 1014);
        assert_eq!(bench.counters.transmitted(), 1);
        assert_eq!(bench.counters.received(), 1);
        let received = report.received.expect("loopback frame");
        assert_eq!(received.len, 1014);
        let header = received.header.expect("header");
        assert_eq!(header.source, DriverConfig::new().mac_address);
        assert_eq!(header.destination, MacAddress::new([0x04, 0x92, 0x26, 0xD8, 0x17, 0xFC]));
        assert_eq!(header.ethertype, 1000);
        assert_eq!(device.tx_ring().free_count(), 32, "TX descriptor reusable");
        assert_eq!(device.rx_ring().free_count(), 32);
        assert!(!device.rx_armed());
    }

    #[test]
    fn test_tx_completion_one_ms_after_enqueue() {
        let world = SimWorld::new(SimPhy::at(0)).without_loopback();
        let bench = TestBench::new(world);
        let config = DriverConfig {
            rx_completion: RxCompletion::Detached,
            ..DriverConfig::new()
        };
        let mut device = bench.device(config);
        let start = bench.world.now();

        let report = device.send_and_receive().expect("transaction");

        assert_eq!(report.received, None);
        assert_eq!(bench.counters.transmitted(), 1);
        let elapsed = bench.world.now() - start;
        assert!((1_000..config.tx_timeout_us).contains(&elapsed), "took {} us", elapsed);
        assert_eq!(device.tx_ring().free_count(), 32);
        assert!(device.rx_armed(), "detached RX stays armed");
    }

    #[test]
    fn test_transmit_timeout() {
        let bench = TestBench::new(SimWorld::new(SimPhy::at(0)).with_dead_transmitter());
        let config = DriverConfig::new();
        let mut device = bench.device(config);
        let start = bench.world.now();

        let err = device.send_and_receive().unwrap_err();

        assert_eq!(err, NetworkError::TransmitTimeout);
        assert!(bench.world.now() - start <= config.tx_timeout_us + 10);
        assert_eq!(device.tx_ring().hardware_count(), 1);
    }

    #[test]
    fn test_receive_timeout_keeps_rx_armed_for_next_transaction() {
        let bench = TestBench::new(SimWorld::new(SimPhy::at(0)).without_loopback());
        let mut device = bench.device(DriverConfig::new());

        let err = device.send_and_receive().unwrap_err();
        assert_eq!(err, NetworkError::ReceiveTimeout);
        assert!(device.rx_armed());
        assert_eq!(device.rx_ring().hardware_count(), 1);

        bench.world.set_loopback(true);
        let report = device.send_and_receive().expect("second transaction");

        assert!(report.received.is_some());
        assert_eq!(device.rx_ring().free_count(), 32, "same RX descriptor reused");
        assert_eq!(device.tx_ring().free_count(), 32);
    }

    #[test]
    fn test_non_coherent_cache_maintenance() {
        let bench = TestBench::new(SimWorld::new(SimPhy::at(0)));
        let mut device = bench.device(DriverConfig::new());
        let tx_addr = bench.tx_frame_addr;
        let rx_addr = bench.rx_frame_addr;

        device.send_and_receive().expect("transaction");

        let ops = bench.cache.ops();
        assert_eq!(ops[0], CacheOp::Flush(tx_addr, 1014), "TX frame flushed first");
        assert_eq!(ops[1], CacheOp::Flush(rx_addr, 10276), "cleared RX buffer flushed");
        assert_eq!(
            ops[2],
            CacheOp::Flush(device.tx_ring().slot_addr(0), CACHE_LINE),
            "TX descriptor line flushed"
        );
        assert!(ops.contains(&CacheOp::Invalidate(rx_addr, 10276)));
    }

    #[test]
    fn test_coherent_platform_skips_cache_maintenance() {
        let bench = TestBench::new(SimWorld::new(SimPhy::at(0)).coherent());
        let mut device = bench.device(DriverConfig::new());

        device.send_and_receive().expect("transaction");

        assert!(bench.cache.ops().is_empty());
    }

    #[test]
    fn test_rx_buffer_cleared_before_arming() {
        let bench = TestBench::new(SimWorld::new(SimPhy::at(0)).without_loopback());
        let config = DriverConfig {
            rx_completion: RxCompletion::Detached,
            ..DriverConfig::new()
        };
        let mut device = bench.device(config);

        device.send_and_receive().expect("transaction");

        assert_eq!(device.rx_frame().word(0), SENTINEL);
        assert_eq!(device.rx_frame().word(10276 / 4 - 1), SENTINEL);
    }

    #[test]
    fn test_error_interrupt_is_counted_and_classified() {
        let bench = TestBench::new(SimWorld::new(SimPhy::at(0)));
        let mut device = bench.device(DriverConfig::new());
        bench
            .world
            .schedule_error(500, Direction::Receive, rx_status::OVERRUN);

        let report = device.send_and_receive().expect("transaction");

        assert_eq!(report.device_errors, 1);
        assert_eq!(bench.counters.errors(), 1);
        assert_eq!(bench.counters.transmitted(), 1);
        assert_eq!(bench.counters.received(), 1);
        assert_eq!(
            bench.counters.take_error_bits(Direction::Receive),
            0,
            "orchestrator drained the recorded bits"
        );
    }

    #[test]
    fn test_handlers_mask_sources_until_next_start() {
        let bench = TestBench::new(SimWorld::new(SimPhy::at(0)));
        let mut device = bench.device(DriverConfig::new());

        device.send_and_receive().expect("transaction");

        let enabled = bench.world.enabled_interrupts();
        assert_eq!(enabled & irq_source::TX_COMPLETE, 0);
        assert_eq!(enabled & irq_source::FRAME_RX, 0);

        device.send_and_receive().expect("second transaction");
        assert_eq!(bench.counters.transmitted(), 1, "counters reset per transaction");
    }

    #[test]
    fn test_incrementing_payload_on_the_wire() {
        let bench = TestBench::new(SimWorld::new(SimPhy::at(0)));
        let config = DriverConfig {
            payload_kind: crate::net::ethernet::PayloadKind::Incrementing,
            payload_size: 300,
            ..DriverConfig::new()
        };
        let mut device = bench.device(config);

        let report = device.send_and_receive().expect("transaction");

        assert_eq!(report.tx_len, 314);
        let bytes = device.rx_frame().as_bytes();
        assert_eq!(bytes[HEADER_SIZE + 255], 255);
        assert_eq!(&bytes[HEADER_SIZE + 256..HEADER_SIZE + 258], &[0x01, 0x00]);
    }

    #[test]
    fn test_frame_larger_than_rx_buffer_is_dropped() {
        let bench = TestBench::new(SimWorld::new(SimPhy::at(0)));
        let mut device = bench.device(DriverConfig::new());
        let mut mac = bench.world.mac();
        mac.reset(POWER_ON_RX_BUFFER_SIZE);

        let err = device.send_and_receive().unwrap_err();

        assert_eq!(err, NetworkError::ReceiveTimeout);
        assert_eq!(bench.counters.transmitted(), 1);
        assert_eq!(bench.counters.received(), 0);
        assert_eq!(bench.counters.errors(), 1, "buffer-not-available reported");
        assert!(device.rx_armed());
    }

    #[test]
    fn test_length_field_matches_payload_on_the_wire() {
        let bench = TestBench::new(SimWorld::new(SimPhy::at(0)));
        let config = DriverConfig {
            payload_size: MAX_PAYLOAD,
            rx_completion: RxCompletion::Detached,
            ..DriverConfig::new()
        };
        let mut device = bench.device(config);

        let report = device.send_and_receive().expect("transaction");

        assert_eq!(report.tx_len, crate::net::ethernet::FRAME_CAPACITY);
        assert_eq!(length_field(device.tx_frame()), report.tx_len - HEADER_SIZE);
    }

    #[test]
    fn test_oversized_payload_rejected_before_enqueue() {
        let bench = TestBench::new(SimWorld::new(SimPhy::at(0)));
        let config = DriverConfig {
            payload_size: 70_000,
            ..DriverConfig::new()
        };
        let mut device = bench.device(config);

        let err = device.send_and_receive().unwrap_err();

        assert_eq!(
            err,
            NetworkError::PayloadTooLarge {
                size: 70_000,
                max: MAX_PAYLOAD
            }
        );
        assert_eq!(bench.world.transmit_kicks(), 0);
        assert_eq!(device.tx_ring().free_count(), 32);
        assert!(!device.rx_armed());
    }
}
