//! Simulated hardware for the host test-suite
//!
//! [`SimWorld`] models one GEM with its PHY, DMA engine and interrupt line,
//! plus the interrupt controller and a clock. Time only moves when code asks
//! the [`SimClock`] for it; scheduled hardware activity (transmit completion,
//! loopback delivery, injected errors) fires as the clock passes its due
//! time, and raises the interrupt by calling the connected `fn()` exactly as
//! the GIC would.
//!
//! The DMA model walks the real descriptor tables in memory: transmit sets
//! the TX `used` bit, loopback copies the frame into the buffer of the next
//! hardware-owned RX slot and sets its `new` bit.

use crate::drivers::net::ethernet::cadence::bd::{
    DESCRIPTOR_STRIDE, Descriptor, RX_EOF, RX_NEW, RX_SOF, RX_WRAP, RawDescriptor, TX_USED,
    TX_WRAP,
};
use crate::drivers::net::ethernet::cadence::dma::DmaArena;
use crate::drivers::net::ethernet::cadence::gem::dma_config_for;
use crate::drivers::net::ethernet::cadence::intr::{
    self, CompletionCounters, CompletionHandlers, MacEventHandler, rx_status, tx_status,
};
use crate::drivers::net::ethernet::cadence::setup::create_rings;
use crate::drivers::net::ethernet::cadence::xfer::GemDevice;
use crate::config::DriverConfig;
use crate::hal::{
    CacheMaintenance, Clock, Direction, HalError, InterruptController, InterruptMask, LinkSpeed,
    Mac, MacConfig, MdcDivisor, SystemControl, irq_source,
};
use crate::net::ethernet::{FRAME_CAPACITY, FrameBuffer, MacAddress};
use std::cell::{Cell, RefCell, RefMut};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::Mutex;

pub const SIM_GEM_IRQ: u32 = 54;

/// Transmit completes this long after the transmitter is kicked
pub const TX_LATENCY_US: u64 = 1_000;
/// Loopback frames land this long after the kick
pub const RX_LATENCY_US: u64 = 2_000;

const TX_LEN_MASK: u32 = 0x3FFF;

/// Receive buffer size out of power-on reset (`dma_cfg` = 0x0002_0784)
pub const POWER_ON_RX_BUFFER_SIZE: usize = 128;

// ============================================================================
// Allocation Helpers
// ============================================================================

/// Page-aligned zeroed arena that lives for the rest of the test process
pub fn leak_arena(len: usize) -> DmaArena {
    let layout = std::alloc::Layout::from_size_align(len, 4096).expect("arena layout");
    // SAFETY: layout has non-zero size
    let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
    assert!(!ptr.is_null(), "arena allocation failed");
    // SAFETY: freshly allocated, never freed, owned only by the arena
    unsafe { DmaArena::from_raw(ptr as usize, len) }
}

pub fn leak_frame() -> &'static mut FrameBuffer {
    Box::leak(Box::new(FrameBuffer::new()))
}

// ============================================================================
// PHY
// ============================================================================

/// Clause 22 PHY on the simulated MDIO bus
#[derive(Debug, Clone)]
pub struct SimPhy {
    addr: Option<u8>,
    id: (u16, u16),
    an_after: u32,
    link_after: u32,
    latch_loopback: bool,
    fail_writes: bool,
    regs: [u16; 32],
    bmsr_reads: u32,
}

impl SimPhy {
    /// Marvell 88E1116R (ZC702) at `addr`, link up on the first BMSR read
    pub fn at(addr: u8) -> Self {
        Self {
            addr: Some(addr),
            id: (0x0141, 0x0E40),
            an_after: 1,
            link_after: 1,
            latch_loopback: false,
            fail_writes: false,
            regs: [0; 32],
            bmsr_reads: 0,
        }
    }

    /// Nothing answers; every read floats to 0xFFFF
    pub fn absent() -> Self {
        Self {
            addr: None,
            ..Self::at(0)
        }
    }

    pub fn with_id(mut self, id1: u16, id2: u16) -> Self {
        self.id = (id1, id2);
        self
    }

    /// Report autonegotiation complete from the `an_reads`th BMSR read on,
    /// link up from the `link_reads`th
    pub fn link_after(mut self, an_reads: u32, link_reads: u32) -> Self {
        self.an_after = an_reads;
        self.link_after = link_reads;
        self
    }

    /// The first BMCR write comes back with loopback set
    pub fn latch_loopback(mut self) -> Self {
        self.latch_loopback = true;
        self
    }

    pub fn fail_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    fn read(&mut self, addr: u8, reg: u8) -> Result<u16, HalError> {
        if self.addr != Some(addr) {
            return Ok(0xFFFF);
        }
        let value = match reg {
            0x02 => self.id.0,
            0x03 => self.id.1,
            0x01 => {
                self.bmsr_reads = self.bmsr_reads.saturating_add(1);
                let mut bmsr = 0x7949;
                if self.bmsr_reads >= self.an_after {
                    bmsr |= 0x0020;
                }
                if self.bmsr_reads >= self.link_after {
                    bmsr |= 0x0004;
                }
                bmsr
            }
            reg => self.regs[reg as usize & 0x1F],
        };
        Ok(value)
    }

    fn write(&mut self, addr: u8, reg: u8, value: u16) -> Result<(), HalError> {
        if self.fail_writes {
            return Err(HalError::MdioBusy);
        }
        if self.addr != Some(addr) {
            return Ok(());
        }
        let mut value = value;
        if reg == 0x00 && self.latch_loopback {
            value |= 0x4000;
            self.latch_loopback = false;
        }
        self.regs[reg as usize & 0x1F] = value;
        Ok(())
    }
}

// ============================================================================
// World
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum SimEvent {
    CompleteTx,
    DeliverRx,
    RaiseError(Direction, u32),
}

struct SimState {
    phy: SimPhy,
    coherent: bool,
    loopback: bool,
    dead_transmitter: bool,
    refuse_interrupts: bool,

    station: Option<MacAddress>,
    divisor: Option<MdcDivisor>,
    speed: Option<LinkSpeed>,

    started: bool,
    rx_buffer_size: usize,
    rx_base: usize,
    tx_base: usize,
    rx_cursor: usize,
    tx_cursor: usize,
    in_flight: VecDeque<Vec<u8>>,
    transmit_kicks: u32,

    irq_enabled: u32,
    irq_status: u32,
    rx_status: u32,
    tx_status: u32,

    intc_handler: Option<fn()>,
    intc_enabled: bool,
}

struct WorldInner {
    now: Cell<u64>,
    events: RefCell<Vec<(u64, SimEvent)>>,
    state: RefCell<SimState>,
}

/// Shared handle to the simulated board
#[derive(Clone)]
pub struct SimWorld(Rc<WorldInner>);

impl SimWorld {
    pub fn new(phy: SimPhy) -> Self {
        let state = SimState {
            phy,
            coherent: false,
            loopback: true,
            dead_transmitter: false,
            refuse_interrupts: false,
            station: None,
            divisor: None,
            speed: None,
            started: false,
            rx_buffer_size: POWER_ON_RX_BUFFER_SIZE,
            rx_base: 0,
            tx_base: 0,
            rx_cursor: 0,
            tx_cursor: 0,
            in_flight: VecDeque::new(),
            transmit_kicks: 0,
            irq_enabled: 0,
            irq_status: 0,
            rx_status: 0,
            tx_status: 0,
            intc_handler: None,
            intc_enabled: false,
        };
        Self(Rc::new(WorldInner {
            now: Cell::new(0),
            events: RefCell::new(Vec::new()),
            state: RefCell::new(state),
        }))
    }

    // ------------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------------

    pub fn without_loopback(self) -> Self {
        self.set_loopback(false);
        self
    }

    /// Transmitter accepts kicks but never completes a frame
    pub fn with_dead_transmitter(self) -> Self {
        self.state().dead_transmitter = true;
        self
    }

    pub fn coherent(self) -> Self {
        self.state().coherent = true;
        self
    }

    /// Interrupt controller rejects every `connect`
    pub fn refuse_interrupts(self) -> Self {
        self.state().refuse_interrupts = true;
        self
    }

    pub fn mac(&self) -> SimMac {
        SimMac(self.clone())
    }

    pub fn clock(&self) -> SimClock {
        SimClock(self.clone())
    }

    pub fn intc(&self) -> SimIntc {
        SimIntc(self.clone())
    }

    // ------------------------------------------------------------------------
    // Inspection and control
    // ------------------------------------------------------------------------

    pub fn now(&self) -> u64 {
        self.0.now.get()
    }

    pub fn set_loopback(&self, enabled: bool) {
        self.state().loopback = enabled;
    }

    /// Raise a device error `delay_us` from now
    pub fn schedule_error(&self, delay_us: u64, direction: Direction, status: u32) {
        self.schedule(delay_us, SimEvent::RaiseError(direction, status));
    }

    pub fn mac_speed(&self) -> Option<LinkSpeed> {
        self.state().speed
    }

    pub fn station_address(&self) -> Option<MacAddress> {
        self.state().station
    }

    pub fn mdio_divisor(&self) -> Option<MdcDivisor> {
        self.state().divisor
    }

    /// Bytes the DMA engine writes into one RX buffer
    pub fn rx_buffer_size(&self) -> usize {
        self.state().rx_buffer_size
    }

    pub fn phy_register(&self, reg: u8) -> u16 {
        self.state().phy.regs[reg as usize & 0x1F]
    }

    pub fn enabled_interrupts(&self) -> u32 {
        self.state().irq_enabled
    }

    pub fn transmit_kicks(&self) -> u32 {
        self.state().transmit_kicks
    }

    pub fn intc_connected(&self) -> bool {
        self.state().intc_handler.is_some()
    }

    pub fn mac_started(&self) -> bool {
        self.state().started
    }

    /// Handle one interrupt the way the GEM driver's ISR does
    pub fn service_interrupt(&self, handler: &dyn MacEventHandler) {
        let status = std::mem::take(&mut self.state().irq_status);
        intr::dispatch(
            status,
            |direction| {
                let mut state = self.state();
                match direction {
                    Direction::Receive => std::mem::take(&mut state.rx_status),
                    Direction::Transmit => std::mem::take(&mut state.tx_status),
                }
            },
            handler,
            self,
        );
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn state(&self) -> RefMut<'_, SimState> {
        self.0.state.borrow_mut()
    }

    fn schedule(&self, delay_us: u64, event: SimEvent) {
        let due = self.now().saturating_add(delay_us);
        self.0.events.borrow_mut().push((due, event));
    }

    /// Move time forward, firing every event that falls due on the way
    fn advance(&self, delta_us: u64) {
        let target = self.now().saturating_add(delta_us);
        loop {
            let next = {
                let mut events = self.0.events.borrow_mut();
                let index = events
                    .iter()
                    .enumerate()
                    .filter(|(_, (due, _))| *due <= target)
                    .min_by_key(|(_, (due, _))| *due)
                    .map(|(i, _)| i);
                index.map(|i| events.remove(i))
            };
            let Some((due, event)) = next else { break };
            self.0.now.set(due.max(self.now()));
            self.fire(event);
        }
        self.0.now.set(target);
    }

    fn fire(&self, event: SimEvent) {
        match event {
            SimEvent::CompleteTx => self.complete_tx(),
            SimEvent::DeliverRx => self.deliver_rx(),
            SimEvent::RaiseError(direction, status) => {
                let mut state = self.state();
                match direction {
                    Direction::Receive => {
                        state.rx_status |= status;
                        state.irq_status |= rx_error_source(status);
                    }
                    Direction::Transmit => {
                        state.tx_status |= status;
                        state.irq_status |= tx_error_source(status);
                    }
                }
            }
        }
        self.raise();
    }

    fn complete_tx(&self) {
        let mut state = self.state();
        if state.tx_base == 0 {
            return;
        }
        let index = state.tx_cursor;
        let desc = descriptor_at(state.tx_base, index);
        let words = desc.load();
        if words.word1 & TX_USED != 0 {
            state.tx_status |= tx_status::USED_BIT_READ;
            state.irq_status |= irq_source::TX_USED_READ;
            return;
        }

        let addr = desc.buffer_addr(Direction::Transmit);
        let len = (words.word1 & TX_LEN_MASK) as usize;
        // SAFETY: the driver bound a live frame buffer of at least `len` bytes
        let frame = unsafe { std::slice::from_raw_parts(addr as *const u8, len) }.to_vec();
        desc.store(Descriptor {
            word0: words.word0,
            word1: words.word1 | TX_USED,
        });
        state.tx_cursor = if words.word1 & TX_WRAP != 0 { 0 } else { index + 1 };
        state.tx_status |= tx_status::COMPLETE;
        state.irq_status |= irq_source::TX_COMPLETE;

        if state.loopback {
            state.in_flight.push_back(frame);
            drop(state);
            self.schedule(RX_LATENCY_US - TX_LATENCY_US, SimEvent::DeliverRx);
        }
    }

    fn deliver_rx(&self) {
        let mut state = self.state();
        let Some(frame) = state.in_flight.pop_front() else {
            return;
        };
        if state.rx_base == 0 {
            return;
        }
        let index = state.rx_cursor;
        let desc = descriptor_at(state.rx_base, index);
        let words = desc.load();
        // One armed descriptor: a frame that does not fit its buffer would
        // spill into a slot the hardware does not own, and is dropped
        if words.word0 & RX_NEW != 0 || frame.len() > state.rx_buffer_size {
            state.rx_status |= rx_status::BUFFER_NOT_AVAILABLE;
            state.irq_status |= irq_source::RX_USED_READ;
            return;
        }

        let addr = desc.buffer_addr(Direction::Receive);
        let len = frame.len().min(FRAME_CAPACITY);
        // SAFETY: the driver bound a live frame buffer of FRAME_CAPACITY bytes
        unsafe { std::ptr::copy_nonoverlapping(frame.as_ptr(), addr as *mut u8, len) };
        desc.store(Descriptor {
            word0: words.word0 | RX_NEW,
            word1: RX_SOF | RX_EOF | len as u32,
        });
        state.rx_cursor = if words.word0 & RX_WRAP != 0 { 0 } else { index + 1 };
        state.rx_status |= rx_status::FRAME_RECEIVED;
        state.irq_status |= irq_source::FRAME_RX;
    }

    /// Call the connected handler if an enabled source is pending
    fn raise(&self) {
        let handler = {
            let state = self.state();
            let pending = state.irq_status & state.irq_enabled != 0;
            if pending && state.intc_enabled {
                state.intc_handler
            } else {
                None
            }
        };
        if let Some(handler) = handler {
            handler();
        }
    }
}

impl InterruptMask for SimWorld {
    fn disable_interrupts(&self, mask: u32) {
        self.state().irq_enabled &= !mask;
    }
}

fn descriptor_at(base: usize, index: usize) -> &'static mut RawDescriptor {
    // SAFETY: base is a ring the driver published; the cursor never passes
    // the slot carrying the wrap bit
    unsafe { &mut *((base + index * DESCRIPTOR_STRIDE) as *mut RawDescriptor) }
}

fn rx_error_source(status: u32) -> u32 {
    let mut source = 0;
    if status & rx_status::OVERRUN != 0 {
        source |= irq_source::RX_OVERRUN;
    }
    if status & rx_status::BUFFER_NOT_AVAILABLE != 0 {
        source |= irq_source::RX_USED_READ;
    }
    if status & rx_status::HRESP_NOT_OK != 0 {
        source |= irq_source::HRESP_NOT_OK;
    }
    source
}

fn tx_error_source(status: u32) -> u32 {
    let mut source = 0;
    if status & tx_status::UNDERRUN != 0 {
        source |= irq_source::TX_UNDERRUN;
    }
    if status & tx_status::RETRY_LIMIT_EXCEEDED != 0 {
        source |= irq_source::RETRY_LIMIT;
    }
    if status & (tx_status::BUFFER_EXHAUSTED | tx_status::HRESP_NOT_OK | tx_status::COLLISION) != 0
    {
        source |= irq_source::TX_EXHAUSTED;
    }
    if status & tx_status::USED_BIT_READ != 0 {
        source |= irq_source::TX_USED_READ;
    }
    source
}

thread_local! {
    static ISR_CONTEXT: RefCell<Option<(SimWorld, &'static dyn MacEventHandler)>> =
        const { RefCell::new(None) };
}

/// Interrupt service routine handed to `InterruptController::connect`
pub fn sim_isr() {
    let context = ISR_CONTEXT.with(|ctx| ctx.borrow().clone());
    if let Some((world, handler)) = context {
        world.service_interrupt(handler);
    }
}

/// Route [`sim_isr`] on this test thread to `world` and `handler`
pub fn install_isr_context(world: &SimWorld, handler: &'static dyn MacEventHandler) {
    ISR_CONTEXT.with(|ctx| *ctx.borrow_mut() = Some((world.clone(), handler)));
}

// ============================================================================
// HAL Implementations
// ============================================================================

pub struct SimMac(SimWorld);

impl InterruptMask for SimMac {
    fn disable_interrupts(&self, mask: u32) {
        self.0.disable_interrupts(mask);
    }
}

impl Mac for SimMac {
    fn config(&self) -> MacConfig {
        MacConfig {
            device_id: 0,
            base_addr: 0xE000_B000,
            cache_coherent: self.0.state().coherent,
        }
    }

    fn module_revision(&self) -> u32 {
        0x002
    }

    fn reset(&mut self, rx_buffer_size: usize) -> usize {
        let (_, size) = dma_config_for(rx_buffer_size);
        let mut state = self.0.state();
        state.started = false;
        state.irq_enabled = 0;
        state.irq_status = 0;
        state.rx_status = 0;
        state.tx_status = 0;
        state.rx_base = 0;
        state.tx_base = 0;
        state.rx_cursor = 0;
        state.tx_cursor = 0;
        state.rx_buffer_size = size;
        size
    }

    fn set_mac_address(&mut self, mac: MacAddress) -> Result<(), HalError> {
        self.0.state().station = Some(mac);
        Ok(())
    }

    fn set_mdio_divisor(&mut self, divisor: MdcDivisor) {
        self.0.state().divisor = Some(divisor);
    }

    fn phy_read(&mut self, phy_addr: u8, reg: u8) -> Result<u16, HalError> {
        self.0.state().phy.read(phy_addr, reg)
    }

    fn phy_write(&mut self, phy_addr: u8, reg: u8, value: u16) -> Result<(), HalError> {
        self.0.state().phy.write(phy_addr, reg, value)
    }

    fn set_operating_speed(&mut self, speed: LinkSpeed) {
        self.0.state().speed = Some(speed);
    }

    fn set_queue_base(&mut self, direction: Direction, base: usize) {
        let mut state = self.0.state();
        // The queue pointer only latches while the DMA engine is idle
        if state.started {
            return;
        }
        match direction {
            Direction::Receive => {
                state.rx_base = base;
                state.rx_cursor = 0;
            }
            Direction::Transmit => {
                state.tx_base = base;
                state.tx_cursor = 0;
            }
        }
    }

    fn start(&mut self) {
        let mut state = self.0.state();
        state.started = true;
        state.irq_enabled |= irq_source::COMPLETION_AND_ERRORS;
    }

    fn stop(&mut self) {
        let mut state = self.0.state();
        state.started = false;
        state.irq_enabled = 0;
    }

    fn transmit(&mut self) {
        let schedule = {
            let mut state = self.0.state();
            state.transmit_kicks += 1;
            state.started && !state.dead_transmitter
        };
        if schedule {
            self.0.schedule(TX_LATENCY_US, SimEvent::CompleteTx);
        }
    }
}

pub struct SimClock(SimWorld);

impl SimClock {
    /// Clock on a board of its own
    pub fn new() -> Self {
        SimWorld::new(SimPhy::absent()).clock()
    }
}

impl Clock for SimClock {
    /// Every reading costs one microsecond so spin loops make progress
    fn now_us(&self) -> u64 {
        let now = self.0.now();
        self.0.advance(1);
        now
    }

    fn delay_us(&self, microseconds: u64) {
        self.0.advance(microseconds);
    }
}

pub struct SimIntc(SimWorld);

impl InterruptController for SimIntc {
    fn connect(&mut self, _id: u32, handler: fn()) -> Result<(), HalError> {
        let mut state = self.0.state();
        if state.refuse_interrupts {
            return Err(HalError::InvalidState);
        }
        state.intc_handler = Some(handler);
        Ok(())
    }

    fn enable(&mut self, _id: u32) {
        self.0.state().intc_enabled = true;
    }

    fn disable(&mut self, _id: u32) {
        self.0.state().intc_enabled = false;
    }

    fn disconnect(&mut self, _id: u32) {
        self.0.state().intc_handler = None;
    }
}

/// SLCR register file that insists on the unlock/lock protocol
pub struct SimSlcr {
    regs: HashMap<usize, u32>,
    writes: Vec<(usize, u32)>,
    locked: bool,
}

impl SimSlcr {
    pub fn new() -> Self {
        Self {
            regs: HashMap::new(),
            writes: Vec::new(),
            locked: true,
        }
    }

    pub fn preset(&mut self, offset: usize, value: u32) {
        self.regs.insert(offset, value);
    }

    pub fn writes(&self) -> &[(usize, u32)] {
        &self.writes
    }
}

impl SystemControl for SimSlcr {
    fn read(&self, offset: usize) -> u32 {
        self.regs.get(&offset).copied().unwrap_or(0)
    }

    fn write(&mut self, offset: usize, value: u32) {
        use crate::drivers::net::ethernet::cadence::clock::{
            LOCK_KEY, SLCR_LOCK, SLCR_UNLOCK, UNLOCK_KEY,
        };
        self.writes.push((offset, value));
        match (offset, value) {
            (SLCR_UNLOCK, UNLOCK_KEY) => self.locked = false,
            (SLCR_LOCK, LOCK_KEY) => self.locked = true,
            _ => {
                assert!(!self.locked, "SLCR write to {:#x} while locked", offset);
                self.regs.insert(offset, value);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOp {
    Flush(usize, usize),
    Invalidate(usize, usize),
}

/// Cache that records maintenance requests
pub struct SimCache {
    ops: Mutex<Vec<CacheOp>>,
}

impl SimCache {
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
        }
    }

    pub fn ops(&self) -> Vec<CacheOp> {
        self.ops.lock().expect("cache log").clone()
    }
}

impl CacheMaintenance for SimCache {
    fn flush_range(&self, addr: usize, len: usize) {
        self.ops.lock().expect("cache log").push(CacheOp::Flush(addr, len));
    }

    fn invalidate_range(&self, addr: usize, len: usize) {
        self.ops
            .lock()
            .expect("cache log")
            .push(CacheOp::Invalidate(addr, len));
    }
}

// ============================================================================
// Bench
// ============================================================================

/// A simulated board with the driver's interrupt handlers installed
pub struct TestBench {
    pub world: SimWorld,
    pub clock: SimClock,
    pub cache: &'static SimCache,
    pub counters: &'static CompletionCounters,
    pub tx_frame_addr: usize,
    pub rx_frame_addr: usize,
    frames: Cell<Option<(&'static mut FrameBuffer, &'static mut FrameBuffer)>>,
}

impl TestBench {
    /// Bench with the GEM interrupt already connected and enabled
    pub fn new(world: SimWorld) -> Self {
        let bench = Self::unwired(world);
        let mut intc = bench.world.intc();
        intc.connect(SIM_GEM_IRQ, sim_isr).expect("connect");
        intc.enable(SIM_GEM_IRQ);
        bench
    }

    /// Bench whose interrupt still has to be connected by the code under test
    pub fn unwired(world: SimWorld) -> Self {
        let cache: &'static SimCache = Box::leak(Box::new(SimCache::new()));
        let counters: &'static CompletionCounters = Box::leak(Box::new(CompletionCounters::new()));
        let tx_frame = leak_frame();
        let rx_frame = leak_frame();
        let coherent = world.state().coherent;
        let handlers: &'static CompletionHandlers<'static> = Box::leak(Box::new(
            CompletionHandlers::new(counters, cache, rx_frame.addr(), FRAME_CAPACITY, coherent),
        ));
        install_isr_context(&world, handlers);

        Self {
            clock: world.clock(),
            world,
            cache,
            counters,
            tx_frame_addr: tx_frame.addr(),
            rx_frame_addr: rx_frame.addr(),
            frames: Cell::new(Some((tx_frame, rx_frame))),
        }
    }

    /// The TX and RX frame buffers; can only be taken once
    pub fn take_frames(&self) -> (&'static mut FrameBuffer, &'static mut FrameBuffer) {
        self.frames.take().expect("frames already handed out")
    }

    /// Orchestrator over fresh rings on a reset MAC, ready for `send_and_receive`
    pub fn device(&self, config: DriverConfig) -> GemDevice<'_, SimMac, SimClock, SimCache> {
        let (tx_frame, rx_frame) = self.take_frames();
        let (rx_ring, tx_ring) = create_rings(leak_arena(0x20000), &config).expect("rings");
        let mut mac = self.world.mac();
        mac.reset(FRAME_CAPACITY);
        GemDevice::new(
            mac,
            &self.clock,
            self.cache,
            self.counters,
            rx_ring,
            tx_ring,
            tx_frame,
            rx_frame,
            config,
        )
    }
}
