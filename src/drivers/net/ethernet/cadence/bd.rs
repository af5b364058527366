//! Buffer descriptor rings
//!
//! The GEM DMA engine walks a circular table of buffer descriptors per
//! direction. A slot moves through four software states, each a contiguous
//! window of the ring:
//!
//! ```text
//!   allocate        enqueue_to_hardware     reclaim_from_hardware     free
//! free ────────► pre ──────────────────► hw ──────────────────────► post ──────► free
//!      ◄──────── unallocate
//! ```
//!
//! Circularly the windows are ordered post → hw → pre → free, so every
//! operation only ever advances one head. Spans must be handed back in the
//! order they were produced.
//!
//! ## Descriptor Layout
//!
//! | Word | RX | TX |
//! |------|----|----|
//! | 0 | address[31:2], wrap (1), new (0) | address |
//! | 1 | SOF (14), EOF (15), length[12:0] | used (31), wrap (30), last (15), length[13:0] |
//! | 2 | address[63:32] (64-bit) | address[63:32] (64-bit) |
//! | 3 | reserved | reserved |
//!
//! RX "new" set means software owns the slot (hardware wrote a frame, or it
//! was never handed over); TX "used" set means software owns it.
//!
//! ## References
//!
//! - Zynq-7000 TRM (UG585), Section 16.3.4 "DMA Buffer Descriptors"
//! - Xilinx standalone BSP, `xemacps_bdring.c`

use crate::hal::Direction;
use core::fmt;
use volatile::Volatile;

// ============================================================================
// Descriptor Bits
// ============================================================================

/// RX word 0: software owns the slot
pub const RX_NEW: u32 = 1 << 0;
/// RX word 0: last slot of the ring
pub const RX_WRAP: u32 = 1 << 1;
const RX_ADDR_MASK: u32 = !0x3;

pub const RX_SOF: u32 = 1 << 14;
pub const RX_EOF: u32 = 1 << 15;
const RX_LEN_MASK: u32 = 0x1FFF;

/// TX word 1: software owns the slot
pub const TX_USED: u32 = 1 << 31;
/// TX word 1: last slot of the ring
pub const TX_WRAP: u32 = 1 << 30;
pub const TX_LAST: u32 = 1 << 15;
const TX_LEN_MASK: u32 = 0x3FFF;

/// Minimum ring base alignment, one cache line
pub const RING_ALIGNMENT: usize = 64;

/// Errors returned by ring operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    /// Alignment is not a power of two or is below the descriptor alignment
    BadAlignment { alignment: usize },

    /// Base address does not honour the requested alignment
    Misaligned { addr: usize, alignment: usize },

    /// Region cannot hold `capacity` descriptors
    RegionTooSmall { required: usize, available: usize },

    ZeroCapacity,

    /// `clone_template` has not run yet
    NotInitialized,

    /// The template can only be cloned into a ring whose slots are all free
    Busy,

    /// Not enough slots in the source window
    Insufficient { requested: usize, available: usize },

    /// Span does not start at the head of the window it is returned to
    OutOfOrder { first: usize, expected: usize },

    /// Slot is not in the state the operation requires
    BadSlotState { slot: usize },

    /// Field does not exist for this ring's direction
    WrongDirection,
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingError::BadAlignment { alignment } => write!(f, "bad alignment {}", alignment),
            RingError::Misaligned { addr, alignment } => {
                write!(f, "address {:#x} not aligned to {}", addr, alignment)
            }
            RingError::RegionTooSmall {
                required,
                available,
            } => write!(f, "region holds {} bytes, need {}", available, required),
            RingError::ZeroCapacity => write!(f, "zero capacity"),
            RingError::NotInitialized => write!(f, "ring template not cloned"),
            RingError::Busy => write!(f, "ring has slots in use"),
            RingError::Insufficient {
                requested,
                available,
            } => write!(f, "requested {} slots, {} available", requested, available),
            RingError::OutOfOrder { first, expected } => {
                write!(f, "span starts at slot {}, expected {}", first, expected)
            }
            RingError::BadSlotState { slot } => write!(f, "slot {} in wrong state", slot),
            RingError::WrongDirection => write!(f, "field not valid for ring direction"),
        }
    }
}

/// Plain copy of the two control words of a descriptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Descriptor {
    pub word0: u32,
    pub word1: u32,
}

impl Descriptor {
    pub const fn zeroed() -> Self {
        Self { word0: 0, word1: 0 }
    }
}

/// Descriptor as the DMA engine sees it
#[repr(C)]
pub struct RawDescriptor {
    word0: Volatile<u32>,
    word1: Volatile<u32>,
    #[cfg(target_pointer_width = "64")]
    addr_hi: Volatile<u32>,
    #[cfg(target_pointer_width = "64")]
    reserved: Volatile<u32>,
}

impl RawDescriptor {
    pub fn load(&self) -> Descriptor {
        Descriptor {
            word0: self.word0.read(),
            word1: self.word1.read(),
        }
    }

    pub fn store(&mut self, desc: Descriptor) {
        // Status word last: it carries the ownership bit on TX
        self.word0.write(desc.word0);
        self.word1.write(desc.word1);
    }

    fn set_addr_hi(&mut self, _addr: usize) {
        #[cfg(target_pointer_width = "64")]
        {
            self.addr_hi.write((_addr >> 32) as u32);
            self.reserved.write(0);
        }
    }

    /// Full buffer address (word 0 plus the upper half on 64-bit targets)
    pub fn buffer_addr(&self, direction: Direction) -> usize {
        let low = match direction {
            Direction::Receive => self.word0.read() & RX_ADDR_MASK,
            Direction::Transmit => self.word0.read(),
        } as usize;
        #[cfg(target_pointer_width = "64")]
        {
            low | ((self.addr_hi.read() as usize) << 32)
        }
        #[cfg(not(target_pointer_width = "64"))]
        {
            low
        }
    }
}

/// Distance between two descriptors in the table
pub const DESCRIPTOR_STRIDE: usize = core::mem::size_of::<RawDescriptor>();

/// Contiguous run of slots produced by one ring operation
///
/// Consumed by the operation that moves its slots to the next state.
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub struct DescriptorSpan {
    first: usize,
    count: usize,
    capacity: usize,
}

impl DescriptorSpan {
    pub fn first(&self) -> usize {
        self.first
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Slot index of the `n`th descriptor of the span
    pub fn slot(&self, n: usize) -> usize {
        (self.first + n) % self.capacity
    }

    pub fn slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.count).map(|n| self.slot(n))
    }
}

/// One direction's descriptor ring
#[derive(Debug)]
pub struct DescriptorRing {
    base: usize,
    bus_addr: usize,
    capacity: usize,
    direction: Option<Direction>,
    template: Descriptor,

    free_head: usize,
    pre_head: usize,
    hw_head: usize,
    post_head: usize,

    free_cnt: usize,
    pre_cnt: usize,
    hw_cnt: usize,
    post_cnt: usize,
}

impl DescriptorRing {
    /// Lay out `capacity` descriptors at the start of `region`
    ///
    /// `bus_addr` is the address the DMA engine uses for the same memory.
    /// Every slot starts zeroed and free; [`clone_template`](Self::clone_template)
    /// must run before the first allocation.
    pub fn create(
        region: super::dma::DmaRegion,
        bus_addr: usize,
        alignment: usize,
        capacity: usize,
    ) -> Result<Self, RingError> {
        if !alignment.is_power_of_two() || alignment < core::mem::align_of::<RawDescriptor>() {
            return Err(RingError::BadAlignment { alignment });
        }
        for addr in [region.base(), bus_addr] {
            if addr % alignment != 0 {
                return Err(RingError::Misaligned { addr, alignment });
            }
        }
        if capacity == 0 {
            return Err(RingError::ZeroCapacity);
        }
        let required = capacity * DESCRIPTOR_STRIDE;
        if required > region.len() {
            return Err(RingError::RegionTooSmall {
                required,
                available: region.len(),
            });
        }

        let mut ring = Self {
            base: region.base(),
            bus_addr,
            capacity,
            direction: None,
            template: Descriptor::zeroed(),
            free_head: 0,
            pre_head: 0,
            hw_head: 0,
            post_head: 0,
            free_cnt: capacity,
            pre_cnt: 0,
            hw_cnt: 0,
            post_cnt: 0,
        };
        for slot in 0..capacity {
            ring.raw(slot).store(Descriptor::zeroed());
            ring.raw(slot).set_addr_hi(0);
        }
        Ok(ring)
    }

    /// Initialise every slot from `template` for `direction`
    ///
    /// RX slots start software owned (`new` set) so the DMA engine skips them
    /// until they are enqueued; TX slots start `used`. The last slot carries
    /// the wrap bit.
    pub fn clone_template(
        &mut self,
        template: Descriptor,
        direction: Direction,
    ) -> Result<(), RingError> {
        if self.free_cnt != self.capacity {
            return Err(RingError::Busy);
        }
        self.direction = Some(direction);
        self.template = template;
        for slot in 0..self.capacity {
            let desc = self.idle_state(slot);
            self.raw(slot).store(desc);
        }
        Ok(())
    }

    /// Reserve `count` contiguous free slots
    pub fn allocate(&mut self, count: usize) -> Result<DescriptorSpan, RingError> {
        self.direction()?;
        if count > self.free_cnt {
            return Err(RingError::Insufficient {
                requested: count,
                available: self.free_cnt,
            });
        }
        let span = self.span(self.free_head, count);
        self.free_head = self.advance(self.free_head, count);
        self.free_cnt -= count;
        self.pre_cnt += count;
        Ok(span)
    }

    /// Return the most recently allocated slots without handing them to hardware
    pub fn unallocate(&mut self, span: DescriptorSpan) -> Result<(), RingError> {
        if span.count > self.pre_cnt {
            return Err(RingError::Insufficient {
                requested: span.count,
                available: self.pre_cnt,
            });
        }
        let expected = self.retreat(self.free_head, span.count);
        if span.first != expected {
            return Err(RingError::OutOfOrder {
                first: span.first,
                expected,
            });
        }
        for slot in span.slots() {
            let desc = self.idle_state(slot);
            self.raw(slot).store(desc);
        }
        self.free_head = expected;
        self.free_cnt += span.count;
        self.pre_cnt -= span.count;
        Ok(())
    }

    /// Hand allocated slots to the DMA engine
    pub fn enqueue_to_hardware(&mut self, span: DescriptorSpan) -> Result<(), RingError> {
        let direction = self.direction()?;
        if span.count > self.pre_cnt {
            return Err(RingError::Insufficient {
                requested: span.count,
                available: self.pre_cnt,
            });
        }
        if span.first != self.pre_head {
            return Err(RingError::OutOfOrder {
                first: span.first,
                expected: self.pre_head,
            });
        }
        if direction == Direction::Receive {
            for slot in span.slots() {
                let raw = self.raw(slot);
                raw.word0.update(|w| *w &= !RX_NEW);
            }
        }
        self.pre_head = self.advance(self.pre_head, span.count);
        self.pre_cnt -= span.count;
        self.hw_cnt += span.count;
        Ok(())
    }

    /// Collect up to `max` slots the DMA engine has finished with, in enqueue order
    ///
    /// An empty span means nothing has completed yet.
    pub fn reclaim_from_hardware(&mut self, max: usize) -> Result<DescriptorSpan, RingError> {
        let direction = self.direction()?;
        let limit = max.min(self.hw_cnt);
        let mut done = 0;
        while done < limit {
            let desc = self.raw(self.advance(self.hw_head, done)).load();
            let complete = match direction {
                Direction::Transmit => desc.word1 & TX_USED != 0,
                Direction::Receive => desc.word0 & RX_NEW != 0,
            };
            if !complete {
                break;
            }
            done += 1;
        }
        let span = self.span(self.hw_head, done);
        self.hw_head = self.advance(self.hw_head, done);
        self.hw_cnt -= done;
        self.post_cnt += done;
        Ok(span)
    }

    /// Return reclaimed slots to the free pool, restoring their idle state
    pub fn free(&mut self, span: DescriptorSpan) -> Result<(), RingError> {
        if span.count > self.post_cnt {
            return Err(RingError::Insufficient {
                requested: span.count,
                available: self.post_cnt,
            });
        }
        if span.is_empty() {
            return Ok(());
        }
        if span.first != self.post_head {
            return Err(RingError::OutOfOrder {
                first: span.first,
                expected: self.post_head,
            });
        }
        for slot in span.slots() {
            let desc = self.idle_state(slot);
            self.raw(slot).store(desc);
        }
        self.post_head = self.advance(self.post_head, span.count);
        self.post_cnt -= span.count;
        self.free_cnt += span.count;
        Ok(())
    }

    // ========================================================================
    // Slot Field Access (allocated slots only)
    // ========================================================================

    /// Bind a buffer to an allocated slot
    pub fn set_address(&mut self, slot: usize, addr: usize) -> Result<(), RingError> {
        let direction = self.pre_slot(slot)?;
        let raw = self.raw(slot);
        match direction {
            Direction::Receive => {
                raw.word0
                    .update(|w| *w = (*w & !RX_ADDR_MASK) | (addr as u32 & RX_ADDR_MASK));
            }
            Direction::Transmit => raw.word0.write(addr as u32),
        }
        raw.set_addr_hi(addr);
        Ok(())
    }

    /// Set the TX frame length (RX lengths are written by hardware)
    pub fn set_length(&mut self, slot: usize, len: usize) -> Result<(), RingError> {
        if self.pre_slot(slot)? != Direction::Transmit {
            return Err(RingError::WrongDirection);
        }
        self.raw(slot)
            .word1
            .update(|w| *w = (*w & !TX_LEN_MASK) | (len as u32 & TX_LEN_MASK));
        Ok(())
    }

    /// Flag the slot as the last fragment of its frame
    pub fn mark_last(&mut self, slot: usize) -> Result<(), RingError> {
        if self.pre_slot(slot)? != Direction::Transmit {
            return Err(RingError::WrongDirection);
        }
        self.raw(slot).word1.update(|w| *w |= TX_LAST);
        Ok(())
    }

    /// Give a TX slot to hardware at the descriptor level
    pub fn clear_used(&mut self, slot: usize) -> Result<(), RingError> {
        if self.pre_slot(slot)? != Direction::Transmit {
            return Err(RingError::WrongDirection);
        }
        self.raw(slot).word1.update(|w| *w &= !TX_USED);
        Ok(())
    }

    /// Frame length recorded in a slot
    pub fn length(&self, slot: usize) -> Result<usize, RingError> {
        let direction = self.direction()?;
        let desc = self.descriptor(slot);
        let len = match direction {
            Direction::Transmit => desc.word1 & TX_LEN_MASK,
            Direction::Receive => desc.word1 & RX_LEN_MASK,
        };
        Ok(len as usize)
    }

    /// Raw status word of a slot
    pub fn status(&self, slot: usize) -> u32 {
        self.descriptor(slot).word1
    }

    pub fn descriptor(&self, slot: usize) -> Descriptor {
        // SAFETY: slot is reduced modulo capacity and create() verified the
        // region holds `capacity` descriptors
        unsafe { &*(self.slot_addr(slot) as *const RawDescriptor) }.load()
    }

    // ========================================================================
    // Geometry and Counters
    // ========================================================================

    pub fn base(&self) -> usize {
        self.base
    }

    /// Address to publish as the DMA queue base
    pub fn bus_addr(&self) -> usize {
        self.bus_addr
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn slot_addr(&self, slot: usize) -> usize {
        self.base + (slot % self.capacity) * DESCRIPTOR_STRIDE
    }

    pub fn free_count(&self) -> usize {
        self.free_cnt
    }

    pub fn allocated_count(&self) -> usize {
        self.pre_cnt
    }

    pub fn hardware_count(&self) -> usize {
        self.hw_cnt
    }

    pub fn completed_count(&self) -> usize {
        self.post_cnt
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn direction(&self) -> Result<Direction, RingError> {
        self.direction.ok_or(RingError::NotInitialized)
    }

    fn raw(&mut self, slot: usize) -> &mut RawDescriptor {
        let addr = self.slot_addr(slot);
        // SAFETY: the region was exclusively handed to this ring at create()
        // and is large enough for `capacity` descriptors; &mut self keeps the
        // CPU side single-writer
        unsafe { &mut *(addr as *mut RawDescriptor) }
    }

    /// Descriptor contents of a slot sitting in the free pool
    fn idle_state(&self, slot: usize) -> Descriptor {
        let last = slot == self.capacity - 1;
        let mut desc = self.template;
        match self.direction {
            Some(Direction::Receive) => {
                desc.word0 = (desc.word0 & !RX_WRAP) | RX_NEW;
                if last {
                    desc.word0 |= RX_WRAP;
                }
            }
            Some(Direction::Transmit) => {
                desc.word1 = (desc.word1 & !TX_WRAP) | TX_USED;
                if last {
                    desc.word1 |= TX_WRAP;
                }
            }
            None => {}
        }
        desc
    }

    /// Direction of the ring, if `slot` is currently allocated
    fn pre_slot(&self, slot: usize) -> Result<Direction, RingError> {
        let direction = self.direction()?;
        if slot >= self.capacity {
            return Err(RingError::BadSlotState { slot });
        }
        let offset = (slot + self.capacity - self.pre_head) % self.capacity;
        if offset >= self.pre_cnt {
            return Err(RingError::BadSlotState { slot });
        }
        Ok(direction)
    }

    fn span(&self, first: usize, count: usize) -> DescriptorSpan {
        DescriptorSpan {
            first,
            count,
            capacity: self.capacity,
        }
    }

    fn advance(&self, head: usize, n: usize) -> usize {
        (head + n) % self.capacity
    }

    fn retreat(&self, head: usize, n: usize) -> usize {
        (head + self.capacity - n % self.capacity) % self.capacity
    }
}
