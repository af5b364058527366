//! Descriptor arena
//!
//! The GEM walks its descriptor rings in memory that must never sit in a
//! dirty cache line, so one block is reserved at link time, mapped as device
//! memory by the MMU setup, and split once into the RX and TX ring regions.
//! Splitting consumes the arena: a region can only be handed out once.

use crate::drivers::net::error::NetworkError;

/// The reserved, uncached block the rings are carved from
#[derive(Debug)]
pub struct DmaArena {
    base: usize,
    len: usize,
}

/// One exclusive sub-range of the arena
#[derive(Debug)]
pub struct DmaRegion {
    base: usize,
    len: usize,
}

impl DmaArena {
    /// Take ownership of `memory` for descriptor rings
    pub fn new(memory: &'static mut [u8]) -> Self {
        Self {
            base: memory.as_mut_ptr() as usize,
            len: memory.len(),
        }
    }

    /// # Safety
    ///
    /// `base..base + len` must be identity mapped, uncached (or DMA coherent),
    /// live for the rest of the program and not referenced by anything else.
    pub unsafe fn from_raw(base: usize, len: usize) -> Self {
        Self { base, len }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Split into the RX region `[0, tx_offset)` and the TX region
    /// `[tx_offset, len)`
    pub fn partition(self, tx_offset: usize) -> Result<(DmaRegion, DmaRegion), NetworkError> {
        if tx_offset == 0 || tx_offset >= self.len {
            return Err(NetworkError::ArenaTooSmall {
                required: tx_offset.saturating_add(1),
                available: self.len,
            });
        }

        let rx = DmaRegion {
            base: self.base,
            len: tx_offset,
        };
        let tx = DmaRegion {
            base: self.base + tx_offset,
            len: self.len - tx_offset,
        };
        Ok((rx, tx))
    }
}

impl DmaRegion {
    pub fn base(&self) -> usize {
        self.base
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
