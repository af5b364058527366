//! Ethernet frame handling
//!
//! MAC address representation plus the frame builder used by the transaction
//! orchestrator: it formats a raw Ethernet II frame in place inside a
//! DMA-visible [`FrameBuffer`] and can wipe a buffer with a sentinel pattern so
//! a DMA write into it is easy to spot.
//!
//! Header fields are written through smoltcp's wire-level frame view, which
//! keeps the byte order of the type field independent of the host.
//!
//! ## Layout
//!
//! ```text
//! 0        6        12     14                     14 + payload
//! +--------+--------+------+----------------------+
//! |  dest  | source | type | payload ...          |
//! +--------+--------+------+----------------------+
//! ```

use core::fmt;
use smoltcp::wire::{EthernetAddress, EthernetFrame, EthernetProtocol};

/// Ethernet header size: dest MAC (6) + src MAC (6) + type (2)
pub const HEADER_SIZE: usize = 14;

/// Largest payload the controller accepts in jumbo mode
pub const MTU_JUMBO: usize = 10240;

/// 802.1Q tag plus the extra header room the controller reserves for it
pub const VLAN_HEADER_SIZE: usize = 18;

/// FCS
pub const TRAILER_SIZE: usize = 4;

/// Capacity of every frame buffer: the largest VLAN-tagged jumbo frame
pub const FRAME_CAPACITY: usize = MTU_JUMBO + HEADER_SIZE + VLAN_HEADER_SIZE + TRAILER_SIZE;

/// Word written across a cleared buffer
pub const SENTINEL: u32 = 0xDEAD_BEEF;

/// Largest payload that fits after the header
pub const MAX_PAYLOAD: usize = FRAME_CAPACITY - HEADER_SIZE;

const SENTINEL_BYTES: usize = core::mem::size_of::<u32>();

const _: () = assert!(FRAME_CAPACITY % SENTINEL_BYTES == 0);

/// 48-bit MAC (Media Access Control) address
///
/// Format: 6 bytes, displayed as XX:XX:XX:XX:XX:XX in hexadecimal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Broadcast MAC address (FF:FF:FF:FF:FF:FF)
    pub const fn broadcast() -> Self {
        Self([0xFF; 6])
    }

    /// Check if this is a multicast address (bit 0 of first byte is 1)
    pub fn is_multicast(&self) -> bool {
        (self.0[0] & 0x01) != 0
    }

    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl From<EthernetAddress> for MacAddress {
    fn from(addr: EthernetAddress) -> Self {
        Self(addr.0)
    }
}

impl From<MacAddress> for EthernetAddress {
    fn from(addr: MacAddress) -> Self {
        EthernetAddress(addr.0)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Diagnostic payload written by [`fill_payload`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// [`DIAGNOSTIC_MESSAGE`], zero padded to the requested size
    Message,

    /// 8-bit counter for the first 256 bytes, then a big-endian 16-bit counter
    Incrementing,
}

pub const DIAGNOSTIC_MESSAGE: &[u8] =
    b"gemdiag: single frame probe sent by the GEM0 bring-up harness, payload padded with zeros";

/// DMA-visible frame storage
///
/// Cache-line aligned so flush/invalidate of one buffer never touches a
/// neighbour.
#[repr(C, align(64))]
pub struct FrameBuffer([u8; FRAME_CAPACITY]);

impl FrameBuffer {
    pub const fn new() -> Self {
        Self([0; FRAME_CAPACITY])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// Bus address of the first byte (identity mapped)
    pub fn addr(&self) -> usize {
        self.0.as_ptr() as usize
    }

    pub const fn capacity(&self) -> usize {
        FRAME_CAPACITY
    }

    /// Native-endian word at word index `index`
    pub fn word(&self, index: usize) -> u32 {
        let start = index * SENTINEL_BYTES;
        let mut bytes = [0u8; SENTINEL_BYTES];
        bytes.copy_from_slice(&self.0[start..start + SENTINEL_BYTES]);
        u32::from_ne_bytes(bytes)
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Write `destination` then `source` into bytes 0..12
pub fn format_header(frame: &mut FrameBuffer, destination: MacAddress, source: MacAddress) {
    let mut view = EthernetFrame::new_unchecked(frame.as_bytes_mut());
    view.set_dst_addr(destination.into());
    view.set_src_addr(source.into());
}

/// Write the type/length field at offset 12, network byte order
pub fn format_type(frame: &mut FrameBuffer, value: u16) {
    let mut view = EthernetFrame::new_unchecked(frame.as_bytes_mut());
    view.set_ethertype(EthernetProtocol::from(value));
}

/// Write `size` bytes of diagnostic payload after the header
///
/// The size is clamped to what fits in the buffer. Returns the number of
/// payload bytes written.
pub fn fill_payload(frame: &mut FrameBuffer, size: usize, kind: PayloadKind) -> usize {
    let size = size.min(MAX_PAYLOAD);
    let payload = &mut frame.as_bytes_mut()[HEADER_SIZE..HEADER_SIZE + size];

    match kind {
        PayloadKind::Message => {
            let copied = DIAGNOSTIC_MESSAGE.len().min(size);
            payload[..copied].copy_from_slice(&DIAGNOSTIC_MESSAGE[..copied]);
            payload[copied..].fill(0);
        }
        PayloadKind::Incrementing => {
            let (head, tail) = payload.split_at_mut(size.min(256));
            for (i, byte) in head.iter_mut().enumerate() {
                *byte = i as u8;
            }
            for (i, pair) in tail.chunks_mut(2).enumerate() {
                let counter = (256 + i) as u16;
                let be = counter.to_be_bytes();
                pair.copy_from_slice(&be[..pair.len()]);
            }
        }
    }

    size
}

/// Fill the whole buffer with [`SENTINEL`]
pub fn clear(frame: &mut FrameBuffer) {
    for word in frame.as_bytes_mut().chunks_exact_mut(SENTINEL_BYTES) {
        word.copy_from_slice(&SENTINEL.to_ne_bytes());
    }
}

/// Decoded header of a frame the controller wrote into a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub destination: MacAddress,
    pub source: MacAddress,
    pub ethertype: u16,
}

impl FrameHeader {
    /// Parse the first `len` bytes of `frame`; `None` if they cannot hold a header
    pub fn parse(frame: &FrameBuffer, len: usize) -> Option<Self> {
        let bytes = frame.as_bytes().get(..len)?;
        let view = EthernetFrame::new_checked(bytes).ok()?;
        Some(Self {
            destination: view.dst_addr().into(),
            source: view.src_addr().into(),
            ethertype: u16::from(view.ethertype()),
        })
    }
}

impl fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} type/len 0x{:04X}",
            self.source, self.destination, self.ethertype
        )
    }
}
