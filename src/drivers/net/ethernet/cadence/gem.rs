//! Cadence GEM register-level controller.
//!
//! [`GemController`] is the board implementation of [`Mac`]: plain volatile
//! accesses to one GEM instance. It keeps no shadow state; everything it
//! needs to know (started, MDIO idle) is read back from the hardware.
//!
//! ## Register Map (subset)
//!
//! | Offset | Name | Used for |
//! |--------|------|----------|
//! | 0x000 | `net_ctrl` | TX/RX enable, MDIO enable, start TX |
//! | 0x004 | `net_cfg` | speed, duplex, MDC divisor |
//! | 0x008 | `net_status` | MDIO idle |
//! | 0x010 | `dma_cfg` | RX buffer size, packet buffer size, burst length |
//! | 0x014 | `tx_status` | TX completion and error bits (write 1 to clear) |
//! | 0x018 | `rx_qbar` | RX descriptor ring base |
//! | 0x01C | `tx_qbar` | TX descriptor ring base |
//! | 0x020 | `rx_status` | RX completion and error bits (write 1 to clear) |
//! | 0x024 | `intr_status` | pending sources (write 1 to clear) |
//! | 0x028 | `intr_en` | enable sources |
//! | 0x02C | `intr_dis` | disable sources |
//! | 0x034 | `phy_maint` | clause 22 MDIO frame |
//! | 0x088 | `spec_addr1_bot` | station address bytes 0..4 |
//! | 0x08C | `spec_addr1_top` | station address bytes 4..6 |
//! | 0x0FC | `module_id` | revision |
//!
//! ## References
//!
//! - Zynq-7000 TRM (UG585), Chapter 16 "Gigabit Ethernet Controller"
//! - UG585 Appendix B, `GEM` register summary

use super::intr::{self, MacEventHandler};
use crate::hal::{
    Direction, HalError, InterruptMask, LinkSpeed, Mac, MacConfig, MdcDivisor, irq_source,
};
use crate::net::ethernet::MacAddress;
use core::ptr::{read_volatile, write_volatile};

/// GEM instances on the Zynq-7000
pub const GEM_CONFIG_TABLE: [MacConfig; 2] = [
    MacConfig {
        device_id: 0,
        base_addr: 0xE000_B000,
        cache_coherent: false,
    },
    MacConfig {
        device_id: 1,
        base_addr: 0xE000_C000,
        cache_coherent: false,
    },
];

/// Configuration of device `device_id`, if the SoC has it
pub fn lookup_config(device_id: u16) -> Option<MacConfig> {
    GEM_CONFIG_TABLE
        .iter()
        .find(|cfg| cfg.device_id == device_id)
        .copied()
}

mod offset {
    pub const NET_CTRL: usize = 0x000;
    pub const NET_CFG: usize = 0x004;
    pub const NET_STATUS: usize = 0x008;
    pub const DMA_CFG: usize = 0x010;
    pub const TX_STATUS: usize = 0x014;
    pub const RX_QBAR: usize = 0x018;
    pub const TX_QBAR: usize = 0x01C;
    pub const RX_STATUS: usize = 0x020;
    pub const INTR_STATUS: usize = 0x024;
    pub const INTR_EN: usize = 0x028;
    pub const INTR_DIS: usize = 0x02C;
    pub const PHY_MAINT: usize = 0x034;
    pub const SPEC_ADDR1_BOT: usize = 0x088;
    pub const SPEC_ADDR1_TOP: usize = 0x08C;
    pub const MODULE_ID: usize = 0x0FC;
}

/// `net_ctrl` bits
mod net_ctrl {
    pub const RX_EN: u32 = 1 << 2;
    pub const TX_EN: u32 = 1 << 3;
    pub const MGMT_PORT_EN: u32 = 1 << 4;
    pub const CLEAR_STATS: u32 = 1 << 5;
    pub const START_TX: u32 = 1 << 9;
}

/// `net_cfg` bits
mod net_cfg {
    pub const SPEED_100: u32 = 1 << 0;
    pub const FULL_DUPLEX: u32 = 1 << 1;
    pub const RX_1536_EN: u32 = 1 << 8;
    pub const GIGE_EN: u32 = 1 << 10;
    pub const MDC_CLK_DIV_SHIFT: u32 = 18;
    pub const MDC_CLK_DIV_MASK: u32 = 0x7 << MDC_CLK_DIV_SHIFT;
}

/// `dma_cfg` fields
mod dma_cfg {
    pub const RX_BUF_SIZE_SHIFT: u32 = 16;
    /// Receive buffer size is programmed in units of this many bytes
    pub const RX_BUF_UNIT: usize = 64;
    pub const RX_BUF_UNITS_MAX: usize = 0xFF;
    pub const TX_PKTBUF_FULL: u32 = 1 << 10;
    pub const RX_PKTBUF_FULL: u32 = 0x3 << 8;
    pub const BURST_INCR16: u32 = 0x10;
}

/// `net_status` bit: the MDIO state machine is idle
const NET_STATUS_MGMT_IDLE: u32 = 1 << 2;

/// `phy_maint` fields
mod phy_maint {
    pub const CLAUSE_22: u32 = 0x4000_0000;
    pub const OP_READ: u32 = 0x2000_0000;
    pub const OP_WRITE: u32 = 0x1000_0000;
    /// Must be written as 0b10
    pub const MUST_10: u32 = 0x0002_0000;
    pub const PHY_ADDR_SHIFT: u32 = 23;
    pub const REG_ADDR_SHIFT: u32 = 18;
    pub const DATA_MASK: u32 = 0xFFFF;
}

/// Status-register write that clears every latched bit
const STATUS_CLEAR_ALL: u32 = 0xFFFF_FFFF;

/// Spins allowed for one MDIO frame (a frame takes 64 MDC periods)
const MDIO_SPIN_LIMIT: u32 = 100_000;

/// Clause 22 management frame for `phy_maint`
pub const fn phy_maintenance_frame(write: bool, phy_addr: u8, reg: u8, data: u16) -> u32 {
    let op = if write {
        phy_maint::OP_WRITE
    } else {
        phy_maint::OP_READ
    };
    phy_maint::CLAUSE_22
        | op
        | phy_maint::MUST_10
        | (((phy_addr & 0x1F) as u32) << phy_maint::PHY_ADDR_SHIFT)
        | (((reg & 0x1F) as u32) << phy_maint::REG_ADDR_SHIFT)
        | data as u32
}

/// Station address as (`spec_addr1_bot`, `spec_addr1_top`)
pub const fn station_address_words(mac: MacAddress) -> (u32, u32) {
    let b = mac.0;
    let bot = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    let top = b[4] as u32 | (b[5] as u32) << 8;
    (bot, top)
}

/// `net_cfg` with the speed bits replaced; duplex forced full
pub const fn with_speed(cfg: u32, speed: LinkSpeed) -> u32 {
    let cfg = (cfg & !(net_cfg::SPEED_100 | net_cfg::GIGE_EN)) | net_cfg::FULL_DUPLEX;
    match speed {
        LinkSpeed::Speed10 => cfg,
        LinkSpeed::Speed100 => cfg | net_cfg::SPEED_100,
        LinkSpeed::Speed1000 => cfg | net_cfg::GIGE_EN,
    }
}

/// `net_cfg` with the MDC divisor field replaced
pub const fn with_mdc_divisor(cfg: u32, divisor: MdcDivisor) -> u32 {
    (cfg & !net_cfg::MDC_CLK_DIV_MASK) | ((divisor as u32) << net_cfg::MDC_CLK_DIV_SHIFT)
}

/// `dma_cfg` value for receive buffers of at least `rx_buffer_size` bytes
///
/// The size is rounded up to whole 64-byte units and clamped to what the
/// 8-bit field can hold. Returns the register value and the size in bytes
/// the DMA engine will actually use per descriptor.
pub const fn dma_config_for(rx_buffer_size: usize) -> (u32, usize) {
    let mut units = rx_buffer_size.div_ceil(dma_cfg::RX_BUF_UNIT);
    if units == 0 {
        units = 1;
    }
    if units > dma_cfg::RX_BUF_UNITS_MAX {
        units = dma_cfg::RX_BUF_UNITS_MAX;
    }
    let value = ((units as u32) << dma_cfg::RX_BUF_SIZE_SHIFT)
        | dma_cfg::TX_PKTBUF_FULL
        | dma_cfg::RX_PKTBUF_FULL
        | dma_cfg::BURST_INCR16;
    (value, units * dma_cfg::RX_BUF_UNIT)
}

/// One GEM instance
pub struct GemController {
    config: MacConfig,
}

impl GemController {
    /// Controller for the SoC instance described by `config`
    ///
    /// # Safety
    ///
    /// `config.base_addr` must be the GEM register block, mapped as device
    /// memory. At most one instance per GEM may use the `&mut self`
    /// methods; others may only service interrupts.
    pub const unsafe fn new(config: MacConfig) -> Self {
        Self { config }
    }

    /// Interrupt service routine body: latch and clear `intr_status`, then
    /// dispatch to `handler`
    ///
    /// Per-direction status registers are read and cleared on demand.
    pub fn service_interrupt(&self, handler: &dyn MacEventHandler) {
        let status = self.read(offset::INTR_STATUS);
        self.write(offset::INTR_STATUS, status);

        intr::dispatch(
            status,
            |direction| {
                let reg = match direction {
                    Direction::Receive => offset::RX_STATUS,
                    Direction::Transmit => offset::TX_STATUS,
                };
                let bits = self.read(reg);
                self.write(reg, bits);
                bits
            },
            handler,
            self,
        );
    }

    fn is_started(&self) -> bool {
        self.read(offset::NET_CTRL) & (net_ctrl::TX_EN | net_ctrl::RX_EN) != 0
    }

    fn mdio_idle(&self) -> bool {
        self.read(offset::NET_STATUS) & NET_STATUS_MGMT_IDLE != 0
    }

    /// Spin until the MDIO state machine goes idle
    fn wait_mdio_idle(&self) -> bool {
        (0..MDIO_SPIN_LIMIT).any(|_| self.mdio_idle())
    }

    /// Issue one management frame and wait for it to finish
    fn mdio_frame(&mut self, frame: u32) -> Result<u32, HalError> {
        if !self.mdio_idle() {
            return Err(HalError::MdioBusy);
        }
        self.modify(offset::NET_CTRL, |v| v | net_ctrl::MGMT_PORT_EN);
        self.write(offset::PHY_MAINT, frame);
        if !self.wait_mdio_idle() {
            return Err(HalError::NoResponse);
        }
        Ok(self.read(offset::PHY_MAINT))
    }

    fn read(&self, offset: usize) -> u32 {
        // SAFETY: base_addr is this GEM's register block (see `new`) and
        // offset is a register in it
        unsafe { read_volatile((self.config.base_addr + offset) as *const u32) }
    }

    fn write(&self, offset: usize, value: u32) {
        // SAFETY: see read
        unsafe { write_volatile((self.config.base_addr + offset) as *mut u32, value) }
    }

    fn modify(&mut self, offset: usize, f: impl FnOnce(u32) -> u32) {
        let value = f(self.read(offset));
        self.write(offset, value);
    }
}

impl InterruptMask for GemController {
    fn disable_interrupts(&self, mask: u32) {
        self.write(offset::INTR_DIS, mask);
    }
}

impl Mac for GemController {
    fn config(&self) -> MacConfig {
        self.config
    }

    fn module_revision(&self) -> u32 {
        (self.read(offset::MODULE_ID) >> 16) & 0xFFF
    }

    fn reset(&mut self, rx_buffer_size: usize) -> usize {
        self.write(offset::NET_CTRL, 0);
        self.write(offset::NET_CTRL, net_ctrl::CLEAR_STATS);
        self.write(offset::TX_STATUS, STATUS_CLEAR_ALL);
        self.write(offset::RX_STATUS, STATUS_CLEAR_ALL);
        self.write(offset::INTR_DIS, irq_source::ALL);
        self.write(offset::INTR_STATUS, STATUS_CLEAR_ALL);
        self.write(offset::RX_QBAR, 0);
        self.write(offset::TX_QBAR, 0);

        self.modify(offset::NET_CFG, |cfg| cfg | net_cfg::RX_1536_EN);
        let (value, size) = dma_config_for(rx_buffer_size);
        self.write(offset::DMA_CFG, value);
        size
    }

    fn set_mac_address(&mut self, mac: MacAddress) -> Result<(), HalError> {
        if self.is_started() {
            return Err(HalError::InvalidState);
        }
        let (bot, top) = station_address_words(mac);
        self.write(offset::SPEC_ADDR1_BOT, bot);
        self.write(offset::SPEC_ADDR1_TOP, top);
        Ok(())
    }

    fn set_mdio_divisor(&mut self, divisor: MdcDivisor) {
        self.modify(offset::NET_CFG, |cfg| with_mdc_divisor(cfg, divisor));
    }

    fn phy_read(&mut self, phy_addr: u8, reg: u8) -> Result<u16, HalError> {
        let value = self.mdio_frame(phy_maintenance_frame(false, phy_addr, reg, 0))?;
        Ok((value & phy_maint::DATA_MASK) as u16)
    }

    fn phy_write(&mut self, phy_addr: u8, reg: u8, value: u16) -> Result<(), HalError> {
        self.mdio_frame(phy_maintenance_frame(true, phy_addr, reg, value))?;
        Ok(())
    }

    fn set_operating_speed(&mut self, speed: LinkSpeed) {
        self.modify(offset::NET_CFG, |cfg| with_speed(cfg, speed));
    }

    fn set_queue_base(&mut self, direction: Direction, base: usize) {
        let reg = match direction {
            Direction::Receive => offset::RX_QBAR,
            Direction::Transmit => offset::TX_QBAR,
        };
        self.write(reg, base as u32);
    }

    fn start(&mut self) {
        self.write(offset::TX_STATUS, STATUS_CLEAR_ALL);
        self.write(offset::RX_STATUS, STATUS_CLEAR_ALL);
        self.modify(offset::NET_CTRL, |v| v | net_ctrl::TX_EN | net_ctrl::RX_EN);
        self.write(offset::INTR_EN, irq_source::COMPLETION_AND_ERRORS);
    }

    fn stop(&mut self) {
        self.write(offset::INTR_DIS, irq_source::ALL);
        self.modify(offset::NET_CTRL, |v| v & !(net_ctrl::TX_EN | net_ctrl::RX_EN));
        self.write(offset::TX_STATUS, STATUS_CLEAR_ALL);
        self.write(offset::RX_STATUS, STATUS_CLEAR_ALL);
        self.write(offset::INTR_STATUS, STATUS_CLEAR_ALL);
    }

    fn transmit(&mut self) {
        self.modify(offset::NET_CTRL, |v| v | net_ctrl::START_TX);
    }
}
