//! Link bring-up
//!
//! Takes the GEM from reset to a gigabit link:
//!
//! 1. Report the controller module revision, reset the controller and size
//!    its receive buffers for a full [`FrameBuffer`](crate::net::ethernet::FrameBuffer)
//! 2. Reprogram the GEM0 reference clock for 125 MHz (SLCR)
//! 3. Program the station address and the MDC divisor
//! 4. Scan MDIO addresses 0..=31 for a PHY
//! 5. Force 1000 Mb/s full duplex, drop loopback, enable autonegotiation
//! 6. Poll BMSR until autonegotiation completes, then until the link is up
//! 7. Switch the MAC to 1000 Mb/s
//!
//! Every poll loop is bounded by [`DriverConfig::link_poll`].
//!
//! ## References
//!
//! - IEEE 802.3 Clause 22 (BMCR/BMSR/PHYSID)
//! - Zynq-7000 TRM (UG585), Section 16.3.6 "PHY Interface"

use super::clock::{GEM0_DIVISOR0, GEM0_DIVISOR1, Slcr, configure_gem0_clock};
use crate::config::{DriverConfig, RegisterPolicy};
use crate::drivers::net::error::{LinkStage, NetworkError, RegisterOp};
use crate::hal::{Clock, HalError, LinkSpeed, Mac, MdcDivisor, SystemControl};
use crate::net::ethernet::FRAME_CAPACITY;
use crate::println;
use crate::wait::{PollError, poll_until};

// ============================================================================
// Clause 22 Registers
// ============================================================================

pub const MII_BMCR: u8 = 0x00;
pub const MII_BMSR: u8 = 0x01;
pub const MII_PHYSID1: u8 = 0x02;
pub const MII_PHYSID2: u8 = 0x03;

/// BMCR: speed select LSB/MSB = 1000 Mb/s, full duplex
pub const BMCR_FORCE_1000_FULL: u16 = 0x0140;
pub const BMCR_ANENABLE: u16 = 1 << 12;
pub const BMCR_LOOPBACK: u16 = 1 << 14;

pub const BMSR_LSTATUS: u16 = 1 << 2;
pub const BMSR_ANEGCOMPLETE: u16 = 1 << 5;

/// Number of addresses on an MDIO bus
pub const PHY_ADDR_COUNT: u8 = 32;

/// Returned by [`detect_phy`] when no address answers
pub const PHY_NOT_FOUND: u8 = PHY_ADDR_COUNT;

/// Link as left by [`bring_up`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkState {
    pub phy_addr: u8,
    /// PHYSID1 << 16 | PHYSID2
    pub phy_id: u32,
    pub speed: LinkSpeed,
    pub full_duplex: bool,
    pub up: bool,
}

/// Find the first MDIO address with a PHY behind it
///
/// A PHY is present when both ID registers read back something other than
/// all zeros or all ones (a floating bus). Returns [`PHY_NOT_FOUND`] if no
/// address qualifies.
pub fn detect_phy<M: Mac + ?Sized>(mac: &mut M) -> u8 {
    (0..PHY_ADDR_COUNT)
        .find(|&addr| read_phy_id(mac, addr).is_some())
        .unwrap_or(PHY_NOT_FOUND)
}

fn read_phy_id<M: Mac + ?Sized>(mac: &mut M, addr: u8) -> Option<u32> {
    let valid = |v: u16| v > 0x0000 && v < 0xFFFF;
    let id1 = mac.phy_read(addr, MII_PHYSID1).ok().filter(|&v| valid(v))?;
    let id2 = mac.phy_read(addr, MII_PHYSID2).ok().filter(|&v| valid(v))?;
    Some(((id1 as u32) << 16) | id2 as u32)
}

/// Register access with the configured failure policy applied
struct Mdio<'a, M: Mac + ?Sized> {
    mac: &'a mut M,
    phy_addr: u8,
    policy: RegisterPolicy,
}

impl<M: Mac + ?Sized> Mdio<'_, M> {
    /// Read `reg`; under [`RegisterPolicy::Tolerate`] a failure yields `fallback`
    fn read_or(&mut self, reg: u8, fallback: u16) -> Result<u16, NetworkError> {
        let op = RegisterOp::PhyRead {
            phy_addr: self.phy_addr,
            reg,
        };
        match self.mac.phy_read(self.phy_addr, reg) {
            Ok(value) => Ok(value),
            Err(cause) => tolerate(self.policy, op, cause).map(|()| fallback),
        }
    }

    fn write(&mut self, reg: u8, value: u16) -> Result<(), NetworkError> {
        let op = RegisterOp::PhyWrite {
            phy_addr: self.phy_addr,
            reg,
        };
        match self.mac.phy_write(self.phy_addr, reg, value) {
            Ok(()) => Ok(()),
            Err(cause) => tolerate(self.policy, op, cause),
        }
    }
}

fn tolerate(policy: RegisterPolicy, op: RegisterOp, cause: HalError) -> Result<(), NetworkError> {
    let err = NetworkError::RegisterAccess { op, cause };
    match policy {
        RegisterPolicy::Tolerate => {
            println!("[WARN] {} (ignored)", err);
            Ok(())
        }
        RegisterPolicy::Abort => {
            println!("[FAIL] {}", err);
            Err(err)
        }
    }
}

/// Bring the link up; see the module documentation for the sequence
pub fn bring_up<M, S, C>(
    mac: &mut M,
    slcr: &mut S,
    clock: &C,
    config: &DriverConfig,
) -> Result<LinkState, NetworkError>
where
    M: Mac + ?Sized,
    S: SystemControl + ?Sized,
    C: Clock + ?Sized,
{
    println!("[GEM] Module revision {:#05x}", mac.module_revision());
    let rx_buffer = mac.reset(FRAME_CAPACITY);
    println!("[GEM] Controller reset, {} byte receive buffers", rx_buffer);

    let clk_ctrl = configure_gem0_clock(&mut Slcr::new(slcr), GEM0_DIVISOR0, GEM0_DIVISOR1);
    println!("[GEM] GEM0_CLK_CTRL = {:#010x}", clk_ctrl);
    clock.delay_us(config.clock_settle_us);

    if let Err(cause) = mac.set_mac_address(config.mac_address) {
        tolerate(config.register_policy, RegisterOp::StationAddress, cause)?;
    }
    mac.set_mdio_divisor(MdcDivisor::Div224);

    let phy_addr = detect_phy(mac);
    if phy_addr == PHY_NOT_FOUND {
        println!("[FAIL] No PHY answered on MDIO addresses 0-31");
        return Err(NetworkError::PhyNotFound);
    }
    let phy_id = read_phy_id(mac, phy_addr).unwrap_or(0);
    println!(
        "[PHY] Found PHY at address {} (ID {:04x}:{:04x})",
        phy_addr,
        phy_id >> 16,
        phy_id & 0xFFFF
    );

    let mut mdio = Mdio {
        mac: &mut *mac,
        phy_addr,
        policy: config.register_policy,
    };

    mdio.write(MII_BMCR, BMCR_FORCE_1000_FULL)?;
    let bmcr = mdio.read_or(MII_BMCR, BMCR_FORCE_1000_FULL)?;
    let bmcr = (bmcr & !BMCR_LOOPBACK) | BMCR_ANENABLE;
    mdio.write(MII_BMCR, bmcr)?;
    println!("[PHY] BMCR = {:#06x}, waiting for autonegotiation", bmcr);

    let polls = wait_for_bmsr(&mut mdio, clock, config, BMSR_ANEGCOMPLETE, LinkStage::AutoNegotiation)?;
    println!("[PHY] Autonegotiation complete ({} polls)", polls);

    let polls = wait_for_bmsr(&mut mdio, clock, config, BMSR_LSTATUS, LinkStage::LinkStatus)?;
    println!("[PHY] Link up ({} polls)", polls);

    mac.set_operating_speed(LinkSpeed::Speed1000);
    println!("[GEM] Operating speed set to {} Mb/s", LinkSpeed::Speed1000.mbps());

    Ok(LinkState {
        phy_addr,
        phy_id,
        speed: LinkSpeed::Speed1000,
        full_duplex: true,
        up: true,
    })
}

fn wait_for_bmsr<M, C>(
    mdio: &mut Mdio<'_, M>,
    clock: &C,
    config: &DriverConfig,
    bit: u16,
    stage: LinkStage,
) -> Result<u32, NetworkError>
where
    M: Mac + ?Sized,
    C: Clock + ?Sized,
{
    poll_until(clock, config.link_poll, || {
        mdio.read_or(MII_BMSR, 0).map(|bmsr| bmsr & bit != 0)
    })
    .map_err(|e| match e {
        PollError::TimedOut => {
            println!("[FAIL] Link down: {} did not finish", stage);
            NetworkError::LinkDown { stage }
        }
        PollError::Probe(err) => err,
    })
}
