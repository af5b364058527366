//! Cadence UART driver for the serial console
//!
//! Polled, transmit-only console on UART1 (the USB-UART bridge on the ZC702
//! and ZedBoard). Output written before [`UartWriter::init`] is discarded so
//! early log lines never touch an unclocked peripheral.
//!
//! ## References
//!
//! - Zynq-7000 TRM (UG585), Chapter 19 "UART Controller"
//! - UG585 Appendix B, `UART` register summary

use core::fmt;
use lazy_static::lazy_static;
use spin::Mutex;
use volatile::Volatile;

/// UART1 base address
const UART_BASE: usize = 0xE000_1000;

/// Register bits, UG585 Appendix B
mod uart_flags {
    // Control register
    pub const CR_RXRES: u32 = 1 << 0; // RX logic reset
    pub const CR_TXRES: u32 = 1 << 1; // TX logic reset
    pub const CR_RXEN: u32 = 1 << 2;
    pub const CR_TXEN: u32 = 1 << 4;

    // Mode register: 8 data bits, no parity, 1 stop bit, normal mode
    pub const MR_8N1: u32 = 0x20;

    // Channel status register
    pub const SR_TXFULL: u32 = 1 << 4;

    // 115200 baud from the 100 MHz UART reference: 100e6 / (124 * (6 + 1))
    pub const BAUDGEN_115200: u32 = 124;
    pub const BAUDDIV_115200: u32 = 6;

    pub const IDR_ALL: u32 = 0x1FFF;
}

lazy_static! {
    pub static ref WRITER: Mutex<UartWriter> = Mutex::new(UartWriter::new());
}

#[repr(C)]
struct CadenceUartRegisters {
    cr: Volatile<u32>,      // 0x00 - Control
    mr: Volatile<u32>,      // 0x04 - Mode
    _ier: Volatile<u32>,    // 0x08 - Interrupt Enable
    idr: Volatile<u32>,     // 0x0C - Interrupt Disable
    _imr: Volatile<u32>,    // 0x10 - Interrupt Mask
    _isr: Volatile<u32>,    // 0x14 - Channel Interrupt Status
    baudgen: Volatile<u32>, // 0x18 - Baud Rate Generator
    _rsv0: [u32; 4],        // 0x1C - 0x28
    sr: Volatile<u32>,      // 0x2C - Channel Status
    fifo: Volatile<u32>,    // 0x30 - TX/RX FIFO
    bauddiv: Volatile<u32>, // 0x34 - Baud Rate Divider
}

/// Serial console writer
pub struct UartWriter {
    base: usize,
    initialized: bool,
}

impl Default for UartWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl UartWriter {
    pub const fn new() -> Self {
        UartWriter {
            base: UART_BASE,
            initialized: false,
        }
    }

    fn registers(&mut self) -> &mut CadenceUartRegisters {
        // SAFETY: UART_BASE is the UART1 register block (UG585 Table 4-6),
        // mapped as device memory; the WRITER mutex serialises access
        unsafe { &mut *(self.base as *mut CadenceUartRegisters) }
    }

    /// Configure 115200 8N1 and enable the transmitter and receiver
    pub fn init(&mut self) {
        let regs = self.registers();

        regs.idr.write(uart_flags::IDR_ALL);
        regs.cr.write(uart_flags::CR_TXRES | uart_flags::CR_RXRES);
        regs.mr.write(uart_flags::MR_8N1);
        regs.baudgen.write(uart_flags::BAUDGEN_115200);
        regs.bauddiv.write(uart_flags::BAUDDIV_115200);
        regs.cr.write(uart_flags::CR_TXEN | uart_flags::CR_RXEN);

        self.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn write_byte(&mut self, byte: u8) {
        if !self.initialized {
            return;
        }
        let regs = self.registers();
        while regs.sr.read() & uart_flags::SR_TXFULL != 0 {
            core::hint::spin_loop();
        }
        regs.fifo.write(byte as u32);
    }

    /// Write a string, expanding `\n` to `\r\n`
    pub fn write_string(&mut self, s: &str) {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
    }
}

impl fmt::Write for UartWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_string(s);
        Ok(())
    }
}
