// src/kernel/driver/serial.rs

//! Serial port driver (UART 16550)
//!
//! COM1 is the kernel's log sink: the `print!`/`println!` macros end up
//! here on bare metal. Writes spin on the transmit-empty bit with a
//! bounded retry budget so a wedged UART cannot hang the kernel.

use core::fmt;

use spin::Mutex;

use crate::arch::x86_64::port::{Port, PortReadOnly};
use crate::errors::{DeviceError, KernelResult};
use crate::kernel::driver::Device;

const COM1_BASE: u16 = 0x3F8;

/// Transmit-empty spins before giving up on the UART.
const TX_TIMEOUT: usize = 100_000;

/// A 16550 UART.
pub struct SerialPort {
    data: Port<u8>,
    int_enable: Port<u8>,
    fifo_ctrl: Port<u8>,
    line_ctrl: Port<u8>,
    modem_ctrl: Port<u8>,
    line_status: PortReadOnly<u8>,
}

impl SerialPort {
    /// The COM1 port at 0x3F8.
    #[must_use]
    pub const fn com1() -> Self {
        Self {
            data: Port::new(COM1_BASE),
            int_enable: Port::new(COM1_BASE + 1),
            fifo_ctrl: Port::new(COM1_BASE + 2),
            line_ctrl: Port::new(COM1_BASE + 3),
            modem_ctrl: Port::new(COM1_BASE + 4),
            line_status: PortReadOnly::new(COM1_BASE + 5),
        }
    }

    fn is_tx_empty(&self) -> bool {
        // Bit 5 of the line status register: transmit holding register
        // empty.
        unsafe { self.line_status.read() & 0x20 != 0 }
    }

    /// Write one byte, spinning until the transmit buffer drains.
    pub fn write_byte(&mut self, byte: u8) -> KernelResult<()> {
        for _ in 0..TX_TIMEOUT {
            if self.is_tx_empty() {
                unsafe {
                    self.data.write(byte);
                }
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(DeviceError::Timeout.into())
    }
}

impl Device for SerialPort {
    fn name(&self) -> &'static str {
        "COM1"
    }

    fn init(&mut self) -> KernelResult<()> {
        // Standard 16550 bring-up: 38400 baud, 8N1, FIFOs on, DTR/RTS.
        unsafe {
            self.int_enable.write(0x00);
            self.line_ctrl.write(0x80);
            self.data.write(0x03);
            self.int_enable.write(0x00);
            self.line_ctrl.write(0x03);
            self.fifo_ctrl.write(0xC7);
            self.modem_ctrl.write(0x0B);
        }
        Ok(())
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.write_byte(byte).map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}

/// Global COM1 instance behind a spin lock.
pub static SERIAL1: Mutex<SerialPort> = Mutex::new(SerialPort::com1());

/// Sink for the `print!`/`println!` macros: COM1 on bare metal, stdout
/// on the host.
#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    #[cfg(not(target_os = "none"))]
    {
        use std::io::Write;
        let _ = std::io::stdout().write_fmt(args);
    }
    #[cfg(target_os = "none")]
    {
        use core::fmt::Write;
        let _ = SERIAL1.lock().write_fmt(args);
    }
}
