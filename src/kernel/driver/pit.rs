// src/kernel/driver/pit.rs

//! Programmable Interval Timer (8253/8254 PIT)
//!
//! Channel 0 fires IRQ0 periodically; that interrupt is the scheduler's
//! tick. The frequency is programmed once at boot from `KernelConfig`
//! and never renegotiated.

use crate::arch::x86_64::port::{Port, PortWriteOnly};
use crate::errors::{DeviceError, KernelResult};
use crate::kernel::driver::Device;

/// Input clock of the PIT in Hz.
const PIT_BASE_FREQUENCY: u32 = 1_193_182;

const CHANNEL0_DATA: u16 = 0x40;
const COMMAND_PORT: u16 = 0x43;

/// Command byte: channel 0, lo/hi access, mode 3 (square wave), binary.
const COMMAND_SQUARE_WAVE: u8 = 0x36;

/// The 8253/8254 interval timer.
pub struct ProgrammableIntervalTimer {
    channel0: Port<u8>,
    command: PortWriteOnly<u8>,
}

impl Default for ProgrammableIntervalTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgrammableIntervalTimer {
    /// A driver for the timer at the standard ports.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            channel0: Port::new(CHANNEL0_DATA),
            command: PortWriteOnly::new(COMMAND_PORT),
        }
    }

    /// Program channel 0 to fire at `freq` Hz.
    ///
    /// The divisor is clamped to the 16-bit register, so frequencies
    /// below ~19 Hz round up to the slowest rate the device supports.
    pub fn set_frequency(&mut self, freq: u32) -> KernelResult<()> {
        if freq == 0 || freq > PIT_BASE_FREQUENCY {
            return Err(DeviceError::InvalidFrequency.into());
        }

        let divisor = PIT_BASE_FREQUENCY / freq;
        let divisor = if divisor > 0xFFFF {
            0xFFFF
        } else {
            divisor as u16
        };

        unsafe {
            self.command.write(COMMAND_SQUARE_WAVE);
            self.channel0.write((divisor & 0xFF) as u8);
            self.channel0.write((divisor >> 8) as u8);
        }

        Ok(())
    }
}

impl Device for ProgrammableIntervalTimer {
    fn name(&self) -> &'static str {
        "Intel 8253/8254 PIT"
    }

    fn init(&mut self) -> KernelResult<()> {
        self.set_frequency(crate::kernel::KernelConfig::default().timer_hz)
    }
}
