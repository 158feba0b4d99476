// src/arch/x86_64/qemu.rs

//! QEMU `isa-debug-exit` device.
//!
//! A write to port 0xF4 terminates the emulator with
//! `(code << 1) | 1` as the exit status; the value below is chosen so
//! it cannot map to status 0 or 1.

use crate::arch::x86_64::port::PortWriteOnly;

const DEBUG_EXIT_PORT: u16 = 0xF4;

/// Exit statuses understood by the run scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    /// Panic or failed self-check.
    Failed = 0x11,
}

/// Ask QEMU to exit. No effect on real hardware without the device.
pub fn exit_qemu(code: QemuExitCode) {
    let mut port = PortWriteOnly::<u32>::new(DEBUG_EXIT_PORT);
    // SAFETY: the debug-exit port has no other owner; on hardware the
    // write is a no-op.
    unsafe {
        port.write(code as u32);
    }
}
