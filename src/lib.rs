// src/lib.rs
//! Max OS scheduler core
//!
//! The preemptive multitasking core of the kernel: interrupt dispatch,
//! the round-robin scheduler, thread/process lifecycle, named resources
//! and the syscall surface. Everything except the entry stubs and port
//! I/O is ordinary Rust, so the whole core builds and runs under plain
//! `cargo test` on the host; the bare-metal binary in `main.rs` wires
//! the same code to real interrupts.

#![cfg_attr(target_os = "none", no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod arch;
pub mod errors;
pub mod kernel;

pub use errors::{KernelError, KernelResult};

/// println! macro, routed to the kernel log (COM1 serial on bare metal)
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

/// print! macro, routed to the kernel log (COM1 serial on bare metal)
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {{
        $crate::kernel::driver::serial::_print(format_args!($($arg)*));
    }};
}

/// println! variant that is compiled out of release builds
#[macro_export]
macro_rules! debug_println {
    () => ($crate::debug_println!(""));
    ($($arg:tt)*) => {{
        if cfg!(debug_assertions) {
            $crate::println!($($arg)*);
        }
    }};
}

/// Halt loop
///
/// Parks the CPU until the next interrupt, forever. Calling this with
/// interrupts disabled hangs the machine.
#[inline]
pub fn hlt_loop() -> ! {
    use crate::arch::{ArchCpu, Cpu};
    loop {
        ArchCpu::halt();
    }
}
