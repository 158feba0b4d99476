// src/arch/x86_64/mod.rs

//! x86_64 hardware-facing layer: ports, descriptor tables, the 8259
//! PIC, interrupt entry stubs and the saved CPU state they produce.

pub mod cpu;
pub mod entry;
pub mod gdt;
pub mod pic;
pub mod port;
pub mod qemu;
pub mod syscall;

pub use cpu::{CpuState, X86Cpu};
pub use entry::init_idt;
pub use gdt::init_gdt;
