// src/arch/mod.rs

//! Architecture-specific abstractions.

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

/// Trait for CPU-specific operations.
pub trait Cpu {
    /// Halt the CPU until the next interrupt.
    fn halt();

    /// Disable interrupts.
    fn disable_interrupts();

    /// Enable interrupts.
    fn enable_interrupts();

    /// Check if interrupts are enabled.
    fn are_interrupts_enabled() -> bool;
}

/// The CPU implementation for the compilation target.
#[cfg(target_arch = "x86_64")]
pub type ArchCpu = x86_64::cpu::X86Cpu;
