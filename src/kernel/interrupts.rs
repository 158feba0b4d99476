// src/kernel/interrupts.rs

//! Interrupt manager and dispatch
//!
//! The single bridge between raw CPU vectors and kernel logic. The entry
//! stubs capture a [`CpuState`] and hand it to [`dispatch`], which looks
//! the vector up in a fixed 256-entry function-pointer table and invokes
//! the registered handler with the whole kernel context. The table is
//! plain data: what runs on which vector is auditable at a glance.
//!
//! Hardware vectors are acknowledged to the interrupt controller on
//! every dispatch path, handled or not. A missing handler on a hardware
//! vector is a spurious interrupt and benign; on any other vector it is
//! an unhandled exception and fatal.

use crate::arch::x86_64::cpu::CpuState;
use crate::debug_println;
use crate::kernel::Kernel;

/// Vector the timer interrupt arrives on (IRQ0 after PIC remap).
pub const TIMER_VECTOR: u8 = 0x20;

/// Breakpoint exception vector (#BP).
pub const BREAKPOINT_VECTOR: u8 = 3;

/// First vector delivered by the remapped 8259 pair.
pub const HARDWARE_VECTOR_BASE: u8 = 0x20;

/// One past the last vector delivered by the remapped 8259 pair.
pub const HARDWARE_VECTOR_LIMIT: u8 = 0x30;

/// Size of the interrupt dispatch table.
pub const VECTOR_COUNT: usize = 256;

/// An interrupt handler entry.
///
/// Handlers receive the full kernel context and the in-stack register
/// snapshot; rewriting the snapshot changes which thread the stub
/// resumes.
pub type InterruptHandlerFn = fn(&mut Kernel, &mut CpuState);

/// Whether a vector belongs to the remapped 8259 range.
#[must_use]
pub const fn is_hardware_vector(vector: u8) -> bool {
    vector >= HARDWARE_VECTOR_BASE && vector < HARDWARE_VECTOR_LIMIT
}

/// Seam between dispatch and the interrupt controller hardware.
///
/// The bare-metal kernel plugs the 8259 pair in here; host tests plug in
/// a recording fake to check the acknowledgement discipline.
pub trait IrqController {
    /// Signal end-of-interrupt for the given vector.
    fn end_of_interrupt(&mut self, vector: u8);
}

/// The interrupt dispatch table plus spurious-interrupt accounting.
pub struct InterruptManager {
    handlers: [Option<InterruptHandlerFn>; VECTOR_COUNT],
    spurious: u64,
}

impl Default for InterruptManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptManager {
    /// An empty dispatch table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            handlers: [None; VECTOR_COUNT],
            spurious: 0,
        }
    }

    /// Install a handler for a vector. Last write wins.
    ///
    /// Must be called before interrupts are enabled; the boot wiring in
    /// `Kernel::new` does this for every vector the core serves.
    pub fn register_handler(&mut self, vector: u8, handler: InterruptHandlerFn) {
        self.handlers[vector as usize] = Some(handler);
    }

    /// The handler currently installed for a vector.
    #[must_use]
    pub fn handler(&self, vector: u8) -> Option<InterruptHandlerFn> {
        self.handlers[vector as usize]
    }

    /// Number of spurious hardware interrupts seen so far.
    #[must_use]
    pub const fn spurious_count(&self) -> u64 {
        self.spurious
    }

    fn note_spurious(&mut self) {
        self.spurious += 1;
    }
}

/// Dispatch one captured interrupt.
///
/// Called with the vector already recorded in `state.interrupt_number`.
/// On return, `state` holds the register snapshot the stub must restore;
/// scheduling handlers overwrite it wholesale to switch threads.
///
/// # Panics
///
/// Panics on an unhandled non-hardware vector: that is an exception the
/// kernel has no answer for, and the panic path reports the vector and
/// register dump before halting.
pub fn dispatch(kernel: &mut Kernel, state: &mut CpuState) {
    let vector = state.vector();

    match kernel.interrupts.handler(vector) {
        Some(handler) => handler(kernel, state),
        None if is_hardware_vector(vector) => {
            kernel.interrupts.note_spurious();
            debug_println!("[int] spurious interrupt on vector {vector:#x}");
        }
        None => fatal_unhandled(vector, state),
    }

    // EOI unconditionally for the hardware range: a swallowed
    // acknowledgement stalls every later interrupt at that priority.
    if is_hardware_vector(vector) {
        kernel.irq.end_of_interrupt(vector);
    }
}

/// Report an unhandled exception and stop.
fn fatal_unhandled(vector: u8, state: &CpuState) -> ! {
    panic!(
        "unhandled exception: vector {vector} error {:#x}\n{state}",
        state.error_code
    );
}

/// Benign #BP handler: log and resume at the next instruction.
pub fn handle_breakpoint(_kernel: &mut Kernel, state: &mut CpuState) {
    crate::println!("[int] breakpoint at {:#x}", state.rip);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_starts_empty_and_last_write_wins() {
        let mut manager = InterruptManager::new();
        assert!(manager.handler(TIMER_VECTOR).is_none());

        fn first(_: &mut Kernel, _: &mut CpuState) {}
        fn second(_: &mut Kernel, state: &mut CpuState) {
            state.rax = 1;
        }

        manager.register_handler(0x21, first);
        manager.register_handler(0x21, second);
        let handler = manager.handler(0x21).unwrap();
        assert!(core::ptr::fn_addr_eq(handler, second as InterruptHandlerFn));
    }

    #[test]
    fn hardware_range_is_exactly_the_remapped_pics() {
        assert!(!is_hardware_vector(0x1F));
        assert!(is_hardware_vector(0x20));
        assert!(is_hardware_vector(0x2F));
        assert!(!is_hardware_vector(0x30));
        assert!(!is_hardware_vector(0x80));
    }
}
