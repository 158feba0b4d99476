// src/kernel/mod.rs

//! The kernel context
//!
//! [`Kernel`] owns every subsystem: the interrupt dispatch table, the
//! scheduler, the global resource registry, the syscall table and the
//! interrupt-controller seam. Interrupt handlers receive `&mut Kernel`,
//! so cross-subsystem operations (a syscall that parks a thread on an
//! endpoint, a tick that tears down a process) are plain borrows with no
//! global state involved.
//!
//! The bare-metal binary installs one `Kernel` behind a spin mutex and
//! routes the assembly entry stubs through [`kernel_interrupt_dispatch`].
//! Host tests skip the global entirely and drive a `Kernel` value
//! directly.

pub mod driver;
pub mod interrupts;
pub mod mm;
pub mod process;
pub mod resource;
pub mod scheduler;
pub mod syscall;

use alloc::boxed::Box;

use spin::{Mutex, Once};

use crate::arch::x86_64::cpu::CpuState;
use crate::errors::{InitError, KernelResult};
use crate::kernel::interrupts::{InterruptManager, IrqController, BREAKPOINT_VECTOR, TIMER_VECTOR};
use crate::kernel::resource::GlobalRegistry;
use crate::kernel::scheduler::Scheduler;
use crate::kernel::syscall::SyscallManager;

/// Boot-time tunables.
#[derive(Debug, Clone, Copy)]
pub struct KernelConfig {
    /// Timer interrupt frequency the PIT is programmed to.
    pub timer_hz: u32,
    /// Stack size for every spawned thread.
    pub thread_stack_size: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            timer_hz: 100,
            thread_stack_size: process::DEFAULT_STACK_SIZE,
        }
    }
}

/// All kernel state, owned in one place.
pub struct Kernel {
    /// The configuration the kernel booted with.
    pub config: KernelConfig,
    /// Vector-to-handler dispatch table.
    pub interrupts: InterruptManager,
    /// Threads, processes and the ready queue.
    pub scheduler: Scheduler,
    /// Named shared memory regions and IPC endpoints.
    pub resources: GlobalRegistry,
    /// The syscall dispatch table.
    pub syscalls: SyscallManager,
    /// End-of-interrupt seam: the 8259 pair on bare metal, a recording
    /// fake under test.
    pub irq: Box<dyn IrqController + Send>,
}

impl Kernel {
    /// Build a kernel with every standard handler wired.
    pub fn new(config: KernelConfig, irq: Box<dyn IrqController + Send>) -> KernelResult<Self> {
        let mut table = InterruptManager::new();
        table.register_handler(TIMER_VECTOR, scheduler::handle_timer);
        table.register_handler(max_os_abi::YIELD_VECTOR, scheduler::handle_yield);
        table.register_handler(max_os_abi::SYSCALL_VECTOR, syscall::handle_syscall);
        table.register_handler(BREAKPOINT_VECTOR, interrupts::handle_breakpoint);

        Ok(Self {
            config,
            interrupts: table,
            scheduler: Scheduler::new(config.thread_stack_size)?,
            resources: GlobalRegistry::new(),
            syscalls: SyscallManager::new(),
            irq,
        })
    }

    /// Feed one captured interrupt through the dispatch table.
    pub fn dispatch(&mut self, state: &mut CpuState) {
        interrupts::dispatch(self, state);
    }
}

/// The installed kernel the entry stubs dispatch into.
static KERNEL: Once<Mutex<Kernel>> = Once::new();

/// Publish the kernel for interrupt dispatch. One shot.
pub fn install(kernel: Kernel) -> KernelResult<()> {
    let mut stored = false;
    KERNEL.call_once(|| {
        stored = true;
        Mutex::new(kernel)
    });
    if stored {
        Ok(())
    } else {
        Err(InitError::AlreadyInitialized.into())
    }
}

/// Run a closure against the installed kernel.
///
/// Used by the boot path for post-install setup (spawning the first
/// processes) before interrupts are enabled.
pub fn with_kernel<R>(f: impl FnOnce(&mut Kernel) -> R) -> Option<R> {
    KERNEL.get().map(|kernel| f(&mut kernel.lock()))
}

/// The Rust landing point of every interrupt entry stub.
///
/// Runs with interrupts disabled (all gates are interrupt gates), so the
/// spin lock cannot deadlock against another handler on this CPU.
///
/// # Panics
///
/// Panics if an interrupt arrives before [`install`]; the IDT is loaded
/// only after the kernel is published, so that indicates a boot bug.
pub extern "C" fn kernel_interrupt_dispatch(state: &mut CpuState) {
    let Some(kernel) = KERNEL.get() else {
        panic!("interrupt before kernel install\n{state}");
    };
    kernel.lock().dispatch(state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::interrupts::HARDWARE_VECTOR_BASE;

    struct NullIrq;

    impl IrqController for NullIrq {
        fn end_of_interrupt(&mut self, _vector: u8) {}
    }

    fn kernel() -> Kernel {
        Kernel::new(KernelConfig::default(), Box::new(NullIrq)).unwrap()
    }

    #[test]
    fn standard_vectors_are_wired() {
        let kernel = kernel();
        for vector in [
            TIMER_VECTOR,
            BREAKPOINT_VECTOR,
            max_os_abi::SYSCALL_VECTOR,
            max_os_abi::YIELD_VECTOR,
        ] {
            assert!(
                kernel.interrupts.handler(vector).is_some(),
                "vector {vector:#x} has no handler"
            );
        }
    }

    #[test]
    fn unclaimed_hardware_vector_is_spurious_not_fatal() {
        let mut kernel = kernel();
        let mut state = CpuState::zeroed();
        state.interrupt_number = u64::from(HARDWARE_VECTOR_BASE + 7);

        kernel.dispatch(&mut state);
        assert_eq!(kernel.interrupts.spurious_count(), 1);
    }

    #[test]
    #[should_panic(expected = "unhandled exception")]
    fn unclaimed_exception_vector_is_fatal() {
        let mut kernel = kernel();
        let mut state = CpuState::zeroed();
        state.interrupt_number = 13;
        state.error_code = 0x10;
        kernel.dispatch(&mut state);
    }
}
