// tests/common/mod.rs

//! Shared fixture for the integration tests: a kernel wired to a
//! recording interrupt controller, plus helpers that inject interrupts
//! with the register snapshot the entry stubs would hand over.

use std::sync::{Arc, Mutex};

use max_os::arch::x86_64::cpu::CpuState;
use max_os::kernel::interrupts::{IrqController, TIMER_VECTOR};
use max_os::kernel::{Kernel, KernelConfig};
use max_os_abi::SyscallNumber;

/// Every vector the fake controller was asked to acknowledge, in order.
pub type EoiLog = Arc<Mutex<Vec<u8>>>;

/// Stand-in for the 8259 pair that records EOIs instead of writing
/// ports.
pub struct FakePic {
    log: EoiLog,
}

impl IrqController for FakePic {
    fn end_of_interrupt(&mut self, vector: u8) {
        self.log.lock().unwrap().push(vector);
    }
}

/// A kernel with default config and a recording controller.
pub fn kernel() -> (Kernel, EoiLog) {
    let log = EoiLog::default();
    let kernel = Kernel::new(KernelConfig::default(), Box::new(FakePic { log: log.clone() }))
        .expect("kernel construction");
    (kernel, log)
}

/// Inject one interrupt, exactly as a stub would: vector recorded in
/// the snapshot, then dispatch.
pub fn fire(kernel: &mut Kernel, state: &mut CpuState, vector: u8) {
    state.interrupt_number = u64::from(vector);
    kernel.dispatch(state);
}

/// One timer tick.
pub fn tick(kernel: &mut Kernel, state: &mut CpuState) {
    fire(kernel, state, TIMER_VECTOR);
}

/// Issue a syscall from the thread `state` currently represents.
///
/// Returns the raw `rax` after dispatch. For a completed syscall that is
/// the encoded result; for a blocking one, `state` now holds whichever
/// thread was dispatched instead.
pub fn syscall(kernel: &mut Kernel, state: &mut CpuState, number: SyscallNumber, args: &[u64]) -> u64 {
    state.rax = number.as_u64();
    let mut words = [0u64; 6];
    words[..args.len()].copy_from_slice(args);
    [
        &mut state.rdi,
        &mut state.rsi,
        &mut state.rdx,
        &mut state.r10,
        &mut state.r8,
        &mut state.r9,
    ]
    .into_iter()
    .zip(words)
    .for_each(|(reg, word)| *reg = word);

    fire(kernel, state, max_os_abi::SYSCALL_VECTOR);
    state.rax
}
