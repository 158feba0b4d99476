// src/arch/x86_64/cpu.rs

//! CPU state and CPU control.
//!
//! [`CpuState`] is the register snapshot the interrupt entry stubs push
//! on every interrupt and restore on every exit. The stubs reinterpret
//! the stack as this structure in place, so its field order and size
//! are load-bearing: first field = last value pushed. Both are pinned
//! by compile-time assertions below; `entry.rs` must push in exactly
//! the reverse order of the fields.

use core::fmt;
use core::mem::{offset_of, size_of};

use raw_cpuid::CpuId;
use x86_64::instructions::{hlt, interrupts};

use crate::arch::Cpu;

/// Kernel code segment selector as laid out by `gdt::init_gdt`.
pub const KERNEL_CODE_SELECTOR: u64 = 0x08;

/// Kernel data segment selector as laid out by `gdt::init_gdt`.
pub const KERNEL_DATA_SELECTOR: u64 = 0x10;

/// RFLAGS for a freshly primed thread: reserved bit 1 plus IF, so the
/// first dispatch lands with interrupts enabled.
pub const INITIAL_RFLAGS: u64 = 0x202;

/// Register snapshot captured on interrupt entry.
///
/// Field order matches the entry stub push sequence: the fifteen
/// general-purpose registers pushed by the stub, the vector number and
/// error code (a dummy 0 for vectors where the CPU pushes none), then
/// the five-word interrupt return frame pushed by the CPU itself.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuState {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rbp: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,

    /// Vector that fired, pushed by the stub.
    pub interrupt_number: u64,
    /// Hardware error code, or 0 for vectors that push none.
    pub error_code: u64,

    // Interrupt return frame, pushed by the CPU.
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

/// Total size the entry stub accounts for: 15 pushed registers, vector
/// and error code, and the 5-word iret frame.
pub const CPU_STATE_SIZE: usize = 22 * 8;

const _: () = assert!(size_of::<CpuState>() == CPU_STATE_SIZE);
const _: () = assert!(offset_of!(CpuState, r15) == 0x00);
const _: () = assert!(offset_of!(CpuState, r8) == 0x38);
const _: () = assert!(offset_of!(CpuState, rdi) == 0x40);
const _: () = assert!(offset_of!(CpuState, rax) == 0x70);
const _: () = assert!(offset_of!(CpuState, interrupt_number) == 0x78);
const _: () = assert!(offset_of!(CpuState, error_code) == 0x80);
const _: () = assert!(offset_of!(CpuState, rip) == 0x88);
const _: () = assert!(offset_of!(CpuState, cs) == 0x90);
const _: () = assert!(offset_of!(CpuState, rflags) == 0x98);
const _: () = assert!(offset_of!(CpuState, rsp) == 0xA0);
const _: () = assert!(offset_of!(CpuState, ss) == 0xA8);

impl CpuState {
    /// An all-zero snapshot.
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            r11: 0,
            r10: 0,
            r9: 0,
            r8: 0,
            rdi: 0,
            rsi: 0,
            rbp: 0,
            rdx: 0,
            rcx: 0,
            rbx: 0,
            rax: 0,
            interrupt_number: 0,
            error_code: 0,
            rip: 0,
            cs: 0,
            rflags: 0,
            rsp: 0,
            ss: 0,
        }
    }

    /// The initial snapshot for a new thread.
    ///
    /// Restoring this state makes the thread start executing at `rip`
    /// with `rdi` as its first argument, on an empty stack, in kernel
    /// segments, with interrupts enabled.
    #[must_use]
    pub const fn primed(rip: u64, rdi: u64, stack_top: u64) -> Self {
        let mut state = Self::zeroed();
        state.rip = rip;
        state.rdi = rdi;
        // System V entry alignment: rsp % 16 == 8 at function entry, as
        // if a return address had just been pushed.
        state.rsp = (stack_top & !0xF) - 8;
        state.rbp = 0;
        state.cs = KERNEL_CODE_SELECTOR;
        state.ss = KERNEL_DATA_SELECTOR;
        state.rflags = INITIAL_RFLAGS;
        state
    }

    /// The vector that produced this snapshot, truncated to table range.
    #[must_use]
    pub const fn vector(&self) -> u8 {
        (self.interrupt_number & 0xFF) as u8
    }
}

impl fmt::Display for CpuState {
    /// Register dump in the format used by fatal fault reports.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "rax={:016x} rbx={:016x} rcx={:016x} rdx={:016x}",
            self.rax, self.rbx, self.rcx, self.rdx
        )?;
        writeln!(
            f,
            "rsi={:016x} rdi={:016x} rbp={:016x} rsp={:016x}",
            self.rsi, self.rdi, self.rbp, self.rsp
        )?;
        writeln!(
            f,
            "r8 ={:016x} r9 ={:016x} r10={:016x} r11={:016x}",
            self.r8, self.r9, self.r10, self.r11
        )?;
        writeln!(
            f,
            "r12={:016x} r13={:016x} r14={:016x} r15={:016x}",
            self.r12, self.r13, self.r14, self.r15
        )?;
        write!(
            f,
            "rip={:016x} cs={:04x} ss={:04x} rflags={:08x} vec={} err={:#x}",
            self.rip, self.cs, self.ss, self.rflags, self.interrupt_number, self.error_code
        )
    }
}

/// CPU identification for the boot banner.
#[derive(Debug, Clone)]
pub struct CpuSummary {
    /// Vendor string, e.g. "GenuineIntel".
    pub vendor: Option<alloc::string::String>,
    /// Whether an on-chip APIC is present.
    pub has_apic: bool,
    /// Whether the timestamp counter is available.
    pub has_tsc: bool,
}

/// Query CPUID for the boot banner.
#[must_use]
pub fn cpu_summary() -> CpuSummary {
    let cpuid = CpuId::new();
    let features = cpuid.get_feature_info();
    CpuSummary {
        vendor: cpuid.get_vendor_info().map(|v| alloc::format!("{v}")),
        has_apic: features.as_ref().is_some_and(|f| f.has_apic()),
        has_tsc: features.as_ref().is_some_and(|f| f.has_tsc()),
    }
}

/// CPU control operations for x86_64.
pub struct X86Cpu;

impl Cpu for X86Cpu {
    fn halt() {
        hlt();
    }

    fn disable_interrupts() {
        interrupts::disable();
    }

    fn enable_interrupts() {
        interrupts::enable();
    }

    fn are_interrupts_enabled() -> bool {
        interrupts::are_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primed_state_points_at_entry() {
        let state = CpuState::primed(0x1234, 0xAB, 0x8000);
        assert_eq!(state.rip, 0x1234);
        assert_eq!(state.rdi, 0xAB);
        assert_eq!(state.rflags, INITIAL_RFLAGS);
        assert_eq!(state.cs, KERNEL_CODE_SELECTOR);
        assert_eq!(state.ss, KERNEL_DATA_SELECTOR);
        assert_eq!(state.rsp % 16, 8);
        assert!(state.rsp < 0x8000);
    }

    #[test]
    fn register_dump_names_every_register() {
        let mut state = CpuState::zeroed();
        state.rax = 0xDEAD;
        state.interrupt_number = 13;
        let dump = alloc::format!("{state}");
        for name in ["rax", "rbx", "rsp", "r15", "rip", "rflags", "vec=13"] {
            assert!(dump.contains(name), "dump missing {name}: {dump}");
        }
        assert!(dump.contains("000000000000dead"));
    }

    #[test]
    fn cpuid_answers_on_the_host() {
        // Only checks the call path; values depend on the machine.
        let _ = cpu_summary();
    }
}
