// src/arch/x86_64/entry.rs

//! Interrupt entry stubs and the IDT.
//!
//! Every wired vector gets a tiny naked stub that normalizes the stack
//! to one shape and jumps to a common trampoline. Vectors where the CPU
//! pushes no error code push a dummy 0 first, so the trampoline always
//! finds `[.. error code, vector, 15 GPRs]` above the iret frame. The
//! trampoline saves the registers in exactly the reverse order of the
//! [`CpuState`](crate::arch::x86_64::cpu::CpuState) fields, hands the
//! stack pointer to [`kernel_interrupt_dispatch`] as a `&mut CpuState`,
//! then restores whatever snapshot dispatch left behind. A scheduling
//! handler that rewrote the snapshot therefore resumes a different
//! thread; nothing here knows or cares.
//!
//! The CPU pushes an error code on vectors 8, 10-14 and 17; those get
//! the no-dummy stub variant.

use lazy_static::lazy_static;
use x86_64::structures::idt::InterruptDescriptorTable;
use x86_64::{PrivilegeLevel, VirtAddr};

use crate::arch::x86_64::gdt::DOUBLE_FAULT_IST_INDEX;
use crate::kernel::kernel_interrupt_dispatch;

/// Save the full register file, dispatch, restore, return.
///
/// `rdi` gets the stack pointer, which after the pushes is exactly a
/// `*mut CpuState`. The `add rsp, 16` drops the vector and error code
/// before `iretq` consumes the frame.
#[unsafe(naked)]
unsafe extern "C" fn interrupt_common() -> ! {
    core::arch::naked_asm!(
        "cld",
        "push rax",
        "push rbx",
        "push rcx",
        "push rdx",
        "push rbp",
        "push rsi",
        "push rdi",
        "push r8",
        "push r9",
        "push r10",
        "push r11",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov rdi, rsp",
        "call {dispatch}",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop r11",
        "pop r10",
        "pop r9",
        "pop r8",
        "pop rdi",
        "pop rsi",
        "pop rbp",
        "pop rdx",
        "pop rcx",
        "pop rbx",
        "pop rax",
        "add rsp, 16",
        "iretq",
        dispatch = sym kernel_interrupt_dispatch,
    )
}

/// Stubs for vectors where the CPU pushes no error code.
macro_rules! interrupt_stubs {
    ($($name:ident => $vector:literal),* $(,)?) => {
        $(
            #[unsafe(naked)]
            unsafe extern "C" fn $name() -> ! {
                core::arch::naked_asm!(
                    "push 0",
                    concat!("push ", $vector),
                    "jmp {common}",
                    common = sym interrupt_common,
                )
            }
        )*
    };
}

/// Stubs for vectors where the CPU already pushed an error code.
macro_rules! interrupt_stubs_with_error {
    ($($name:ident => $vector:literal),* $(,)?) => {
        $(
            #[unsafe(naked)]
            unsafe extern "C" fn $name() -> ! {
                core::arch::naked_asm!(
                    concat!("push ", $vector),
                    "jmp {common}",
                    common = sym interrupt_common,
                )
            }
        )*
    };
}

interrupt_stubs! {
    isr_divide_error => 0,
    isr_debug => 1,
    isr_non_maskable => 2,
    isr_breakpoint => 3,
    isr_overflow => 4,
    isr_bound_range => 5,
    isr_invalid_opcode => 6,
    isr_device_not_available => 7,
    isr_x87_floating_point => 16,
    isr_machine_check => 18,
    isr_simd_floating_point => 19,
}

interrupt_stubs_with_error! {
    isr_double_fault => 8,
    isr_invalid_tss => 10,
    isr_segment_not_present => 11,
    isr_stack_segment_fault => 12,
    isr_general_protection => 13,
    isr_page_fault => 14,
    isr_alignment_check => 17,
}

interrupt_stubs! {
    irq0 => 32,
    irq1 => 33,
    irq2 => 34,
    irq3 => 35,
    irq4 => 36,
    irq5 => 37,
    irq6 => 38,
    irq7 => 39,
    irq8 => 40,
    irq9 => 41,
    irq10 => 42,
    irq11 => 43,
    irq12 => 44,
    irq13 => 45,
    irq14 => 46,
    irq15 => 47,
    isr_syscall => 128,
    isr_yield => 129,
}

fn stub_addr(stub: unsafe extern "C" fn() -> !) -> VirtAddr {
    VirtAddr::new(stub as usize as u64)
}

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();

        // SAFETY: every stub ends in iretq with the stack it was given,
        // so each satisfies the raw-address handler contract.
        unsafe {
            idt.divide_error.set_handler_addr(stub_addr(isr_divide_error));
            idt.debug.set_handler_addr(stub_addr(isr_debug));
            idt.non_maskable_interrupt
                .set_handler_addr(stub_addr(isr_non_maskable));
            idt.breakpoint.set_handler_addr(stub_addr(isr_breakpoint));
            idt.overflow.set_handler_addr(stub_addr(isr_overflow));
            idt.bound_range_exceeded
                .set_handler_addr(stub_addr(isr_bound_range));
            idt.invalid_opcode.set_handler_addr(stub_addr(isr_invalid_opcode));
            idt.device_not_available
                .set_handler_addr(stub_addr(isr_device_not_available));
            idt.invalid_tss.set_handler_addr(stub_addr(isr_invalid_tss));
            idt.segment_not_present
                .set_handler_addr(stub_addr(isr_segment_not_present));
            idt.stack_segment_fault
                .set_handler_addr(stub_addr(isr_stack_segment_fault));
            idt.general_protection_fault
                .set_handler_addr(stub_addr(isr_general_protection));
            idt.page_fault.set_handler_addr(stub_addr(isr_page_fault));
            idt.x87_floating_point
                .set_handler_addr(stub_addr(isr_x87_floating_point));
            idt.alignment_check
                .set_handler_addr(stub_addr(isr_alignment_check));
            idt.machine_check.set_handler_addr(stub_addr(isr_machine_check));
            idt.simd_floating_point
                .set_handler_addr(stub_addr(isr_simd_floating_point));

            // A double fault on a corrupted stack must land on a known
            // good one.
            idt.double_fault
                .set_handler_addr(stub_addr(isr_double_fault))
                .set_stack_index(DOUBLE_FAULT_IST_INDEX);

            let hardware = [
                irq0, irq1, irq2, irq3, irq4, irq5, irq6, irq7, irq8, irq9, irq10, irq11,
                irq12, irq13, irq14, irq15,
            ];
            for (i, stub) in hardware.into_iter().enumerate() {
                idt[32 + i as u8].set_handler_addr(stub_addr(stub));
            }

            // DPL3 so ring 3 code may raise the syscall and yield gates.
            idt[max_os_abi::SYSCALL_VECTOR]
                .set_handler_addr(stub_addr(isr_syscall))
                .set_privilege_level(PrivilegeLevel::Ring3);
            idt[max_os_abi::YIELD_VECTOR]
                .set_handler_addr(stub_addr(isr_yield))
                .set_privilege_level(PrivilegeLevel::Ring3);
        }

        idt
    };
}

/// Load the IDT. The GDT must already be in force.
pub fn init_idt() {
    IDT.load();
}
