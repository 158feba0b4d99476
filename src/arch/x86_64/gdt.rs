// src/arch/x86_64/gdt.rs

//! Global Descriptor Table (GDT) and Task State Segment (TSS).
//!
//! Defines the ring 0 and ring 3 segments and the TSS stacks. The
//! kernel code/data selectors must come out as 0x08/0x10: primed
//! thread states and the interrupt return path hard-code them.

use lazy_static::lazy_static;
use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};
use x86_64::structures::tss::TaskStateSegment;
use x86_64::VirtAddr;

use super::cpu::{KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR};

/// IST index used by the double fault gate.
pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;

const STACK_SIZE: usize = 4096 * 5;

#[repr(C, align(4096))]
struct AlignedStack {
    data: [u8; STACK_SIZE],
}

static mut DOUBLE_FAULT_STACK: AlignedStack = AlignedStack {
    data: [0; STACK_SIZE],
};

/// Stack the CPU switches to when a ring 3 thread takes an interrupt.
static mut PRIVILEGE_STACK: AlignedStack = AlignedStack {
    data: [0; STACK_SIZE],
};

static mut TSS: TaskStateSegment = TaskStateSegment::new();

/// Segment selectors as laid out by [`init_gdt`].
pub struct Selectors {
    /// Kernel code segment (ring 0).
    pub kernel_code: SegmentSelector,
    /// Kernel data segment (ring 0).
    pub kernel_data: SegmentSelector,
    /// User code segment (ring 3).
    pub user_code: SegmentSelector,
    /// User data segment (ring 3).
    pub user_data: SegmentSelector,
    /// TSS selector.
    pub tss: SegmentSelector,
}

lazy_static! {
    static ref GDT: (GlobalDescriptorTable, Selectors) = {
        let mut gdt = GlobalDescriptorTable::new();

        // Ring 0 segments; order fixes the 0x08/0x10 selectors.
        let kernel_code = gdt.append(Descriptor::kernel_code_segment());
        let kernel_data = gdt.append(Descriptor::kernel_data_segment());

        // Ring 3 segments, present so the DPL3 syscall gates have a
        // well-defined caller model.
        let user_code = gdt.append(Descriptor::user_code_segment());
        let user_data = gdt.append(Descriptor::user_data_segment());

        let tss = gdt.append(Descriptor::tss_segment(unsafe {
            &*core::ptr::addr_of!(TSS)
        }));

        (
            gdt,
            Selectors {
                kernel_code,
                kernel_data,
                user_code,
                user_data,
                tss,
            },
        )
    };
}

/// Segment selectors currently in force.
pub fn selectors() -> &'static Selectors {
    &GDT.1
}

/// Build and load the GDT and TSS.
///
/// Must run before the IDT is loaded and before interrupts are enabled.
pub fn init_gdt() {
    use x86_64::instructions::segmentation::{Segment, CS, SS};
    use x86_64::instructions::tables::load_tss;

    unsafe {
        TSS.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] = {
            let stack_start = VirtAddr::from_ptr(core::ptr::addr_of!(DOUBLE_FAULT_STACK));
            stack_start + (STACK_SIZE as u64)
        };
        TSS.privilege_stack_table[0] = {
            let stack_start = VirtAddr::from_ptr(core::ptr::addr_of!(PRIVILEGE_STACK));
            stack_start + (STACK_SIZE as u64)
        };
    }

    GDT.0.load();

    let selectors = selectors();
    assert_eq!(u64::from(selectors.kernel_code.0), KERNEL_CODE_SELECTOR);
    assert_eq!(u64::from(selectors.kernel_data.0), KERNEL_DATA_SELECTOR);

    unsafe {
        CS::set_reg(selectors.kernel_code);
        SS::set_reg(selectors.kernel_data);
        load_tss(selectors.tss);
    }
}
