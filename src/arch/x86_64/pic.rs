// src/arch/x86_64/pic.rs

//! 8259 programmable interrupt controller pair.
//!
//! The classic master/slave chain, remapped so hardware interrupts land
//! on vectors 0x20-0x2F instead of colliding with CPU exceptions. Only
//! the timer line (IRQ0) and the cascade line (IRQ2) are unmasked; the
//! core has no handler for anything else.
//!
//! The pair plugs into the kernel through the
//! [`IrqController`](crate::kernel::interrupts::IrqController) seam, so
//! dispatch code never touches ports directly.

use crate::arch::x86_64::port::PortWriteOnly;
use crate::kernel::interrupts::IrqController;

const PIC1_COMMAND: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_COMMAND: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

/// ICW1: begin initialization, expect ICW4.
const ICW1_INIT: u8 = 0x11;
/// ICW4: 8086/88 mode.
const ICW4_8086: u8 = 0x01;
/// End-of-interrupt command.
const PIC_EOI: u8 = 0x20;

/// Master mask: everything off except IRQ0 (timer) and IRQ2 (cascade).
const MASTER_MASK: u8 = 0xFA;
/// Slave mask: everything off.
const SLAVE_MASK: u8 = 0xFF;

struct Pic {
    offset: u8,
    command: PortWriteOnly<u8>,
    data: PortWriteOnly<u8>,
}

impl Pic {
    const fn handles_vector(&self, vector: u8) -> bool {
        self.offset <= vector && vector < self.offset + 8
    }

    unsafe fn end_of_interrupt(&mut self) {
        // SAFETY: EOI is always valid on the command port of an
        // initialized PIC.
        unsafe {
            self.command.write(PIC_EOI);
        }
    }
}

/// The chained master/slave 8259 pair.
pub struct ChainedPics {
    pics: [Pic; 2],
}

impl ChainedPics {
    /// A pair delivering to the given vector offsets.
    #[must_use]
    pub const fn new(offset1: u8, offset2: u8) -> Self {
        Self {
            pics: [
                Pic {
                    offset: offset1,
                    command: PortWriteOnly::new(PIC1_COMMAND),
                    data: PortWriteOnly::new(PIC1_DATA),
                },
                Pic {
                    offset: offset2,
                    command: PortWriteOnly::new(PIC2_COMMAND),
                    data: PortWriteOnly::new(PIC2_DATA),
                },
            ],
        }
    }

    /// Run the ICW init sequence and apply the masks.
    ///
    /// # Safety
    ///
    /// Must run once, before interrupts are enabled, on the machine's
    /// real 8259 pair.
    pub unsafe fn initialize(&mut self) {
        // SAFETY: the caller guarantees exclusive access to the PIC
        // ports during initialization.
        unsafe {
            // Port 0x80 is the traditional POST port; a write gives the
            // old silicon time to settle between ICW bytes.
            let mut wait_port: PortWriteOnly<u8> = PortWriteOnly::new(0x80);
            let mut wait = || wait_port.write(0);

            self.pics[0].command.write(ICW1_INIT);
            wait();
            self.pics[1].command.write(ICW1_INIT);
            wait();

            // ICW2: vector offsets.
            self.pics[0].data.write(self.pics[0].offset);
            wait();
            self.pics[1].data.write(self.pics[1].offset);
            wait();

            // ICW3: slave on IRQ2, cascade identity 2.
            self.pics[0].data.write(4);
            wait();
            self.pics[1].data.write(2);
            wait();

            self.pics[0].data.write(ICW4_8086);
            wait();
            self.pics[1].data.write(ICW4_8086);
            wait();

            self.pics[0].data.write(MASTER_MASK);
            self.pics[1].data.write(SLAVE_MASK);
        }
    }

    fn handles_vector(&self, vector: u8) -> bool {
        self.pics.iter().any(|p| p.handles_vector(vector))
    }
}

impl IrqController for ChainedPics {
    fn end_of_interrupt(&mut self, vector: u8) {
        if !self.handles_vector(vector) {
            return;
        }
        // SAFETY: called from interrupt dispatch for a vector this pair
        // delivered; the slave needs its own EOI, the master always one.
        unsafe {
            if self.pics[1].handles_vector(vector) {
                self.pics[1].end_of_interrupt();
            }
            self.pics[0].end_of_interrupt();
        }
    }
}
