// src/arch/x86_64/port.rs

//! Typed I/O port access.
//!
//! Keeps the `in`/`out` instructions behind a small typed API so the
//! unsafe surface stays at the call sites that know which device owns
//! the port.

use core::marker::PhantomData;

/// A readable and writable I/O port.
#[derive(Debug)]
pub struct Port<T> {
    port: u16,
    _phantom: PhantomData<T>,
}

impl<T> Port<T> {
    /// Create a port wrapper for the given address.
    #[must_use]
    pub const fn new(port: u16) -> Self {
        Self {
            port,
            _phantom: PhantomData,
        }
    }
}

impl Port<u8> {
    /// Read one byte from the port.
    ///
    /// # Safety
    ///
    /// The caller must guarantee the port address is valid and that
    /// reading it has no unintended side effects for the owning device.
    pub unsafe fn read(&self) -> u8 {
        let value: u8;
        unsafe {
            core::arch::asm!(
                "in al, dx",
                in("dx") self.port,
                out("al") value,
                options(nomem, nostack, preserves_flags)
            );
        }
        value
    }

    /// Write one byte to the port.
    ///
    /// # Safety
    ///
    /// The caller must guarantee the port address is valid and that the
    /// write is meaningful for the owning device.
    pub unsafe fn write(&mut self, value: u8) {
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") self.port,
                in("al") value,
                options(nomem, nostack, preserves_flags)
            );
        }
    }
}

/// A read-only I/O port.
#[derive(Debug)]
pub struct PortReadOnly<T> {
    port: u16,
    _phantom: PhantomData<T>,
}

impl<T> PortReadOnly<T> {
    /// Create a read-only port wrapper for the given address.
    #[must_use]
    pub const fn new(port: u16) -> Self {
        Self {
            port,
            _phantom: PhantomData,
        }
    }
}

impl PortReadOnly<u8> {
    /// Read one byte from the port.
    ///
    /// # Safety
    ///
    /// Same contract as [`Port::read`].
    pub unsafe fn read(&self) -> u8 {
        let value: u8;
        unsafe {
            core::arch::asm!(
                "in al, dx",
                in("dx") self.port,
                out("al") value,
                options(nomem, nostack, preserves_flags)
            );
        }
        value
    }
}

/// A write-only I/O port.
#[derive(Debug)]
pub struct PortWriteOnly<T> {
    port: u16,
    _phantom: PhantomData<T>,
}

impl<T> PortWriteOnly<T> {
    /// Create a write-only port wrapper for the given address.
    #[must_use]
    pub const fn new(port: u16) -> Self {
        Self {
            port,
            _phantom: PhantomData,
        }
    }
}

impl PortWriteOnly<u8> {
    /// Write one byte to the port.
    ///
    /// # Safety
    ///
    /// Same contract as [`Port::write`].
    pub unsafe fn write(&mut self, value: u8) {
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") self.port,
                in("al") value,
                options(nomem, nostack, preserves_flags)
            );
        }
    }
}

impl PortWriteOnly<u32> {
    /// Write one dword to the port.
    ///
    /// # Safety
    ///
    /// Same contract as [`Port::write`].
    pub unsafe fn write(&mut self, value: u32) {
        unsafe {
            core::arch::asm!(
                "out dx, eax",
                in("dx") self.port,
                in("eax") value,
                options(nomem, nostack, preserves_flags)
            );
        }
    }
}
