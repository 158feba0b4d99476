// max_os_abi/src/call.rs
//! Syscall numbers and calling convention
//!
//! A syscall is issued with `int 0x80`. The syscall number travels in
//! `rax`; up to six argument words travel in `rdi`, `rsi`, `rdx`, `r10`,
//! `r8`, `r9` (the `r10` slot stands in for `rcx`, which the interrupt
//! path cannot preserve for us). The result comes back in `rax`, encoded
//! as described in [`crate::error`].
//!
//! A cooperative reschedule can also be requested without arguments via
//! `int 0x81`; it is equivalent to [`SyscallNumber::ThreadYield`] but
//! skips the syscall dispatch entirely.

/// Software interrupt vector for syscalls.
pub const SYSCALL_VECTOR: u8 = 0x80;

/// Software interrupt vector for a bare voluntary yield.
pub const YIELD_VECTOR: u8 = 0x81;

/// Number of argument registers carried by a syscall.
pub const SYSCALL_ARG_COUNT: usize = 6;

/// Size of the kernel's syscall dispatch table.
///
/// Numbers at or above this value can never be valid.
pub const MAX_SYSCALLS: usize = 256;

/// Syscall numbers.
///
/// The discriminants are stable ABI. `ReceiveIpcMessage` was added after
/// the first twelve and therefore sits at the end; nothing may be
/// renumbered.
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyscallNumber {
    /// Stop every thread of the calling process. Does not return.
    CloseProcess = 0,
    /// Write a message to the kernel log. Args: ptr, len.
    Klog = 1,
    /// Create a named shared memory region. Args: name ptr, name len,
    /// size, optional address-out ptr. Returns a handle.
    CreateSharedMemory = 2,
    /// Open an existing named shared memory region. Args: name ptr,
    /// name len, optional address-out ptr. Returns a handle.
    OpenSharedMemory = 3,
    /// Allocate kernel heap memory. Args: size. Returns the address.
    AllocateMemory = 4,
    /// Free memory obtained from `AllocateMemory`. Args: address.
    FreeMemory = 5,
    /// Create (or open, if it already exists) a named IPC endpoint.
    /// Args: name ptr, name len. Returns a handle.
    CreateIpcEndpoint = 6,
    /// Queue a message on an endpoint. Args: handle, ptr, len.
    SendIpcMessage = 7,
    /// Release an endpoint handle. Args: handle.
    RemoveIpcEndpoint = 8,
    /// Give up the rest of the current time slice.
    ThreadYield = 9,
    /// Sleep for at least the given number of timer ticks. Args: ticks.
    ThreadSleep = 10,
    /// Stop the calling thread. Does not return.
    ThreadClose = 11,
    /// Receive the oldest message from an endpoint, blocking while the
    /// queue is empty. Args: handle, buf ptr, buf len. Returns the
    /// number of bytes received.
    ReceiveIpcMessage = 12,
}

impl SyscallNumber {
    /// Number of defined syscalls.
    pub const COUNT: usize = 13;

    /// Convert a raw `rax` value into a syscall number.
    #[must_use]
    pub const fn from_u64(value: u64) -> Option<Self> {
        match value {
            0 => Some(Self::CloseProcess),
            1 => Some(Self::Klog),
            2 => Some(Self::CreateSharedMemory),
            3 => Some(Self::OpenSharedMemory),
            4 => Some(Self::AllocateMemory),
            5 => Some(Self::FreeMemory),
            6 => Some(Self::CreateIpcEndpoint),
            7 => Some(Self::SendIpcMessage),
            8 => Some(Self::RemoveIpcEndpoint),
            9 => Some(Self::ThreadYield),
            10 => Some(Self::ThreadSleep),
            11 => Some(Self::ThreadClose),
            12 => Some(Self::ReceiveIpcMessage),
            _ => None,
        }
    }

    /// The raw value carried in `rax`.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_round_trip() {
        for raw in 0..SyscallNumber::COUNT as u64 {
            let number = SyscallNumber::from_u64(raw).unwrap();
            assert_eq!(number.as_u64(), raw);
        }
        assert_eq!(SyscallNumber::from_u64(SyscallNumber::COUNT as u64), None);
        assert_eq!(SyscallNumber::from_u64(0xFFFF), None);
    }

    #[test]
    fn receive_sits_after_the_original_twelve() {
        assert_eq!(SyscallNumber::ThreadClose.as_u64(), 11);
        assert_eq!(SyscallNumber::ReceiveIpcMessage.as_u64(), 12);
    }
}
