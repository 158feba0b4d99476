// max_os_abi/src/error.rs
//! Type-safe syscall errors
//!
//! Errors cross the user-kernel boundary as a `u32` discriminant packed
//! into the single return register. The discriminant values are stable
//! ABI and must not be changed; they are grouped by subsystem so a raw
//! code in a log line can be read at a glance.
//!
//! # Result encoding
//!
//! A syscall returns one `u64` in `rax`. Success values are returned
//! raw. Errors are returned as the two's complement of the error code,
//! which confines them to the top [`MAX_ERROR_CODE`] values of the `u64`
//! range; no legitimate kernel return value (handle, address, byte
//! count) ever falls in that window.

use core::fmt;

/// Largest error code representable in the rax encoding.
pub const MAX_ERROR_CODE: u32 = 0x0FFF;

/// Raw values strictly above this threshold decode as errors.
pub const ERROR_THRESHOLD: u64 = u64::MAX - MAX_ERROR_CODE as u64;

/// Syscall error codes.
///
/// # ABI representation
///
/// Represented as `u32` with category-grouped discriminants:
/// general errors in `0x00xx`, resource errors in `0x01xx`. All values
/// must stay at or below [`MAX_ERROR_CODE`] so the rax encoding holds.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyscallError {
    // === General errors (0x00xx) ===
    /// An argument was out of range, null where forbidden, or malformed.
    InvalidArgument = 0x0001,
    /// The kernel could not allocate the memory the request needed.
    OutOfMemory = 0x0002,
    /// The syscall number is not bound to any operation.
    UnknownSyscall = 0x0003,
    /// A resource name exceeded the permitted length.
    NameTooLong = 0x0004,

    // === Resource errors (0x01xx) ===
    /// No resource with the given name exists.
    NotFound = 0x0100,
    /// A resource with the given name already exists.
    AlreadyExists = 0x0101,
    /// The handle is not in the calling process's handle table.
    InvalidHandle = 0x0102,
    /// The handle refers to a resource of a different kind.
    WrongResourceKind = 0x0103,
    /// The endpoint was removed while the operation was in flight.
    EndpointClosed = 0x0104,
    /// The message payload exceeds the permitted size.
    MessageTooLarge = 0x0105,
}

impl SyscallError {
    /// Convert a raw discriminant back into an error.
    ///
    /// Unknown discriminants collapse to `InvalidArgument`; the kernel
    /// never emits them, so this only matters for corrupted values.
    #[must_use]
    pub const fn from_u32(value: u32) -> Self {
        match value {
            0x0001 => Self::InvalidArgument,
            0x0002 => Self::OutOfMemory,
            0x0003 => Self::UnknownSyscall,
            0x0004 => Self::NameTooLong,
            0x0100 => Self::NotFound,
            0x0101 => Self::AlreadyExists,
            0x0102 => Self::InvalidHandle,
            0x0103 => Self::WrongResourceKind,
            0x0104 => Self::EndpointClosed,
            0x0105 => Self::MessageTooLarge,
            _ => Self::InvalidArgument,
        }
    }

    /// The raw discriminant.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Short human-readable description.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid argument",
            Self::OutOfMemory => "out of memory",
            Self::UnknownSyscall => "unknown syscall",
            Self::NameTooLong => "name too long",
            Self::NotFound => "not found",
            Self::AlreadyExists => "already exists",
            Self::InvalidHandle => "invalid handle",
            Self::WrongResourceKind => "wrong resource kind",
            Self::EndpointClosed => "endpoint closed",
            Self::MessageTooLarge => "message too large",
        }
    }
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pack a syscall result into the value returned in `rax`.
#[must_use]
pub const fn encode_result(result: Result<u64, SyscallError>) -> u64 {
    match result {
        Ok(value) => value,
        Err(error) => (error.as_u32() as u64).wrapping_neg(),
    }
}

/// Unpack a raw `rax` value into a syscall result.
#[must_use]
pub const fn decode_result(raw: u64) -> Result<u64, SyscallError> {
    if raw > ERROR_THRESHOLD {
        Err(SyscallError::from_u32(raw.wrapping_neg() as u32))
    } else {
        Ok(raw)
    }
}
