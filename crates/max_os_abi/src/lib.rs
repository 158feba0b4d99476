//! Max OS shared ABI definitions
//!
//! This crate defines the contract between the kernel and anything that
//! issues syscalls against it: syscall numbers, the register convention,
//! error codes, the single-register result encoding, and the opaque
//! handle type used for kernel resources.
//!
//! Everything here is `no_std` and dependency-free so it can be linked
//! into the kernel and into userspace programs alike. Discriminant values
//! are stable ABI and must not be renumbered.
//!
//! # Modules
//!
//! - [`call`]: syscall numbers and the interrupt/register convention
//! - [`error`]: type-safe syscall error codes and the rax encoding
//! - [`handle`]: opaque resource handles and resource kinds

#![no_std]
#![warn(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod call;
pub mod error;
pub mod handle;

// Re-export commonly used types
pub use call::{SyscallNumber, MAX_SYSCALLS, SYSCALL_ARG_COUNT, SYSCALL_VECTOR, YIELD_VECTOR};
pub use error::{decode_result, encode_result, SyscallError, ERROR_THRESHOLD};
pub use handle::{Handle, ResourceKind};

/// Maximum length in bytes of a resource name.
pub const MAX_NAME_LEN: usize = 64;

/// Maximum size in bytes of a single IPC message payload.
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// Maximum size in bytes of a single `AllocateMemory` request.
pub const MAX_ALLOC_SIZE: usize = 16 * 1024 * 1024;
