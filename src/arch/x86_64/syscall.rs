// src/arch/x86_64/syscall.rs

//! Raw syscall issue helpers.
//!
//! Kernel threads (and the demo programs in `main.rs`) enter the kernel
//! the same way user code would: `int 0x80` with the number in `rax` and
//! arguments in `rdi`, `rsi`, `rdx`, `r10`. The interrupt path restores
//! every register except `rax`, which carries the encoded result; decode
//! it with [`max_os_abi::decode_result`].

use core::arch::asm;

/// Issue a syscall with no arguments.
///
/// # Safety
///
/// `number` must be issued with the argument registers the operation
/// expects; a blocking syscall parks the calling thread.
#[inline]
pub unsafe fn syscall0(number: u64) -> u64 {
    let result;
    // SAFETY: int 0x80 is the syscall gate; the kernel preserves all
    // registers except rax.
    unsafe {
        asm!("int 0x80", inlateout("rax") number => result);
    }
    result
}

/// Issue a syscall with one argument.
///
/// # Safety
///
/// Same contract as [`syscall0`]; pointer arguments must be valid for
/// the operation's access.
#[inline]
pub unsafe fn syscall1(number: u64, arg1: u64) -> u64 {
    let result;
    // SAFETY: see syscall0.
    unsafe {
        asm!("int 0x80", inlateout("rax") number => result, in("rdi") arg1);
    }
    result
}

/// Issue a syscall with two arguments.
///
/// # Safety
///
/// Same contract as [`syscall1`].
#[inline]
pub unsafe fn syscall2(number: u64, arg1: u64, arg2: u64) -> u64 {
    let result;
    // SAFETY: see syscall0.
    unsafe {
        asm!(
            "int 0x80",
            inlateout("rax") number => result,
            in("rdi") arg1,
            in("rsi") arg2,
        );
    }
    result
}

/// Issue a syscall with three arguments.
///
/// # Safety
///
/// Same contract as [`syscall1`].
#[inline]
pub unsafe fn syscall3(number: u64, arg1: u64, arg2: u64, arg3: u64) -> u64 {
    let result;
    // SAFETY: see syscall0.
    unsafe {
        asm!(
            "int 0x80",
            inlateout("rax") number => result,
            in("rdi") arg1,
            in("rsi") arg2,
            in("rdx") arg3,
        );
    }
    result
}

/// Issue a syscall with four arguments.
///
/// # Safety
///
/// Same contract as [`syscall1`].
#[inline]
pub unsafe fn syscall4(number: u64, arg1: u64, arg2: u64, arg3: u64, arg4: u64) -> u64 {
    let result;
    // SAFETY: see syscall0.
    unsafe {
        asm!(
            "int 0x80",
            inlateout("rax") number => result,
            in("rdi") arg1,
            in("rsi") arg2,
            in("rdx") arg3,
            in("r10") arg4,
        );
    }
    result
}

/// Give up the rest of the current time slice.
///
/// The bare yield vector skips syscall dispatch entirely.
#[inline]
pub fn yield_now() {
    // SAFETY: int 0x81 only triggers a reschedule; all registers are
    // preserved.
    unsafe {
        asm!("int 0x81");
    }
}
