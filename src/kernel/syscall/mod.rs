// src/kernel/syscall/mod.rs

//! Syscall manager
//!
//! The software-interrupt handler on vector 0x80. The syscall number and
//! argument block are extracted from the interrupted thread's saved
//! registers, range-checked against a 256-slot dispatch table and routed
//! to the operation. Unknown numbers return an error code to the caller;
//! they never fault the kernel.
//!
//! Blocking operations park the calling thread and defer the result:
//! nothing is written at dispatch time, and whoever completes the wait
//! writes the encoded result into the parked thread's saved `rax` so
//! the thread resumes as if the syscall had just returned.

use alloc::string::String;
use alloc::vec::Vec;

use max_os_abi::{
    encode_result, Handle, ResourceKind, SyscallError, SyscallNumber, MAX_MESSAGE_SIZE,
    MAX_NAME_LEN, MAX_SYSCALLS,
};

use crate::arch::x86_64::cpu::CpuState;
use crate::debug_println;
use crate::kernel::resource::SendOutcome;
use crate::kernel::Kernel;
use crate::println;

/// The argument block of one syscall, as carried by the registers.
#[derive(Debug, Clone, Copy)]
pub struct SyscallArgs {
    /// Raw syscall number from `rax`.
    pub number: u64,
    /// Argument words from `rdi`, `rsi`, `rdx`, `r10`, `r8`, `r9`.
    pub args: [u64; max_os_abi::SYSCALL_ARG_COUNT],
}

impl SyscallArgs {
    /// Extract the argument block from a saved register snapshot.
    #[must_use]
    pub const fn from_state(state: &CpuState) -> Self {
        Self {
            number: state.rax,
            args: [
                state.rdi, state.rsi, state.rdx, state.r10, state.r8, state.r9,
            ],
        }
    }

    /// The n-th argument word.
    #[must_use]
    pub const fn arg(&self, index: usize) -> u64 {
        self.args[index]
    }
}

/// What a syscall operation did with the calling thread.
pub enum SyscallOutcome {
    /// The result is written into the caller's `rax` immediately.
    Complete(Result<u64, SyscallError>),
    /// The calling thread was parked; the result arrives at wake time.
    Blocked,
    /// Result written immediately, then the CPU is handed over.
    Yield(Result<u64, SyscallError>),
}

/// A syscall operation.
pub type SyscallHandlerFn = fn(&mut Kernel, &SyscallArgs) -> SyscallOutcome;

/// The 256-slot syscall dispatch table.
pub struct SyscallManager {
    handlers: [Option<SyscallHandlerFn>; MAX_SYSCALLS],
}

impl Default for SyscallManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SyscallManager {
    /// A table with every defined syscall bound.
    #[must_use]
    pub fn new() -> Self {
        let mut manager = Self {
            handlers: [None; MAX_SYSCALLS],
        };
        manager.register(SyscallNumber::CloseProcess, sys_close_process);
        manager.register(SyscallNumber::Klog, sys_klog);
        manager.register(SyscallNumber::CreateSharedMemory, sys_create_shared_memory);
        manager.register(SyscallNumber::OpenSharedMemory, sys_open_shared_memory);
        manager.register(SyscallNumber::AllocateMemory, sys_allocate_memory);
        manager.register(SyscallNumber::FreeMemory, sys_free_memory);
        manager.register(SyscallNumber::CreateIpcEndpoint, sys_create_ipc_endpoint);
        manager.register(SyscallNumber::SendIpcMessage, sys_send_ipc_message);
        manager.register(SyscallNumber::RemoveIpcEndpoint, sys_remove_ipc_endpoint);
        manager.register(SyscallNumber::ThreadYield, sys_thread_yield);
        manager.register(SyscallNumber::ThreadSleep, sys_thread_sleep);
        manager.register(SyscallNumber::ThreadClose, sys_thread_close);
        manager.register(SyscallNumber::ReceiveIpcMessage, sys_receive_ipc_message);
        manager
    }

    /// Bind an operation to a syscall number. Last write wins.
    pub fn register(&mut self, number: SyscallNumber, handler: SyscallHandlerFn) {
        self.handlers[number.as_u64() as usize] = Some(handler);
    }

    /// Look up the operation for a raw syscall number.
    #[must_use]
    pub fn handler(&self, raw: u64) -> Option<SyscallHandlerFn> {
        if raw >= MAX_SYSCALLS as u64 {
            return None;
        }
        self.handlers[raw as usize]
    }
}

/// Interrupt handler for the syscall vector.
pub fn handle_syscall(kernel: &mut Kernel, state: &mut CpuState) {
    let args = SyscallArgs::from_state(state);

    #[cfg(feature = "syscall_trace")]
    println!(
        "[syscall] {} num={} args={:x?}",
        kernel.scheduler.current_thread(),
        args.number,
        args.args
    );

    let outcome = match kernel.syscalls.handler(args.number) {
        Some(handler) => handler(kernel, &args),
        None => {
            debug_println!("[syscall] unknown syscall number {:#x}", args.number);
            SyscallOutcome::Complete(Err(SyscallError::UnknownSyscall))
        }
    };

    let mut hand_over = false;
    match outcome {
        SyscallOutcome::Complete(result) => state.rax = encode_result(result),
        SyscallOutcome::Yield(result) => {
            state.rax = encode_result(result);
            hand_over = true;
        }
        SyscallOutcome::Blocked => {}
    }

    // A thread that left the running state mid-syscall cannot be
    // resumed; fall through to selection without consuming a tick.
    if hand_over || kernel.scheduler.current_left_running() {
        kernel.scheduler.reschedule(state);
    }
}

/// Copy a byte block out of the caller's address space.
fn read_user_bytes(
    ptr: u64,
    len: u64,
    max: usize,
    oversize: SyscallError,
) -> Result<Vec<u8>, SyscallError> {
    if ptr == 0 {
        return Err(SyscallError::InvalidArgument);
    }
    if len as usize > max {
        return Err(oversize);
    }
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(len as usize)
        .map_err(|_| SyscallError::OutOfMemory)?;
    // SAFETY: non-null pointer and length supplied by the calling
    // thread for its own memory; this uniprocessor core shares one
    // address space, so the range is directly readable.
    unsafe {
        bytes.extend_from_slice(core::slice::from_raw_parts(ptr as *const u8, len as usize));
    }
    Ok(bytes)
}

/// Read a resource name: bounded length, valid UTF-8.
fn read_user_name(ptr: u64, len: u64) -> Result<String, SyscallError> {
    let bytes = read_user_bytes(ptr, len, MAX_NAME_LEN, SyscallError::NameTooLong)?;
    String::from_utf8(bytes).map_err(|_| SyscallError::InvalidArgument)
}

/// Write one u64 back into the caller's address space, if requested.
fn write_user_u64(ptr: u64, value: u64) {
    if ptr == 0 {
        return;
    }
    // SAFETY: the caller opted in by passing a non-null out pointer
    // into its own memory.
    unsafe {
        core::ptr::write_unaligned(ptr as *mut u64, value);
    }
}

fn sys_close_process(kernel: &mut Kernel, _args: &SyscallArgs) -> SyscallOutcome {
    let pid = kernel.scheduler.current_process();
    debug_println!("[syscall] close process {pid}");
    kernel.scheduler.stop_process(pid);
    SyscallOutcome::Blocked
}

fn sys_klog(kernel: &mut Kernel, args: &SyscallArgs) -> SyscallOutcome {
    let (ptr, len) = (args.arg(0), args.arg(1));
    let message = match read_user_bytes(ptr, len, MAX_MESSAGE_SIZE, SyscallError::MessageTooLarge)
        .and_then(|bytes| String::from_utf8(bytes).map_err(|_| SyscallError::InvalidArgument))
    {
        Ok(message) => message,
        Err(err) => return SyscallOutcome::Complete(Err(err)),
    };

    let pid = kernel.scheduler.current_process();
    println!("[{pid}] {message}");
    SyscallOutcome::Complete(Ok(len))
}

fn sys_create_shared_memory(kernel: &mut Kernel, args: &SyscallArgs) -> SyscallOutcome {
    SyscallOutcome::Complete(shared_memory_op(kernel, args, true))
}

fn sys_open_shared_memory(kernel: &mut Kernel, args: &SyscallArgs) -> SyscallOutcome {
    SyscallOutcome::Complete(shared_memory_op(kernel, args, false))
}

fn shared_memory_op(
    kernel: &mut Kernel,
    args: &SyscallArgs,
    create: bool,
) -> Result<u64, SyscallError> {
    let name = read_user_name(args.arg(0), args.arg(1))?;

    let Kernel {
        scheduler,
        resources,
        ..
    } = kernel;

    let (id, base, addr_out) = if create {
        let (id, base) = resources.create_shared_memory(&name, args.arg(2))?;
        (id, base, args.arg(3))
    } else {
        let (id, base) = resources.open_shared_memory(&name)?;
        (id, base, args.arg(2))
    };

    let pid = scheduler.current_process();
    let handle = scheduler
        .process_mut(pid)
        .ok_or(SyscallError::InvalidArgument)?
        .resources_mut()
        .insert(ResourceKind::SharedMemory, id);

    write_user_u64(addr_out, base);
    Ok(handle.as_u64())
}

fn sys_allocate_memory(kernel: &mut Kernel, args: &SyscallArgs) -> SyscallOutcome {
    let pid = kernel.scheduler.current_process();
    let result = match kernel.scheduler.process_mut(pid) {
        Some(process) => process.allocate(args.arg(0)),
        None => Err(SyscallError::InvalidArgument),
    };
    SyscallOutcome::Complete(result)
}

fn sys_free_memory(kernel: &mut Kernel, args: &SyscallArgs) -> SyscallOutcome {
    let pid = kernel.scheduler.current_process();
    let result = match kernel.scheduler.process_mut(pid) {
        Some(process) => process.free(args.arg(0)).map(|()| 0),
        None => Err(SyscallError::InvalidArgument),
    };
    SyscallOutcome::Complete(result)
}

fn sys_create_ipc_endpoint(kernel: &mut Kernel, args: &SyscallArgs) -> SyscallOutcome {
    let name = match read_user_name(args.arg(0), args.arg(1)) {
        Ok(name) => name,
        Err(err) => return SyscallOutcome::Complete(Err(err)),
    };

    let Kernel {
        scheduler,
        resources,
        ..
    } = kernel;

    let result = resources.create_or_open_endpoint(&name).and_then(|id| {
        let pid = scheduler.current_process();
        let handle = scheduler
            .process_mut(pid)
            .ok_or(SyscallError::InvalidArgument)?
            .resources_mut()
            .insert(ResourceKind::MessageEndpoint, id);
        Ok(handle.as_u64())
    });
    SyscallOutcome::Complete(result)
}

fn sys_send_ipc_message(kernel: &mut Kernel, args: &SyscallArgs) -> SyscallOutcome {
    let payload = match read_user_bytes(
        args.arg(1),
        args.arg(2),
        MAX_MESSAGE_SIZE,
        SyscallError::MessageTooLarge,
    ) {
        Ok(payload) => payload,
        Err(err) => return SyscallOutcome::Complete(Err(err)),
    };

    let Kernel {
        scheduler,
        resources,
        ..
    } = kernel;

    let result = (|| {
        let pid = scheduler.current_process();
        let id = scheduler
            .process(pid)
            .ok_or(SyscallError::InvalidArgument)?
            .resources()
            .lookup(Handle::new(args.arg(0)), ResourceKind::MessageEndpoint)?;

        match resources.endpoint_mut(id)?.send(&payload)? {
            SendOutcome::Queued => {}
            SendOutcome::Delivered(wakeup) => {
                scheduler.apply_wakeups(alloc::vec![wakeup]);
            }
        }
        Ok(0)
    })();
    SyscallOutcome::Complete(result)
}

fn sys_remove_ipc_endpoint(kernel: &mut Kernel, args: &SyscallArgs) -> SyscallOutcome {
    let Kernel {
        scheduler,
        resources,
        ..
    } = kernel;

    let result = (|| {
        let pid = scheduler.current_process();
        let handle = Handle::new(args.arg(0));
        let process = scheduler
            .process_mut(pid)
            .ok_or(SyscallError::InvalidArgument)?;
        let id = process
            .resources()
            .lookup(handle, ResourceKind::MessageEndpoint)?;
        process.resources_mut().remove(handle)?;

        let wakeups = resources.release(id);
        scheduler.apply_wakeups(wakeups);
        Ok(0)
    })();
    SyscallOutcome::Complete(result)
}

fn sys_thread_yield(_kernel: &mut Kernel, _args: &SyscallArgs) -> SyscallOutcome {
    SyscallOutcome::Yield(Ok(0))
}

fn sys_thread_sleep(kernel: &mut Kernel, args: &SyscallArgs) -> SyscallOutcome {
    kernel.scheduler.sleep_current(args.arg(0));
    // rax is written now and saved with the snapshot; the thread sees
    // the zero when its wake tick redispatches it.
    SyscallOutcome::Complete(Ok(0))
}

fn sys_thread_close(kernel: &mut Kernel, _args: &SyscallArgs) -> SyscallOutcome {
    let tid = kernel.scheduler.current_thread();
    debug_println!("[syscall] close thread {tid}");
    kernel.scheduler.stop_current();
    SyscallOutcome::Blocked
}

fn sys_receive_ipc_message(kernel: &mut Kernel, args: &SyscallArgs) -> SyscallOutcome {
    let (raw_handle, buffer, capacity) = (args.arg(0), args.arg(1), args.arg(2));
    if buffer == 0 {
        return SyscallOutcome::Complete(Err(SyscallError::InvalidArgument));
    }

    let Kernel {
        scheduler,
        resources,
        ..
    } = kernel;

    let pid = scheduler.current_process();
    let id = match scheduler
        .process(pid)
        .ok_or(SyscallError::InvalidArgument)
        .and_then(|process| {
            process
                .resources()
                .lookup(Handle::new(raw_handle), ResourceKind::MessageEndpoint)
        }) {
        Ok(id) => id,
        Err(err) => return SyscallOutcome::Complete(Err(err)),
    };

    let endpoint = match resources.endpoint_mut(id) {
        Ok(endpoint) => endpoint,
        Err(err) => return SyscallOutcome::Complete(Err(err)),
    };

    match endpoint.try_receive(buffer, capacity) {
        Some(count) => SyscallOutcome::Complete(Ok(count)),
        None => {
            endpoint.park_receiver(scheduler.current_thread(), buffer, capacity);
            scheduler.block_current();
            SyscallOutcome::Blocked
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_block_follows_the_register_convention() {
        let mut state = CpuState::zeroed();
        state.rax = 7;
        state.rdi = 1;
        state.rsi = 2;
        state.rdx = 3;
        state.r10 = 4;
        state.r8 = 5;
        state.r9 = 6;

        let args = SyscallArgs::from_state(&state);
        assert_eq!(args.number, 7);
        assert_eq!(args.args, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn out_of_range_numbers_have_no_handler() {
        let manager = SyscallManager::new();
        assert!(manager.handler(SyscallNumber::Klog.as_u64()).is_some());
        assert!(manager.handler(SyscallNumber::COUNT as u64).is_none());
        assert!(manager.handler(0xFFFF).is_none());
    }

    #[test]
    fn null_pointers_are_invalid_arguments() {
        assert_eq!(
            read_user_bytes(0, 4, 64, SyscallError::NameTooLong).unwrap_err(),
            SyscallError::InvalidArgument
        );
    }

    #[test]
    fn name_length_is_bounded() {
        let long = [b'a'; MAX_NAME_LEN + 1];
        assert_eq!(
            read_user_name(long.as_ptr() as u64, long.len() as u64).unwrap_err(),
            SyscallError::NameTooLong
        );
        let ok = b"console";
        assert_eq!(
            read_user_name(ok.as_ptr() as u64, ok.len() as u64).unwrap(),
            "console"
        );
    }
}
