// tests/syscall_abi.rs

//! The syscall surface as seen from the caller's registers: number in
//! `rax`, arguments in `rdi`-`r10`, encoded result back in `rax`, and
//! every failure mode mapped to a stable error code.

mod common;

use common::{kernel, syscall, tick};
use max_os::arch::x86_64::cpu::CpuState;
use max_os_abi::{
    decode_result, SyscallError, SyscallNumber, ERROR_THRESHOLD, MAX_MESSAGE_SIZE, MAX_NAME_LEN,
};

extern "C" fn noop_entry() {}

#[test]
fn unknown_numbers_come_back_as_errors_not_faults() {
    let (mut kernel, _log) = kernel();
    let mut state = CpuState::zeroed();

    for number in [13u64, 99, 255] {
        state.rax = number;
        state.interrupt_number = u64::from(max_os_abi::SYSCALL_VECTOR);
        kernel.dispatch(&mut state);
        assert_eq!(decode_result(state.rax), Err(SyscallError::UnknownSyscall));
        // The encoding confines errors to the top of the u64 range.
        assert!(state.rax > ERROR_THRESHOLD);
    }
}

#[test]
fn klog_reports_bytes_written() {
    let (mut kernel, _log) = kernel();
    let mut state = CpuState::zeroed();

    let message = "hello from the log";
    let result = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::Klog,
        &[message.as_ptr() as u64, message.len() as u64],
    );
    assert_eq!(decode_result(result), Ok(message.len() as u64));
}

#[test]
fn klog_rejects_bad_pointers_and_bad_utf8() {
    let (mut kernel, _log) = kernel();
    let mut state = CpuState::zeroed();

    let result = syscall(&mut kernel, &mut state, SyscallNumber::Klog, &[0, 4]);
    assert_eq!(decode_result(result), Err(SyscallError::InvalidArgument));

    let bad = [0xFFu8, 0xFE, 0xFD];
    let result = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::Klog,
        &[bad.as_ptr() as u64, bad.len() as u64],
    );
    assert_eq!(decode_result(result), Err(SyscallError::InvalidArgument));
}

#[test]
fn resource_names_are_length_checked() {
    let (mut kernel, _log) = kernel();
    let pid = kernel.scheduler.spawn_process("names", noop_entry).unwrap();
    let mut state = CpuState::zeroed();
    tick(&mut kernel, &mut state);
    assert_eq!(kernel.scheduler.current_process(), pid);

    let long = [b'x'; MAX_NAME_LEN + 1];
    let result = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::CreateIpcEndpoint,
        &[long.as_ptr() as u64, long.len() as u64],
    );
    assert_eq!(decode_result(result), Err(SyscallError::NameTooLong));
}

#[test]
fn allocate_and_free_follow_the_ledger() {
    let (mut kernel, _log) = kernel();
    let pid = kernel.scheduler.spawn_process("alloc", noop_entry).unwrap();
    let mut state = CpuState::zeroed();
    tick(&mut kernel, &mut state);

    // Limits first.
    let zero = syscall(&mut kernel, &mut state, SyscallNumber::AllocateMemory, &[0]);
    assert_eq!(decode_result(zero), Err(SyscallError::InvalidArgument));
    let huge = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::AllocateMemory,
        &[max_os_abi::MAX_ALLOC_SIZE as u64 + 1],
    );
    assert_eq!(decode_result(huge), Err(SyscallError::InvalidArgument));

    let addr = decode_result(syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::AllocateMemory,
        &[512],
    ))
    .unwrap();
    assert_eq!(addr % 16, 0);
    assert_eq!(kernel.scheduler.process(pid).unwrap().allocation_count(), 1);

    // The region is zeroed.
    let bytes = unsafe { core::slice::from_raw_parts(addr as *const u8, 512) };
    assert!(bytes.iter().all(|&b| b == 0));

    let freed = syscall(&mut kernel, &mut state, SyscallNumber::FreeMemory, &[addr]);
    assert_eq!(decode_result(freed), Ok(0));

    // Freeing twice, or an address the process never got, is rejected.
    let again = syscall(&mut kernel, &mut state, SyscallNumber::FreeMemory, &[addr]);
    assert_eq!(decode_result(again), Err(SyscallError::InvalidArgument));
}

#[test]
fn shared_memory_create_open_and_conflicts() {
    let (mut kernel, _log) = kernel();
    kernel.scheduler.spawn_process("shm-a", noop_entry).unwrap();
    kernel.scheduler.spawn_process("shm-b", noop_entry).unwrap();
    let mut state = CpuState::zeroed();
    tick(&mut kernel, &mut state);

    let name = b"vram";
    let mut base_a = 0u64;
    let handle = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::CreateSharedMemory,
        &[
            name.as_ptr() as u64,
            name.len() as u64,
            4096,
            core::ptr::addr_of_mut!(base_a) as u64,
        ],
    );
    assert!(decode_result(handle).is_ok());
    assert_ne!(base_a, 0);

    // Same name again: taken.
    let conflict = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::CreateSharedMemory,
        &[name.as_ptr() as u64, name.len() as u64, 64, 0],
    );
    assert_eq!(decode_result(conflict), Err(SyscallError::AlreadyExists));

    // Second process opens the same region and sees the same base.
    tick(&mut kernel, &mut state);
    let mut base_b = 0u64;
    let opened = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::OpenSharedMemory,
        &[
            name.as_ptr() as u64,
            name.len() as u64,
            core::ptr::addr_of_mut!(base_b) as u64,
        ],
    );
    assert!(decode_result(opened).is_ok());
    assert_eq!(base_b, base_a);

    let missing = b"nope";
    let not_found = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::OpenSharedMemory,
        &[missing.as_ptr() as u64, missing.len() as u64, 0],
    );
    assert_eq!(decode_result(not_found), Err(SyscallError::NotFound));
}

#[test]
fn handles_are_kind_checked() {
    let (mut kernel, _log) = kernel();
    kernel.scheduler.spawn_process("kinds", noop_entry).unwrap();
    let mut state = CpuState::zeroed();
    tick(&mut kernel, &mut state);

    let name = b"region";
    let shm_handle = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::CreateSharedMemory,
        &[name.as_ptr() as u64, name.len() as u64, 64, 0],
    );
    let shm_handle = decode_result(shm_handle).unwrap();

    // A shared memory handle is not an endpoint.
    let payload = b"x";
    let sent = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::SendIpcMessage,
        &[shm_handle, payload.as_ptr() as u64, payload.len() as u64],
    );
    assert_eq!(decode_result(sent), Err(SyscallError::WrongResourceKind));

    // A handle the process never received names nothing.
    let bogus = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::RemoveIpcEndpoint,
        &[999],
    );
    assert_eq!(decode_result(bogus), Err(SyscallError::InvalidHandle));
}

#[test]
fn oversized_messages_are_rejected_at_the_gate() {
    let (mut kernel, _log) = kernel();
    kernel.scheduler.spawn_process("big", noop_entry).unwrap();
    let mut state = CpuState::zeroed();
    tick(&mut kernel, &mut state);

    let name = b"pipe";
    let handle = decode_result(syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::CreateIpcEndpoint,
        &[name.as_ptr() as u64, name.len() as u64],
    ))
    .unwrap();

    let payload = vec![0u8; MAX_MESSAGE_SIZE + 1];
    let sent = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::SendIpcMessage,
        &[handle, payload.as_ptr() as u64, payload.len() as u64],
    );
    assert_eq!(decode_result(sent), Err(SyscallError::MessageTooLarge));
}

#[test]
fn queued_messages_drain_in_fifo_order() {
    let (mut kernel, _log) = kernel();
    kernel.scheduler.spawn_process("fifo", noop_entry).unwrap();
    let mut state = CpuState::zeroed();
    tick(&mut kernel, &mut state);

    let name = b"ordered";
    let handle = decode_result(syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::CreateIpcEndpoint,
        &[name.as_ptr() as u64, name.len() as u64],
    ))
    .unwrap();

    for payload in [b"one".as_slice(), b"two", b"three"] {
        let sent = syscall(
            &mut kernel,
            &mut state,
            SyscallNumber::SendIpcMessage,
            &[handle, payload.as_ptr() as u64, payload.len() as u64],
        );
        assert_eq!(decode_result(sent), Ok(0));
    }

    let mut buffer = [0u8; 16];
    for expected in [b"one".as_slice(), b"two", b"three"] {
        let count = decode_result(syscall(
            &mut kernel,
            &mut state,
            SyscallNumber::ReceiveIpcMessage,
            &[handle, buffer.as_mut_ptr() as u64, buffer.len() as u64],
        ))
        .unwrap();
        assert_eq!(&buffer[..count as usize], expected);
    }
}
