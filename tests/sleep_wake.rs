// tests/sleep_wake.rs

//! Sleeping, blocking and teardown, driven through the dispatch path:
//! a parked thread must come back exactly when its wake condition says,
//! carrying the deferred syscall result in `rax`.

mod common;

use common::{kernel, syscall, tick};
use max_os::arch::x86_64::cpu::CpuState;
use max_os::kernel::process::ThreadState;
use max_os_abi::{decode_result, SyscallError, SyscallNumber};

extern "C" fn noop_entry() {}

#[test]
fn sleeper_resumes_strictly_after_its_wake_tick() {
    let (mut kernel, _log) = kernel();
    let pid = kernel.scheduler.spawn_process("napper", noop_entry).unwrap();
    let a = kernel.scheduler.process(pid).unwrap().threads()[0];

    let mut state = CpuState::zeroed();
    tick(&mut kernel, &mut state);
    assert_eq!(kernel.scheduler.current_thread(), a);
    assert_eq!(kernel.scheduler.ticks(), 1);

    // sleep(3) at tick 1: wake tick 4, first dispatch on tick 5.
    syscall(&mut kernel, &mut state, SyscallNumber::ThreadSleep, &[3]);
    assert_eq!(
        kernel.scheduler.current_thread(),
        kernel.scheduler.idle_thread()
    );

    for expected_tick in 2..=4 {
        tick(&mut kernel, &mut state);
        assert_eq!(kernel.scheduler.ticks(), expected_tick);
        assert_eq!(kernel.scheduler.thread_state(a), Some(ThreadState::Sleeping));
    }

    tick(&mut kernel, &mut state);
    assert_eq!(kernel.scheduler.ticks(), 5);
    assert_eq!(kernel.scheduler.current_thread(), a);
    // The sleep syscall resumes with a success result.
    assert_eq!(decode_result(state.rax), Ok(0));
}

#[test]
fn blocked_receive_is_woken_by_a_send() {
    let (mut kernel, _log) = kernel();
    let recv_pid = kernel.scheduler.spawn_process("recv", noop_entry).unwrap();
    let receiver = kernel.scheduler.process(recv_pid).unwrap().threads()[0];
    kernel.scheduler.spawn_process("send", noop_entry).unwrap();

    let mut state = CpuState::zeroed();
    tick(&mut kernel, &mut state);
    assert_eq!(kernel.scheduler.current_thread(), receiver);

    let name = b"chan";
    let handle = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::CreateIpcEndpoint,
        &[name.as_ptr() as u64, name.len() as u64],
    );
    assert_eq!(decode_result(handle), Ok(1));

    // Empty queue: the receiver parks and the sender thread runs next.
    let mut buffer = [0u8; 16];
    syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::ReceiveIpcMessage,
        &[handle, buffer.as_mut_ptr() as u64, buffer.len() as u64],
    );
    assert_eq!(
        kernel.scheduler.thread_state(receiver),
        Some(ThreadState::Waiting)
    );
    assert_ne!(kernel.scheduler.current_thread(), receiver);

    // The sender joins the same endpoint and posts a payload.
    let send_handle = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::CreateIpcEndpoint,
        &[name.as_ptr() as u64, name.len() as u64],
    );
    let payload = b"hello";
    let sent = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::SendIpcMessage,
        &[send_handle, payload.as_ptr() as u64, payload.len() as u64],
    );
    assert_eq!(decode_result(sent), Ok(0));

    // Direct handoff: buffer filled, receiver ready again.
    assert_eq!(&buffer[..5], b"hello");
    assert_eq!(
        kernel.scheduler.thread_state(receiver),
        Some(ThreadState::Ready)
    );

    // On dispatch the receive syscall resumes with the byte count.
    tick(&mut kernel, &mut state);
    assert_eq!(kernel.scheduler.current_thread(), receiver);
    assert_eq!(decode_result(state.rax), Ok(5));
}

#[test]
fn removing_the_endpoint_fails_the_parked_receiver() {
    let (mut kernel, _log) = kernel();
    let pid = kernel.scheduler.spawn_process("waiter", noop_entry).unwrap();
    let t1 = kernel.scheduler.process(pid).unwrap().threads()[0];
    kernel.scheduler.spawn_thread(pid, noop_entry).unwrap();

    let mut state = CpuState::zeroed();
    tick(&mut kernel, &mut state);
    assert_eq!(kernel.scheduler.current_thread(), t1);

    let name = b"doomed";
    let handle = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::CreateIpcEndpoint,
        &[name.as_ptr() as u64, name.len() as u64],
    );

    let mut buffer = [0u8; 8];
    syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::ReceiveIpcMessage,
        &[handle, buffer.as_mut_ptr() as u64, buffer.len() as u64],
    );
    assert_eq!(kernel.scheduler.thread_state(t1), Some(ThreadState::Waiting));

    // Sibling thread drops the last use; the parked receive must fail.
    let removed = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::RemoveIpcEndpoint,
        &[handle],
    );
    assert_eq!(decode_result(removed), Ok(0));
    assert!(kernel.resources.is_empty());
    assert_eq!(kernel.scheduler.thread_state(t1), Some(ThreadState::Ready));

    tick(&mut kernel, &mut state);
    assert_eq!(kernel.scheduler.current_thread(), t1);
    assert_eq!(decode_result(state.rax), Err(SyscallError::EndpointClosed));
}

#[test]
fn send_after_receiver_is_reclaimed_queues_the_payload() {
    let (mut kernel, _log) = kernel();
    let waiter_pid = kernel.scheduler.spawn_process("waiter", noop_entry).unwrap();
    let parked = kernel.scheduler.process(waiter_pid).unwrap().threads()[0];
    kernel.scheduler.spawn_thread(waiter_pid, noop_entry).unwrap();
    kernel
        .scheduler
        .spawn_process("outsider", noop_entry)
        .unwrap();

    let mut state = CpuState::zeroed();
    tick(&mut kernel, &mut state);
    assert_eq!(kernel.scheduler.current_thread(), parked);

    // The waiter's first thread opens the endpoint and parks on it.
    let name = b"chan";
    let handle = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::CreateIpcEndpoint,
        &[name.as_ptr() as u64, name.len() as u64],
    );
    let mut buffer = [0u8; 16];
    syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::ReceiveIpcMessage,
        &[handle, buffer.as_mut_ptr() as u64, buffer.len() as u64],
    );
    assert_eq!(
        kernel.scheduler.thread_state(parked),
        Some(ThreadState::Waiting)
    );

    // Rotate to the outsider so it joins the endpoint before the
    // waiter process goes away.
    syscall(&mut kernel, &mut state, SyscallNumber::ThreadYield, &[]);
    let outsider_handle = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::CreateIpcEndpoint,
        &[name.as_ptr() as u64, name.len() as u64],
    );

    // Back to the waiter's sibling, which closes the whole process
    // while its first thread is still parked.
    syscall(&mut kernel, &mut state, SyscallNumber::ThreadYield, &[]);
    syscall(&mut kernel, &mut state, SyscallNumber::CloseProcess, &[]);
    tick(&mut kernel, &mut state);
    assert!(kernel.scheduler.process(waiter_pid).is_none());
    // The endpoint survives through the outsider's use.
    assert_eq!(kernel.resources.len(), 1);

    // The dead receiver must not swallow the payload: the send queues
    // it and the outsider's own receive drains it.
    let payload = b"hello";
    let sent = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::SendIpcMessage,
        &[
            outsider_handle,
            payload.as_ptr() as u64,
            payload.len() as u64,
        ],
    );
    assert_eq!(decode_result(sent), Ok(0));
    assert_eq!(buffer, [0u8; 16]);

    let mut received = [0u8; 16];
    let count = syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::ReceiveIpcMessage,
        &[
            outsider_handle,
            received.as_mut_ptr() as u64,
            received.len() as u64,
        ],
    );
    assert_eq!(decode_result(count), Ok(5));
    assert_eq!(&received[..5], b"hello");
}

#[test]
fn close_process_releases_every_resource() {
    let (mut kernel, _log) = kernel();
    let pid = kernel.scheduler.spawn_process("hoarder", noop_entry).unwrap();

    let mut state = CpuState::zeroed();
    tick(&mut kernel, &mut state);

    let name = b"junk";
    syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::CreateIpcEndpoint,
        &[name.as_ptr() as u64, name.len() as u64],
    );

    let mut region_base = 0u64;
    let shm_name = b"frame";
    syscall(
        &mut kernel,
        &mut state,
        SyscallNumber::CreateSharedMemory,
        &[
            shm_name.as_ptr() as u64,
            shm_name.len() as u64,
            128,
            core::ptr::addr_of_mut!(region_base) as u64,
        ],
    );
    assert_ne!(region_base, 0);

    let addr = syscall(&mut kernel, &mut state, SyscallNumber::AllocateMemory, &[256]);
    assert!(decode_result(addr).is_ok());
    assert_eq!(
        kernel.scheduler.process(pid).unwrap().allocation_count(),
        1
    );
    assert_eq!(kernel.resources.len(), 2);

    // CloseProcess stops the thread; the next tick reclaims and tears
    // down, releasing handles and allocations.
    syscall(&mut kernel, &mut state, SyscallNumber::CloseProcess, &[]);
    tick(&mut kernel, &mut state);

    assert!(kernel.scheduler.process(pid).is_none());
    assert!(kernel.resources.is_empty());
}

#[test]
fn thread_close_defers_reclamation_to_the_next_tick() {
    let (mut kernel, _log) = kernel();
    let pid = kernel.scheduler.spawn_process("mortal", noop_entry).unwrap();
    let a = kernel.scheduler.process(pid).unwrap().threads()[0];

    let mut state = CpuState::zeroed();
    tick(&mut kernel, &mut state);
    assert_eq!(kernel.scheduler.current_thread(), a);

    syscall(&mut kernel, &mut state, SyscallNumber::ThreadClose, &[]);
    // Stopped but not yet reclaimed; the stack is still in use.
    assert_eq!(kernel.scheduler.thread_state(a), Some(ThreadState::Stopped));
    assert_eq!(
        kernel.scheduler.current_thread(),
        kernel.scheduler.idle_thread()
    );

    tick(&mut kernel, &mut state);
    assert_eq!(kernel.scheduler.thread_state(a), None);
    assert!(kernel.scheduler.process(pid).is_none());
}
