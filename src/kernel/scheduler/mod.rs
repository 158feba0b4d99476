// src/kernel/scheduler/mod.rs

//! The preemptive round-robin scheduler
//!
//! Registered as the interrupt handler for the timer vector and the
//! voluntary-yield vector. On every timer tick it advances the tick
//! counter, wakes due sleepers, reclaims stopped threads, then performs
//! the mechanical switch: the interrupted thread's register snapshot is
//! saved into its slot and the next ready thread's snapshot is written
//! over the in-stack state the entry stub will restore.
//!
//! Ready threads rotate FIFO. Sleepers wait in a heap ordered by wake
//! tick, so the per-tick wake scan touches only the threads that are
//! actually due. When nothing is ready the idle thread runs; it halts
//! the CPU until the next interrupt and is never queued, so selection
//! can never fail.

use alloc::collections::{BTreeMap, BinaryHeap, VecDeque};
use alloc::vec::Vec;
use core::cmp::Reverse;

use max_os_abi::encode_result;

use crate::arch::x86_64::cpu::CpuState;
use crate::arch::{ArchCpu, Cpu};
use crate::debug_println;
use crate::errors::SpawnError;
use crate::kernel::process::{Process, ProcessId, Thread, ThreadId, ThreadState};
use crate::kernel::resource::{GlobalRegistry, Wakeup};
use crate::kernel::Kernel;

/// A thread entry point.
pub type ThreadEntry = extern "C" fn();

/// One parked sleeper, ordered by wake tick (ties by thread id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct SleepEntry {
    wake_tick: u64,
    thread: ThreadId,
}

/// The scheduler state: all threads and processes, the ready queue, the
/// sleep heap and the tick counter.
pub struct Scheduler {
    threads: BTreeMap<ThreadId, Thread>,
    processes: BTreeMap<ProcessId, Process>,
    ready: VecDeque<ThreadId>,
    sleeping: BinaryHeap<Reverse<SleepEntry>>,
    current: ThreadId,
    idle_thread: ThreadId,
    idle_process: ProcessId,
    ticks: u64,
    next_tid: u64,
    next_pid: u64,
    stack_size: usize,
}

impl Scheduler {
    /// Build a scheduler with its idle thread already in place.
    ///
    /// The idle thread is the current thread at boot: the first timer
    /// tick saves the boot context into its slot and dispatches the
    /// first real thread.
    pub fn new(stack_size: usize) -> Result<Self, SpawnError> {
        let mut scheduler = Self {
            threads: BTreeMap::new(),
            processes: BTreeMap::new(),
            ready: VecDeque::new(),
            sleeping: BinaryHeap::new(),
            current: ThreadId::new(0),
            idle_thread: ThreadId::new(0),
            idle_process: ProcessId::new(0),
            ticks: 0,
            next_tid: 1,
            next_pid: 1,
            stack_size,
        };

        let pid = scheduler.alloc_pid();
        let mut process = Process::new(pid, "idle");
        let tid = scheduler.alloc_tid();
        let mut idle = Thread::new(
            tid,
            pid,
            thread_entry_trampoline as usize as u64,
            idle_main as usize as u64,
            stack_size,
        )?;
        // Idle stands in for the boot context until the first switch.
        idle.set_state(ThreadState::Running);
        process.add_thread(tid);

        scheduler.threads.insert(tid, idle);
        scheduler.processes.insert(pid, process);
        scheduler.current = tid;
        scheduler.idle_thread = tid;
        scheduler.idle_process = pid;
        Ok(scheduler)
    }

    fn alloc_tid(&mut self) -> ThreadId {
        let tid = ThreadId::new(self.next_tid);
        self.next_tid += 1;
        tid
    }

    fn alloc_pid(&mut self) -> ProcessId {
        let pid = ProcessId::new(self.next_pid);
        self.next_pid += 1;
        pid
    }

    /// Create a process with one initial thread.
    pub fn spawn_process(&mut self, name: &str, entry: ThreadEntry) -> Result<ProcessId, SpawnError> {
        let pid = self.alloc_pid();
        self.processes.insert(pid, Process::new(pid, name));
        match self.spawn_thread(pid, entry) {
            Ok(_) => {
                debug_println!("[sched] spawned {} ({name})", pid);
                Ok(pid)
            }
            Err(err) => {
                self.processes.remove(&pid);
                Err(err)
            }
        }
    }

    /// Add a thread to an existing process.
    ///
    /// The thread is primed onto a fresh stack and enqueued ready, so
    /// the next free tick can dispatch it.
    pub fn spawn_thread(&mut self, pid: ProcessId, entry: ThreadEntry) -> Result<ThreadId, SpawnError> {
        if !self.processes.contains_key(&pid) {
            return Err(SpawnError::NoSuchProcess);
        }

        let tid = self.alloc_tid();
        let mut thread = Thread::new(
            tid,
            pid,
            thread_entry_trampoline as usize as u64,
            entry as usize as u64,
            self.stack_size,
        )?;
        thread.set_state(ThreadState::Ready);

        self.threads.insert(tid, thread);
        self.ready.push_back(tid);
        if let Some(process) = self.processes.get_mut(&pid) {
            process.add_thread(tid);
        }
        Ok(tid)
    }

    /// The thread currently holding the CPU.
    #[must_use]
    pub const fn current_thread(&self) -> ThreadId {
        self.current
    }

    /// The process owning the current thread.
    #[must_use]
    pub fn current_process(&self) -> ProcessId {
        self.threads
            .get(&self.current)
            .map_or(self.idle_process, Thread::process)
    }

    /// The always-dispatchable idle thread.
    #[must_use]
    pub const fn idle_thread(&self) -> ThreadId {
        self.idle_thread
    }

    /// Monotone tick counter; advanced only by the timer vector.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Lifecycle state of a thread, if it has not been reclaimed.
    #[must_use]
    pub fn thread_state(&self, tid: ThreadId) -> Option<ThreadState> {
        self.threads.get(&tid).map(Thread::state)
    }

    /// A process, if it has not been torn down.
    #[must_use]
    pub fn process(&self, pid: ProcessId) -> Option<&Process> {
        self.processes.get(&pid)
    }

    /// A process, mutably.
    pub fn process_mut(&mut self, pid: ProcessId) -> Option<&mut Process> {
        self.processes.get_mut(&pid)
    }

    /// Number of live (non-stopped) threads, idle included.
    #[must_use]
    pub fn live_thread_count(&self) -> usize {
        self.threads
            .values()
            .filter(|t| t.state().is_live())
            .count()
    }

    /// Number of threads currently marked running.
    #[must_use]
    pub fn running_thread_count(&self) -> usize {
        self.threads
            .values()
            .filter(|t| t.state() == ThreadState::Running)
            .count()
    }

    /// Park the current thread until `ticks` timer ticks have elapsed.
    ///
    /// The thread becomes ready again on the first tick strictly after
    /// its wake tick: sleep(5) at tick 0 is eligible at tick 6.
    pub fn sleep_current(&mut self, ticks: u64) {
        let tid = self.current;
        if tid == self.idle_thread {
            return;
        }
        if let Some(thread) = self.threads.get_mut(&tid) {
            thread.set_state(ThreadState::Sleeping);
            self.sleeping.push(Reverse(SleepEntry {
                // Saturates for absurd durations: a wake tick the counter
                // never reaches is simply an unbounded sleep.
                wake_tick: self.ticks.saturating_add(ticks),
                thread: tid,
            }));
        }
    }

    /// Park the current thread waiting on a resource.
    ///
    /// Whoever completes the wait supplies a [`Wakeup`] carrying the
    /// deferred syscall result.
    pub fn block_current(&mut self) {
        let tid = self.current;
        if tid == self.idle_thread {
            return;
        }
        if let Some(thread) = self.threads.get_mut(&tid) {
            thread.set_state(ThreadState::Waiting);
        }
    }

    /// Mark the current thread stopped; reclamation happens on the next
    /// timer tick (a thread cannot reclaim the stack it runs on).
    pub fn stop_current(&mut self) {
        self.stop_thread(self.current);
    }

    /// Mark a thread stopped.
    pub fn stop_thread(&mut self, tid: ThreadId) {
        if tid == self.idle_thread {
            return;
        }
        if let Some(thread) = self.threads.get_mut(&tid) {
            if thread.state().is_live() {
                thread.set_state(ThreadState::Stopped);
            }
        }
    }

    /// Mark every thread of a process stopped.
    pub fn stop_process(&mut self, pid: ProcessId) {
        if pid == self.idle_process {
            return;
        }
        let members: Vec<ThreadId> = self
            .processes
            .get(&pid)
            .map(|p| p.threads().to_vec())
            .unwrap_or_default();
        for tid in members {
            self.stop_thread(tid);
        }
    }

    /// Deliver deferred results to parked threads and make them ready.
    pub fn apply_wakeups(&mut self, wakeups: Vec<Wakeup>) {
        for wakeup in wakeups {
            if let Some(thread) = self.threads.get_mut(&wakeup.thread) {
                if thread.state() == ThreadState::Waiting {
                    thread.saved_state.rax = encode_result(wakeup.result);
                    thread.set_state(ThreadState::Ready);
                    self.ready.push_back(wakeup.thread);
                }
            }
        }
    }

    /// Whether the dispatch path must fall through to a reschedule
    /// because the current thread gave up the CPU mid-interrupt.
    #[must_use]
    pub fn current_left_running(&self) -> bool {
        self.thread_state(self.current) != Some(ThreadState::Running)
    }

    /// Timer-tick bookkeeping: advance time, wake due sleepers, reclaim
    /// stopped threads and tear down empty processes.
    pub fn on_tick(&mut self, resources: &mut GlobalRegistry) {
        self.ticks += 1;
        if let Some(thread) = self.threads.get_mut(&self.current) {
            thread.ticks_used += 1;
        }
        self.wake_due_sleepers();
        self.reclaim_stopped(resources);
    }

    /// Save the interrupted thread, pick the next ready one, and write
    /// its snapshot over the in-stack state.
    pub fn reschedule(&mut self, state: &mut CpuState) {
        let current = self.current;
        if let Some(thread) = self.threads.get_mut(&current) {
            thread.saved_state = *state;
            if thread.state() == ThreadState::Running {
                thread.set_state(ThreadState::Ready);
                if current != self.idle_thread {
                    self.ready.push_back(current);
                }
            }
        }

        let next = self.pop_ready().unwrap_or(self.idle_thread);
        let Some(thread) = self.threads.get_mut(&next) else {
            // The idle thread is created at construction and never
            // reclaimed, so this cannot happen.
            debug_assert!(false, "selected thread {next} has no slot");
            return;
        };
        thread.set_state(ThreadState::Running);
        *state = thread.saved_state;
        self.current = next;
    }

    /// Pop the first id in the ready queue that still names a ready
    /// thread, skipping entries gone stale through a stop.
    fn pop_ready(&mut self) -> Option<ThreadId> {
        while let Some(tid) = self.ready.pop_front() {
            if self.thread_state(tid) == Some(ThreadState::Ready) {
                return Some(tid);
            }
        }
        None
    }

    fn wake_due_sleepers(&mut self) {
        while let Some(Reverse(entry)) = self.sleeping.peek().copied() {
            if entry.wake_tick >= self.ticks {
                break;
            }
            self.sleeping.pop();
            if let Some(thread) = self.threads.get_mut(&entry.thread) {
                if thread.state() == ThreadState::Sleeping {
                    thread.set_state(ThreadState::Ready);
                    self.ready.push_back(entry.thread);
                }
            }
        }
    }

    fn reclaim_stopped(&mut self, resources: &mut GlobalRegistry) {
        let stopped: Vec<ThreadId> = self
            .threads
            .values()
            .filter(|t| t.state() == ThreadState::Stopped)
            .map(Thread::id)
            .collect();
        if stopped.is_empty() {
            return;
        }

        // A thread stopped while parked on an endpoint must be forgotten
        // there before its stack goes away; a later send popping its
        // entry would write into freed memory.
        resources.purge_receivers(&stopped);

        for tid in stopped {
            if let Some(thread) = self.threads.remove(&tid) {
                if let Some(process) = self.processes.get_mut(&thread.process()) {
                    process.remove_thread(tid);
                }
            }
        }

        let empty: Vec<ProcessId> = self
            .processes
            .values()
            .filter(|p| p.threads().is_empty())
            .map(Process::id)
            .collect();

        let mut wakeups = Vec::new();
        for pid in empty {
            if pid == self.idle_process {
                continue;
            }
            if let Some(mut process) = self.processes.remove(&pid) {
                debug_println!("[sched] tearing down {} ({})", pid, process.name());
                for (_, rid) in process.resources_mut().drain() {
                    wakeups.extend(resources.release(rid));
                }
                process.release_allocations();
            }
        }
        self.apply_wakeups(wakeups);
    }
}

/// Timer interrupt handler: one tick of bookkeeping, then a switch.
pub fn handle_timer(kernel: &mut Kernel, state: &mut CpuState) {
    let Kernel {
        scheduler,
        resources,
        ..
    } = kernel;
    scheduler.on_tick(resources);
    scheduler.reschedule(state);
}

/// Voluntary-yield handler: a switch without a tick, so cooperative
/// threads cannot distort sleep arithmetic.
pub fn handle_yield(kernel: &mut Kernel, state: &mut CpuState) {
    kernel.scheduler.reschedule(state);
}

/// First code a new thread runs: call its entry function, then retire
/// the thread if the entry ever returns.
pub extern "C" fn thread_entry_trampoline(entry: ThreadEntry) -> ! {
    entry();
    // SAFETY: int 0x80 with a valid syscall number; the kernel never
    // resumes this thread after ThreadClose.
    unsafe {
        crate::arch::x86_64::syscall::syscall0(max_os_abi::SyscallNumber::ThreadClose.as_u64());
    }
    // Only reachable in the window before the close is processed.
    loop {
        ArchCpu::halt();
    }
}

/// Body of the idle thread: wait for the next interrupt instead of
/// spinning through the tick budget.
extern "C" fn idle_main() {
    loop {
        ArchCpu::halt();
    }
}
