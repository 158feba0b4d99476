// src/kernel/process/thread.rs

//! Threads: the schedulable unit
//!
//! A thread owns its stack and a saved [`CpuState`]. The saved state is
//! only meaningful while the thread is not running; the running thread's
//! registers live on the interrupt stack until the scheduler writes them
//! back here on the next preemption.

use alloc::vec::Vec;
use core::fmt;

use crate::arch::x86_64::cpu::CpuState;
use crate::errors::SpawnError;
use crate::kernel::process::ProcessId;

/// Default stack size for a new thread.
pub const DEFAULT_STACK_SIZE: usize = 0x10000;

/// Unique thread identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u64);

impl ThreadId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid#{}", self.0)
    }
}

/// Lifecycle state of a thread.
///
/// `Stopped` is terminal; the scheduler reclaims stopped threads on the
/// next timer tick and no transition ever leaves the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Created but not yet eligible for dispatch.
    New,
    /// Currently executing. At most one thread at a time.
    Running,
    /// Eligible for dispatch, waiting in the ready queue.
    Ready,
    /// Parked until a wake tick elapses.
    Sleeping,
    /// Parked on a resource (blocking IPC receive).
    Waiting,
    /// Terminated. Terminal state.
    Stopped,
}

impl ThreadState {
    /// Whether the thread still counts as live.
    #[must_use]
    pub const fn is_live(self) -> bool {
        !matches!(self, ThreadState::Stopped)
    }
}

/// A schedulable thread.
pub struct Thread {
    id: ThreadId,
    process: ProcessId,
    state: ThreadState,
    stack: Vec<u8>,
    /// Register snapshot to resume from; stale while `Running`.
    pub saved_state: CpuState,
    /// Timer ticks this thread has been preempted after.
    pub ticks_used: u64,
}

impl Thread {
    /// Create a thread primed to enter at `rip` with `rdi` as argument.
    ///
    /// Allocates the stack fallibly so exhaustion surfaces as a spawn
    /// error rather than an allocator abort.
    pub fn new(
        id: ThreadId,
        process: ProcessId,
        rip: u64,
        rdi: u64,
        stack_size: usize,
    ) -> Result<Self, SpawnError> {
        let mut stack = Vec::new();
        stack
            .try_reserve_exact(stack_size)
            .map_err(|_| SpawnError::OutOfMemory)?;
        stack.resize(stack_size, 0);

        let stack_top = stack.as_ptr() as u64 + stack_size as u64;

        Ok(Self {
            id,
            process,
            state: ThreadState::New,
            stack,
            saved_state: CpuState::primed(rip, rdi, stack_top),
            ticks_used: 0,
        })
    }

    /// The thread's id.
    #[must_use]
    pub const fn id(&self) -> ThreadId {
        self.id
    }

    /// The owning process.
    #[must_use]
    pub const fn process(&self) -> ProcessId {
        self.process
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ThreadState {
        self.state
    }

    /// Transition to a new state.
    ///
    /// `Stopped` is terminal; a transition out of it is a scheduler bug
    /// and trips a debug assertion.
    pub fn set_state(&mut self, state: ThreadState) {
        debug_assert!(
            self.state != ThreadState::Stopped || state == ThreadState::Stopped,
            "{} left the Stopped state",
            self.id
        );
        self.state = state;
    }

    /// Size of the owned stack region.
    #[must_use]
    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }
}
