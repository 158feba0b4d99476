// src/kernel/process/mod.rs

//! Processes: address-space-level grouping of threads
//!
//! A process owns its member threads, a table mapping opaque handles to
//! global resources, and a ledger of raw allocations made on its behalf.
//! When the last live thread stops, the scheduler tears the process down
//! in order: resource handles released, leftover allocations freed,
//! thread stacks dropped last.

pub mod thread;

pub use thread::{Thread, ThreadId, ThreadState, DEFAULT_STACK_SIZE};

use alloc::alloc::{alloc_zeroed, dealloc};
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::alloc::Layout;
use core::fmt;

use max_os_abi::{Handle, ResourceKind, SyscallError, MAX_ALLOC_SIZE};

use crate::kernel::resource::ResourceId;

/// Unique process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(u64);

impl ProcessId {
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

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid#{}", self.0)
    }
}

/// Per-process table mapping handles to global resources.
///
/// Handles are dense, start at [`Handle::FIRST`] and are never reused
/// within a process lifetime.
#[derive(Default)]
pub struct ResourceTable {
    next: Option<Handle>,
    entries: BTreeMap<Handle, (ResourceKind, ResourceId)>,
}

impl ResourceTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: Some(Handle::FIRST),
            entries: BTreeMap::new(),
        }
    }

    /// Bind a new handle to a resource.
    pub fn insert(&mut self, kind: ResourceKind, id: ResourceId) -> Handle {
        let handle = self.next.unwrap_or(Handle::FIRST);
        self.next = Some(handle.next());
        self.entries.insert(handle, (kind, id));
        handle
    }

    /// Resolve a handle, checking it names the expected resource kind.
    pub fn lookup(&self, handle: Handle, kind: ResourceKind) -> Result<ResourceId, SyscallError> {
        match self.entries.get(&handle) {
            Some((bound_kind, id)) if *bound_kind == kind => Ok(*id),
            Some(_) => Err(SyscallError::WrongResourceKind),
            None => Err(SyscallError::InvalidHandle),
        }
    }

    /// Drop a handle, returning what it was bound to.
    pub fn remove(&mut self, handle: Handle) -> Result<(ResourceKind, ResourceId), SyscallError> {
        self.entries
            .remove(&handle)
            .ok_or(SyscallError::InvalidHandle)
    }

    /// Remove and return every binding, for process teardown.
    pub fn drain(&mut self) -> Vec<(ResourceKind, ResourceId)> {
        let entries = core::mem::take(&mut self.entries);
        entries.into_values().collect()
    }

    /// Number of live handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table holds no handles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A process: thread membership, handles, allocations.
pub struct Process {
    id: ProcessId,
    name: String,
    threads: Vec<ThreadId>,
    resources: ResourceTable,
    allocations: BTreeMap<u64, Layout>,
}

impl Process {
    /// Create an empty process.
    pub fn new(id: ProcessId, name: &str) -> Self {
        Self {
            id,
            name: String::from(name),
            threads: Vec::new(),
            resources: ResourceTable::new(),
            allocations: BTreeMap::new(),
        }
    }

    /// The process id.
    #[must_use]
    pub const fn id(&self) -> ProcessId {
        self.id
    }

    /// The process name, for log lines.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Member thread ids, including stopped ones not yet reclaimed.
    #[must_use]
    pub fn threads(&self) -> &[ThreadId] {
        &self.threads
    }

    /// Record a new member thread.
    pub fn add_thread(&mut self, thread: ThreadId) {
        self.threads.push(thread);
    }

    /// Forget a reclaimed member thread.
    pub fn remove_thread(&mut self, thread: ThreadId) {
        self.threads.retain(|&t| t != thread);
    }

    /// The process's handle table.
    #[must_use]
    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    /// The process's handle table, mutably.
    pub fn resources_mut(&mut self) -> &mut ResourceTable {
        &mut self.resources
    }

    /// Serve an `AllocateMemory` request from the kernel heap.
    ///
    /// The allocation is recorded in the process ledger so it can be
    /// validated on free and reclaimed at teardown.
    pub fn allocate(&mut self, size: u64) -> Result<u64, SyscallError> {
        if size == 0 || size > MAX_ALLOC_SIZE as u64 {
            return Err(SyscallError::InvalidArgument);
        }
        let layout =
            Layout::from_size_align(size as usize, 16).map_err(|_| SyscallError::InvalidArgument)?;

        // SAFETY: the layout is non-zero and well-formed.
        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(SyscallError::OutOfMemory);
        }

        let addr = ptr as u64;
        self.allocations.insert(addr, layout);
        Ok(addr)
    }

    /// Serve a `FreeMemory` request.
    ///
    /// Only addresses this process allocated are accepted.
    pub fn free(&mut self, addr: u64) -> Result<(), SyscallError> {
        let layout = self
            .allocations
            .remove(&addr)
            .ok_or(SyscallError::InvalidArgument)?;
        // SAFETY: the ledger guarantees addr/layout came from
        // alloc_zeroed and has not been freed yet.
        unsafe {
            dealloc(addr as *mut u8, layout);
        }
        Ok(())
    }

    /// Free every allocation still in the ledger, for teardown.
    pub fn release_allocations(&mut self) {
        let allocations = core::mem::take(&mut self.allocations);
        for (addr, layout) in allocations {
            // SAFETY: same provenance argument as `free`.
            unsafe {
                dealloc(addr as *mut u8, layout);
            }
        }
    }

    /// Number of outstanding raw allocations.
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.allocations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_start_at_one_and_increment() {
        let mut table = ResourceTable::new();
        let a = table.insert(ResourceKind::SharedMemory, ResourceId::new(10));
        let b = table.insert(ResourceKind::MessageEndpoint, ResourceId::new(11));
        assert_eq!(a.as_u64(), 1);
        assert_eq!(b.as_u64(), 2);

        assert_eq!(
            table.lookup(a, ResourceKind::SharedMemory),
            Ok(ResourceId::new(10))
        );
        assert_eq!(
            table.lookup(a, ResourceKind::MessageEndpoint),
            Err(SyscallError::WrongResourceKind)
        );
        assert_eq!(
            table.lookup(Handle::new(99), ResourceKind::SharedMemory),
            Err(SyscallError::InvalidHandle)
        );
    }

    #[test]
    fn allocation_ledger_rejects_foreign_frees() {
        let mut process = Process::new(ProcessId::new(1), "ledger");
        let addr = process.allocate(128).unwrap();
        assert_ne!(addr, 0);
        assert_eq!(process.allocation_count(), 1);

        assert_eq!(process.free(addr + 8), Err(SyscallError::InvalidArgument));
        assert_eq!(process.free(addr), Ok(()));
        assert_eq!(process.free(addr), Err(SyscallError::InvalidArgument));
        assert_eq!(process.allocation_count(), 0);
    }

    #[test]
    fn oversized_allocations_are_rejected() {
        let mut process = Process::new(ProcessId::new(2), "big");
        assert_eq!(process.allocate(0), Err(SyscallError::InvalidArgument));
        assert_eq!(
            process.allocate(MAX_ALLOC_SIZE as u64 + 1),
            Err(SyscallError::InvalidArgument)
        );
    }

    #[test]
    fn teardown_frees_the_ledger() {
        let mut process = Process::new(ProcessId::new(3), "teardown");
        process.allocate(64).unwrap();
        process.allocate(64).unwrap();
        assert_eq!(process.allocation_count(), 2);
        process.release_allocations();
        assert_eq!(process.allocation_count(), 0);
    }
}
