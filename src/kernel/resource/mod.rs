// src/kernel/resource/mod.rs

//! Global resource registry
//!
//! Named kernel resources (shared memory regions, IPC endpoints) live
//! here, keyed by a global [`ResourceId`] and reference-counted by use.
//! Processes never hold resources directly: their handle tables map to
//! ids in this registry, and releasing the last use destroys the
//! resource. Destroying an endpoint can wake parked receivers; those
//! wakeups are returned to the caller for the scheduler to apply, since
//! the registry knows nothing about thread state.

pub mod endpoint;
pub mod shm;

pub use endpoint::{MessageEndpoint, SendOutcome};
pub use shm::SharedMemoryRegion;

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use max_os_abi::{ResourceKind, SyscallError};

use crate::kernel::process::ThreadId;

/// Global identifier of a registered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(u64);

impl ResourceId {
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

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rid#{}", self.0)
    }
}

/// A deferred syscall result for a thread parked on a resource.
///
/// Produced by registry/endpoint operations, applied by the scheduler:
/// the encoded result lands in the parked thread's saved `rax` and the
/// thread becomes ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wakeup {
    /// The thread to unpark.
    pub thread: ThreadId,
    /// The result its blocked syscall resumes with.
    pub result: Result<u64, SyscallError>,
}

enum Resource {
    SharedMemory(SharedMemoryRegion),
    Endpoint(MessageEndpoint),
}

impl Resource {
    const fn kind(&self) -> ResourceKind {
        match self {
            Resource::SharedMemory(_) => ResourceKind::SharedMemory,
            Resource::Endpoint(_) => ResourceKind::MessageEndpoint,
        }
    }

    fn name(&self) -> &str {
        match self {
            Resource::SharedMemory(region) => region.name(),
            Resource::Endpoint(endpoint) => endpoint.name(),
        }
    }
}

struct Entry {
    resource: Resource,
    use_count: u64,
}

/// The kernel-wide registry of named resources.
#[derive(Default)]
pub struct GlobalRegistry {
    next_id: u64,
    entries: BTreeMap<ResourceId, Entry>,
    names: BTreeMap<(ResourceKind, String), ResourceId>,
}

impl GlobalRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: BTreeMap::new(),
            names: BTreeMap::new(),
        }
    }

    fn register(&mut self, resource: Resource) -> ResourceId {
        let id = ResourceId::new(self.next_id);
        self.next_id += 1;
        self.names
            .insert((resource.kind(), String::from(resource.name())), id);
        self.entries.insert(
            id,
            Entry {
                resource,
                use_count: 1,
            },
        );
        id
    }

    /// Create a named shared memory region.
    ///
    /// Fails with `AlreadyExists` when the name is taken. Returns the id
    /// and the region's base address.
    pub fn create_shared_memory(
        &mut self,
        name: &str,
        size: u64,
    ) -> Result<(ResourceId, u64), SyscallError> {
        if self.find(ResourceKind::SharedMemory, name).is_some() {
            return Err(SyscallError::AlreadyExists);
        }
        let region = SharedMemoryRegion::new(name, size)?;
        let base = region.base();
        let id = self.register(Resource::SharedMemory(region));
        Ok((id, base))
    }

    /// Open an existing shared memory region, bumping its use count.
    ///
    /// Returns the id and base address, or `NotFound`.
    pub fn open_shared_memory(&mut self, name: &str) -> Result<(ResourceId, u64), SyscallError> {
        let id = self
            .find(ResourceKind::SharedMemory, name)
            .ok_or(SyscallError::NotFound)?;
        let entry = self.entry_mut(id)?;
        entry.use_count += 1;
        match &entry.resource {
            Resource::SharedMemory(region) => Ok((id, region.base())),
            Resource::Endpoint(_) => Err(SyscallError::WrongResourceKind),
        }
    }

    /// Create a named endpoint, or open it if it already exists.
    ///
    /// The create syscall folds create-and-open: first use creates the
    /// channel, later uses join it.
    pub fn create_or_open_endpoint(&mut self, name: &str) -> Result<ResourceId, SyscallError> {
        if let Some(id) = self.find(ResourceKind::MessageEndpoint, name) {
            self.entry_mut(id)?.use_count += 1;
            return Ok(id);
        }
        Ok(self.register(Resource::Endpoint(MessageEndpoint::new(name))))
    }

    /// Access an endpoint by id.
    pub fn endpoint_mut(&mut self, id: ResourceId) -> Result<&mut MessageEndpoint, SyscallError> {
        match self.entries.get_mut(&id) {
            Some(Entry {
                resource: Resource::Endpoint(endpoint),
                ..
            }) => Ok(endpoint),
            Some(_) => Err(SyscallError::WrongResourceKind),
            None => Err(SyscallError::InvalidHandle),
        }
    }

    /// Forget parked receivers belonging to reclaimed threads.
    ///
    /// A thread stopped while parked leaves its entry behind; the entry
    /// points into a stack about to be freed, so it must go before any
    /// further send can pop it.
    pub fn purge_receivers(&mut self, dead: &[ThreadId]) {
        for entry in self.entries.values_mut() {
            if let Resource::Endpoint(endpoint) = &mut entry.resource {
                endpoint.purge_receivers(dead);
            }
        }
    }

    /// Drop one use of a resource.
    ///
    /// When the use count reaches zero the resource is destroyed; for an
    /// endpoint that fails every parked receiver with `EndpointClosed`,
    /// and those wakeups are returned for the scheduler to apply.
    pub fn release(&mut self, id: ResourceId) -> Vec<Wakeup> {
        let Some(entry) = self.entries.get_mut(&id) else {
            return Vec::new();
        };

        entry.use_count -= 1;
        if entry.use_count > 0 {
            return Vec::new();
        }

        let Some(mut entry) = self.entries.remove(&id) else {
            return Vec::new();
        };
        self.names
            .remove(&(entry.resource.kind(), String::from(entry.resource.name())));

        match &mut entry.resource {
            Resource::Endpoint(endpoint) => endpoint.close(),
            Resource::SharedMemory(_) => Vec::new(),
        }
    }

    /// Current use count of a resource, for diagnostics and tests.
    #[must_use]
    pub fn use_count(&self, id: ResourceId) -> Option<u64> {
        self.entries.get(&id).map(|entry| entry.use_count)
    }

    /// Number of live resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, kind: ResourceKind, name: &str) -> Option<ResourceId> {
        self.names.get(&(kind, String::from(name))).copied()
    }

    fn entry_mut(&mut self, id: ResourceId) -> Result<&mut Entry, SyscallError> {
        self.entries.get_mut(&id).ok_or(SyscallError::InvalidHandle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_memory_names_are_unique() {
        let mut registry = GlobalRegistry::new();
        let (id, base) = registry.create_shared_memory("vram", 128).unwrap();
        assert_ne!(base, 0);
        assert_eq!(
            registry.create_shared_memory("vram", 64).unwrap_err(),
            SyscallError::AlreadyExists
        );

        let (opened, opened_base) = registry.open_shared_memory("vram").unwrap();
        assert_eq!(opened, id);
        assert_eq!(opened_base, base);
        assert_eq!(registry.use_count(id), Some(2));

        assert_eq!(
            registry.open_shared_memory("missing").unwrap_err(),
            SyscallError::NotFound
        );
    }

    #[test]
    fn endpoint_create_folds_open() {
        let mut registry = GlobalRegistry::new();
        let first = registry.create_or_open_endpoint("chat").unwrap();
        let second = registry.create_or_open_endpoint("chat").unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.use_count(first), Some(2));
    }

    #[test]
    fn last_release_destroys_and_wakes() {
        let mut registry = GlobalRegistry::new();
        let id = registry.create_or_open_endpoint("doomed").unwrap();
        registry.create_or_open_endpoint("doomed").unwrap();

        registry
            .endpoint_mut(id)
            .unwrap()
            .park_receiver(ThreadId::new(3), 0, 0);

        assert!(registry.release(id).is_empty());
        let wakeups = registry.release(id);
        assert_eq!(wakeups.len(), 1);
        assert_eq!(wakeups[0].thread, ThreadId::new(3));
        assert_eq!(wakeups[0].result, Err(SyscallError::EndpointClosed));
        assert!(registry.is_empty());

        // The name is free again after destruction.
        let reborn = registry.create_or_open_endpoint("doomed").unwrap();
        assert_ne!(reborn, id);
    }

    #[test]
    fn kind_mismatch_is_detected() {
        let mut registry = GlobalRegistry::new();
        let (id, _) = registry.create_shared_memory("region", 64).unwrap();
        assert_eq!(
            registry.endpoint_mut(id).unwrap_err(),
            SyscallError::WrongResourceKind
        );
    }
}
