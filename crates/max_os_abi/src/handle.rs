// max_os_abi/src/handle.rs
//! Opaque resource handles
//!
//! A handle names a kernel resource within one process's handle table.
//! Handles are dense `u64` values starting at [`Handle::FIRST`]; zero is
//! reserved so it can stand for "no handle" on the wire.

use core::fmt;

/// A process-local name for a kernel resource.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u64);

impl Handle {
    /// The first handle a process ever receives.
    pub const FIRST: Handle = Handle(1);

    /// Wrap a raw handle value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw wire value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether the value can name a resource at all.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// The handle after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle#{}", self.0)
    }
}

/// The kinds of resource a handle can refer to.
///
/// The original surface also named filesystem, process and thread
/// resources; only the two the scheduler core serves are defined here.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    /// A named shared memory region.
    SharedMemory = 0,
    /// A named IPC message endpoint.
    MessageEndpoint = 1,
}

impl ResourceKind {
    /// Short name for log lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SharedMemory => "shared-memory",
            Self::MessageEndpoint => "message-endpoint",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_never_valid() {
        assert!(!Handle::new(0).is_valid());
        assert!(Handle::FIRST.is_valid());
        assert_eq!(Handle::FIRST.next().as_u64(), 2);
    }

    // Kinds key ordered registry maps, so they must sort.
    #[test]
    fn kinds_order_by_discriminant() {
        assert!(ResourceKind::SharedMemory < ResourceKind::MessageEndpoint);
        let mut kinds = [ResourceKind::MessageEndpoint, ResourceKind::SharedMemory];
        kinds.sort();
        assert_eq!(kinds[0], ResourceKind::SharedMemory);
    }
}
