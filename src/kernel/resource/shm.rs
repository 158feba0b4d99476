// src/kernel/resource/shm.rs

//! Named shared memory regions
//!
//! A region is a zero-initialised kernel buffer published under a name.
//! Processes map it by handle; on this uniprocessor core the "mapping"
//! is simply the region's base address, exported through the create/open
//! syscalls.

use alloc::string::String;
use alloc::vec::Vec;

use max_os_abi::SyscallError;

/// A named, fixed-size, zero-filled memory region.
#[derive(Debug)]
pub struct SharedMemoryRegion {
    name: String,
    buffer: Vec<u8>,
}

impl SharedMemoryRegion {
    /// Allocate a zeroed region of `size` bytes.
    pub fn new(name: &str, size: u64) -> Result<Self, SyscallError> {
        if size == 0 || size > max_os_abi::MAX_ALLOC_SIZE as u64 {
            return Err(SyscallError::InvalidArgument);
        }
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(size as usize)
            .map_err(|_| SyscallError::OutOfMemory)?;
        buffer.resize(size as usize, 0);
        Ok(Self {
            name: String::from(name),
            buffer,
        })
    }

    /// The published name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base address of the backing buffer.
    #[must_use]
    pub fn base(&self) -> u64 {
        self.buffer.as_ptr() as u64
    }

    /// Size of the region in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.buffer.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_are_zeroed_and_addressable() {
        let region = SharedMemoryRegion::new("frame", 256).unwrap();
        assert_eq!(region.size(), 256);
        assert_ne!(region.base(), 0);
        assert!(region.buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn zero_sized_regions_are_rejected() {
        assert_eq!(
            SharedMemoryRegion::new("empty", 0).unwrap_err(),
            SyscallError::InvalidArgument
        );
    }

    #[test]
    fn size_limit_is_inclusive() {
        let max = max_os_abi::MAX_ALLOC_SIZE as u64;
        let region = SharedMemoryRegion::new("huge", max).unwrap();
        assert_eq!(region.size(), max);
        assert_eq!(
            SharedMemoryRegion::new("too-big", max + 1).unwrap_err(),
            SyscallError::InvalidArgument
        );
    }
}
