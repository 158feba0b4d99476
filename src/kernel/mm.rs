// src/kernel/mm.rs

//! Kernel heap
//!
//! A spin-locked wrapper around `linked_list_allocator` with usage
//! statistics and a single-initialization guard. The bare-metal binary
//! registers an instance as the global allocator and feeds it a static
//! region at boot; host tests run on the host allocator and never touch
//! this.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, Ordering};

use linked_list_allocator::Heap;
use spin::Mutex;

use crate::errors::{InitError, KernelResult};

/// Snapshot of heap usage.
#[derive(Debug, Clone, Copy)]
pub struct HeapStats {
    /// Bytes currently handed out.
    pub used: usize,
    /// Bytes still available.
    pub free: usize,
    /// Allocations served since boot.
    pub allocation_count: usize,
    /// Deallocations served since boot.
    pub deallocation_count: usize,
}

/// Spin-locked kernel heap.
pub struct LockedHeap {
    heap: Mutex<Heap>,
    initialized: AtomicBool,
    allocations: Mutex<Counters>,
}

#[derive(Default)]
struct Counters {
    allocs: usize,
    deallocs: usize,
}

impl Default for LockedHeap {
    fn default() -> Self {
        Self::empty()
    }
}

impl LockedHeap {
    /// An uninitialized heap; every allocation fails until [`Self::init`].
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            heap: Mutex::new(Heap::empty()),
            initialized: AtomicBool::new(false),
            allocations: Mutex::new(Counters {
                allocs: 0,
                deallocs: 0,
            }),
        }
    }

    /// Whether [`Self::init`] has run.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Hand the heap its backing region.
    ///
    /// # Safety
    ///
    /// `start..start + size` must be valid, unused memory that outlives
    /// the heap.
    ///
    /// # Errors
    ///
    /// Fails with `InitError::AlreadyInitialized` on a second call and
    /// `InitError::RegionTooSmall` when the region cannot hold the
    /// allocator's bookkeeping.
    pub unsafe fn init(&self, start: *mut u8, size: usize) -> KernelResult<()> {
        if size < 128 {
            return Err(InitError::RegionTooSmall.into());
        }
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(InitError::AlreadyInitialized.into());
        }
        unsafe {
            self.heap.lock().init(start, size);
        }
        Ok(())
    }

    /// Current usage statistics.
    pub fn stats(&self) -> HeapStats {
        let heap = self.heap.lock();
        let counters = self.allocations.lock();
        HeapStats {
            used: heap.used(),
            free: heap.free(),
            allocation_count: counters.allocs,
            deallocation_count: counters.deallocs,
        }
    }
}

unsafe impl GlobalAlloc for LockedHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let result = self.heap.lock().allocate_first_fit(layout);
        match result {
            Ok(block) => {
                self.allocations.lock().allocs += 1;
                block.as_ptr()
            }
            Err(()) => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let Some(block) = NonNull::new(ptr) else {
            return;
        };
        self.allocations.lock().deallocs += 1;
        unsafe {
            self.heap.lock().deallocate(block, layout);
        }
    }
}
