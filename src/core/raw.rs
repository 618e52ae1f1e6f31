//! System heap wrapper.
//!
//! The OS allocator is an external collaborator; everything guardheap
//! needs from it is a 16-aligned allocate/free pair with byte accounting.

use std::alloc::{alloc, dealloc, Layout};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::block::BLOCK_ALIGN;

/// Wrapper around the system allocator for whole block regions.
pub(crate) struct SystemHeap {
    /// Total bytes currently allocated
    allocated_bytes: AtomicUsize,

    /// Total allocation count
    allocation_count: AtomicUsize,
}

impl SystemHeap {
    pub fn new() -> Self {
        Self {
            allocated_bytes: AtomicUsize::new(0),
            allocation_count: AtomicUsize::new(0),
        }
    }

    /// Allocate `size` bytes aligned to [`BLOCK_ALIGN`]. Null on
    /// exhaustion; the caller decides how fatal that is.
    pub fn alloc(&self, size: usize) -> *mut u8 {
        let Ok(layout) = Layout::from_size_align(size.max(1), BLOCK_ALIGN) else {
            return std::ptr::null_mut();
        };

        // SAFETY: layout has nonzero size
        let ptr = unsafe { alloc(layout) };

        if !ptr.is_null() {
            self.allocated_bytes.fetch_add(size, Ordering::Relaxed);
            self.allocation_count.fetch_add(1, Ordering::Relaxed);
        }

        ptr
    }

    /// Release a region previously obtained from [`SystemHeap::alloc`].
    ///
    /// # Safety
    ///
    /// `ptr` must have been allocated by this heap with the same `size`.
    pub unsafe fn dealloc(&self, ptr: *mut u8, size: usize) {
        let layout = Layout::from_size_align_unchecked(size.max(1), BLOCK_ALIGN);
        dealloc(ptr, layout);
        self.allocated_bytes.fetch_sub(size, Ordering::Relaxed);
    }

    /// Get total bytes currently allocated.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated_bytes.load(Ordering::Relaxed)
    }

    /// Get total allocation count.
    pub fn allocation_count(&self) -> usize {
        self.allocation_count.load(Ordering::Relaxed)
    }
}
