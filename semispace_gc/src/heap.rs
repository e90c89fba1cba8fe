//! Heap - GC-managed memory with bump allocation and copying collection
//!
//! Design:
//! - One zeroed region, rounded up to the page size, split into two equal semispaces
//! - New objects are bump allocated in the active semispace
//! - When the active semispace is exhausted a full collection copies the live objects into the
//!   other semispace, and the allocation is retried exactly once
//!
//! The runtime provides:
//! - `ObjectModel::object_size` - size of an object from its header
//! - `ObjectModel::trace_object` - trace pointers within an object
//! - `ObjectModel::visit_roots` - enumerate roots held outside of handle scopes

use std::alloc::{self, Layout};

use core::ptr::NonNull;

use tracing::{debug, warn};

use crate::{
    collector::{GarbageCollector, GcStats},
    gc_header::{align_size, align_up},
    visitor::ObjectModel,
    AllocResult, GcError, GcHeader, GcPtr, GcResult, HeapOptions, HeapOptionsBuilder,
};

/// Page size used when the platform cannot report one
const FALLBACK_PAGE_SIZE: usize = 4096;

/// The managed heap
pub struct Heap {
    /// Start of the whole region, used to release it
    region: NonNull<u8>,

    /// Layout the region was allocated with
    layout: Layout,

    /// Next free byte in the active semispace
    alloc_ptr: *mut u8,

    /// One past the last byte of the active semispace
    limit: *mut u8,

    /// Start of the semispace new objects are allocated in
    active_start: *mut u8,

    /// Start of the other semispace, the destination of the next collection
    inactive_start: *mut u8,

    /// Size of the whole region in bytes, covering both semispaces
    size: usize,

    options: HeapOptions,

    stats: GcStats,
}

impl Heap {
    /// Create a heap of at least `capacity` bytes, covering both semispaces
    pub fn new(capacity: usize) -> GcResult<Heap> {
        Self::with_options(HeapOptionsBuilder::new().heap_size(capacity).build())
    }

    pub fn with_options(options: HeapOptions) -> GcResult<Heap> {
        let capacity = options.heap_size;
        let page_size = page_size();

        let size = align_up(capacity.max(1), page_size)
            .ok_or(GcError::InvalidCapacity { capacity })?;
        let layout = Layout::from_size_align(size, page_size)
            .map_err(|_| GcError::InvalidCapacity { capacity })?;

        let region = NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
            .ok_or(GcError::HeapReservation { size })?;

        let semispace_size = size / 2;
        let active_start = region.as_ptr();
        let inactive_start = unsafe { active_start.add(semispace_size) };

        debug!(size, semispace_size, "created heap");

        Ok(Heap {
            region,
            layout,
            alloc_ptr: active_start,
            limit: inactive_start,
            active_start,
            inactive_start,
            size,
            options,
            stats: GcStats::default(),
        })
    }

    /// Allocate memory for an object of type T
    ///
    /// Returns a pointer to uninitialized memory. The caller must write the object's header
    /// before any other allocation can happen.
    ///
    /// # Arguments
    /// * `model` - The runtime's object model, used if a collection is needed
    pub fn alloc<T>(&mut self, model: &mut impl ObjectModel) -> AllocResult<GcPtr<T>> {
        self.alloc_with_size(model, core::mem::size_of::<T>())
    }

    /// Allocate memory with the given size
    ///
    /// The size is rounded up to the word size. Runs a full collection if the active semispace
    /// is exhausted, then retries once.
    ///
    /// # Arguments
    /// * `model` - The runtime's object model, used if a collection is needed
    /// * `size` - The size of the object in bytes, including its header
    pub fn alloc_with_size<T>(
        &mut self,
        model: &mut impl ObjectModel,
        size: usize,
    ) -> AllocResult<GcPtr<T>> {
        debug_assert!(size >= GcHeader::SIZE, "objects must have room for a header");
        debug_assert!(core::mem::align_of::<T>() <= GcHeader::ALIGN);

        let alloc_size = match align_size(size) {
            Some(alloc_size) => alloc_size,
            None => return self.out_of_memory(size),
        };

        // Run a GC on every allocation in stress test mode
        if self.options.gc_stress_test {
            GarbageCollector::run(self, model, Some(alloc_size));
        }

        if let Some(ptr) = self.bump(alloc_size) {
            return Ok(ptr);
        }

        GarbageCollector::run(self, model, Some(alloc_size));

        // Live data cannot change between these two attempts, so a second collection could not
        // free anything more
        match self.bump(alloc_size) {
            Some(ptr) => Ok(ptr),
            None => self.out_of_memory(alloc_size),
        }
    }

    /// Bump allocate in the active semispace, if there is room
    #[inline]
    fn bump<T>(&mut self, alloc_size: usize) -> Option<GcPtr<T>> {
        if alloc_size > self.bytes_free() {
            return None;
        }

        let ptr = self.alloc_ptr;
        unsafe {
            self.alloc_ptr = ptr.add(alloc_size);
            Some(GcPtr::from_ptr(ptr.cast()))
        }
    }

    #[cold]
    fn out_of_memory<T>(&self, requested: usize) -> AllocResult<GcPtr<T>> {
        let available = self.bytes_free();
        warn!(requested, available, "out of memory after collection");

        #[cfg(feature = "alloc_error")]
        {
            return Err(GcError::OutOfMemory {
                requested,
                available,
            });
        }

        #[cfg(not(feature = "alloc_error"))]
        {
            panic!(
                "Ran out of heap memory: requested {} bytes, {} bytes free",
                requested, available
            );
        }
    }

    /// Run a full garbage collection
    pub fn collect(&mut self, model: &mut impl ObjectModel) {
        GarbageCollector::run(self, model, None);
    }

    /// Size of the whole region in bytes, covering both semispaces
    #[inline]
    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Size of a single semispace, the most that can be live at once
    #[inline]
    pub fn semispace_size(&self) -> usize {
        self.size / 2
    }

    /// Get bytes currently allocated in the active semispace
    #[inline]
    pub fn bytes_allocated(&self) -> usize {
        self.alloc_ptr as usize - self.active_start as usize
    }

    /// Get bytes still free in the active semispace
    #[inline]
    pub fn bytes_free(&self) -> usize {
        self.limit as usize - self.alloc_ptr as usize
    }

    /// Whether `ptr` points at an allocated object in the active semispace
    #[inline]
    pub fn contains<T>(&self, ptr: GcPtr<T>) -> bool {
        let ptr = ptr.as_ptr() as *const u8;
        self.active_start as *const u8 <= ptr && ptr < self.alloc_ptr as *const u8
    }

    /// Offset of `ptr` from the start of the active semispace, if it lies inside it
    pub fn offset_of<T>(&self, ptr: GcPtr<T>) -> Option<usize> {
        if self.contains(ptr) {
            Some(ptr.addr() - self.active_start as usize)
        } else {
            None
        }
    }

    #[inline]
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    #[inline]
    pub fn options(&self) -> &HeapOptions {
        &self.options
    }

    #[inline]
    pub(crate) fn stats_mut(&mut self) -> &mut GcStats {
        &mut self.stats
    }

    /// Bounds of the semispace currently receiving allocations
    #[inline]
    pub(crate) fn current_space_bounds(&self) -> (*mut u8, *mut u8) {
        (self.active_start, self.limit)
    }

    /// Swap the roles of the two semispaces. The old active semispace becomes from-space, and
    /// allocation restarts at the base of the new one.
    pub(crate) fn flip(&mut self) {
        core::mem::swap(&mut self.active_start, &mut self.inactive_start);
        self.alloc_ptr = self.active_start;
        self.limit = unsafe { self.active_start.add(self.semispace_size()) };
    }

    /// Set the allocation pointer after a collection has copied objects up to `alloc_ptr`
    #[inline]
    pub(crate) fn set_alloc_ptr(&mut self, alloc_ptr: *mut u8) {
        debug_assert!(self.active_start <= alloc_ptr && alloc_ptr <= self.limit);
        self.alloc_ptr = alloc_ptr;
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.region.as_ptr(), self.layout) }
    }
}

#[cfg(unix)]
fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        FALLBACK_PAGE_SIZE
    }
}

#[cfg(not(unix))]
fn page_size() -> usize {
    FALLBACK_PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_rounds_to_page_size() {
        let heap = Heap::new(100).unwrap();
        assert_eq!(heap.capacity() % page_size(), 0);
        assert!(heap.capacity() >= 100);
        assert_eq!(heap.semispace_size() * 2, heap.capacity());
        assert_eq!(heap.bytes_allocated(), 0);
        assert_eq!(heap.bytes_free(), heap.semispace_size());
    }

    #[test]
    fn test_heap_zero_capacity() {
        let heap = Heap::new(0).unwrap();
        assert_eq!(heap.capacity(), page_size());
    }

    #[test]
    fn test_heap_invalid_capacity() {
        assert_eq!(
            Heap::new(usize::MAX).err(),
            Some(GcError::InvalidCapacity {
                capacity: usize::MAX
            })
        );
    }

    #[test]
    fn test_flip_swaps_semispaces() {
        let mut heap = Heap::new(8192).unwrap();
        let (first_start, first_end) = heap.current_space_bounds();

        heap.flip();
        let (second_start, second_end) = heap.current_space_bounds();
        assert_eq!(second_start, first_end);
        assert_eq!(second_end as usize - second_start as usize, heap.semispace_size());

        heap.flip();
        assert_eq!(heap.current_space_bounds(), (first_start, first_end));
        assert_eq!(heap.bytes_allocated(), 0);
    }
}
