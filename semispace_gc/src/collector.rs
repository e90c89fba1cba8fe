//! Collector - Cheney-style copying collection
//!
//! Flips the semispaces, evacuates the roots, then scans the copies breadth first. All copying and
//! pointer rewriting goes through `copy_or_fix_pointer`.

use core::{marker::PhantomData, ptr::NonNull};

use tracing::{debug, trace};

use crate::{
    gc_header::align_size,
    handle,
    visitor::{GcVisitor, ObjectModel},
    GcHeader, GcPtr, Heap,
};

/// GC statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GcStats {
    /// Number of collections
    pub collections: u64,
    /// Objects copied in the last collection
    pub last_objects_copied: usize,
    /// Bytes copied in the last collection, which is the live data right after it
    pub last_bytes_copied: usize,
    /// Bytes reclaimed in the last collection
    pub last_bytes_reclaimed: usize,
    /// Bytes copied over all collections
    pub total_bytes_copied: usize,
}

/// A Cheney-style semispace garbage collector. Flips the heap's semispaces, copies everything
/// reachable from the roots into the new active semispace, then scans the copies in address order
/// until the scan pointer catches up with the alloc pointer.
pub(crate) struct GarbageCollector<M> {
    // Bounds of the region we are copying from
    from_space_start_ptr: *const u8,
    from_space_end_ptr: *const u8,

    // End of the region we are copying to
    to_space_end_ptr: *const u8,

    // Pointer to the next to-space object to scan
    scan_ptr: *mut u8,

    // Pointer to the end of the copied objects in to-space. Is the address of the next copy.
    alloc_ptr: *mut u8,

    objects_copied: usize,

    model: PhantomData<fn() -> M>,
}

impl<M: ObjectModel> GarbageCollector<M> {
    /// Run a full collection. `requested` is the allocation that triggered it, if any.
    pub(crate) fn run(heap: &mut Heap, model: &mut M, requested: Option<usize>) {
        let bytes_before = heap.bytes_allocated();
        match requested {
            Some(requested) => debug!(requested, bytes_before, "starting collection"),
            None => debug!(bytes_before, "starting explicit collection"),
        }

        let (from_space_start_ptr, from_space_end_ptr) = heap.current_space_bounds();
        heap.flip();
        let (to_space_start_ptr, to_space_end_ptr) = heap.current_space_bounds();

        let mut gc = GarbageCollector {
            from_space_start_ptr,
            from_space_end_ptr,
            to_space_end_ptr,
            scan_ptr: to_space_start_ptr,
            alloc_ptr: to_space_start_ptr,
            objects_copied: 0,
            model: PhantomData::<fn() -> M>,
        };

        // First copy the objects held by live handle scopes, then the runtime's own roots
        handle::visit_roots(&mut gc);
        model.visit_roots(&mut gc);

        // Then fix the pointers in each copied object until the scan pointer catches up with the
        // alloc pointer, meaning all live objects have been copied and all pointers fixed.
        while gc.scan_ptr < gc.alloc_ptr {
            let object = unsafe { GcPtr::from_ptr(gc.scan_ptr.cast::<GcHeader>()) };
            model.trace_object(object, &mut gc);

            let alloc_size = Self::alloc_size(object);
            unsafe { gc.scan_ptr = gc.scan_ptr.add(alloc_size) }
        }

        debug_assert_eq!(gc.scan_ptr, gc.alloc_ptr);

        // Nothing reads from-space again, so it can be poisoned to catch stale pointers
        if heap.options().poison_from_space {
            unsafe {
                let len = from_space_end_ptr.offset_from(from_space_start_ptr) as usize;
                core::ptr::write_bytes(from_space_start_ptr, 0x01, len);
            }
        }

        heap.set_alloc_ptr(gc.alloc_ptr);

        let bytes_copied = heap.bytes_allocated();
        let stats = heap.stats_mut();
        stats.collections += 1;
        stats.last_objects_copied = gc.objects_copied;
        stats.last_bytes_copied = bytes_copied;
        stats.last_bytes_reclaimed = bytes_before.saturating_sub(bytes_copied);
        stats.total_bytes_copied += bytes_copied;

        debug!(
            objects_copied = gc.objects_copied,
            bytes_copied,
            bytes_free = heap.bytes_free(),
            "finished collection"
        );
    }

    /// Aligned size of an object. Every object holds at least its header, otherwise the scan
    /// cursor would never move past it.
    #[inline]
    fn alloc_size(object: GcPtr<GcHeader>) -> usize {
        let size = M::object_size(object);
        match align_size(size) {
            Some(alloc_size) if alloc_size >= GcHeader::SIZE => alloc_size,
            _ => panic!(
                "object at {:p} reports an impossible size of {} bytes",
                object, size
            ),
        }
    }

    #[inline]
    fn is_in_from_space(&self, ptr: *const u8) -> bool {
        self.from_space_start_ptr <= ptr && ptr < self.from_space_end_ptr
    }

    /// The visitor shared by the root phase and the scan phase. This is the only place that
    /// copies objects or rewrites pointers.
    #[inline]
    fn copy_or_fix_pointer(&mut self, field: &mut GcPtr<GcHeader>) {
        let mut object = *field;

        // We only need to visit pointers into from-space. Anything else is either already in
        // to-space or is not managed by this heap.
        if !self.is_in_from_space(object.as_ptr() as *const u8) {
            return;
        }

        // If the header is actually a forwarding pointer then simply rewrite the field to point
        // to the copy.
        if let Some(forwarding_ptr) = object.forwarding_address() {
            *field = GcPtr::from_non_null(forwarding_ptr);
            return;
        }

        // There is always enough room in to-space, since everything copied already fit in the
        // from-space of the same size.
        let alloc_size = Self::alloc_size(object);
        debug_assert!(alloc_size <= self.to_space_end_ptr as usize - self.alloc_ptr as usize);

        // Copy object from the old to the new semispace, and bump alloc_ptr past the copy
        let new_object = unsafe {
            let new_object = NonNull::new_unchecked(self.alloc_ptr.cast::<GcHeader>());
            core::ptr::copy_nonoverlapping::<u8>(
                object.as_ptr().cast(),
                self.alloc_ptr,
                alloc_size,
            );
            self.alloc_ptr = self.alloc_ptr.add(alloc_size);
            new_object
        };

        trace!(from = ?object.as_ptr(), to = ?new_object.as_ptr(), alloc_size, "forward");

        // Overwrite the header of the old object with a forwarding pointer to the copy, then point
        // the field at the copy.
        unsafe { object.install_forward(new_object) };
        *field = GcPtr::from_non_null(new_object);

        self.objects_copied += 1;
    }
}

impl<M: ObjectModel> GcVisitor for GarbageCollector<M> {
    #[inline]
    fn visit<T>(&mut self, ptr: &mut GcPtr<T>) {
        self.copy_or_fix_pointer(ptr.cast_mut());
    }
}
