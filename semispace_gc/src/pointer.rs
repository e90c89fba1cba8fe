//! GC-managed pointer type
//!
//! `GcPtr<T>` is a pointer to a GC-managed object. It should not be held on the stack across
//! potential GC points (allocations). Use `Handle<T>` for rooted references.

use core::{
    ops::{Deref, DerefMut},
    ptr::NonNull,
};

use crate::GcHeader;

/// A pointer to a GC-managed object.
///
/// This is a thin wrapper around a raw pointer to the start of the object, which is always its
/// `GcHeader`. Any collection may move the object, after which this pointer is stale unless it
/// was visited by the collector.
///
/// # Safety
/// - Must not be held on the stack across GC points
/// - The pointed-to object must begin with a `GcHeader`
#[repr(transparent)]
pub struct GcPtr<T> {
    ptr: NonNull<T>,
}

impl<T> GcPtr<T> {
    /// Get the raw pointer
    #[inline]
    pub const fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// Create from a raw pointer
    ///
    /// # Safety
    /// The pointer must be non-null and point to a valid GC-managed object
    #[inline]
    pub const unsafe fn from_ptr(ptr: *mut T) -> GcPtr<T> {
        GcPtr {
            ptr: NonNull::new_unchecked(ptr),
        }
    }

    /// Create from a NonNull pointer
    #[inline]
    pub const fn from_non_null(ptr: NonNull<T>) -> GcPtr<T> {
        GcPtr { ptr }
    }

    /// Check pointer equality
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }

    /// Cast to another type
    #[inline]
    pub fn cast<U>(&self) -> GcPtr<U> {
        GcPtr {
            ptr: self.ptr.cast(),
        }
    }

    /// Reinterpret a pointer field in place, so that it can be rewritten as another type.
    #[inline]
    pub fn cast_mut<U>(&mut self) -> &mut GcPtr<U> {
        // GcPtr<T> and GcPtr<U> are both a single NonNull
        unsafe { &mut *(self as *mut GcPtr<T> as *mut GcPtr<U>) }
    }

    /// View this object through its header
    #[inline]
    pub fn header(&self) -> GcPtr<GcHeader> {
        self.cast()
    }

    /// Get the underlying NonNull
    #[inline]
    pub fn as_non_null(&self) -> NonNull<T> {
        self.ptr
    }

    /// Address of the object as an integer
    #[inline]
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }
}

impl<T> Clone for GcPtr<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for GcPtr<T> {}

impl<T> PartialEq for GcPtr<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Eq for GcPtr<T> {}

impl<T> Deref for GcPtr<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for GcPtr<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { self.ptr.as_mut() }
    }
}

impl<T> core::fmt::Debug for GcPtr<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "GcPtr({:p})", self.ptr)
    }
}

impl<T> core::fmt::Pointer for GcPtr<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Pointer::fmt(&self.ptr, f)
    }
}
