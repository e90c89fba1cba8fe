//! Handle scopes - roots held by native frames
//!
//! A `HandleScope` pushes a fixed-capacity frame of root slots onto this thread's handle stack and
//! pops it again when dropped, on every exit path. While the frame is live the collector visits
//! every slot registered in it and rewrites the slot in place when its object moves.
//!
//! Slots come in two forms:
//! - `HandleScope::handle` stores the pointer in storage owned by the frame and returns a
//!   `Handle<T>` that reads through it
//! - `HandleScope::protect` registers the address of the caller's own pointer variable

use core::{cell::Cell, marker::PhantomData, ops::Deref, ptr::NonNull};

use crate::{GcHeader, GcPtr, GcVisitor};

/// Number of slots a single handle frame can protect.
pub const HANDLE_FRAME_CAPACITY: usize = 32;

/// The address of a location holding a (possibly null) heap pointer
type Slot = *mut Option<GcPtr<GcHeader>>;

struct HandleFrame {
    /// Addresses of the protected slots. Only the first `len` are in use.
    slots: [Slot; HANDLE_FRAME_CAPACITY],
    len: usize,

    /// Storage for slots created by `HandleScope::handle`
    locals: [Option<GcPtr<GcHeader>>; HANDLE_FRAME_CAPACITY],
    num_locals: usize,

    /// Frame that was on top of the stack when this one was pushed
    prev: Option<NonNull<HandleFrame>>,
}

thread_local! {
    /// Top of this thread's handle stack, most recently pushed frame first
    static TOP_FRAME: Cell<Option<NonNull<HandleFrame>>> = const { Cell::new(None) };
}

#[cfg(feature = "handle_stats")]
thread_local! {
    static HANDLE_STATS: Cell<HandleStats> = const {
        Cell::new(HandleStats {
            num_handles: 0,
            max_handles: 0,
        })
    };
}

#[cfg(feature = "handle_stats")]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandleStats {
    /// Number of slots currently protected
    pub num_handles: usize,
    /// Max number of slots protected at once observed so far
    pub max_handles: usize,
}

#[cfg(feature = "handle_stats")]
pub fn handle_stats() -> HandleStats {
    HANDLE_STATS.with(Cell::get)
}

/// A frame on the handle stack. The frame is pushed on creation and popped when the scope is
/// dropped, so every slot registered through it is a root for exactly the scope's lifetime.
///
/// Scopes must be dropped in the reverse order they were created. Must only be created on the
/// stack.
#[must_use = "a HandleScope pops its frame as soon as it is dropped"]
pub struct HandleScope {
    frame: NonNull<HandleFrame>,
}

impl HandleScope {
    #[inline]
    pub fn new() -> HandleScope {
        let prev = TOP_FRAME.with(Cell::get);
        let frame = Box::new(HandleFrame {
            slots: [core::ptr::null_mut(); HANDLE_FRAME_CAPACITY],
            len: 0,
            locals: [None; HANDLE_FRAME_CAPACITY],
            num_locals: 0,
            prev,
        });

        let frame = NonNull::from(Box::leak(frame));
        TOP_FRAME.with(|top| top.set(Some(frame)));

        HandleScope { frame }
    }

    /// Enter a handle scope, run `f` inside it, and pop the scope on the way out. Handles created
    /// inside cannot escape, but raw pointers returned by `f` can.
    #[inline]
    pub fn run<R>(f: impl FnOnce(&HandleScope) -> R) -> R {
        let scope = HandleScope::new();
        f(&scope)
    }

    /// Root `ptr` in a slot owned by this scope.
    #[inline]
    pub fn handle<T>(&self, ptr: GcPtr<T>) -> Handle<'_, T> {
        let frame = self.frame.as_ptr();
        unsafe {
            let index = (*frame).num_locals;
            let slot = core::ptr::addr_of_mut!((*frame).locals)
                .cast::<Option<GcPtr<GcHeader>>>()
                .add(index);

            self.register(slot);
            slot.write(Some(ptr.cast()));
            (*frame).num_locals = index + 1;

            Handle {
                slot: NonNull::new_unchecked(slot.cast::<GcPtr<T>>()),
                scope: PhantomData,
            }
        }
    }

    /// Register the caller's own pointer variable as a root for the lifetime of this scope.
    ///
    /// # Safety
    /// `slot` must stay valid, and must not move, for as long as this scope is live. It must only
    /// ever hold pointers to objects that begin with a `GcHeader`.
    #[inline]
    pub unsafe fn protect<T>(&self, slot: *mut GcPtr<T>) {
        self.register(slot.cast());
    }

    /// Register a nullable pointer variable as a root for the lifetime of this scope.
    ///
    /// # Safety
    /// Same requirements as `protect`.
    #[inline]
    pub unsafe fn protect_opt<T>(&self, slot: *mut Option<GcPtr<T>>) {
        self.register(slot.cast());
    }

    /// Number of slots registered in this scope's frame
    #[inline]
    pub fn len(&self) -> usize {
        unsafe { (*self.frame.as_ptr()).len }
    }

    fn register(&self, slot: Slot) {
        let frame = self.frame.as_ptr();
        unsafe {
            let len = (*frame).len;

            // Silently dropping a root would leave a dangling pointer after the next collection
            if len == HANDLE_FRAME_CAPACITY {
                panic!(
                    "handle frame capacity of {} slots exceeded",
                    HANDLE_FRAME_CAPACITY
                );
            }

            (*frame).slots[len] = slot;
            (*frame).len = len + 1;
        }

        #[cfg(feature = "handle_stats")]
        HANDLE_STATS.with(|stats| {
            let mut current = stats.get();
            current.num_handles += 1;
            current.max_handles = current.max_handles.max(current.num_handles);
            stats.set(current);
        });
    }
}

impl Drop for HandleScope {
    #[inline]
    fn drop(&mut self) {
        TOP_FRAME.with(|top| {
            assert_eq!(
                top.get(),
                Some(self.frame),
                "handle scopes must be dropped in reverse order of creation"
            );

            let frame = unsafe { Box::from_raw(self.frame.as_ptr()) };
            top.set(frame.prev);

            #[cfg(feature = "handle_stats")]
            HANDLE_STATS.with(|stats| {
                let mut current = stats.get();
                current.num_handles -= frame.len;
                stats.set(current);
            });
        });
    }
}

/// A rooted reference to a heap object. The handle points at a slot in its scope's frame, so it
/// stays valid across collections: the collector updates the slot, and every read goes through
/// it.
pub struct Handle<'s, T> {
    slot: NonNull<GcPtr<T>>,
    scope: PhantomData<&'s HandleScope>,
}

impl<'s, T> Handle<'s, T> {
    /// Current address of the object. Only valid until the next allocation.
    #[inline]
    pub fn get(&self) -> GcPtr<T> {
        unsafe { self.slot.as_ptr().read() }
    }

    /// Replace the object behind this handle. All copies of this handle see the change.
    #[inline]
    pub fn set(&self, ptr: GcPtr<T>) {
        unsafe { self.slot.as_ptr().write(ptr) }
    }

    #[inline]
    pub fn cast<U>(&self) -> Handle<'s, U> {
        Handle {
            slot: self.slot.cast(),
            scope: PhantomData,
        }
    }
}

impl<T> Clone for Handle<'_, T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<'_, T> {}

impl<T> Deref for Handle<'_, T> {
    type Target = GcPtr<T>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        unsafe { self.slot.as_ref() }
    }
}

impl<T> core::fmt::Debug for Handle<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Handle({:p})", self.get())
    }
}

/// Visit every registered slot, walking frames from the top of the stack down.
pub(crate) fn visit_roots(visitor: &mut impl GcVisitor) {
    let mut current = TOP_FRAME.with(Cell::get);
    while let Some(frame) = current {
        let frame = frame.as_ptr();
        unsafe {
            for index in 0..(*frame).len {
                let slot = (*frame).slots[index];
                visitor.visit_opt(&mut *slot);
            }

            current = (*frame).prev;
        }
    }
}

/// Number of handle scopes live on this thread.
pub fn live_frame_count() -> usize {
    let mut count = 0;
    let mut current = TOP_FRAME.with(Cell::get);
    while let Some(frame) = current {
        count += 1;
        current = unsafe { (*frame.as_ptr()).prev };
    }

    count
}

/// Number of slots protected by all handle scopes live on this thread.
pub fn live_slot_count() -> usize {
    let mut count = 0;
    let mut current = TOP_FRAME.with(Cell::get);
    while let Some(frame) = current {
        unsafe {
            count += (*frame.as_ptr()).len;
            current = (*frame.as_ptr()).prev;
        }
    }

    count
}

/// Check that this thread's handle stack is empty. A live frame at shutdown means a scope leaked.
pub fn assert_no_live_frames() {
    let count = live_frame_count();
    assert!(count == 0, "{} handle scope(s) still live", count);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_ptr(header: &mut GcHeader) -> GcPtr<GcHeader> {
        GcPtr::from_non_null(NonNull::from(header))
    }

    #[test]
    fn test_scopes_push_and_pop() {
        assert_eq!(live_frame_count(), 0);
        {
            let _outer = HandleScope::new();
            assert_eq!(live_frame_count(), 1);
            {
                let _inner = HandleScope::new();
                assert_eq!(live_frame_count(), 2);
            }
            assert_eq!(live_frame_count(), 1);
        }
        assert_no_live_frames();
    }

    #[test]
    fn test_handle_get_and_set() {
        let mut first = GcHeader::new(1);
        let mut second = GcHeader::new(2);
        let first = dummy_ptr(&mut first);
        let second = dummy_ptr(&mut second);

        let scope = HandleScope::new();
        let handle = scope.handle(first);
        let copy = handle;
        assert_eq!(handle.get(), first);
        assert_eq!(handle.tag(), 1);

        copy.set(second);
        assert_eq!(handle.get(), second);
        assert_eq!(scope.len(), 1);
        assert_eq!(live_slot_count(), 1);
    }

    #[test]
    fn test_slots_released_with_scope() {
        let mut header = GcHeader::new(1);
        let ptr = dummy_ptr(&mut header);

        let outer = HandleScope::new();
        let _a = outer.handle(ptr);
        HandleScope::run(|inner| {
            let _b = inner.handle(ptr);
            let _c = inner.handle(ptr);
            assert_eq!(live_slot_count(), 3);
        });
        assert_eq!(live_slot_count(), 1);
    }

    #[test]
    #[should_panic(expected = "handle frame capacity")]
    fn test_frame_capacity_exceeded() {
        let mut header = GcHeader::new(1);
        let ptr = dummy_ptr(&mut header);

        let scope = HandleScope::new();
        for _ in 0..=HANDLE_FRAME_CAPACITY {
            scope.handle(ptr);
        }
    }

    #[test]
    #[should_panic(expected = "reverse order")]
    fn test_out_of_order_drop() {
        let first = HandleScope::new();
        let _second = HandleScope::new();
        drop(first);
    }

    #[cfg(feature = "handle_stats")]
    #[test]
    fn test_handle_stats() {
        let mut header = GcHeader::new(1);
        let ptr = dummy_ptr(&mut header);

        HandleScope::run(|scope| {
            scope.handle(ptr);
            scope.handle(ptr);
        });
        HandleScope::run(|scope| {
            scope.handle(ptr);
        });

        let stats = handle_stats();
        assert_eq!(stats.num_handles, 0);
        assert_eq!(stats.max_handles, 2);
    }
}
