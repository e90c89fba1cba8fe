//! GC Header for the copying collector
//!
//! Every heap object starts with a one-word GcHeader. Outside of a collection the word holds the
//! host's type tag. During a collection the header of an evacuated from-space object is
//! overwritten with the address of its to-space copy.
//!
//! Layout: | GcHeader | ... object data ... |
//!
//! The low bit of the word tells the two apart. Tags are stored shifted left with the low bit set,
//! while a forwarding address is word aligned and so always has the low bit clear.

use core::ptr::NonNull;

/// Set in every header that still holds a tag, clear once the header holds a forwarding address.
pub const NOT_FORWARDED_BIT: usize = 1;

/// Decoded view of a header word
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderState {
    /// The header holds the host's type tag
    Tag(usize),
    /// The object has been copied to this address during the current collection
    Forwarded(NonNull<GcHeader>),
}

/// Header at the start of every heap object.
#[repr(C)]
pub struct GcHeader {
    word: usize,
}

impl GcHeader {
    /// Size of the GC header
    pub const SIZE: usize = core::mem::size_of::<GcHeader>();

    /// Alignment of allocations. Every object starts on a word boundary.
    pub const ALIGN: usize = core::mem::align_of::<usize>();

    /// Largest tag that can be stored alongside the not-forwarded bit
    pub const MAX_TAG: usize = usize::MAX >> 1;

    /// Create a header holding the given host tag
    #[inline]
    pub const fn new(tag: usize) -> GcHeader {
        debug_assert!(tag <= Self::MAX_TAG);
        GcHeader {
            word: (tag << 1) | NOT_FORWARDED_BIT,
        }
    }

    /// Whether this header has been replaced by a forwarding address
    #[inline]
    pub fn is_forwarded(&self) -> bool {
        self.word & NOT_FORWARDED_BIT == 0
    }

    /// The host tag. Must not be called on a forwarded header.
    #[inline]
    pub fn tag(&self) -> usize {
        debug_assert!(!self.is_forwarded(), "read tag of forwarded object");
        self.word >> 1
    }

    /// The address this object was copied to, if it has been forwarded
    #[inline]
    pub fn forwarding_address(&self) -> Option<NonNull<GcHeader>> {
        if self.is_forwarded() {
            NonNull::new(self.word as *mut GcHeader)
        } else {
            None
        }
    }

    #[inline]
    pub fn state(&self) -> HeaderState {
        match self.forwarding_address() {
            Some(address) => HeaderState::Forwarded(address),
            None => HeaderState::Tag(self.word >> 1),
        }
    }

    /// Overwrite this header with the address of the object's copy.
    ///
    /// # Safety
    /// The object must not already be forwarded, and `to` must hold a complete copy of it. Once
    /// forwarded, nothing may read this object's old payload again.
    #[inline]
    pub unsafe fn install_forward(&mut self, to: NonNull<GcHeader>) {
        debug_assert!(!self.is_forwarded(), "object forwarded twice in one collection");
        debug_assert_eq!(to.as_ptr() as usize & NOT_FORWARDED_BIT, 0);
        self.word = to.as_ptr() as usize;
    }

    /// The raw header word
    #[inline]
    pub fn raw(&self) -> usize {
        self.word
    }
}

impl core::fmt::Debug for GcHeader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.state() {
            HeaderState::Tag(tag) => write!(f, "GcHeader(tag {})", tag),
            HeaderState::Forwarded(to) => write!(f, "GcHeader(forwarded to {:p})", to),
        }
    }
}

/// Round an allocation request up to the allocation alignment, or None on overflow
#[inline]
pub(crate) fn align_size(size: usize) -> Option<usize> {
    align_up(size, GcHeader::ALIGN)
}

/// Align a value up to the given alignment
#[inline]
pub(crate) fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    value.checked_add(align - 1).map(|value| value & !(align - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gc_header_size() {
        assert_eq!(GcHeader::SIZE, core::mem::size_of::<usize>());
        assert_eq!(GcHeader::SIZE % GcHeader::ALIGN, 0);
    }

    #[test]
    fn test_gc_header_tag() {
        for tag in [0, 1, 2, 3, 42, GcHeader::MAX_TAG] {
            let header = GcHeader::new(tag);
            assert!(!header.is_forwarded());
            assert_eq!(header.raw() & NOT_FORWARDED_BIT, NOT_FORWARDED_BIT);
            assert_eq!(header.tag(), tag);
            assert_eq!(header.state(), HeaderState::Tag(tag));
            assert_eq!(header.forwarding_address(), None);
        }
    }

    #[test]
    fn test_gc_header_forward() {
        let mut target = GcHeader::new(7);
        let target_ptr = NonNull::from(&mut target);

        let mut header = GcHeader::new(7);
        unsafe { header.install_forward(target_ptr) };

        assert!(header.is_forwarded());
        assert_eq!(header.forwarding_address(), Some(target_ptr));
        assert_eq!(header.state(), HeaderState::Forwarded(target_ptr));
        assert_eq!(header.raw(), target_ptr.as_ptr() as usize);
    }

    #[test]
    fn test_align_size() {
        assert_eq!(align_size(0), Some(0));
        assert_eq!(align_size(1), Some(GcHeader::ALIGN));
        assert_eq!(align_size(GcHeader::ALIGN), Some(GcHeader::ALIGN));
        assert_eq!(align_size(GcHeader::ALIGN + 1), Some(2 * GcHeader::ALIGN));
        assert_eq!(align_size(usize::MAX), None);
    }
}
