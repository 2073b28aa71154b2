use core::fmt;
use core::ptr::NonNull;
use kernel_info::memory::PAGE_SHIFT;

/// Handle to one page-sized frame handed out by a
/// [`FrameAllocator`](crate::FrameAllocator).
///
/// A `Frame` is a plain address: copying it does not take a reference. Use
/// [`FrameAllocator::increment`](crate::FrameAllocator::increment) for every
/// additional owner.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    ptr: NonNull<u8>,
}

// Safety: a frame is an address; access to the memory behind it is governed
// by the allocator's ownership rules, not by the handle.
unsafe impl Send for Frame {}
unsafe impl Sync for Frame {}

impl Frame {
    #[inline]
    pub(crate) const fn new(ptr: NonNull<u8>) -> Self {
        Self { ptr }
    }

    /// Rebuild a handle from a pointer previously obtained via
    /// [`as_ptr`](Self::as_ptr), e.g. one kept in a page table entry.
    ///
    /// # Safety
    /// `ptr` must be the start of a frame handed out by the allocator the
    /// handle is going to be used with, and the frame must still be referenced.
    #[inline]
    #[must_use]
    pub const unsafe fn from_ptr(ptr: NonNull<u8>) -> Self {
        Self { ptr }
    }

    /// Start of the frame.
    #[inline]
    #[must_use]
    pub const fn as_ptr(self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    #[inline]
    #[must_use]
    pub fn addr(self) -> usize {
        self.ptr.as_ptr().addr()
    }

    /// Frame number (address divided by the page size).
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.addr() >> PAGE_SHIFT
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:#x})", self.addr())
    }
}
