//! Reference-counted physical frame allocator.
//!
//! The managed region is split in two:
//!
//! ```text
//! start                  pool                                      end
//! ┌──────────────────────┬──────┬──────┬──────┬─────────────┬──────┐
//! │ refcount[0..frames]  │ pad  │  f0  │  f1  │     ...     │ fN-1 │
//! └──────────────────────┴──────┴──────┴──────┴─────────────┴──────┘
//!  one byte per frame     up to  page-aligned frames
//!                         PAGE_SIZE
//! ```
//!
//! Free frames are chained through their first word. A frame on the free
//! list always has count 0; a frame off it always has count 1 or more.

use crate::Frame;
use crate::fault::{FrameFault, RegionError, fault};
use core::ptr::{self, NonNull, null_mut};
use kernel_info::memory::{ALLOC_POISON, FREE_POISON, PAGE_SIZE, page_round_up};
use kernel_sync::SpinLock;
use log::{debug, trace};

/// Header written into the first bytes of every **free** frame.
#[repr(C)]
struct Run {
    next: *mut Run,
}

/// State guarded by the allocator lock.
struct Inner {
    /// Head of the free list (or null).
    free: *mut Run,
    nfree: usize,
    /// One count per pool frame, stored at the start of the region.
    refcounts: *mut u8,
}

// Safety: the raw pointers are only followed while the allocator lock is held.
unsafe impl Send for Inner {}

impl Inner {
    #[inline]
    fn count(&self, idx: usize) -> u8 {
        unsafe { self.refcounts.add(idx).read() }
    }

    #[inline]
    fn set_count(&mut self, idx: usize, count: u8) {
        unsafe { self.refcounts.add(idx).write(count) };
    }

    /// # Safety
    /// `frame` must be a pool frame that is on no list.
    unsafe fn push(&mut self, frame: Frame, idx: usize) {
        let run = frame.as_ptr().cast::<Run>();
        unsafe { run.write(Run { next: self.free }) };
        self.free = run;
        self.nfree += 1;
        self.set_count(idx, 0);
    }

    fn pop(&mut self) -> Option<Frame> {
        let run = NonNull::new(self.free)?;
        // Safety: every run on the list was written by `push`.
        self.free = unsafe { run.as_ptr().read().next };
        self.nfree -= 1;
        Some(Frame::new(run.cast()))
    }
}

/// Where the pool starts and how many frames it holds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct RegionLayout {
    frames: usize,
    pool_offset: usize,
}

impl RegionLayout {
    /// Split `[start, end)` into one count byte per frame followed by as many
    /// page-aligned frames as fit.
    const fn of(start: usize, end: usize) -> Result<Self, RegionError> {
        if end <= start {
            return Err(RegionError::Inverted { start, end });
        }
        // Every frame costs a page plus its count byte.
        let upper = (end - start) / (PAGE_SIZE + 1);
        let pool = page_round_up(start + upper);
        let fit = if pool < end {
            (end - pool) / PAGE_SIZE
        } else {
            0
        };
        let frames = if fit < upper { fit } else { upper };
        if frames == 0 {
            return Err(RegionError::TooSmall { start, end });
        }
        Ok(Self {
            frames,
            pool_offset: pool - start,
        })
    }
}

/// Page-granular allocator with a per-frame reference count.
///
/// A frame is handed out with count 1. Additional owners (e.g. address spaces
/// sharing a page until one of them writes to it) call
/// [`increment`](Self::increment); each owner gives its reference back with
/// [`decrement`](Self::decrement), and the last one returns the frame to the
/// free list. [`free`](Self::free) is for the sole owner only.
///
/// All bookkeeping sits behind one [`SpinLock`]. Each operation is atomic on
/// its own; a sequence of operations is not.
///
/// Misuse (foreign or misaligned addresses, double frees, count overflow or
/// underflow) is fatal, see [`FrameFault`]. Running out of frames is not:
/// [`allocate`](Self::allocate) returns `None`.
pub struct FrameAllocator {
    pool: NonNull<u8>,
    frames: usize,
    inner: SpinLock<Inner>,
}

// Safety: `pool` is only used to compute addresses; frame memory is written
// by whoever owns the frame, the bookkeeping under `inner`.
unsafe impl Send for FrameAllocator {}
unsafe impl Sync for FrameAllocator {}

impl FrameAllocator {
    /// Take over the memory in `[start, end)`.
    ///
    /// Every pool frame starts out free and filled with [`FREE_POISON`].
    ///
    /// # Errors
    /// The region is empty, inverted, or too small to hold a frame plus its
    /// count.
    ///
    /// # Safety
    /// The range must be valid, writable and exclusive to the allocator for as
    /// long as the allocator or any frame it handed out is in use.
    pub unsafe fn new(start: NonNull<u8>, end: NonNull<u8>) -> Result<Self, RegionError> {
        let layout = RegionLayout::of(start.as_ptr().addr(), end.as_ptr().addr())?;
        let refcounts = start.as_ptr();
        // Safety: the layout keeps the pool inside `[start, end)`.
        let pool = unsafe { start.add(layout.pool_offset) };

        let mut inner = Inner {
            free: null_mut(),
            nfree: 0,
            refcounts,
        };
        // Push high to low so that allocation starts at the bottom.
        for idx in (0..layout.frames).rev() {
            // Safety: `idx < frames`, so the frame lies inside the pool.
            let frame = Frame::new(unsafe { pool.add(idx * PAGE_SIZE) });
            unsafe {
                ptr::write_bytes(frame.as_ptr(), FREE_POISON, PAGE_SIZE);
                inner.push(frame, idx);
            }
        }

        debug!(
            "kalloc: {} frames at {:#x}, {} count bytes at {:#x}",
            layout.frames,
            pool.as_ptr().addr(),
            layout.frames,
            refcounts.addr()
        );
        Ok(Self {
            pool,
            frames: layout.frames,
            inner: SpinLock::named("kmem", inner),
        })
    }

    /// Hand out a frame with count 1, filled with [`ALLOC_POISON`].
    ///
    /// Returns `None` when every frame is in use.
    pub fn allocate(&self) -> Option<Frame> {
        let frame = {
            let mut inner = self.inner.lock();
            let frame = inner.pop()?;
            inner.set_count(self.index_of(frame), 1);
            frame
        };
        // Safety: the frame was just taken off the free list; it is ours.
        unsafe { ptr::write_bytes(frame.as_ptr(), ALLOC_POISON, PAGE_SIZE) };
        Some(frame)
    }

    /// Return a frame owned by the caller alone.
    ///
    /// # Panics
    /// Fatal if `frame` does not belong to the pool, is already free or still
    /// has other owners.
    pub fn free(&self, frame: Frame) {
        let idx = self.check("kfree", frame);
        {
            let mut inner = self.inner.lock();
            match inner.count(idx) {
                1 => {}
                0 => fault(FrameFault::DoubleFree { addr: frame.addr() }),
                count => fault(FrameFault::SharedFree {
                    addr: frame.addr(),
                    count,
                }),
            }
            // Claimed for the free list; a concurrent second free sees 0.
            inner.set_count(idx, 0);
        }
        self.release(frame, idx);
    }

    /// Register one more owner of an allocated frame.
    ///
    /// # Panics
    /// Fatal if `frame` does not belong to the pool, is free, or already has
    /// `u8::MAX` owners.
    pub fn increment(&self, frame: Frame) {
        let idx = self.check("increment", frame);
        let mut inner = self.inner.lock();
        match inner.count(idx) {
            0 => fault(FrameFault::IncrementFree { addr: frame.addr() }),
            u8::MAX => fault(FrameFault::RefcountOverflow { addr: frame.addr() }),
            count => inner.set_count(idx, count + 1),
        }
    }

    /// Drop one owner of `frame`; the last owner puts it back on the free list.
    ///
    /// # Panics
    /// Fatal if `frame` does not belong to the pool or has no owners.
    pub fn decrement(&self, frame: Frame) {
        let idx = self.check("decrement", frame);
        let last = {
            let mut inner = self.inner.lock();
            let count = inner.count(idx);
            if count == 0 {
                fault(FrameFault::RefcountUnderflow { addr: frame.addr() });
            }
            inner.set_count(idx, count - 1);
            count == 1
        };
        if last {
            self.release(frame, idx);
        }
    }

    /// Current reference count of `frame` (0 when free).
    ///
    /// # Panics
    /// Fatal if `frame` does not belong to the pool.
    pub fn refcount(&self, frame: Frame) -> u8 {
        let idx = self.check("refcount", frame);
        self.inner.lock().count(idx)
    }

    /// Whether `frame` is a frame of this pool.
    #[must_use]
    pub fn contains(&self, frame: Frame) -> bool {
        self.in_pool(frame.addr())
    }

    /// Frames currently on the free list.
    #[must_use]
    pub fn free_frames(&self) -> usize {
        self.inner.lock().nfree
    }

    /// Size of the pool in frames.
    #[inline]
    #[must_use]
    pub const fn total_frames(&self) -> usize {
        self.frames
    }

    /// Free memory in bytes.
    #[must_use]
    pub fn free_bytes(&self) -> usize {
        self.free_frames() * PAGE_SIZE
    }

    /// Poison a frame nobody references any more and put it on the free list.
    fn release(&self, frame: Frame, idx: usize) {
        // Safety: count is 0 and the frame is on no list; nobody else may
        // touch it.
        unsafe { ptr::write_bytes(frame.as_ptr(), FREE_POISON, PAGE_SIZE) };
        let mut inner = self.inner.lock();
        unsafe { inner.push(frame, idx) };
        trace!("kalloc: frame {:#x} back on the free list", frame.addr());
    }

    #[inline]
    fn index_of(&self, frame: Frame) -> usize {
        (frame.addr() - self.pool.as_ptr().addr()) / PAGE_SIZE
    }

    #[inline]
    fn in_pool(&self, addr: usize) -> bool {
        let base = self.pool.as_ptr().addr();
        addr % PAGE_SIZE == 0 && addr >= base && addr < base + self.frames * PAGE_SIZE
    }

    /// Validate `frame` and return its index in the pool.
    #[track_caller]
    fn check(&self, op: &'static str, frame: Frame) -> usize {
        let addr = frame.addr();
        if addr % PAGE_SIZE != 0 {
            fault(FrameFault::Misaligned { op, addr });
        }
        if !self.in_pool(addr) {
            fault(FrameFault::OutOfRange { op, addr });
        }
        self.index_of(frame)
    }
}
