use crate::device::BlockData;
use crate::list::{Link, Links};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use kernel_info::bio::BLOCK_SIZE;
use kernel_sync::SleepLock;

/// One buffer of the pool.
///
/// Identity, reference count and list linkage are only read or written under
/// the lock of the bucket whose list holds the slot. A slot that was never
/// assigned holds no block, whatever its identity fields say. The payload is
/// only touched by the holder of `block`. `valid` is written either by the
/// payload holder or, while nobody holds a reference, under the bucket lock.
pub(crate) struct Slot {
    dev: AtomicU32,
    blockno: AtomicU32,
    refcnt: AtomicU32,
    assigned: AtomicBool,
    valid: AtomicBool,
    pub(crate) link: Link,
    pub(crate) block: SleepLock<BlockData>,
}

impl Slot {
    pub(crate) const fn new() -> Self {
        Self {
            dev: AtomicU32::new(0),
            blockno: AtomicU32::new(0),
            refcnt: AtomicU32::new(0),
            assigned: AtomicBool::new(false),
            valid: AtomicBool::new(false),
            link: Link::new(),
            block: SleepLock::new("buffer", [0; BLOCK_SIZE]),
        }
    }

    #[inline]
    pub(crate) fn holds(&self, dev: u32, blockno: u32) -> bool {
        self.assigned.load(Ordering::Relaxed)
            && self.dev.load(Ordering::Relaxed) == dev
            && self.blockno.load(Ordering::Relaxed) == blockno
    }

    #[inline]
    pub(crate) fn refcnt(&self) -> u32 {
        self.refcnt.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_refcnt(&self, refcnt: u32) {
        self.refcnt.store(refcnt, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_valid(&self) {
        self.valid.store(true, Ordering::Relaxed);
    }

    /// Repurpose an unreferenced slot for `(dev, blockno)` with one reference.
    pub(crate) fn assign(&self, dev: u32, blockno: u32) {
        debug_assert_eq!(self.refcnt(), 0);
        self.dev.store(dev, Ordering::Relaxed);
        self.blockno.store(blockno, Ordering::Relaxed);
        self.assigned.store(true, Ordering::Relaxed);
        self.valid.store(false, Ordering::Relaxed);
        self.set_refcnt(1);
    }
}

impl Links for [Slot] {
    #[inline]
    fn link(&self, idx: usize) -> &Link {
        &self[idx].link
    }
}
