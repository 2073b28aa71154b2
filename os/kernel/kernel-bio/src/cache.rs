use crate::buffer::Slot;
use crate::device::{BlockData, BlockDevice};
use crate::fault::{BioFault, fault};
use crate::list::IndexList;
use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};
use kernel_info::bio::BLOCK_SIZE;
use kernel_sync::{LockStats, Scheduler, SleepLockGuard, SpinLock, SpinLockGuard};
use log::{debug, trace};

/// Counters describing how the cache has been used.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct CacheStats {
    /// Lookups that found the block already cached.
    pub hits: usize,
    /// Lookups that had to repurpose a buffer.
    pub misses: usize,
    /// Misses served by a buffer taken from another bucket.
    pub migrations: usize,
    pub disk_reads: usize,
    pub disk_writes: usize,
}

#[derive(Default)]
struct Counters {
    hits: AtomicUsize,
    misses: AtomicUsize,
    migrations: AtomicUsize,
    disk_reads: AtomicUsize,
    disk_writes: AtomicUsize,
}

impl Counters {
    #[inline]
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            migrations: self.migrations.load(Ordering::Relaxed),
            disk_reads: self.disk_reads.load(Ordering::Relaxed),
            disk_writes: self.disk_writes.load(Ordering::Relaxed),
        }
    }
}

/// How a reference is being dropped.
#[derive(Copy, Clone, Eq, PartialEq)]
enum Unref {
    /// `brelse`: an unreferenced buffer becomes the bucket's most recently used.
    Release,
    /// `bunpin`: plain decrement.
    Unpin,
}

impl Unref {
    const fn op(self) -> &'static str {
        match self {
            Self::Release => "brelse",
            Self::Unpin => "bunpin",
        }
    }
}

/// Sharded cache of disk blocks.
///
/// `NBUF` buffers are spread over `NBUCKET` hash buckets keyed by block
/// number. Each bucket is a list of buffers ordered by recency behind its own
/// [`SpinLock`], so lookups of blocks in different buckets do not contend.
/// A miss repurposes an unreferenced buffer, preferring the home bucket and
/// otherwise stealing one from another bucket.
///
/// Holding a [`BufGuard`] gives exclusive access to a block's payload; the
/// guard owns the buffer's [`SleepLock`](kernel_sync::SleepLock) and one
/// reference. Dropping it releases both.
///
/// # Lock order
///
/// A thread holds at most two bucket locks, and always takes the lower
/// bucket index first. Bucket locks are never held while taking a buffer's
/// sleep lock or doing I/O.
pub struct BufferCache<
    D,
    S,
    const NBUF: usize = { kernel_info::bio::NBUF },
    const NBUCKET: usize = { kernel_info::bio::NBUCKET },
> {
    device: D,
    sched: S,
    slots: [Slot; NBUF],
    buckets: [SpinLock<IndexList>; NBUCKET],
    counters: Counters,
}

impl<D, S, const NBUF: usize, const NBUCKET: usize> BufferCache<D, S, NBUF, NBUCKET>
where
    D: BlockDevice,
    S: Scheduler,
{
    const GEOMETRY: () = {
        assert!(NBUF > 0, "the cache needs at least one buffer");
        assert!(NBUCKET > 0, "the cache needs at least one bucket");
        assert!(NBUF < u32::MAX as usize);
    };

    /// Build the cache with every buffer unused and parked in bucket 0.
    pub fn new(device: D, sched: S) -> Self {
        let () = Self::GEOMETRY;

        let slots: [Slot; NBUF] = core::array::from_fn(|_| Slot::new());
        let mut buckets: [SpinLock<IndexList>; NBUCKET] =
            core::array::from_fn(|_| SpinLock::named("bcache.bucket", IndexList::new()));

        let first = buckets[0].get_mut();
        for idx in 0..NBUF {
            first.push_front(&slots[..], idx);
        }

        debug!(
            "bcache: {} buffers of {} bytes in {} buckets",
            NBUF, BLOCK_SIZE, NBUCKET
        );
        Self {
            device,
            sched,
            slots,
            buckets,
            counters: Counters::default(),
        }
    }

    /// The bucket that caches `blockno`.
    #[inline]
    #[must_use]
    pub const fn bucket_of(blockno: u32) -> usize {
        blockno as usize % NBUCKET
    }

    /// Return a locked buffer holding the contents of `blockno` on `dev`.
    ///
    /// Reads from the device only if the block is not already cached. The
    /// caller has exclusive access to the payload until the guard is released.
    ///
    /// # Panics
    /// Fatal if every buffer is referenced.
    pub fn read(&self, dev: u32, blockno: u32) -> BufGuard<'_, D, S, NBUF, NBUCKET> {
        let mut buf = self.get(dev, blockno);
        let slot = &self.slots[buf.slot];
        if !slot.is_valid() {
            self.device.read_block(dev, blockno, buf.data_mut());
            slot.set_valid();
            Counters::bump(&self.counters.disk_reads);
        }
        buf
    }

    /// Write the buffer's payload to disk.
    ///
    /// # Panics
    /// Fatal unless the calling task holds the buffer's lock.
    pub fn write(&self, buf: &BufGuard<'_, D, S, NBUF, NBUCKET>) {
        self.check_owner("bwrite", buf);
        self.device.write_block(buf.dev, buf.blockno, buf.data());
        Counters::bump(&self.counters.disk_writes);
    }

    /// Release a locked buffer. Same as dropping the guard.
    ///
    /// # Panics
    /// Fatal unless the calling task holds the buffer's lock.
    pub fn release(&self, buf: BufGuard<'_, D, S, NBUF, NBUCKET>) {
        if !ptr::eq(buf.cache, self) {
            fault(BioFault::ForeignBuffer { op: "brelse" });
        }
        drop(buf);
    }

    /// Take an extra reference on the buffer so it outlives the guard.
    ///
    /// The buffer cannot be repurposed until the returned pin is dropped or
    /// passed to [`unpin`](Self::unpin).
    pub fn pin<'a>(
        &'a self,
        buf: &BufGuard<'a, D, S, NBUF, NBUCKET>,
    ) -> BufPin<'a, D, S, NBUF, NBUCKET> {
        if !ptr::eq(buf.cache, self) {
            fault(BioFault::ForeignBuffer { op: "bpin" });
        }
        let _bucket = self.buckets[Self::bucket_of(buf.blockno)].lock();
        let slot = &self.slots[buf.slot];
        slot.set_refcnt(slot.refcnt() + 1);
        BufPin {
            cache: self,
            slot: buf.slot,
            dev: buf.dev,
            blockno: buf.blockno,
        }
    }

    /// Drop a reference taken by [`pin`](Self::pin). Same as dropping the pin.
    pub fn unpin(&self, pin: BufPin<'_, D, S, NBUF, NBUCKET>) {
        if !ptr::eq(pin.cache, self) {
            fault(BioFault::ForeignBuffer { op: "bunpin" });
        }
        drop(pin);
    }

    /// The reference count of `(dev, blockno)` if it is cached.
    #[must_use]
    pub fn refcount(&self, dev: u32, blockno: u32) -> Option<u32> {
        let bucket = self.buckets[Self::bucket_of(blockno)].lock();
        self.find_cached(&bucket, dev, blockno)
            .map(|idx| self.slots[idx].refcnt())
    }

    /// Number of buffers currently linked into `bucket`.
    #[must_use]
    pub fn bucket_len(&self, bucket: usize) -> usize {
        self.buckets[bucket].lock().len()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Contention counters of every bucket lock.
    #[must_use]
    pub fn lock_stats(&self) -> [LockStats; NBUCKET] {
        core::array::from_fn(|bucket| self.buckets[bucket].stats())
    }

    #[inline]
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Find or repurpose a buffer for `(dev, blockno)` and lock it.
    fn get(&self, dev: u32, blockno: u32) -> BufGuard<'_, D, S, NBUF, NBUCKET> {
        let slot = self.claim(dev, blockno);
        let data = self.slots[slot].block.lock(&self.sched);
        BufGuard {
            cache: self,
            slot,
            dev,
            blockno,
            data: Some(data),
        }
    }

    /// Take a reference on the buffer for `(dev, blockno)` and return its index.
    fn claim(&self, dev: u32, blockno: u32) -> usize {
        let home = Self::bucket_of(blockno);

        {
            let mut bucket = self.buckets[home].lock();
            if let Some(idx) = self.take_cached(&bucket, dev, blockno) {
                return idx;
            }
            if let Some(idx) = self.recycle_local(&mut bucket, dev, blockno) {
                return idx;
            }
        }

        // The home bucket was dropped above, so something may have been cached
        // or released there in the meantime; look again under the pair lock.
        for step in 1..NBUCKET {
            let victim = (home + step) % NBUCKET;
            let (mut bucket, mut other) = self.lock_pair(home, victim);

            if let Some(idx) = self.take_cached(&bucket, dev, blockno) {
                return idx;
            }
            if let Some(idx) = self.recycle_local(&mut bucket, dev, blockno) {
                return idx;
            }

            if let Some(idx) = self.find_unused(&other) {
                other.remove(&self.slots[..], idx);
                self.slots[idx].assign(dev, blockno);
                bucket.push_front(&self.slots[..], idx);
                trace!(
                    "bcache: buffer {idx} moved from bucket {victim} to {home} for block {blockno} on dev {dev}"
                );
                Counters::bump(&self.counters.misses);
                Counters::bump(&self.counters.migrations);
                return idx;
            }
        }

        fault(BioFault::NoBuffers { dev, blockno })
    }

    /// Lock the home bucket and one other bucket in ascending index order.
    fn lock_pair(
        &self,
        home: usize,
        other: usize,
    ) -> (SpinLockGuard<'_, IndexList>, SpinLockGuard<'_, IndexList>) {
        debug_assert_ne!(home, other);
        if home < other {
            let home = self.buckets[home].lock();
            let other = self.buckets[other].lock();
            (home, other)
        } else {
            let other = self.buckets[other].lock();
            let home = self.buckets[home].lock();
            (home, other)
        }
    }

    fn find_cached(&self, bucket: &IndexList, dev: u32, blockno: u32) -> Option<usize> {
        bucket
            .iter(&self.slots[..])
            .find(|&idx| self.slots[idx].holds(dev, blockno))
    }

    fn take_cached(&self, bucket: &IndexList, dev: u32, blockno: u32) -> Option<usize> {
        let idx = self.find_cached(bucket, dev, blockno)?;
        let slot = &self.slots[idx];
        slot.set_refcnt(slot.refcnt() + 1);
        Counters::bump(&self.counters.hits);
        Some(idx)
    }

    /// Least recently used unreferenced buffer of `bucket`.
    fn find_unused(&self, bucket: &IndexList) -> Option<usize> {
        bucket
            .iter_lru(&self.slots[..])
            .find(|&idx| self.slots[idx].refcnt() == 0)
    }

    /// Repurpose an unreferenced buffer that already lives in the home bucket.
    fn recycle_local(&self, bucket: &mut IndexList, dev: u32, blockno: u32) -> Option<usize> {
        let idx = self.find_unused(bucket)?;
        self.slots[idx].assign(dev, blockno);
        bucket.move_to_front(&self.slots[..], idx);
        trace!("bcache: buffer {idx} reused for block {blockno} on dev {dev}");
        Counters::bump(&self.counters.misses);
        Some(idx)
    }

    fn check_owner(&self, op: &'static str, buf: &BufGuard<'_, D, S, NBUF, NBUCKET>) {
        if !ptr::eq(buf.cache, self) {
            fault(BioFault::ForeignBuffer { op });
        }
        if !self.slots[buf.slot].block.holding(&self.sched) {
            fault(BioFault::NotHolding {
                op,
                dev: buf.dev,
                blockno: buf.blockno,
            });
        }
    }

    /// Drop one reference. The buffer cannot have left its home bucket while
    /// referenced, so the bucket follows from the block number.
    fn unref(&self, idx: usize, dev: u32, blockno: u32, how: Unref) {
        let mut bucket = self.buckets[Self::bucket_of(blockno)].lock();
        let slot = &self.slots[idx];
        let refcnt = slot.refcnt();
        if refcnt == 0 {
            fault(BioFault::RefcountUnderflow {
                op: how.op(),
                dev,
                blockno,
            });
        }
        slot.set_refcnt(refcnt - 1);
        if refcnt == 1 && how == Unref::Release {
            bucket.move_to_front(&self.slots[..], idx);
        }
    }
}

/// A locked, referenced buffer.
///
/// Dereferences to nothing on its own; use [`data`](Self::data) and
/// [`data_mut`](Self::data_mut). Dropping the guard is `brelse`.
pub struct BufGuard<'a, D, S, const NBUF: usize, const NBUCKET: usize>
where
    D: BlockDevice,
    S: Scheduler,
{
    cache: &'a BufferCache<D, S, NBUF, NBUCKET>,
    slot: usize,
    dev: u32,
    blockno: u32,
    data: Option<SleepLockGuard<'a, BlockData, S>>,
}

impl<'a, D, S, const NBUF: usize, const NBUCKET: usize> BufGuard<'a, D, S, NBUF, NBUCKET>
where
    D: BlockDevice,
    S: Scheduler,
{
    #[inline]
    pub const fn dev(&self) -> u32 {
        self.dev
    }

    #[inline]
    pub const fn blockno(&self) -> u32 {
        self.blockno
    }

    /// Index of the underlying buffer in the pool.
    #[inline]
    pub const fn slot(&self) -> usize {
        self.slot
    }

    /// Whether the payload has been loaded from disk.
    pub fn is_valid(&self) -> bool {
        self.cache.slots[self.slot].is_valid()
    }

    pub fn data(&self) -> &BlockData {
        match &self.data {
            Some(guard) => &**guard,
            None => unreachable!("buffer used after release"),
        }
    }

    pub fn data_mut(&mut self) -> &mut BlockData {
        match &mut self.data {
            Some(guard) => &mut **guard,
            None => unreachable!("buffer used after release"),
        }
    }

    /// Write the payload to disk. See [`BufferCache::write`].
    pub fn write(&self) {
        self.cache.write(self);
    }

    /// Keep the buffer cached past this guard. See [`BufferCache::pin`].
    pub fn pin(&self) -> BufPin<'a, D, S, NBUF, NBUCKET> {
        self.cache.pin(self)
    }
}

impl<D, S, const NBUF: usize, const NBUCKET: usize> Drop for BufGuard<'_, D, S, NBUF, NBUCKET>
where
    D: BlockDevice,
    S: Scheduler,
{
    fn drop(&mut self) {
        let Some(data) = self.data.take() else {
            return;
        };
        if !data.lock().holding(&self.cache.sched) {
            fault(BioFault::NotHolding {
                op: "brelse",
                dev: self.dev,
                blockno: self.blockno,
            });
        }
        drop(data);
        self.cache
            .unref(self.slot, self.dev, self.blockno, Unref::Release);
    }
}

/// An extra reference on a buffer, held without its lock.
///
/// Dropping the pin is `bunpin`.
pub struct BufPin<'a, D, S, const NBUF: usize, const NBUCKET: usize>
where
    D: BlockDevice,
    S: Scheduler,
{
    cache: &'a BufferCache<D, S, NBUF, NBUCKET>,
    slot: usize,
    dev: u32,
    blockno: u32,
}

impl<D, S, const NBUF: usize, const NBUCKET: usize> BufPin<'_, D, S, NBUF, NBUCKET>
where
    D: BlockDevice,
    S: Scheduler,
{
    #[inline]
    pub const fn dev(&self) -> u32 {
        self.dev
    }

    #[inline]
    pub const fn blockno(&self) -> u32 {
        self.blockno
    }
}

impl<D, S, const NBUF: usize, const NBUCKET: usize> Drop for BufPin<'_, D, S, NBUF, NBUCKET>
where
    D: BlockDevice,
    S: Scheduler,
{
    fn drop(&mut self) {
        self.cache
            .unref(self.slot, self.dev, self.blockno, Unref::Unpin);
    }
}
