use core::ptr::NonNull;
use kernel_alloc::{Frame, FrameAllocator, RegionError};
use kernel_info::memory::{ALLOC_POISON, FREE_POISON, PAGE_SIZE};
use std::alloc::{Layout, alloc, dealloc};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

/// Page-aligned scratch memory standing in for physical RAM.
struct Region {
    start: NonNull<u8>,
    layout: Layout,
}

impl Region {
    fn pages(n: usize) -> Self {
        let layout = Layout::from_size_align(n * PAGE_SIZE, PAGE_SIZE).unwrap();
        let start = NonNull::new(unsafe { alloc(layout) }).unwrap();
        Self { start, layout }
    }

    fn end(&self) -> NonNull<u8> {
        unsafe { self.start.add(self.layout.size()) }
    }

    fn allocator(&self) -> FrameAllocator {
        unsafe { FrameAllocator::new(self.start, self.end()) }.unwrap()
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        unsafe { dealloc(self.start.as_ptr(), self.layout) };
    }
}

fn contents(frame: Frame) -> &'static [u8] {
    unsafe { core::slice::from_raw_parts(frame.as_ptr(), PAGE_SIZE) }
}

/// Everything but the free-list link in the first word.
fn payload(frame: Frame) -> &'static [u8] {
    &contents(frame)[size_of::<usize>()..]
}

#[test]
fn pool_of_three_frames() {
    // one page for the counts, three for the pool
    let region = Region::pages(4);
    let kmem = region.allocator();
    assert_eq!(kmem.total_frames(), 3);
    assert_eq!(kmem.free_frames(), 3);
    assert_eq!(kmem.free_bytes(), 3 * PAGE_SIZE);

    let a = kmem.allocate().unwrap();
    let b = kmem.allocate().unwrap();
    let c = kmem.allocate().unwrap();
    assert!(kmem.allocate().is_none());
    assert_eq!(kmem.free_frames(), 0);

    let distinct: HashSet<_> = [a, b, c].into_iter().collect();
    assert_eq!(distinct.len(), 3);

    kmem.free(b);
    let again = kmem.allocate().unwrap();
    assert_eq!(again, b);
    assert_eq!(kmem.refcount(again), 1);
    assert!(kmem.allocate().is_none());
}

#[test]
fn frames_are_aligned_and_inside_the_region() {
    let region = Region::pages(16);
    let kmem = region.allocator();
    let lo = region.start.as_ptr().addr();
    let hi = region.end().as_ptr().addr();

    let mut frames = Vec::new();
    while let Some(frame) = kmem.allocate() {
        assert_eq!(frame.addr() % PAGE_SIZE, 0);
        assert!(frame.addr() >= lo && frame.addr() + PAGE_SIZE <= hi);
        assert!(kmem.contains(frame));
        frames.push(frame);
    }
    assert_eq!(frames.len(), kmem.total_frames());
    // the count bytes take the first page
    assert_eq!(frames.len(), 15);
    assert!(frames.iter().all(|f| f.addr() >= lo + PAGE_SIZE));
}

#[test]
fn allocation_starts_at_the_bottom() {
    let region = Region::pages(4);
    let kmem = region.allocator();
    let a = kmem.allocate().unwrap();
    let b = kmem.allocate().unwrap();
    assert_eq!(a.addr(), region.start.as_ptr().addr() + PAGE_SIZE);
    assert_eq!(b.addr(), a.addr() + PAGE_SIZE);
    assert_eq!(b.index(), a.index() + 1);
}

#[test]
fn frames_are_poisoned() {
    let region = Region::pages(4);
    let kmem = region.allocator();

    let frame = kmem.allocate().unwrap();
    assert!(contents(frame).iter().all(|&b| b == ALLOC_POISON));

    unsafe { frame.as_ptr().write_bytes(0xCC, PAGE_SIZE) };
    kmem.free(frame);
    assert_eq!(kmem.refcount(frame), 0);
    assert!(payload(frame).iter().all(|&b| b == FREE_POISON));

    // never handed out yet: poisoned at startup
    let fresh = kmem.allocate().unwrap();
    let untouched = kmem.allocate().unwrap();
    assert_eq!(fresh, frame);
    assert!(contents(untouched).iter().all(|&b| b == ALLOC_POISON));
}

#[test]
fn shared_frame_returns_on_last_decrement() {
    let region = Region::pages(4);
    let kmem = region.allocator();

    let frame = kmem.allocate().unwrap();
    kmem.increment(frame);
    kmem.increment(frame);
    assert_eq!(kmem.refcount(frame), 3);
    assert_eq!(kmem.free_frames(), 2);

    kmem.decrement(frame);
    kmem.decrement(frame);
    assert_eq!(kmem.refcount(frame), 1);
    assert_eq!(kmem.free_frames(), 2);
    assert!(contents(frame).iter().all(|&b| b == ALLOC_POISON));

    kmem.decrement(frame);
    assert_eq!(kmem.refcount(frame), 0);
    assert_eq!(kmem.free_frames(), 3);
    assert!(payload(frame).iter().all(|&b| b == FREE_POISON));
}

#[test]
fn from_ptr_round_trips() {
    let region = Region::pages(4);
    let kmem = region.allocator();

    let frame = kmem.allocate().unwrap();
    let raw = frame.as_ptr();
    let back = unsafe { Frame::from_ptr(NonNull::new(raw).unwrap()) };
    assert_eq!(back, frame);
    kmem.free(back);
    assert_eq!(kmem.free_frames(), 3);
}

#[test]
fn contains_rejects_foreign_addresses() {
    let region = Region::pages(4);
    let kmem = region.allocator();
    let frame = kmem.allocate().unwrap();

    let misaligned = unsafe { Frame::from_ptr(NonNull::new(frame.as_ptr().add(8)).unwrap()) };
    let metadata = unsafe { Frame::from_ptr(region.start) };
    assert!(kmem.contains(frame));
    assert!(!kmem.contains(misaligned));
    assert!(!kmem.contains(metadata));
}

#[test]
fn unusable_regions() {
    let region = Region::pages(1);
    let too_small = unsafe { FrameAllocator::new(region.start, region.end()) };
    assert!(matches!(too_small, Err(RegionError::TooSmall { .. })));

    let inverted = unsafe { FrameAllocator::new(region.end(), region.start) };
    assert!(matches!(inverted, Err(RegionError::Inverted { .. })));
    assert_eq!(
        inverted.err().unwrap().to_string(),
        format!(
            "region end {:#x} is not above its start {:#x}",
            region.start.as_ptr().addr(),
            region.end().as_ptr().addr()
        )
    );
}

#[test]
#[should_panic(expected = "double free")]
fn double_free_is_fatal() {
    let region = Region::pages(4);
    let kmem = region.allocator();
    let frame = kmem.allocate().unwrap();
    kmem.free(frame);
    kmem.free(frame);
}

#[test]
#[should_panic(expected = "shared by 2 owners")]
fn freeing_a_shared_frame_is_fatal() {
    let region = Region::pages(4);
    let kmem = region.allocator();
    let frame = kmem.allocate().unwrap();
    kmem.increment(frame);
    kmem.free(frame);
}

#[test]
#[should_panic(expected = "not page aligned")]
fn misaligned_free_is_fatal() {
    let region = Region::pages(4);
    let kmem = region.allocator();
    let frame = kmem.allocate().unwrap();
    let inside = unsafe { Frame::from_ptr(NonNull::new(frame.as_ptr().add(1)).unwrap()) };
    kmem.free(inside);
}

#[test]
#[should_panic(expected = "outside the managed pool")]
fn foreign_free_is_fatal() {
    let region = Region::pages(4);
    let other = Region::pages(4);
    let kmem = region.allocator();
    let stranger = other.allocator().allocate().unwrap();
    kmem.free(stranger);
}

#[test]
#[should_panic(expected = "outside the managed pool")]
fn freeing_the_count_page_is_fatal() {
    let region = Region::pages(4);
    let kmem = region.allocator();
    kmem.free(unsafe { Frame::from_ptr(region.start) });
}

#[test]
#[should_panic(expected = "underflow")]
fn decrement_of_a_free_frame_is_fatal() {
    let region = Region::pages(4);
    let kmem = region.allocator();
    let frame = kmem.allocate().unwrap();
    kmem.decrement(frame);
    kmem.decrement(frame);
}

#[test]
#[should_panic(expected = "not allocated")]
fn increment_of_a_free_frame_is_fatal() {
    let region = Region::pages(4);
    let kmem = region.allocator();
    let frame = kmem.allocate().unwrap();
    kmem.free(frame);
    kmem.increment(frame);
}

#[test]
#[should_panic(expected = "overflow")]
fn refcount_overflow_is_fatal() {
    let region = Region::pages(4);
    let kmem = region.allocator();
    let frame = kmem.allocate().unwrap();
    for _ in 1..u8::MAX {
        kmem.increment(frame);
    }
    assert_eq!(kmem.refcount(frame), u8::MAX);
    kmem.increment(frame);
}

#[test]
fn concurrent_allocate_and_free() {
    let threads = 8;
    let rounds = 500;
    let region = Region::pages(33);
    let kmem = Arc::new(region.allocator());
    let total = kmem.total_frames();
    assert_eq!(total, 32);
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let kmem = Arc::clone(&kmem);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                let tag = u8::try_from(t + 0x10).unwrap();
                start.wait();
                for _ in 0..rounds {
                    let mut mine = Vec::new();
                    for _ in 0..3 {
                        if let Some(frame) = kmem.allocate() {
                            assert_eq!(kmem.refcount(frame), 1);
                            unsafe { frame.as_ptr().write_bytes(tag, PAGE_SIZE) };
                            mine.push(frame);
                        }
                    }
                    thread::yield_now();
                    for frame in mine {
                        // nobody else wrote into a frame we own
                        assert!(contents(frame).iter().all(|&b| b == tag));
                        kmem.free(frame);
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(kmem.free_frames(), total);
    let mut seen = HashSet::new();
    while let Some(frame) = kmem.allocate() {
        assert!(seen.insert(frame), "frame {frame:?} handed out twice");
    }
    assert_eq!(seen.len(), total);
}

#[test]
fn concurrent_sharing() {
    let threads = 6;
    let region = Region::pages(4);
    let kmem = Arc::new(region.allocator());
    let frame = kmem.allocate().unwrap();
    for _ in 0..threads {
        kmem.increment(frame);
    }
    kmem.decrement(frame);

    let start = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let kmem = Arc::clone(&kmem);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                kmem.decrement(frame);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    // returned exactly once
    assert_eq!(kmem.refcount(frame), 0);
    assert_eq!(kmem.free_frames(), 3);
}
