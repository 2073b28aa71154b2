//! # Physical Frame Allocation
//!
//! This crate hands out page-sized frames of physical memory to the rest of
//! the kernel (page tables, kernel stacks, pipe buffers, user pages) and takes
//! them back. Frames may be shared: each one carries a small reference count,
//! so that e.g. two address spaces can map the same page until one of them
//! needs a private copy.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 FrameAllocator                      │
//! │    • allocate / free for sole owners                │
//! │    • increment / decrement for shared frames        │
//! │    • one SpinLock around all bookkeeping            │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                 Managed region                      │
//! │    • one count byte per frame at the bottom         │
//! │    • page-aligned frame pool above it               │
//! │    • free frames chained through their first word   │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Poisoning
//!
//! Frame contents are overwritten on every transition so that stale data is
//! never mistaken for live data:
//! * on allocation with [`ALLOC_POISON`](kernel_info::memory::ALLOC_POISON),
//! * on return to the free list with
//!   [`FREE_POISON`](kernel_info::memory::FREE_POISON).
//!
//! ## Failure Model
//!
//! Running out of frames is an ordinary condition: [`FrameAllocator::allocate`]
//! returns `None` and the caller backs off. Everything else that can go wrong
//! is a kernel bug (freeing a frame twice, freeing a frame someone else still
//! references, passing an address the allocator never handed out) and ends in
//! [`fault`] with a [`FrameFault`].
//!
//! ## Usage
//!
//! ```rust
//! use core::ptr::NonNull;
//! use kernel_alloc::FrameAllocator;
//! use kernel_info::memory::PAGE_SIZE;
//! use std::alloc::{Layout, alloc, dealloc};
//!
//! let layout = Layout::from_size_align(8 * PAGE_SIZE, PAGE_SIZE).unwrap();
//! let start = NonNull::new(unsafe { alloc(layout) }).unwrap();
//! let end = unsafe { start.add(layout.size()) };
//!
//! let kmem = unsafe { FrameAllocator::new(start, end) }.unwrap();
//! let frame = kmem.allocate().expect("out of memory");
//! kmem.increment(frame);
//! kmem.decrement(frame);
//! kmem.free(frame);
//! assert_eq!(kmem.free_frames(), kmem.total_frames());
//!
//! drop(kmem);
//! unsafe { dealloc(start.as_ptr(), layout) };
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod fault;
mod frame;
mod frame_alloc;

pub use fault::{FrameFault, RegionError, fault};
pub use frame::Frame;
pub use frame_alloc::FrameAllocator;
