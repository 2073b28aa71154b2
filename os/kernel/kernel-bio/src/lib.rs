//! # Block Buffer Cache
//!
//! Every disk block the file system touches goes through this cache. It keeps
//! recently used blocks in memory and serializes access to each cached block,
//! so that two tasks never modify the same block at the same time.
//!
//! ## Interface
//!
//! * [`BufferCache::read`] returns a locked buffer holding the block's
//!   contents, reading it from the [`BlockDevice`] only if it is not cached.
//! * After changing the payload, [`BufferCache::write`] (or
//!   [`BufGuard::write`]) writes it back.
//! * When done, release the buffer by dropping the guard or passing it to
//!   [`BufferCache::release`]. Do not hold buffers longer than necessary: only
//!   one task at a time can use a buffer.
//! * [`BufferCache::pin`] keeps a block cached after its guard is gone, e.g.
//!   while a log transaction still refers to it.
//!
//! ## Structure
//!
//! ```text
//!   bucket 0        bucket 1        ...   bucket NBUCKET-1
//! ┌──────────┐    ┌──────────┐          ┌──────────┐
//! │ SpinLock │    │ SpinLock │          │ SpinLock │
//! │ MRU..LRU │    │ MRU..LRU │          │ MRU..LRU │
//! └────┬─────┘    └────┬─────┘          └────┬─────┘
//!      ▼               ▼                     ▼
//!   slot 3 ⇄ slot 0  slot 7               slot 5 ⇄ slot 1
//!   (dev, blockno, refcnt, valid, SleepLock<payload>)
//! ```
//!
//! Buffers live in a fixed arena and are threaded into their bucket by index.
//! A buffer is found in bucket `blockno % NBUCKET`; on a miss an unreferenced
//! buffer is repurposed, from the home bucket if possible and otherwise moved
//! over from another bucket.
//!
//! ## Faults
//!
//! Misuse of a buffer and running out of buffers are fatal ([`BioFault`]);
//! they are reported through the `log` facade and then panic.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod buffer;
mod cache;
mod device;
mod fault;
mod list;

pub use cache::{BufGuard, BufPin, BufferCache, CacheStats};
pub use device::{BlockData, BlockDevice};
pub use fault::{BioFault, fault};
pub use kernel_info::bio::BLOCK_SIZE;
