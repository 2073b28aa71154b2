//! # Kernel Configuration
//!
//! Compile-time constants shared by the kernel's resource managers and their
//! collaborators. The block cache and the disk driver have to agree on the
//! block size, and the frame allocator and the virtual-memory layer have to
//! agree on the page size; this crate is the single source of truth for both.
//!
//! ## Modules
//!
//! ### Block I/O ([`bio`])
//! * **Block size**: payload bytes per cached disk block
//! * **Cache geometry**: number of buffers and number of hash buckets
//!
//! ### Physical Memory ([`memory`])
//! * **Page size**: bytes per physical frame
//! * **Poison bytes**: fill patterns written on allocation and on free
//!
//! All values are `const` and validated with `const` assertions, so an invalid
//! configuration fails to compile instead of failing at boot.

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod bio;
pub mod memory;
