//! # Kernel synchronization primitives
//!
//! Two lock types with deliberately different waiting behavior:
//!
//! * [`SpinLock`] never gives up the processor. A contending caller busy-waits,
//!   so critical sections must be short and must not block or do I/O.
//! * [`SleepLock`] puts a contending task to sleep through the [`Scheduler`]
//!   and wakes it when the holder releases. It records which task holds it and
//!   is meant for long critical sections, such as the lifetime of a disk
//!   request.
//!
//! The two are not interchangeable and are kept as separate types.

#![cfg_attr(not(any(test, doctest, feature = "std")), no_std)]
#![allow(unsafe_code)]

#[cfg(any(test, feature = "std"))]
mod host;
mod scheduler;
mod sleep_lock;
mod spin_lock;

#[cfg(any(test, feature = "std"))]
pub use host::HostScheduler;
pub use scheduler::{Scheduler, TaskId};
pub use sleep_lock::{SleepLock, SleepLockGuard};
pub use spin_lock::{LockStats, SpinLock, SpinLockGuard};
