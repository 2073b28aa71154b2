use crate::SpinLockGuard;
use core::fmt;

/// Identifies a schedulable task (process or kernel thread).
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TaskId(u64);

impl TaskId {
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task {}", self.0)
    }
}

/// The slice of the process scheduler the blocking primitives depend on.
///
/// Implemented by the kernel's scheduler; [`HostScheduler`](crate::HostScheduler)
/// maps it onto `std::thread` for host builds.
pub trait Scheduler: Sync {
    /// The task currently executing on this processor.
    fn current(&self) -> TaskId;

    /// Take the current task off the run queue until [`wakeup`](Self::wakeup)
    /// is called for `chan`.
    ///
    /// `guard` is released once the task is committed to sleeping, so a wakeup
    /// issued by someone who takes the same lock afterwards is never lost. The
    /// lock is held again when this returns. Wakeups may be spurious; callers
    /// re-check their condition in a loop.
    fn sleep<'a, T>(&self, chan: usize, guard: SpinLockGuard<'a, T>) -> SpinLockGuard<'a, T>;

    /// Make every task sleeping on `chan` runnable again.
    fn wakeup(&self, chan: usize);
}

impl<S: Scheduler + ?Sized> Scheduler for &S {
    #[inline]
    fn current(&self) -> TaskId {
        (**self).current()
    }

    #[inline]
    fn sleep<'a, T>(&self, chan: usize, guard: SpinLockGuard<'a, T>) -> SpinLockGuard<'a, T> {
        (**self).sleep(chan, guard)
    }

    #[inline]
    fn wakeup(&self, chan: usize) {
        (**self).wakeup(chan);
    }
}
