use crate::{Scheduler, SpinLock, TaskId};
use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    ptr,
};

/// Blocking mutual exclusion for long critical sections.
///
/// A contending caller sleeps on the lock's channel until the holder releases
/// it, so the holder may block (e.g. across a disk request) without keeping
/// other processors spinning. The lock remembers which task holds it so that
/// callers can assert ownership with [`holding`](Self::holding).
///
/// The holder word itself is protected by a short internal [`SpinLock`]; the
/// scheduler releases that spin lock once the waiter is asleep.
pub struct SleepLock<T> {
    holder: SpinLock<Option<TaskId>>,
    data: UnsafeCell<T>,
}

// Safety: access to `data` is serialized by `holder`.
unsafe impl<T: Send> Sync for SleepLock<T> {}
unsafe impl<T: Send> Send for SleepLock<T> {}

impl<T> SleepLock<T> {
    pub const fn new(name: &'static str, value: T) -> Self {
        Self {
            holder: SpinLock::named(name, None),
            data: UnsafeCell::new(value),
        }
    }

    /// Sleep/wakeup channel of this lock.
    #[inline]
    fn chan(&self) -> usize {
        ptr::from_ref(self).addr()
    }

    /// Acquire the lock for the current task, sleeping while it is held elsewhere.
    ///
    /// Re-acquiring a lock the caller already holds never returns.
    pub fn lock<'a, S>(&'a self, sched: &'a S) -> SleepLockGuard<'a, T, S>
    where
        S: Scheduler + ?Sized,
    {
        let me = sched.current();
        let mut holder = self.holder.lock();
        while holder.is_some() {
            holder = sched.sleep(self.chan(), holder);
        }
        *holder = Some(me);
        drop(holder);
        SleepLockGuard::new(self, sched)
    }

    /// Acquire the lock for the current task if it is free.
    pub fn try_lock<'a, S>(&'a self, sched: &'a S) -> Option<SleepLockGuard<'a, T, S>>
    where
        S: Scheduler + ?Sized,
    {
        let mut holder = self.holder.lock();
        if holder.is_some() {
            return None;
        }
        *holder = Some(sched.current());
        drop(holder);
        Some(SleepLockGuard::new(self, sched))
    }

    /// Whether the lock is held by the task currently running.
    pub fn holding<S>(&self, sched: &S) -> bool
    where
        S: Scheduler + ?Sized,
    {
        *self.holder.lock() == Some(sched.current())
    }

    /// The task holding the lock, if any.
    pub fn holder(&self) -> Option<TaskId> {
        *self.holder.lock()
    }

    pub fn is_locked(&self) -> bool {
        self.holder.lock().is_some()
    }
}

/// Exclusive access to a [`SleepLock`]'s data; releases the lock on drop and
/// wakes the tasks waiting for it.
pub struct SleepLockGuard<'a, T, S: Scheduler + ?Sized> {
    lock: &'a SleepLock<T>,
    sched: &'a S,
    /// Send/Sync follow `&mut T`: sharing the guard shares `&T`.
    _data: PhantomData<&'a mut T>,
}

impl<'a, T, S: Scheduler + ?Sized> SleepLockGuard<'a, T, S> {
    #[inline]
    const fn new(lock: &'a SleepLock<T>, sched: &'a S) -> Self {
        Self {
            lock,
            sched,
            _data: PhantomData,
        }
    }

    /// The lock this guard belongs to.
    #[inline]
    #[must_use]
    pub const fn lock(&self) -> &'a SleepLock<T> {
        self.lock
    }
}

impl<T, S: Scheduler + ?Sized> Deref for SleepLockGuard<'_, T, S> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T, S: Scheduler + ?Sized> DerefMut for SleepLockGuard<'_, T, S> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T, S: Scheduler + ?Sized> Drop for SleepLockGuard<'_, T, S> {
    fn drop(&mut self) {
        *self.lock.holder.lock() = None;
        self.sched.wakeup(self.lock.chan());
    }
}
