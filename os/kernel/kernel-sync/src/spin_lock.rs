use core::{
    cell::UnsafeCell,
    fmt,
    hint::spin_loop,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// Non-yielding mutual exclusion.
///
/// A contending caller busy-waits (test-and-test-and-set) and never gives up
/// the processor, so the holder must not sleep, yield or wait for I/O.
///
/// Every lock counts its acquisitions and the number of failed
/// test-and-set attempts, which is how bucket contention is measured.
pub struct SpinLock<T> {
    /// lock state
    /// * `false`: unlocked
    /// * `true`: locked
    locked: AtomicBool,
    name: &'static str,
    acquisitions: AtomicUsize,
    spins: AtomicUsize,
    inner: UnsafeCell<T>,
}

// Safety: mutual exclusion; only T: Send may cross threads.
unsafe impl<T: Send> Sync for SpinLock<T> {}

/// Snapshot of a [`SpinLock`]'s contention counters.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct LockStats {
    pub name: &'static str,
    /// Completed acquisitions.
    pub acquisitions: usize,
    /// Failed test-and-set attempts while waiting.
    pub spins: usize,
}

impl fmt::Display for LockStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lock: {}: #test-and-set {} #acquire() {}",
            self.name, self.spins, self.acquisitions
        )
    }
}

impl<T> SpinLock<T> {
    pub const fn new(inner: T) -> Self {
        Self::named("spinlock", inner)
    }

    /// Create a lock whose statistics are reported under `name`.
    pub const fn named(name: &'static str, inner: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            name,
            acquisitions: AtomicUsize::new(0),
            spins: AtomicUsize::new(0),
            inner: UnsafeCell::new(inner),
        }
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Try once; returns immediately.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        if self.try_acquire() {
            self.acquisitions.fetch_add(1, Ordering::Relaxed);
            Some(SpinLockGuard::new(self))
        } else {
            None
        }
    }

    /// Spin until acquired (TATAS), then return a guard.
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let mut spins = 0usize;
        while !self.try_acquire() {
            spins += 1;
            // Contended path: spin on a read, then retry the CAS.
            while self.locked.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
        if spins > 0 {
            self.spins.fetch_add(spins, Ordering::Relaxed);
        }
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        SpinLockGuard::new(self)
    }

    /// Closure convenience, built on the guard.
    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut g = self.lock();
        f(&mut g)
    }

    /// Whether some caller currently holds the lock.
    ///
    /// Only a hint; the answer may be stale by the time it is read.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn stats(&self) -> LockStats {
        LockStats {
            name: self.name,
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            spins: self.spins.load(Ordering::Relaxed),
        }
    }

    /// Mutable access when you have `&mut self` (no contention possible).
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    /// Send/Sync follow `&mut T`: sharing the guard shares `&T`.
    _data: PhantomData<&'a mut T>,
}

impl<'a, T> SpinLockGuard<'a, T> {
    #[inline]
    const fn new(lock: &'a SpinLock<T>) -> Self {
        Self {
            lock,
            _data: PhantomData,
        }
    }

    /// The lock this guard belongs to.
    #[inline]
    #[must_use]
    pub const fn lock(&self) -> &'a SpinLock<T> {
        self.lock
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        // Release publishes the critical section.
        self.lock.locked.store(false, Ordering::Release);
    }
}
