use crate::{Scheduler, SpinLockGuard, TaskId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// [`Scheduler`] for host builds: every OS thread is a task.
///
/// Sleeping threads park on a process-wide condition variable. Each channel
/// counts the wakeups issued for it, and a sleeper returns once that count
/// moves past the value it saw when it went to sleep.
#[derive(Debug, Default, Copy, Clone)]
pub struct HostScheduler;

static NEXT_TASK: AtomicU64 = AtomicU64::new(1);

std::thread_local! {
    static CURRENT: TaskId = TaskId::new(NEXT_TASK.fetch_add(1, Ordering::Relaxed));
}

#[derive(Debug, Default)]
struct Channel {
    wakeups: u64,
    sleepers: usize,
}

/// Channels with at least one sleeper.
static CHANNELS: Mutex<BTreeMap<usize, Channel>> = Mutex::new(BTreeMap::new());
static WOKEN: Condvar = Condvar::new();

fn channels() -> MutexGuard<'static, BTreeMap<usize, Channel>> {
    // A panicking test thread must not take the other sleepers with it.
    CHANNELS.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HostScheduler {
    /// Threads currently asleep on `chan`.
    #[must_use]
    pub fn sleepers(&self, chan: usize) -> usize {
        channels().get(&chan).map_or(0, |c| c.sleepers)
    }
}

impl Scheduler for HostScheduler {
    fn current(&self) -> TaskId {
        CURRENT.with(|id| *id)
    }

    fn sleep<'a, T>(&self, chan: usize, guard: SpinLockGuard<'a, T>) -> SpinLockGuard<'a, T> {
        let lock = guard.lock();
        let mut channels = channels();
        let entry = channels.entry(chan).or_default();
        entry.sleepers += 1;
        let seen = entry.wakeups;
        // Registered under CHANNELS: a wakeup for `chan` can no longer be missed.
        drop(guard);

        channels = WOKEN
            .wait_while(channels, |c| c.get(&chan).is_some_and(|e| e.wakeups == seen))
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = channels.get_mut(&chan) {
            entry.sleepers -= 1;
            if entry.sleepers == 0 {
                channels.remove(&chan);
            }
        }
        drop(channels);
        lock.lock()
    }

    fn wakeup(&self, chan: usize) {
        let mut channels = channels();
        if let Some(entry) = channels.get_mut(&chan) {
            entry.wakeups = entry.wakeups.wrapping_add(1);
            WOKEN.notify_all();
        }
    }
}
