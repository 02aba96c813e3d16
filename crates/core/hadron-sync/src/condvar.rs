//! Condition variable for blocking threads.
//!
//! [`Condvar`] lets a thread holding a [`Mutex`] atomically release it, sleep
//! until notified, and re-acquire it. The notification state is a single
//! sequence number on a [`Futex`]: waiters sleep on the value they read while
//! still holding the lock, and every notify bumps it before waking. A notify
//! that lands between the unlock and the sleep therefore makes the sleep
//! return at once.
//!
//! Wakeups may be spurious, and a notification meant for one predicate may
//! wake a waiter on another. Always re-check the predicate in a loop, or use
//! [`Condvar::wait_while`].

use core::fmt;
use core::time::Duration;

use crate::futex::{Futex, WaitWake};
use crate::loom_compat::Ordering;
use crate::mutex::MutexGuard;
use crate::sys::DefaultBackend;

/// A condition variable.
///
/// Threads call [`wait`](Condvar::wait) to atomically release a lock and
/// sleep until [`notify_one`](Condvar::notify_one) or
/// [`notify_all`](Condvar::notify_all) is called.
///
/// # Example
///
/// ```ignore
/// static READY: Mutex<bool> = Mutex::new(false);
/// static COND: Condvar = Condvar::new();
///
/// // Waiter:
/// let mut guard = READY.lock();
/// while !*guard {
///     guard = COND.wait(guard);
/// }
///
/// // Notifier:
/// *READY.lock() = true;
/// COND.notify_one();
/// ```
pub struct Condvar<B: WaitWake = DefaultBackend> {
    seq: Futex<B>,
}

impl<B: WaitWake> Condvar<B> {
    /// Creates a new condition variable.
    #[cfg(not(any(loom, shuttle)))]
    pub const fn new() -> Self {
        Self { seq: Futex::new(0) }
    }

    /// Creates a new condition variable.
    #[cfg(any(loom, shuttle))]
    pub fn new() -> Self {
        Self { seq: Futex::new(0) }
    }

    /// Atomically releases the [`MutexGuard`], waits for notification,
    /// then re-acquires and returns a new guard.
    ///
    /// The caller should always recheck the predicate in a loop:
    /// ```ignore
    /// while !condition {
    ///     guard = condvar.wait(guard);
    /// }
    /// ```
    pub fn wait<'a, T: ?Sized>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let mutex = guard.mutex_ref();
        // Read under the lock: any notify for a state change we have not
        // seen yet must bump the sequence after this point.
        let seq = self.seq.load(Ordering::Relaxed);
        drop(guard);

        self.seq.wait(seq);

        mutex.lock()
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout`.
    ///
    /// Returns the re-acquired guard and `false` if the timeout elapsed
    /// without a wakeup. `true` means the thread was woken, which is not
    /// proof that the predicate changed. A zero `timeout` returns `false`
    /// immediately without releasing the lock.
    pub fn wait_timeout<'a, T: ?Sized>(
        &self,
        guard: MutexGuard<'a, T>,
        timeout: Duration,
    ) -> (MutexGuard<'a, T>, bool) {
        if timeout.is_zero() {
            return (guard, false);
        }
        let mutex = guard.mutex_ref();
        let seq = self.seq.load(Ordering::Relaxed);
        drop(guard);

        let woken = self.seq.wait_timeout(seq, timeout);

        (mutex.lock(), woken)
    }

    /// Blocks while `condition` returns `true`, re-checking after every
    /// wakeup. Returns with the lock held and the condition false.
    pub fn wait_while<'a, T: ?Sized, F>(
        &self,
        mut guard: MutexGuard<'a, T>,
        mut condition: F,
    ) -> MutexGuard<'a, T>
    where
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut *guard) {
            guard = self.wait(guard);
        }
        guard
    }

    /// Wakes one waiting thread (signal).
    pub fn notify_one(&self) {
        self.seq.fetch_add(1, Ordering::Relaxed);
        self.seq.wake_one();
    }

    /// Wakes all waiting threads (broadcast).
    pub fn notify_all(&self) {
        self.seq.fetch_add(1, Ordering::Relaxed);
        self.seq.wake_all();
    }
}

impl<B: WaitWake> Default for Condvar<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: WaitWake> fmt::Debug for Condvar<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condvar").finish_non_exhaustive()
    }
}

#[cfg(all(test, not(any(loom, shuttle))))]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Instant;

    use super::*;
    use crate::Mutex;
    use crate::sys::ParkingLotFutex;

    #[test]
    fn notify_without_waiters() {
        let cv: Condvar = Condvar::new();
        cv.notify_one(); // should not panic
        cv.notify_all();
    }

    #[test]
    fn zero_timeout_keeps_lock() {
        let lock = Mutex::new(1);
        let cv: Condvar = Condvar::new();
        let (guard, woken) = cv.wait_timeout(lock.lock(), Duration::ZERO);
        assert!(!woken);
        assert!(lock.is_locked());
        assert_eq!(*guard, 1);
    }

    #[test]
    fn wait_timeout_elapses_and_relocks() {
        let lock = Mutex::new(0);
        let cv: Condvar = Condvar::new();
        let start = Instant::now();
        let (guard, woken) = cv.wait_timeout(lock.lock(), Duration::from_millis(10));
        assert!(!woken);
        assert!(start.elapsed() >= Duration::from_millis(5));
        assert!(lock.is_locked());
        drop(guard);
    }

    #[test]
    fn lock_is_released_while_waiting() {
        let pair = Arc::new((Mutex::new(false), Condvar::<DefaultBackend>::new()));
        let waiter = {
            let pair = Arc::clone(&pair);
            thread::spawn(move || {
                let (lock, cv) = &*pair;
                let guard = cv.wait_while(lock.lock(), |ready| !*ready);
                assert!(*guard);
            })
        };
        // If the waiter kept the lock, this would deadlock.
        thread::sleep(Duration::from_millis(10));
        let (lock, cv) = &*pair;
        *lock.lock() = true;
        cv.notify_one();
        waiter.join().unwrap();
    }

    fn broadcast_releases_all<B: WaitWake + 'static>() {
        let pair = Arc::new((Mutex::new(0u32), Condvar::<B>::new()));
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let pair = Arc::clone(&pair);
                thread::spawn(move || {
                    let (lock, cv) = &*pair;
                    let mut guard = lock.lock();
                    while *guard == 0 {
                        guard = cv.wait(guard);
                    }
                })
            })
            .collect();
        thread::sleep(Duration::from_millis(10));
        let (lock, cv) = &*pair;
        *lock.lock() = 1;
        cv.notify_all();
        for waiter in waiters {
            waiter.join().unwrap();
        }
    }

    fn timed_wait_reports_notification<B: WaitWake + 'static>() {
        let pair = Arc::new((Mutex::new(false), Condvar::<B>::new()));
        let holding = Arc::new(Barrier::new(2));
        let waiter = {
            let (pair, holding) = (Arc::clone(&pair), Arc::clone(&holding));
            thread::spawn(move || {
                let (lock, cv) = &*pair;
                let mut guard = lock.lock();
                holding.wait();
                let start = Instant::now();
                let mut woken = false;
                while !*guard {
                    let (next, signaled) = cv.wait_timeout(guard, Duration::from_secs(5));
                    guard = next;
                    woken = signaled;
                }
                assert!(lock.is_locked());
                (woken, start.elapsed())
            })
        };
        // The waiter holds the lock until it sleeps, so this store and the
        // notify land after it read the sequence.
        holding.wait();
        thread::sleep(Duration::from_millis(30));
        let (lock, cv) = &*pair;
        *lock.lock() = true;
        cv.notify_one();

        let (woken, elapsed) = waiter.join().unwrap();
        assert!(woken);
        assert!(elapsed < Duration::from_secs(2), "waited {elapsed:?}");
    }

    #[test]
    fn timed_wait_signaled_default_backend() {
        timed_wait_reports_notification::<DefaultBackend>();
    }

    #[test]
    fn timed_wait_signaled_parking_backend() {
        timed_wait_reports_notification::<ParkingLotFutex>();
    }

    #[test]
    fn notify_all_default_backend() {
        broadcast_releases_all::<DefaultBackend>();
    }

    #[test]
    fn notify_all_parking_backend() {
        broadcast_releases_all::<ParkingLotFutex>();
    }

    #[test]
    fn producer_consumer_handoff() {
        let state = Arc::new((Mutex::new(Vec::new()), Condvar::<DefaultBackend>::new()));
        let consumer = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                let (queue, cv) = &*state;
                let mut received = Vec::new();
                while received.len() < 100 {
                    let mut guard = cv.wait_while(queue.lock(), |q: &mut Vec<u32>| q.is_empty());
                    received.append(&mut *guard);
                }
                received
            })
        };
        let (queue, cv) = &*state;
        for i in 0..100 {
            queue.lock().push(i);
            cv.notify_one();
        }
        let received = consumer.join().unwrap();
        assert_eq!(received, (0..100).collect::<Vec<_>>());
    }
}
