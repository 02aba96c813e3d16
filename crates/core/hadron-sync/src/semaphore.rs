//! Counting semaphore.
//!
//! [`Semaphore`] is built from exactly two things: an atomic 32-bit permit
//! counter and the [`Futex`] wait/wake primitive keyed on that counter. There
//! is no internal lock. Every mutation is either an atomic add ([`post`]) or a
//! compare-and-swap ([`wait`]), and the loser of a race re-reads the counter
//! and tries again.
//!
//! Waiters only ever sleep on the value `0`. Since the kernel compares the
//! word and sleeps atomically with respect to wakes, a `post` that lands
//! between a waiter's load and its sleep makes the sleep return at once, so
//! no wakeup is lost.
//!
//! [`post`]: Semaphore::post
//! [`wait`]: Semaphore::wait

use core::fmt;
use core::time::Duration;
use std::time::Instant;

use crate::futex::{Futex, WaitWake};
use crate::loom_compat::Ordering;
use crate::stress::stress_delay;
use crate::sys::DefaultBackend;

/// A counting semaphore.
///
/// The counter starts at zero unless built with
/// [`with_permits`](Self::with_permits). [`wait`](Self::wait) consumes one
/// permit, blocking while none are available; [`post`](Self::post) and
/// [`post_many`](Self::post_many) produce them. No FIFO order is promised
/// among waiters.
///
/// # Example
///
/// ```ignore
/// static READY: Semaphore = Semaphore::new();
///
/// // Consumer:
/// READY.wait();
///
/// // Producer:
/// READY.post();
/// ```
pub struct Semaphore<B: WaitWake = DefaultBackend> {
    count: Futex<B>,
}

impl<B: WaitWake> Semaphore<B> {
    /// Creates a semaphore with no permits available.
    #[cfg(not(any(loom, shuttle)))]
    pub const fn new() -> Self {
        Self::with_permits(0)
    }

    /// Creates a semaphore holding `permits` permits.
    #[cfg(not(any(loom, shuttle)))]
    pub const fn with_permits(permits: u32) -> Self {
        Self {
            count: Futex::new(permits),
        }
    }

    /// Creates a semaphore with no permits available.
    #[cfg(any(loom, shuttle))]
    pub fn new() -> Self {
        Self::with_permits(0)
    }

    /// Creates a semaphore holding `permits` permits.
    #[cfg(any(loom, shuttle))]
    pub fn with_permits(permits: u32) -> Self {
        Self {
            count: Futex::new(permits),
        }
    }

    /// Returns a snapshot of the number of available permits.
    pub fn available_permits(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Commits the claim of one permit if the counter still reads `observed`.
    ///
    /// `observed` must be non-zero.
    #[inline]
    fn try_claim(&self, observed: u32) -> bool {
        debug_assert_ne!(observed, 0);
        stress_delay();
        self.count
            .compare_exchange_weak(observed, observed - 1, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Takes one permit, blocking until one is available.
    ///
    /// Cannot be cancelled. Use [`wait_timeout`](Self::wait_timeout) to
    /// bound the time spent blocked.
    pub fn wait(&self) {
        loop {
            let mut count = self.count.load(Ordering::Relaxed);
            while count == 0 {
                log::trace!("semaphore {:p}: no permits, blocking", self);
                self.count.wait(0);
                count = self.count.load(Ordering::Relaxed);
            }
            if self.try_claim(count) {
                return;
            }
        }
    }

    /// Takes one permit, blocking for at most `timeout`.
    ///
    /// Returns `true` if a permit was claimed. A zero `timeout` returns
    /// `false` without touching the counter, even if permits are available;
    /// use [`try_wait`](Self::try_wait) for a non-blocking attempt.
    ///
    /// The remaining budget is recomputed before every sleep, so spurious
    /// wakeups and lost races cannot stretch the call past its deadline.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if timeout.is_zero() {
            return false;
        }
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            // Beyond the clock's range: indistinguishable from forever.
            self.wait();
            return true;
        };

        loop {
            let mut count = self.count.load(Ordering::Relaxed);
            while count == 0 {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    log::trace!("semaphore {:p}: timed out after {:?}", self, timeout);
                    return false;
                }
                self.count.wait_timeout(0, remaining);
                count = self.count.load(Ordering::Relaxed);
            }
            if self.try_claim(count) {
                return true;
            }
        }
    }

    /// Takes one permit if one is available right now.
    ///
    /// Retries only when another thread changed the counter between the read
    /// and the compare-and-swap; never blocks.
    pub fn try_wait(&self) -> bool {
        let mut count = self.count.load(Ordering::Relaxed);
        loop {
            if count == 0 {
                return false;
            }
            stress_delay();
            match self.count.compare_exchange_weak(
                count,
                count - 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => count = actual,
            }
        }
    }

    /// Releases one permit and wakes one waiter.
    pub fn post(&self) {
        self.post_many(1);
    }

    /// Releases `amount` permits.
    ///
    /// A single permit wakes one waiter. More than one wakes every waiter;
    /// they race for the permits and the losers go back to sleep. Posting
    /// zero permits does nothing.
    ///
    /// # Panics
    ///
    /// With debug assertions, panics if the count would overflow. The count
    /// is left untouched in that case. Release builds wrap.
    pub fn post_many(&self, amount: u32) {
        if amount == 0 {
            return;
        }
        let mut prev = self.count.load(Ordering::Relaxed);
        loop {
            let next = match prev.checked_add(amount) {
                Some(next) => next,
                None if cfg!(debug_assertions) => {
                    panic!("semaphore permit count overflowed: {prev} + {amount}")
                }
                None => prev.wrapping_add(amount),
            };
            match self
                .count
                .compare_exchange_weak(prev, next, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => prev = actual,
            }
        }
        if amount == 1 {
            self.count.wake_one();
        } else {
            self.count.wake_all();
        }
    }

    /// Waits for a permit and returns a guard that posts it back on drop.
    pub fn acquire(&self) -> SemaphorePermit<'_, B> {
        self.wait();
        SemaphorePermit { sem: self }
    }

    /// Like [`acquire`](Self::acquire), bounded by `timeout`.
    ///
    /// Returns `None` if the timeout elapsed first.
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<SemaphorePermit<'_, B>> {
        self.wait_timeout(timeout)
            .then(|| SemaphorePermit { sem: self })
    }

    /// Tries to acquire a permit without blocking.
    ///
    /// Returns `Some(permit)` if a permit was available, `None` otherwise.
    pub fn try_acquire(&self) -> Option<SemaphorePermit<'_, B>> {
        self.try_wait().then(|| SemaphorePermit { sem: self })
    }
}

impl<B: WaitWake> Default for Semaphore<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: WaitWake> fmt::Debug for Semaphore<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("permits", &self.available_permits())
            .finish()
    }
}

/// RAII permit that posts back to the [`Semaphore`] on drop.
#[must_use = "dropping the permit releases it immediately"]
pub struct SemaphorePermit<'a, B: WaitWake = DefaultBackend> {
    sem: &'a Semaphore<B>,
}

impl<B: WaitWake> SemaphorePermit<'_, B> {
    /// Consumes the permit without returning it to the semaphore.
    pub fn forget(self) {
        core::mem::forget(self);
    }
}

impl<B: WaitWake> Drop for SemaphorePermit<'_, B> {
    fn drop(&mut self) {
        self.sem.post();
    }
}


#[cfg(loom)]
mod loom_tests {
    use loom::sync::Arc;
    use loom::thread;

    use super::*;

    /// Waiters spin through the model backend, so bound preemptions to keep
    /// the state space finite.
    fn model(f: impl Fn() + Sync + Send + 'static) {
        let mut builder = loom::model::Builder::new();
        builder.preemption_bound = Some(2);
        builder.check(f);
    }

    #[test]
    fn post_releases_blocked_waiter() {
        model(|| {
            let sem: Arc<Semaphore> = Arc::new(Semaphore::new());
            let waiter = {
                let sem = Arc::clone(&sem);
                thread::spawn(move || sem.wait())
            };
            sem.post();
            waiter.join().unwrap();
            assert_eq!(sem.available_permits(), 0);
        });
    }

    #[test]
    fn single_permit_claimed_once() {
        model(|| {
            let sem: Arc<Semaphore> = Arc::new(Semaphore::with_permits(1));
            let other = {
                let sem = Arc::clone(&sem);
                thread::spawn(move || sem.try_wait())
            };
            let here = sem.try_wait();
            let there = other.join().unwrap();
            assert!(here ^ there);
            assert_eq!(sem.available_permits(), 0);
        });
    }

    #[test]
    fn batched_post_feeds_two_waiters() {
        model(|| {
            let sem: Arc<Semaphore> = Arc::new(Semaphore::new());
            let waiters: Vec<_> = (0..2)
                .map(|_| {
                    let sem = Arc::clone(&sem);
                    thread::spawn(move || sem.wait())
                })
                .collect();
            sem.post_many(2);
            for waiter in waiters {
                waiter.join().unwrap();
            }
            assert_eq!(sem.available_permits(), 0);
        });
    }
}

#[cfg(all(shuttle, not(loom)))]
mod shuttle_tests {
    use std::sync::Arc;

    use shuttle::thread;

    use super::*;

    #[test]
    fn waits_never_outnumber_posts() {
        shuttle::check_random(
            || {
                let sem: Arc<Semaphore> = Arc::new(Semaphore::new());
                let waiters: Vec<_> = (0..3)
                    .map(|_| {
                        let sem = Arc::clone(&sem);
                        thread::spawn(move || sem.wait())
                    })
                    .collect();
                let poster = {
                    let sem = Arc::clone(&sem);
                    thread::spawn(move || {
                        sem.post();
                        sem.post_many(2);
                        sem.post();
                    })
                };
                poster.join().unwrap();
                for waiter in waiters {
                    waiter.join().unwrap();
                }
                assert_eq!(sem.available_permits(), 1);
            },
            1000,
        );
    }
}
