//! Raw word wait/wake primitive.
//!
//! A [`Futex`] is an [`AtomicU32`] plus the ability to sleep until another
//! thread changes it. The actual blocking is delegated to a [`WaitWake`]
//! backend (see [`crate::sys`]), which keeps the semaphore and condition
//! variable protocols portable across platforms and model checkers.
//!
//! A return from [`Futex::wait`] proves nothing: the backend may wake
//! spuriously, and a wake intended for one waiter may be observed by another.
//! Callers always re-check their predicate in a loop.

use core::fmt;
use core::marker::PhantomData;
use core::time::Duration;

use crate::error::{FutexError, platform_failure};
use crate::loom_compat::{AtomicU32, Ordering};
use crate::sys::DefaultBackend;

/// Outcome of a single backend wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The thread was woken, possibly spuriously.
    Woken,
    /// The word no longer held the expected value, so the thread never slept.
    ValueChanged,
    /// The timeout elapsed before any wake arrived.
    TimedOut,
}

/// A word-keyed wait/wake mechanism.
///
/// Implementations must uphold the futex contract: `wait` compares the word
/// against `expected` and goes to sleep as one atomic step with respect to
/// `wake_*` on the same word, so a wake issued after the word changed can
/// never be lost.
pub trait WaitWake {
    /// Blocks while `word == expected`, for at most `timeout` if given.
    ///
    /// # Errors
    ///
    /// Returns [`FutexError`] only when the platform fails in a way that is
    /// not part of the normal protocol (timeouts and spurious wakeups are
    /// reported through [`WaitStatus`]).
    fn wait(
        word: &AtomicU32,
        expected: u32,
        timeout: Option<Duration>,
    ) -> Result<WaitStatus, FutexError>;

    /// Wakes at most one thread blocked on `word`. Returns how many were woken.
    ///
    /// # Errors
    ///
    /// Returns [`FutexError`] if the platform rejected the wake.
    fn wake_one(word: &AtomicU32) -> Result<usize, FutexError>;

    /// Wakes every thread blocked on `word`. Returns how many were woken.
    ///
    /// # Errors
    ///
    /// Returns [`FutexError`] if the platform rejected the wake.
    fn wake_all(word: &AtomicU32) -> Result<usize, FutexError>;
}

/// An atomic 32-bit word that threads can sleep on.
///
/// All control-flow decisions must read the word through [`Futex::load`];
/// the value is never observed torn.
pub struct Futex<B: WaitWake = DefaultBackend> {
    word: AtomicU32,
    _backend: PhantomData<fn() -> B>,
}

impl<B: WaitWake> Futex<B> {
    /// Creates a new futex word holding `value`.
    #[cfg(not(any(loom, shuttle)))]
    pub const fn new(value: u32) -> Self {
        Self {
            word: AtomicU32::new(value),
            _backend: PhantomData,
        }
    }

    /// Creates a new futex word holding `value`.
    #[cfg(any(loom, shuttle))]
    pub fn new(value: u32) -> Self {
        Self {
            word: AtomicU32::new(value),
            _backend: PhantomData,
        }
    }

    /// Atomically loads the current value.
    #[inline]
    pub fn load(&self, order: Ordering) -> u32 {
        self.word.load(order)
    }

    /// Atomically stores `value`.
    #[inline]
    pub fn store(&self, value: u32, order: Ordering) {
        self.word.store(value, order);
    }

    /// Atomically adds `value`, wrapping on overflow. Returns the previous value.
    #[inline]
    pub fn fetch_add(&self, value: u32, order: Ordering) -> u32 {
        self.word.fetch_add(value, order)
    }

    /// Stores `new` if the word still equals `current`.
    ///
    /// # Errors
    ///
    /// Returns the value actually observed if it differed from `current`.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: u32,
        new: u32,
        success: Ordering,
        failure: Ordering,
    ) -> Result<u32, u32> {
        self.word.compare_exchange(current, new, success, failure)
    }

    /// Like [`compare_exchange`](Self::compare_exchange), but may fail
    /// spuriously. Only useful inside a retry loop.
    ///
    /// # Errors
    ///
    /// Returns the value observed on failure, which may equal `current`.
    #[inline]
    pub fn compare_exchange_weak(
        &self,
        current: u32,
        new: u32,
        success: Ordering,
        failure: Ordering,
    ) -> Result<u32, u32> {
        self.word.compare_exchange_weak(current, new, success, failure)
    }

    /// Blocks while the word equals `expected`.
    ///
    /// Returns immediately if the word already differs. Otherwise sleeps
    /// until a [`wake_one`](Self::wake_one)/[`wake_all`](Self::wake_all) or
    /// a spurious wakeup.
    ///
    /// # Panics
    ///
    /// Panics if the backend fails outside its contract.
    pub fn wait(&self, expected: u32) {
        if self.word.load(Ordering::Relaxed) != expected {
            return;
        }
        if let Err(err) = B::wait(&self.word, expected, None) {
            platform_failure("Futex::wait", &err);
        }
    }

    /// Blocks while the word equals `expected`, for at most `timeout`.
    ///
    /// Returns `false` if the timeout elapsed first, `true` otherwise
    /// (including when the word had already changed). A zero `timeout`
    /// returns `false` without looking at the word.
    ///
    /// # Panics
    ///
    /// Panics if the backend fails outside its contract.
    pub fn wait_timeout(&self, expected: u32, timeout: Duration) -> bool {
        if timeout.is_zero() {
            return false;
        }
        if self.word.load(Ordering::Relaxed) != expected {
            return true;
        }
        match B::wait(&self.word, expected, Some(timeout)) {
            Ok(WaitStatus::TimedOut) => false,
            Ok(WaitStatus::Woken | WaitStatus::ValueChanged) => true,
            Err(err) => platform_failure("Futex::wait_timeout", &err),
        }
    }

    /// Wakes at most one thread blocked on this word.
    ///
    /// Returns `true` if the backend reports that a thread was woken.
    ///
    /// # Panics
    ///
    /// Panics if the backend fails outside its contract.
    pub fn wake_one(&self) -> bool {
        match B::wake_one(&self.word) {
            Ok(woken) => woken > 0,
            Err(err) => platform_failure("Futex::wake_one", &err),
        }
    }

    /// Wakes every thread blocked on this word. Returns how many were woken.
    ///
    /// # Panics
    ///
    /// Panics if the backend fails outside its contract.
    pub fn wake_all(&self) -> usize {
        match B::wake_all(&self.word) {
            Ok(woken) => woken,
            Err(err) => platform_failure("Futex::wake_all", &err),
        }
    }
}

impl<B: WaitWake> Default for Futex<B> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<B: WaitWake> fmt::Debug for Futex<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Futex")
            .field("value", &self.word.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(all(test, not(any(loom, shuttle))))]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering as StdOrdering};
    use std::thread;
    use std::time::Instant;

    use super::*;
    use crate::sys::ParkingLotFutex;

    #[test]
    fn wait_returns_when_value_differs() {
        let futex: Futex = Futex::new(5);
        // Would block forever if the mismatch were not detected.
        futex.wait(4);
        assert_eq!(futex.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn zero_timeout_never_inspects_word() {
        let futex: Futex = Futex::new(1);
        // The word differs, but a zero budget still reports a timeout.
        assert!(!futex.wait_timeout(0, Duration::ZERO));
        assert!(!futex.wait_timeout(1, Duration::ZERO));
    }

    #[test]
    fn wait_timeout_reports_changed_value() {
        let futex: Futex = Futex::new(3);
        assert!(futex.wait_timeout(0, Duration::from_secs(5)));
    }

    #[test]
    fn atomic_word_operations() {
        let futex: Futex = Futex::default();
        assert_eq!(futex.fetch_add(2, Ordering::Relaxed), 0);
        assert_eq!(
            futex.compare_exchange(2, 7, Ordering::AcqRel, Ordering::Relaxed),
            Ok(2)
        );
        assert_eq!(
            futex.compare_exchange(2, 9, Ordering::AcqRel, Ordering::Relaxed),
            Err(7)
        );
        futex.store(11, Ordering::Relaxed);
        assert_eq!(format!("{futex:?}"), "Futex { value: 11 }");
    }

    #[test]
    fn wake_without_waiters() {
        let futex: Futex = Futex::new(0);
        assert!(!futex.wake_one());
        assert_eq!(futex.wake_all(), 0);
    }

    fn times_out<B: WaitWake>() {
        let futex = Futex::<B>::new(0);
        let start = Instant::now();
        assert!(!futex.wait_timeout(0, Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(15));
        assert_eq!(futex.load(Ordering::Relaxed), 0);
    }

    fn wakes_blocked_waiter<B: WaitWake + 'static>() {
        let futex = Arc::new(Futex::<B>::new(0));
        let waiter = {
            let futex = Arc::clone(&futex);
            thread::spawn(move || {
                while futex.load(Ordering::Acquire) == 0 {
                    futex.wait(0);
                }
            })
        };
        thread::sleep(Duration::from_millis(10));
        futex.store(1, Ordering::Release);
        futex.wake_one();
        waiter.join().unwrap();
    }

    fn wake_all_releases_everyone<B: WaitWake + 'static>() {
        let futex = Arc::new(Futex::<B>::new(0));
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let futex = Arc::clone(&futex);
                thread::spawn(move || {
                    while futex.load(Ordering::Acquire) == 0 {
                        futex.wait(0);
                    }
                })
            })
            .collect();
        thread::sleep(Duration::from_millis(10));
        futex.store(1, Ordering::Release);
        futex.wake_all();
        for waiter in waiters {
            waiter.join().unwrap();
        }
    }

    fn wake_one_releases_single_waiter<B: WaitWake + 'static>() {
        let futex = Arc::new(Futex::<B>::new(0));
        let returned = Arc::new(AtomicUsize::new(0));
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let (futex, returned) = (Arc::clone(&futex), Arc::clone(&returned));
                thread::spawn(move || {
                    futex.wait(0);
                    returned.fetch_add(1, StdOrdering::SeqCst);
                })
            })
            .collect();
        // Give every waiter time to block.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(returned.load(StdOrdering::SeqCst), 0);

        assert!(futex.wake_one());
        let deadline = Instant::now() + Duration::from_secs(5);
        while returned.load(StdOrdering::SeqCst) == 0 && Instant::now() < deadline {
            thread::yield_now();
        }
        thread::sleep(Duration::from_millis(20));
        assert_eq!(returned.load(StdOrdering::SeqCst), 1);

        futex.wake_all();
        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert_eq!(returned.load(StdOrdering::SeqCst), 3);
    }

    #[test]
    fn default_backend_times_out() {
        times_out::<DefaultBackend>();
    }

    #[test]
    fn default_backend_wakes_blocked_waiter() {
        wakes_blocked_waiter::<DefaultBackend>();
    }

    #[test]
    fn default_backend_wake_all() {
        wake_all_releases_everyone::<DefaultBackend>();
    }

    #[test]
    fn default_backend_wake_one_releases_one() {
        wake_one_releases_single_waiter::<DefaultBackend>();
    }

    #[test]
    fn parking_backend_times_out() {
        times_out::<ParkingLotFutex>();
    }

    #[test]
    fn parking_backend_wakes_blocked_waiter() {
        wakes_blocked_waiter::<ParkingLotFutex>();
    }

    #[test]
    fn parking_backend_wake_all() {
        wake_all_releases_everyone::<ParkingLotFutex>();
    }

    #[test]
    fn parking_backend_wake_one_releases_one() {
        wake_one_releases_single_waiter::<ParkingLotFutex>();
    }
}
