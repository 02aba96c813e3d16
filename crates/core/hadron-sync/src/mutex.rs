//! Blocking mutual exclusion lock.
//!
//! [`Mutex`] hands the actual locking to the platform's raw mutex
//! (`parking_lot::RawMutex`, driven through the `lock_api::RawMutex` trait)
//! and adds the guard, the protected data and, under `cfg(hadron_lock_debug)`,
//! owner tracking that turns a same-thread re-lock into a panic instead of a
//! silent deadlock.

use core::cell::UnsafeCell;
use core::fmt;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
#[cfg(hadron_lock_debug)]
use core::sync::atomic::{AtomicUsize, Ordering};

use lock_api::{GetThreadId, RawMutex as _};

/// The platform lock every [`Mutex`] delegates to.
pub(crate) type RawMutex = parking_lot::RawMutex;

/// Returns a non-zero identifier for the calling thread.
pub(crate) fn current_thread_id() -> usize {
    parking_lot::RawThreadId::INIT.nonzero_thread_id().get()
}

/// A blocking mutual exclusion lock.
///
/// Contended callers sleep in the platform lock rather than spinning.
/// Const-constructable so it can be placed in `static` items.
pub struct Mutex<T: ?Sized> {
    raw: RawMutex,
    #[cfg(hadron_lock_debug)]
    owner: AtomicUsize,
    data: UnsafeCell<T>,
}

// SAFETY: The Mutex ensures exclusive access to `T` through the raw lock.
// `T: Send` is required because the data may be accessed from different threads.
unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates a new unlocked `Mutex` wrapping `value`.
    pub const fn new(value: T) -> Self {
        Self {
            raw: RawMutex::INIT,
            #[cfg(hadron_lock_debug)]
            owner: AtomicUsize::new(0),
            data: UnsafeCell::new(value),
        }
    }

    /// Consumes the mutex and returns the protected value.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Acquires the lock, blocking until it becomes available.
    ///
    /// Returns a [`MutexGuard`] that releases the lock when dropped.
    ///
    /// # Panics
    ///
    /// With `cfg(hadron_lock_debug)`, panics if the calling thread already
    /// holds this lock.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        #[cfg(hadron_lock_debug)]
        {
            if self.owner.load(Ordering::Relaxed) == current_thread_id() {
                log::error!("Mutex {:p} re-locked by its owner", self);
                panic!("Mutex::lock() called by the thread already holding it");
            }
        }

        self.raw.lock();
        self.guard()
    }

    /// Attempts to acquire the lock without blocking.
    ///
    /// Returns `Some(guard)` if the lock was acquired, `None` if it was already held.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        if self.raw.try_lock() {
            Some(self.guard())
        } else {
            None
        }
    }

    /// Returns `true` if some thread currently holds the lock.
    ///
    /// Only a snapshot; the answer may be stale by the time it is used.
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// Returns a mutable reference to the data. No locking is needed since
    /// the borrow is exclusive.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Releases the lock without a guard.
    ///
    /// Pairs with a guard that was passed to [`core::mem::forget`].
    ///
    /// # Safety
    ///
    /// The lock must be held, and the caller must own the logical
    /// acquisition being released (no live guard may still refer to it).
    pub unsafe fn force_unlock(&self) {
        #[cfg(hadron_lock_debug)]
        self.owner.store(0, Ordering::Relaxed);

        // SAFETY: Upheld by the caller.
        unsafe { self.raw.unlock() };
    }

    /// Builds a guard for an acquisition that just succeeded.
    fn guard(&self) -> MutexGuard<'_, T> {
        #[cfg(hadron_lock_debug)]
        self.owner.store(current_thread_id(), Ordering::Relaxed);

        MutexGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Mutex");
        match self.try_lock() {
            Some(guard) => {
                d.field("data", &&*guard);
            }
            None => {
                d.field("data", &format_args!("<locked>"));
            }
        }
        d.finish()
    }
}

/// RAII guard that releases the [`Mutex`] when dropped.
///
/// Not `Send`: the platform lock must be released by the thread that took it.
#[must_use = "if unused the Mutex will immediately unlock"]
pub struct MutexGuard<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
    _not_send: PhantomData<*const ()>,
}

// SAFETY: Sharing the guard only hands out `&T`.
unsafe impl<T: ?Sized + Sync> Sync for MutexGuard<'_, T> {}

impl<'a, T: ?Sized> MutexGuard<'a, T> {
    /// Returns a reference to the underlying [`Mutex`].
    ///
    /// Used by [`Condvar::wait`](crate::Condvar::wait) to re-acquire after release.
    pub fn mutex_ref(&self) -> &'a Mutex<T> {
        self.mutex
    }
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: The guard guarantees exclusive access while it exists.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: The guard guarantees exclusive access while it exists.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: The guard is proof that this thread holds the lock.
        unsafe { self.mutex.force_unlock() };
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn lock_unlock() {
        let lock = Mutex::new(42);
        {
            let guard = lock.lock();
            assert_eq!(*guard, 42);
            assert!(lock.is_locked());
        }
        // Lock is released after guard is dropped.
        assert!(!lock.is_locked());
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn try_lock_fails_when_held() {
        let lock = Mutex::new(10);
        let _guard = lock.lock();
        assert!(lock.try_lock().is_none());
    }

    #[test]
    fn mutate_through_guard() {
        let lock = Mutex::new(String::from("hello"));
        lock.lock().push_str(" world");
        assert_eq!(&*lock.lock(), "hello world");
    }

    #[test]
    fn get_mut_and_into_inner() {
        let mut lock = Mutex::new(vec![1, 2]);
        lock.get_mut().push(3);
        assert_eq!(lock.into_inner(), vec![1, 2, 3]);
    }

    #[test]
    fn force_unlock_after_forget() {
        let lock = Mutex::new(());
        core::mem::forget(lock.lock());
        assert!(lock.is_locked());
        // SAFETY: The forgotten guard's acquisition is still outstanding.
        unsafe { lock.force_unlock() };
        assert!(!lock.is_locked());
    }

    #[test]
    fn guard_mutex_ref_points_back() {
        let lock = Mutex::new(1);
        let guard = lock.lock();
        assert!(core::ptr::eq(guard.mutex_ref(), &lock));
    }

    #[test]
    fn debug_reports_locked_state() {
        let lock = Mutex::new(7);
        assert_eq!(format!("{lock:?}"), "Mutex { data: 7 }");
        let _guard = lock.lock();
        assert_eq!(format!("{lock:?}"), "Mutex { data: <locked> }");
    }

    #[test]
    fn excludes_concurrent_writers() {
        let counter = Arc::new(Mutex::new(0u64));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        *counter.lock() += 1;
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*counter.lock(), 8000);
    }

    #[test]
    fn thread_ids_are_distinct() {
        let here = current_thread_id();
        let there = thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(here, 0);
        assert_ne!(here, there);
    }

    #[cfg(hadron_lock_debug)]
    #[test]
    #[should_panic(expected = "already holding it")]
    fn relock_by_owner_panics() {
        let lock = Mutex::new(0);
        let _guard = lock.lock();
        let _again = lock.lock();
    }
}
