//! Recursive (re-entrant) mutual exclusion lock.
//!
//! The owning thread may lock again without deadlocking; the lock is only
//! released once it has been unlocked as many times as it was locked.
//!
//! [`RawRecursiveMutex`] layers an owner thread id and a depth counter over
//! the platform mutex. Because it knows its owner, an unlock from the wrong
//! thread or an unbalanced extra unlock is detected and panics rather than
//! corrupting the platform lock.

use core::cell::UnsafeCell;
use core::fmt;
use core::marker::PhantomData;
use core::ops::Deref;
use core::sync::atomic::{AtomicUsize, Ordering};

use lock_api::RawMutex as _;

use crate::mutex::{RawMutex, current_thread_id};

/// Thread id stored in `owner` while nobody holds the lock.
const NO_OWNER: usize = 0;

/// A recursive lock without protected data.
///
/// Offers the explicit `lock`/`unlock` pairing directly;
/// [`RecursiveMutex`] wraps it in a scoped guard.
pub struct RawRecursiveMutex {
    raw: RawMutex,
    owner: AtomicUsize,
    depth: AtomicUsize,
}

impl RawRecursiveMutex {
    /// Creates a new unlocked recursive mutex.
    pub const fn new() -> Self {
        Self {
            raw: RawMutex::INIT,
            owner: AtomicUsize::new(NO_OWNER),
            depth: AtomicUsize::new(0),
        }
    }

    /// Re-enters if the calling thread already owns the lock.
    fn try_reenter(&self, me: usize) -> bool {
        // Only the owner can observe its own id here, so the depth is ours.
        if self.owner.load(Ordering::Relaxed) != me {
            return false;
        }
        let depth = self.depth.load(Ordering::Relaxed);
        let depth = depth
            .checked_add(1)
            .unwrap_or_else(|| panic!("RawRecursiveMutex lock depth overflowed"));
        self.depth.store(depth, Ordering::Relaxed);
        true
    }

    /// Records the calling thread as the owner of a fresh acquisition.
    fn take_ownership(&self, me: usize) {
        self.owner.store(me, Ordering::Relaxed);
        self.depth.store(1, Ordering::Relaxed);
    }

    /// Acquires the lock, blocking unless the calling thread already owns it.
    pub fn lock(&self) {
        let me = current_thread_id();
        if self.try_reenter(me) {
            return;
        }
        self.raw.lock();
        self.take_ownership(me);
    }

    /// Acquires the lock if it is free or already owned by the calling thread.
    pub fn try_lock(&self) -> bool {
        let me = current_thread_id();
        if self.try_reenter(me) {
            return true;
        }
        if self.raw.try_lock() {
            self.take_ownership(me);
            true
        } else {
            false
        }
    }

    /// Releases one level of ownership.
    ///
    /// The platform lock is released when the depth returns to zero.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not hold the lock, which includes
    /// an unlock past the matching number of `lock` calls.
    #[track_caller]
    pub fn unlock(&self) {
        if self.owner.load(Ordering::Relaxed) != current_thread_id() {
            log::error!("RawRecursiveMutex {:p}: unbalanced or foreign unlock", self);
            panic!("RawRecursiveMutex::unlock() called by a thread that does not hold it");
        }
        let depth = self.depth.load(Ordering::Relaxed) - 1;
        self.depth.store(depth, Ordering::Relaxed);
        if depth == 0 {
            self.owner.store(NO_OWNER, Ordering::Relaxed);
            // SAFETY: The owner check above proves this thread holds `raw`.
            unsafe { self.raw.unlock() };
        }
    }

    /// Returns `true` if any thread holds the lock.
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// Returns `true` if the calling thread holds the lock.
    pub fn is_owned_by_current_thread(&self) -> bool {
        self.owner.load(Ordering::Relaxed) == current_thread_id()
    }

    /// Returns how many times the calling thread has locked without
    /// unlocking; 0 if it does not hold the lock.
    pub fn depth(&self) -> usize {
        if self.is_owned_by_current_thread() {
            self.depth.load(Ordering::Relaxed)
        } else {
            0
        }
    }
}

impl Default for RawRecursiveMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RawRecursiveMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRecursiveMutex")
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

/// A recursive lock protecting a value.
///
/// Guards only give shared access: the same thread may hold several at
/// once, so handing out `&mut T` would alias. Pair with a `Cell` or
/// `RefCell` for interior mutation.
pub struct RecursiveMutex<T: ?Sized> {
    raw: RawRecursiveMutex,
    data: UnsafeCell<T>,
}

// SAFETY: Only one thread at a time can hold guards, and guards only hand
// out `&T`; `T: Send` suffices because `T` never crosses threads while shared.
unsafe impl<T: ?Sized + Send> Send for RecursiveMutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for RecursiveMutex<T> {}

impl<T> RecursiveMutex<T> {
    /// Creates a new unlocked `RecursiveMutex` wrapping `value`.
    pub const fn new(value: T) -> Self {
        Self {
            raw: RawRecursiveMutex::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Consumes the lock and returns the protected value.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> RecursiveMutex<T> {
    /// Acquires the lock, re-entering if this thread already holds it.
    pub fn lock(&self) -> RecursiveMutexGuard<'_, T> {
        self.raw.lock();
        RecursiveMutexGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Attempts to acquire the lock without blocking.
    pub fn try_lock(&self) -> Option<RecursiveMutexGuard<'_, T>> {
        if self.raw.try_lock() {
            Some(RecursiveMutexGuard {
                lock: self,
                _not_send: PhantomData,
            })
        } else {
            None
        }
    }

    /// Returns the underlying raw lock, for inspecting ownership and depth.
    pub fn raw(&self) -> &RawRecursiveMutex {
        &self.raw
    }

    /// Returns a mutable reference to the data without locking.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RecursiveMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("RecursiveMutex");
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

/// RAII guard releasing one level of a [`RecursiveMutex`] when dropped.
#[must_use = "if unused the RecursiveMutex will immediately unlock"]
pub struct RecursiveMutexGuard<'a, T: ?Sized> {
    lock: &'a RecursiveMutex<T>,
    _not_send: PhantomData<*const ()>,
}

impl<T: ?Sized> Deref for RecursiveMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: The lock is held by this thread; only shared references
        // are ever produced.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for RecursiveMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.unlock();
    }
}
