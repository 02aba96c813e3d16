//! Futex-backed synchronization primitives for Hadron host tooling.
//!
//! The centerpiece is [`Semaphore`], a counting semaphore built from nothing
//! but an atomic 32-bit counter and a raw word wait/wake primitive
//! ([`Futex`]). The lock types ([`Mutex`], [`RwLock`], [`RecursiveMutex`])
//! delegate mutual exclusion to `parking_lot`'s raw locks through the
//! `lock_api` traits, and [`Condvar`] is a sequence counter on a [`Futex`].
//!
//! Every primitive here can be model-checked: build with `--cfg loom` or
//! `--cfg shuttle` and the atomics and the wait/wake backend switch to the
//! checker's versions.

#![warn(missing_docs)]

pub mod condvar;
pub mod error;
pub mod futex;
pub mod mutex;
pub mod recursive;
pub mod rwlock;
pub mod semaphore;
pub mod stress;
pub mod sys;

pub(crate) mod loom_compat;

pub use condvar::Condvar;
pub use error::FutexError;
pub use futex::{Futex, WaitStatus, WaitWake};
pub use mutex::{Mutex, MutexGuard};
pub use recursive::{RawRecursiveMutex, RecursiveMutex, RecursiveMutexGuard};
pub use rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use semaphore::{Semaphore, SemaphorePermit};
pub use sys::DefaultBackend;
