//! Model-checker compatibility shim.
//!
//! Under `cfg(loom)` or `cfg(shuttle)`, re-exports the checker's atomics and
//! `yield_now`. Otherwise, re-exports the standard types.
//!
//! The semaphore and futex word go through this module so their protocol can
//! be explored under a deterministic scheduler without code changes.

// ---------------------------------------------------------------------------
// Loom mode
// ---------------------------------------------------------------------------

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicU32, Ordering};
#[cfg(loom)]
pub(crate) use loom::thread::yield_now;

// ---------------------------------------------------------------------------
// Shuttle mode
// ---------------------------------------------------------------------------

#[cfg(all(shuttle, not(loom)))]
pub(crate) use shuttle::sync::atomic::{AtomicU32, Ordering};
#[cfg(all(shuttle, not(loom)))]
pub(crate) use shuttle::thread::yield_now;

// ---------------------------------------------------------------------------
// Normal mode
// ---------------------------------------------------------------------------

#[cfg(not(any(loom, shuttle)))]
pub(crate) use core::sync::atomic::{AtomicU32, Ordering};
