//! Backend for `cfg(loom)` and `cfg(shuttle)` builds.

use core::time::Duration;

use crate::error::FutexError;
use crate::futex::{WaitStatus, WaitWake};
use crate::loom_compat::{AtomicU32, Ordering, yield_now};

/// Treats every wait as a spurious wakeup.
///
/// Blocking cannot be expressed to the model checker, so a waiter yields and
/// returns; the caller's re-check loop then behaves like a spin loop that the
/// scheduler knows how to explore. Wakes are no-ops.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelFutex;

impl WaitWake for ModelFutex {
    fn wait(
        word: &AtomicU32,
        expected: u32,
        _timeout: Option<Duration>,
    ) -> Result<WaitStatus, FutexError> {
        if word.load(Ordering::Relaxed) != expected {
            return Ok(WaitStatus::ValueChanged);
        }
        yield_now();
        Ok(WaitStatus::Woken)
    }

    fn wake_one(_word: &AtomicU32) -> Result<usize, FutexError> {
        Ok(0)
    }

    fn wake_all(_word: &AtomicU32) -> Result<usize, FutexError> {
        Ok(0)
    }
}
