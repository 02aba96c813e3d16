//! Portable backend on top of `parking_lot_core`.

use core::time::Duration;
use std::time::Instant;

use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN, ParkResult};

use crate::error::FutexError;
use crate::futex::{WaitStatus, WaitWake};
use crate::loom_compat::{AtomicU32, Ordering};

/// Wait/wake through `parking_lot_core`'s address-keyed parking table.
///
/// The value check in `park`'s validation callback runs under the same bucket
/// lock that `unpark_*` takes, which gives the same no-lost-wakeup guarantee
/// as the kernel futex.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParkingLotFutex;

fn key(word: &AtomicU32) -> usize {
    core::ptr::from_ref(word) as usize
}

impl WaitWake for ParkingLotFutex {
    fn wait(
        word: &AtomicU32,
        expected: u32,
        timeout: Option<Duration>,
    ) -> Result<WaitStatus, FutexError> {
        // An unrepresentable deadline is as good as none.
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        // SAFETY: the callbacks neither panic nor call back into the parking
        // table, and the key is the address of a live word.
        let result = unsafe {
            parking_lot_core::park(
                key(word),
                || word.load(Ordering::Relaxed) == expected,
                || {},
                |_, _| {},
                DEFAULT_PARK_TOKEN,
                deadline,
            )
        };
        Ok(match result {
            ParkResult::Unparked(_) => WaitStatus::Woken,
            ParkResult::Invalid => WaitStatus::ValueChanged,
            ParkResult::TimedOut => WaitStatus::TimedOut,
        })
    }

    fn wake_one(word: &AtomicU32) -> Result<usize, FutexError> {
        // SAFETY: the callback does not touch the parking table.
        let result = unsafe { parking_lot_core::unpark_one(key(word), |_| DEFAULT_UNPARK_TOKEN) };
        Ok(result.unparked_threads)
    }

    fn wake_all(word: &AtomicU32) -> Result<usize, FutexError> {
        // SAFETY: the key is the address of a live word.
        Ok(unsafe { parking_lot_core::unpark_all(key(word), DEFAULT_UNPARK_TOKEN) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_word_is_invalid_park() {
        let word = AtomicU32::new(9);
        assert_eq!(
            ParkingLotFutex::wait(&word, 0, None).unwrap(),
            WaitStatus::ValueChanged
        );
    }

    #[test]
    fn short_wait_times_out() {
        let word = AtomicU32::new(0);
        assert_eq!(
            ParkingLotFutex::wait(&word, 0, Some(Duration::from_millis(1))).unwrap(),
            WaitStatus::TimedOut
        );
    }

    #[test]
    fn unpark_with_no_sleepers() {
        let word = AtomicU32::new(0);
        assert_eq!(ParkingLotFutex::wake_one(&word).unwrap(), 0);
        assert_eq!(ParkingLotFutex::wake_all(&word).unwrap(), 0);
    }
}
