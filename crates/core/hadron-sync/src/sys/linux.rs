//! `futex(2)` backend.

use core::ptr;
use core::time::Duration;
use std::io;

use crate::error::FutexError;
use crate::futex::{WaitStatus, WaitWake};
use crate::loom_compat::AtomicU32;

/// Wait/wake through the Linux `futex(2)` syscall.
///
/// Uses `FUTEX_PRIVATE_FLAG`: the word is never shared across processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxFutex;

/// Converts a relative timeout, saturating seconds that overflow `time_t`.
#[allow(clippy::cast_possible_wrap, clippy::cast_lossless)]
fn to_timespec(timeout: Duration) -> libc::timespec {
    // SAFETY: `timespec` is plain integers (plus padding on some targets);
    // all-zero is a valid value.
    let mut ts: libc::timespec = unsafe { core::mem::zeroed() };
    ts.tv_sec = libc::time_t::try_from(timeout.as_secs()).unwrap_or(libc::time_t::MAX);
    // Always below 1e9, fits every `tv_nsec` width.
    ts.tv_nsec = timeout.subsec_nanos() as _;
    ts
}

/// Issues `FUTEX_WAKE` for up to `count` waiters.
fn wake(word: &AtomicU32, count: libc::c_int) -> Result<usize, FutexError> {
    // SAFETY: `word` is a live, aligned `u32` for the duration of the call;
    // FUTEX_WAKE ignores the remaining arguments.
    let woken = unsafe {
        libc::syscall(
            libc::SYS_futex,
            ptr::from_ref(word).cast::<u32>(),
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            count,
        )
    };
    if woken < 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(usize::try_from(woken).unwrap_or(usize::MAX))
}

impl WaitWake for LinuxFutex {
    fn wait(
        word: &AtomicU32,
        expected: u32,
        timeout: Option<Duration>,
    ) -> Result<WaitStatus, FutexError> {
        let ts = timeout.map(to_timespec);
        let ts_ptr = ts.as_ref().map_or(ptr::null(), ptr::from_ref);

        // SAFETY: `word` is a live, aligned `u32`; `ts_ptr` is null or points
        // at `ts`, which outlives the call. FUTEX_WAIT treats the timeout as
        // relative.
        let ret = unsafe {
            libc::syscall(
                libc::SYS_futex,
                ptr::from_ref(word).cast::<u32>(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                expected,
                ts_ptr,
            )
        };
        if ret == 0 {
            return Ok(WaitStatus::Woken);
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EAGAIN) => Ok(WaitStatus::ValueChanged),
            Some(libc::EINTR) => Ok(WaitStatus::Woken),
            Some(libc::ETIMEDOUT) => Ok(WaitStatus::TimedOut),
            _ => Err(err.into()),
        }
    }

    fn wake_one(word: &AtomicU32) -> Result<usize, FutexError> {
        wake(word, 1)
    }

    fn wake_all(word: &AtomicU32) -> Result<usize, FutexError> {
        wake(word, libc::c_int::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timespec_splits_seconds_and_nanos() {
        let ts = to_timespec(Duration::new(3, 250_000_000));
        assert_eq!(ts.tv_sec, 3);
        assert_eq!(ts.tv_nsec, 250_000_000);
    }

    #[test]
    fn timespec_saturates_huge_timeouts() {
        let ts = to_timespec(Duration::MAX);
        assert_eq!(ts.tv_sec, libc::time_t::MAX);
    }

    #[test]
    fn mismatched_word_reports_value_changed() {
        let word = AtomicU32::new(1);
        assert_eq!(
            LinuxFutex::wait(&word, 0, None).unwrap(),
            WaitStatus::ValueChanged
        );
    }

    #[test]
    fn short_wait_times_out() {
        let word = AtomicU32::new(0);
        assert_eq!(
            LinuxFutex::wait(&word, 0, Some(Duration::from_millis(1))).unwrap(),
            WaitStatus::TimedOut
        );
    }
}
