//! Error types for the wait/wake layer.
//!
//! Expected outcomes (timeouts, spurious wakeups, a word that already
//! changed) are reported through [`WaitStatus`](crate::WaitStatus), never as
//! errors. [`FutexError`] is reserved for a backend that failed in a way the
//! caller cannot correct, and the [`Futex`](crate::Futex) wrapper escalates it
//! to [`platform_failure`].

use std::io;

/// A wait/wake backend failed unexpectedly.
#[derive(Debug, thiserror::Error)]
pub enum FutexError {
    /// The kernel rejected the request with an errno the protocol does not expect.
    #[error("futex syscall failed: {0}")]
    Os(#[from] io::Error),
    /// The backend cannot block on this platform.
    #[error("futex wait is not supported by this backend")]
    Unsupported,
}

/// Reports a broken platform integration and aborts the calling thread.
///
/// There is no corrective action at this layer: the caller cannot tell a
/// transient failure from a backend that will never block correctly.
#[cold]
#[inline(never)]
#[track_caller]
pub(crate) fn platform_failure(op: &str, err: &FutexError) -> ! {
    log::error!("{op}: unrecoverable wait/wake failure: {err}");
    panic!("{op}: unrecoverable wait/wake failure: {err}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_error_display_includes_errno_text() {
        let err = FutexError::from(io::Error::from_raw_os_error(22));
        let text = err.to_string();
        assert!(text.starts_with("futex syscall failed: "));
    }

    #[test]
    #[should_panic(expected = "unrecoverable wait/wake failure")]
    fn platform_failure_panics() {
        platform_failure("Futex::wait", &FutexError::Unsupported);
    }
}
