//! Contention stress delays.
//!
//! Injects random spin delays between observing shared state and committing
//! a compare-and-swap, widening race windows so that retry paths actually run
//! under test. Disabled until [`init`] or [`init_from_env`] sets a non-zero
//! maximum delay.
//!
//! ## Design
//!
//! - **PRNG**: xorshift64, per-thread state in a `thread_local!` cell, no
//!   locking. Each thread derives its seed from the global seed and the order
//!   in which it first drew a number.
//! - **Timing**: spins against [`Instant`] (monotonic).
//! - **Delay**: a random duration in `[0, max_us)` microseconds.

use core::cell::Cell;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Environment variable holding the maximum delay in microseconds.
pub const MAX_US_ENV: &str = "HADRON_SYNC_STRESS_MAX_US";

/// Environment variable holding the PRNG seed.
pub const SEED_ENV: &str = "HADRON_SYNC_STRESS_SEED";

/// Substituted for a zero seed; zero is the xorshift fixed point.
const FALLBACK_SEED: u64 = 0xDEAD_BEEF_CAFE_BABE;

/// Maximum stress delay in microseconds. Zero disables delays.
static MAX_US: AtomicU32 = AtomicU32::new(0);

/// Base seed shared by all threads.
static SEED: AtomicU64 = AtomicU64::new(FALLBACK_SEED);

/// Bumped whenever `init` runs so threads re-seed lazily.
static GENERATION: AtomicU64 = AtomicU64::new(0);

/// Hands out a distinct index to each thread that seeds its PRNG.
static NEXT_THREAD: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// `(generation, xorshift state)`; state 0 means "not seeded yet".
    static PRNG_STATE: Cell<(u64, u64)> = const { Cell::new((0, 0)) };
}

/// Stress settings, usually read from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressConfig {
    /// Maximum random delay in microseconds.
    pub max_us: u32,
    /// Initial PRNG seed. Zero selects a fixed fallback.
    pub seed: u64,
}

impl StressConfig {
    /// Reads [`MAX_US_ENV`] and [`SEED_ENV`].
    ///
    /// Returns `None` if the maximum delay is unset or unparsable. A missing
    /// or malformed seed falls back to 0.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let raw = lookup(MAX_US_ENV)?;
        let max_us = match raw.trim().parse::<u32>() {
            Ok(max_us) => max_us,
            Err(err) => {
                log::warn!("ignoring {MAX_US_ENV}={raw:?}: {err}");
                return None;
            }
        };
        let seed = lookup(SEED_ENV)
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .unwrap_or(0);
        Some(Self { max_us, seed })
    }
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

/// Initializes the stress delay subsystem.
///
/// - `max_us`: maximum random delay in microseconds. 0 disables delays.
/// - `seed`: initial PRNG seed. If 0, a fallback constant is used to avoid a
///   stuck-at-zero xorshift.
pub fn init(max_us: u32, seed: u64) {
    let seed = if seed == 0 { FALLBACK_SEED } else { seed };
    SEED.store(seed, Ordering::Relaxed);
    GENERATION.fetch_add(1, Ordering::Relaxed);
    MAX_US.store(max_us, Ordering::Release);
    log::debug!("lock stress: max_us={max_us} seed={seed:#x}");
}

/// Applies [`StressConfig::from_env`] if the environment enables stress.
///
/// Returns whether a configuration was found.
pub fn init_from_env() -> bool {
    init_from_lookup(|key| std::env::var(key).ok())
}

fn init_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> bool {
    match StressConfig::from_lookup(lookup) {
        Some(config) => {
            init(config.max_us, config.seed);
            true
        }
        None => false,
    }
}

/// Returns `true` if delays are currently injected.
pub fn is_enabled() -> bool {
    MAX_US.load(Ordering::Relaxed) != 0
}

// ---------------------------------------------------------------------------
// PRNG
// ---------------------------------------------------------------------------

/// Derives a non-zero per-thread seed.
fn thread_seed() -> u64 {
    let index = NEXT_THREAD.fetch_add(1, Ordering::Relaxed);
    let base = SEED.load(Ordering::Relaxed);
    let seed = base
        .wrapping_add(index)
        .wrapping_mul(0x9E37_79B9_7F4A_7C15);
    if seed == 0 { base ^ 0x1234_5678 } else { seed }
}

/// Returns the next pseudo-random u64 for the current thread.
#[inline]
fn next_random() -> u64 {
    let generation = GENERATION.load(Ordering::Relaxed);
    PRNG_STATE.with(|cell| {
        let (seen, mut x) = cell.get();
        if x == 0 || seen != generation {
            x = thread_seed();
        }
        // xorshift64
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        cell.set((generation, x));
        x
    })
}

// ---------------------------------------------------------------------------
// Delay
// ---------------------------------------------------------------------------

/// Spins for a random duration in `[0, max_us)` microseconds.
///
/// A no-op until [`init`] sets a non-zero maximum.
///
/// Must not acquire any lock from this crate: it runs inside their
/// acquire paths.
#[inline]
pub fn stress_delay() {
    let max_us = MAX_US.load(Ordering::Acquire);
    if max_us == 0 {
        return;
    }

    let target_ns = next_random() % (u64::from(max_us) * 1000);
    if target_ns == 0 {
        return;
    }

    let target = Duration::from_nanos(target_ns);
    let start = Instant::now();
    while start.elapsed() < target {
        core::hint::spin_loop();
    }
}
