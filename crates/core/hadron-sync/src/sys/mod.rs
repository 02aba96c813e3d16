//! Wait/wake backends.
//!
//! - [`LinuxFutex`]: the `futex(2)` syscall with private `FUTEX_WAIT` /
//!   `FUTEX_WAKE`. Linux only.
//! - [`ParkingLotFutex`]: `parking_lot_core`'s global parking table keyed on
//!   the word's address. Works everywhere `parking_lot` does.
//! - `ModelFutex`: under `cfg(loom)` or `cfg(shuttle)`, every wait is a
//!   spurious wakeup that yields to the model scheduler.
//!
//! [`DefaultBackend`] picks the native backend for the target.

#[cfg(all(target_os = "linux", not(any(loom, shuttle))))]
mod linux;
#[cfg(any(loom, shuttle))]
mod model;
#[cfg(not(any(loom, shuttle)))]
mod parking;

#[cfg(all(target_os = "linux", not(any(loom, shuttle))))]
pub use linux::LinuxFutex;
#[cfg(any(loom, shuttle))]
pub use model::ModelFutex;
#[cfg(not(any(loom, shuttle)))]
pub use parking::ParkingLotFutex;

/// The backend used when a primitive is not given one explicitly.
#[cfg(all(target_os = "linux", not(any(loom, shuttle))))]
pub type DefaultBackend = LinuxFutex;

/// The backend used when a primitive is not given one explicitly.
#[cfg(all(not(target_os = "linux"), not(any(loom, shuttle))))]
pub type DefaultBackend = ParkingLotFutex;

/// The backend used when a primitive is not given one explicitly.
#[cfg(any(loom, shuttle))]
pub type DefaultBackend = ModelFutex;
