//! Error taxonomy for the public control surface.
//!
//! Per-tick participant failures are not part of this taxonomy: they are
//! routed to the relevant [`ClockHandler`](crate::clockable::ClockHandler)
//! and never propagate to the caller of [`MasterClock`](crate::MasterClock).
//! This enum only covers misuse of the control surface and the "internal
//! invariant violation" category documented as unrecoverable.

use thiserror::Error;

/// Errors returned by [`MasterClock`](crate::MasterClock) control operations.
#[derive(Debug, Error)]
pub enum MasterClockError {
    /// `start` was called while the engine was already running.
    #[error("master clock is already running")]
    AlreadyRunning,

    /// `start` was called before a callback handler table was installed.
    #[error("callback handlers must be installed before start")]
    HandlersNotInstalled,

    /// The worker thread could not be spawned.
    #[error("failed to spawn master clock worker thread: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// An internal invariant was violated. This indicates a programming
    /// error in the scheduler itself rather than participant misbehavior,
    /// and is not expected to occur in a correct build.
    #[error("internal invariant violation: {0}")]
    Internal(String),
}
