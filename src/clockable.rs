//! External capability interfaces consumed by the scheduler.
//!
//! CPU emulators, timers, serial ports, A/D converters and other
//! peripherals are opaque to this crate beyond these traits: a frequency,
//! a chip id, and a tick entry point.

use std::error::Error;
use std::fmt;

/// Reason a participant voluntarily stopped ticking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReason(pub String);

impl ExitReason {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a single [`Clockable::on_clock_tick`] activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The participant wishes to keep running.
    Continue,
    /// The participant is voluntarily stopping; carries a human-readable reason.
    Exit(ExitReason),
}

/// A fault raised by a participant's tick. Opaque to the scheduler: it is
/// only ever forwarded to the owning chip's [`ClockHandler::on_exception`].
pub type ParticipantFault = Box<dyn Error + Send + Sync>;

/// Any participant that can be activated periodically by the scheduler.
///
/// Implementations must be cheap to query (`frequency_hz`, `chip`) since
/// the schedule compiler reads them once per compile, and `on_clock_tick`
/// runs on the engine's single worker thread, so it must never block.
pub trait Clockable: Send + Sync {
    /// Nominal frequency in whole hertz. Zero means "currently silent": the
    /// entry is registered but never activated until the frequency becomes
    /// positive and a reschedule is requested.
    fn frequency_hz(&self) -> u64;

    /// Chip identifier used for linked-stop grouping.
    fn chip(&self) -> u32;

    /// Activate the participant once. Must not block or sleep.
    fn on_clock_tick(&self) -> Result<TickOutcome, ParticipantFault>;

    /// Downcast to the CPU-emulator marker capability, if implemented.
    ///
    /// The default implementation returns `None`; CPU-class participants
    /// override this to return `Some(self)`. The registry calls this once
    /// at registration time and caches the result on the entry, per the
    /// identity-based-type-check replacement documented for this crate.
    fn as_cpu_emulator(&self) -> Option<&dyn CpuEmulator> {
        None
    }
}

/// Marker sub-capability identifying participants to which the linked-stop
/// policy applies (CPU cores, as opposed to peripherals).
pub trait CpuEmulator: Clockable {}

/// Per-chip callback handler, invoked by the engine and the linked-stop
/// policy. The handler table is a flat array indexed by chip id, installed
/// once before `start` and read-only thereafter.
pub trait ClockHandler: Send + Sync {
    /// Invoked when an entry voluntarily exits or is stopped by the
    /// linked-stop policy (including synthetic cascade reasons).
    fn on_normal_exit(&self, reason: &ExitReason);

    /// Invoked when an entry's tick raised a fault.
    fn on_exception(&self, error: &ParticipantFault);
}
