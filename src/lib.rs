//! `masterclock` — a deterministic multi-rate tick scheduler for
//! multi-chip emulator cores.
//!
//! A [`MasterClock`] coordinates a heterogeneous set of clocked
//! participants (CPU cores, timers, serial ports, A/D converters, and
//! other peripherals), each advertising its own nominal frequency in
//! hertz, and drives them forward in virtual time so that over any long
//! interval each participant receives approximately
//! `frequency × elapsed_seconds` activations. It tracks total elapsed
//! virtual time at picosecond resolution, supports dynamic add/remove/
//! enable/disable and frequency changes while running, and enforces a
//! linked-stop policy: disabling a CPU-class participant also disables
//! every peripheral bound to the same chip, and optionally cross-stops
//! peer chips under "sync play".
//!
//! This crate never sleeps, spins on a condition, or performs I/O on its
//! hot path: virtual time advances by integer addition on a single
//! dedicated worker thread, not by wall-clock pacing.
//!
//! ```no_run
//! use std::sync::Arc;
//! use masterclock::{ClockHandler, Clockable, ExitReason, MasterClock, MasterClockConfig, ParticipantFault, TickOutcome};
//!
//! struct Timer;
//! impl Clockable for Timer {
//!     fn frequency_hz(&self) -> u64 { 1000 }
//!     fn chip(&self) -> u32 { 0 }
//!     fn on_clock_tick(&self) -> Result<TickOutcome, ParticipantFault> { Ok(TickOutcome::Continue) }
//! }
//!
//! struct NoopHandler;
//! impl ClockHandler for NoopHandler {
//!     fn on_normal_exit(&self, _reason: &ExitReason) {}
//!     fn on_exception(&self, _error: &ParticipantFault) {}
//! }
//!
//! let clock = MasterClock::new(MasterClockConfig::default());
//! let id = clock.add(Arc::new(Timer), Some(0), true, true);
//! clock.set_callback_handlers(vec![Arc::new(NoopHandler)]).unwrap();
//! clock.start().unwrap();
//! # let _ = id;
//! # clock.stop();
//! # clock.join();
//! ```

mod clock;
mod clockable;
mod config;
mod engine;
mod error;
mod linked_stop;
mod math;
mod registry;
mod schedule;

pub use clock::MasterClock;
pub use clockable::{ClockHandler, Clockable, CpuEmulator, ExitReason, ParticipantFault, TickOutcome};
pub use config::{MasterClockConfig, ENV_PERIOD_WARNING_THRESHOLD, ENV_SYNC_PLAY};
pub use error::MasterClockError;
pub use math::{gcd_u32, gcd_u64, lcm_u32, lcm_u64};
pub use registry::{ClockableId, EntryKey};
pub use schedule::{ScheduleStats, DEFAULT_PERIOD_WARNING_THRESHOLD, PICOSECONDS_PER_SECOND};
