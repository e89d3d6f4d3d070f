//! Public control surface: the `MasterClock` struct external code drives.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

use tracing::info;

use crate::clockable::{Clockable, ClockHandler};
use crate::config::MasterClockConfig;
use crate::engine;
use crate::error::MasterClockError;
use crate::registry::{ClockableId, EntryKey, Registry};
use crate::schedule::{CompiledSchedule, ScheduleStats};

/// State shared between the public handle and the worker thread.
pub(crate) struct ClockInner {
    pub registry: Registry,
    pub handlers: RwLock<Option<Vec<Arc<dyn ClockHandler>>>>,
    pub running: AtomicBool,
    pub reschedule_requested: AtomicBool,
    pub sync_play: AtomicBool,
    pub total_elapsed_ps: AtomicI64,
    pub period_warning_threshold: u64,
    pub stats: Mutex<ScheduleStats>,
    /// The compiled schedule and the index it was rotated to on the last
    /// stop, so a subsequent restart resumes mid-period rather than from
    /// scratch (see spec §9 "step-list rotation on stop").
    pub resume: Mutex<Option<(CompiledSchedule, usize)>>,
}

impl ClockInner {
    fn new(config: MasterClockConfig) -> Self {
        Self {
            registry: Registry::new(),
            handlers: RwLock::new(None),
            running: AtomicBool::new(false),
            reschedule_requested: AtomicBool::new(true),
            sync_play: AtomicBool::new(config.sync_play),
            total_elapsed_ps: AtomicI64::new(0),
            period_warning_threshold: config.period_warning_threshold,
            stats: Mutex::new(ScheduleStats::default()),
            resume: Mutex::new(None),
        }
    }
}

/// Deterministic multi-rate tick scheduler.
///
/// Cheap to clone-and-share: internally it is an `Arc`-backed handle, so
/// callers typically wrap it in their own `Arc` only if they need a single
/// shared instance across threads beyond what `MasterClock` already gives
/// them (every method here takes `&self`).
pub struct MasterClock {
    pub(crate) inner: Arc<ClockInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MasterClock {
    /// Construct a new, idle scheduler with no participants registered.
    pub fn new(config: MasterClockConfig) -> Self {
        Self {
            inner: Arc::new(ClockInner::new(config)),
            worker: Mutex::new(None),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<ClockInner> {
        &self.inner
    }

    /// Register a clockable. Idempotent: re-adding the same clockable
    /// (by pointer identity) re-enables its existing entry rather than
    /// duplicating it. Always requests a reschedule.
    pub fn add(
        &self,
        clockable: Arc<dyn Clockable>,
        callback_chip: Option<usize>,
        enabled: bool,
        precise: bool,
    ) -> ClockableId {
        let id = self.inner.registry.add(clockable, callback_chip, enabled, precise);
        self.request_reschedule();
        id
    }

    /// Remove a clockable by id or by reference. Absence is not an error.
    pub fn remove(&self, key: EntryKey<'_>) {
        self.inner.registry.remove(key);
        self.request_reschedule();
    }

    /// Enable a clockable; if it is CPU-class, also enables its chip's peripherals.
    pub fn enable(&self, key: EntryKey<'_>) {
        self.inner.registry.enable(key);
    }

    /// Disable exactly this entry (no cascade — see [`MasterClock::add`]'s
    /// sibling docs on the linked-stop policy, which only runs from inside
    /// the engine loop when a participant stops itself).
    pub fn disable(&self, key: EntryKey<'_>) {
        self.inner.registry.disable(key);
    }

    /// Install the chip-indexed callback handler table. Must be called
    /// before [`MasterClock::start`]; the table is read-only once running.
    pub fn set_callback_handlers(&self, handlers: Vec<Arc<dyn ClockHandler>>) -> Result<(), MasterClockError> {
        if self.inner.running.load(Ordering::Acquire) {
            return Err(MasterClockError::AlreadyRunning);
        }
        *self.inner.handlers.write().unwrap() = Some(handlers);
        Ok(())
    }

    /// Toggle cross-chip cascading stop.
    pub fn set_sync_play(&self, enabled: bool) {
        self.inner.sync_play.store(enabled, Ordering::Release);
    }

    /// Request that the schedule be recompiled at the next safe point
    /// (between steps). Safe to call from any thread at any time.
    pub fn request_reschedule(&self) {
        self.inner.reschedule_requested.store(true, Ordering::Release);
    }

    /// Zero the elapsed-time counter without stopping the clock.
    pub fn reset_elapsed(&self) {
        self.inner.total_elapsed_ps.store(0, Ordering::Release);
    }

    /// Total elapsed virtual time, in picoseconds.
    pub fn get_elapsed_ps(&self) -> i64 {
        self.inner.total_elapsed_ps.load(Ordering::Acquire)
    }

    /// Elapsed virtual time formatted as fixed-width `0000.000000000`
    /// milliseconds (4 integer digits, 9 fractional digits).
    pub fn get_formatted_elapsed_ms(&self) -> String {
        let ps = self.get_elapsed_ps().max(0);
        let ms_whole = ps / 1_000_000_000;
        let ps_remainder = ps % 1_000_000_000;
        format!("{ms_whole:04}.{ps_remainder:09}")
    }

    /// Diagnostics from the most recently compiled schedule.
    pub fn schedule_stats(&self) -> ScheduleStats {
        *self.inner.stats.lock().unwrap()
    }

    /// Whether the engine is currently running.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Cooperatively stop the engine: it finishes the current step, then
    /// exits and rotates the step list so a later restart resumes mid-period.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
    }

    /// Start the engine on a dedicated worker thread. Idempotent: a no-op
    /// if already running.
    pub fn start(&self) -> Result<(), MasterClockError> {
        if self.inner.handlers.read().unwrap().is_none() {
            return Err(MasterClockError::HandlersNotInstalled);
        }
        let mut worker = self.worker.lock().unwrap();
        if self.inner.running.swap(true, Ordering::AcqRel) {
            // Already running: restore the flag semantics (swap already set
            // it true) and report idempotent no-op.
            return Ok(());
        }
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name("masterclock-engine".into())
            .spawn(move || {
                info!("master clock engine starting");
                engine::run(&inner);
                info!("master clock engine stopped");
            })
            .map_err(MasterClockError::SpawnFailed)?;
        *worker = Some(handle);
        Ok(())
    }

    /// Run the engine synchronously on the calling thread instead of
    /// spawning a worker. Blocks until the engine halts (all participants
    /// disabled) or another thread calls [`MasterClock::stop`].
    pub fn run(&self) -> Result<(), MasterClockError> {
        if self.inner.handlers.read().unwrap().is_none() {
            return Err(MasterClockError::HandlersNotInstalled);
        }
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        engine::run(&self.inner);
        Ok(())
    }

    /// Block until a worker thread started via [`MasterClock::start`] exits.
    pub fn join(&self) {
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for MasterClock {
    fn drop(&mut self) {
        self.stop();
    }
}
