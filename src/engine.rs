//! Execution engine: runs the compiled schedule in a tight loop on a
//! single worker thread, per spec §4.D.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, error};

use crate::clock::ClockInner;
use crate::clockable::TickOutcome;
use crate::linked_stop;
use crate::registry::Entry;
use crate::schedule::{self, CompiledSchedule};

fn all_entries_disabled(inner: &ClockInner) -> bool {
    let snapshot = inner.registry.snapshot();
    !snapshot.is_empty() && snapshot.iter().all(|e| !e.is_enabled())
}

fn disable_and_cascade(inner: &ClockInner, entry: &Arc<Entry>) {
    entry.set_enabled(false);
    linked_stop::cascade(inner, entry);
}

/// Entry point for the engine loop. May be called directly on the calling
/// thread (synchronous run) or from a spawned worker (asynchronous start);
/// the caller is responsible for having already set `running = true`.
pub(crate) fn run(inner: &Arc<ClockInner>) {
    let (mut schedule, mut step_index) = inner
        .resume
        .lock()
        .unwrap()
        .take()
        .unwrap_or((CompiledSchedule::default(), 0));

    let mut last_step_index = step_index;
    // Base ticks consumed under the *current* schedule since it was last
    // compiled. Fed into `schedule::advance_phase` so a live recompile
    // resumes each entry's cycle where it actually is instead of snapping
    // every entry back to "due right now" (spec testable property 5).
    let mut ticks_since_compile: u64 = 0;

    while inner.running.load(Ordering::Acquire) {
        if inner.reschedule_requested.swap(false, Ordering::AcqRel) || schedule.steps.is_empty() {
            let snapshot = inner.registry.snapshot();
            schedule::advance_phase(&snapshot, ticks_since_compile);
            let (compiled, stats) = schedule::compile(&snapshot, inner.period_warning_threshold);
            debug!(
                steps = compiled.steps.len(),
                lcm_frequency = stats.lcm_frequency,
                period_steps = stats.period_steps,
                "schedule compiled"
            );
            *inner.stats.lock().unwrap() = stats;
            schedule = compiled;
            step_index = 0;
            ticks_since_compile = 0;

            if schedule.steps.is_empty() {
                // No participant has a non-zero frequency: there is
                // nothing to run anyone on. Halt rather than spin.
                inner.running.store(false, Ordering::Release);
                break;
            }
        }

        while step_index < schedule.steps.len() {
            last_step_index = step_index;
            let step = &schedule.steps[step_index];
            let mut pending_disable: Vec<Arc<Entry>> = Vec::new();

            for entry in &step.entries {
                if !entry.is_enabled() {
                    continue;
                }
                if entry.is_frequency_zero.load(Ordering::Acquire) {
                    continue;
                }
                match entry.clockable.on_clock_tick() {
                    Ok(TickOutcome::Continue) => {}
                    Ok(TickOutcome::Exit(reason)) => {
                        linked_stop::notify_normal_exit(inner, entry, &reason);
                        pending_disable.push(entry.clone());
                    }
                    Err(fault) => {
                        error!(error = %fault, "participant tick raised a fault");
                        linked_stop::notify_exception(inner, entry, &fault);
                        pending_disable.push(entry.clone());
                    }
                }
            }

            for entry in &pending_disable {
                disable_and_cascade(inner, entry);
            }

            if all_entries_disabled(inner) {
                inner.running.store(false, Ordering::Release);
                break;
            }

            inner
                .total_elapsed_ps
                .fetch_add(step.step_duration_ps as i64, Ordering::AcqRel);
            ticks_since_compile += step.step_duration_ps / schedule.tick_ps;

            if inner.reschedule_requested.load(Ordering::Acquire) {
                break;
            }
            step_index += 1;
        }

        if !inner.running.load(Ordering::Acquire) {
            break;
        }
        if step_index >= schedule.steps.len() {
            // Completed a full period cleanly; loop back to the top and
            // (absent a pending reschedule) start the next period at 0.
            // `period_steps` is a multiple of every entry's threshold, so
            // every entry's phase is unchanged at this boundary — reset the
            // tick counter here rather than letting it grow unboundedly
            // across many periods.
            step_index = 0;
            ticks_since_compile = 0;
        }
    }

    // Rotate so a later restart resumes at the step after the one that
    // caused termination, preserving long-term rate accuracy across
    // stop/start cycles (spec §4.D, §9).
    if !schedule.steps.is_empty() {
        let rotate_by = (last_step_index + 1) % schedule.steps.len();
        schedule.steps.rotate_left(rotate_by);
    }
    *inner.resume.lock().unwrap() = Some((schedule, 0));
}
