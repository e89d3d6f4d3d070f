//! Schedule compiler: derives a compact periodic execution schedule from
//! the registry's current frequencies.
//!
//! This is the most delicate component of the crate — see spec §4.C for the
//! prose algorithm this file implements verbatim, step by step.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::warn;

use crate::math::lcm_u64;
use crate::registry::Entry;

/// Picoseconds per second; the resolution of the virtual clock.
pub const PICOSECONDS_PER_SECOND: u64 = 1_000_000_000_000;

/// Above this many compiled steps, schedule compilation logs a warning:
/// the configured frequencies are too disparate to schedule efficiently.
pub const DEFAULT_PERIOD_WARNING_THRESHOLD: u64 = 20_000;

/// Imprecise entries are allowed up to this drift factor before being
/// folded into the LCM unconditionally (see spec §4.C step 3).
const IMPRECISE_DRIFT_FACTOR: u64 = 4;

/// One position in the compiled periodic schedule.
pub struct ExecutionStep {
    pub entries: Vec<Arc<Entry>>,
    pub step_duration_ps: u64,
}

/// The compiled, circular schedule plus the base tick quantum it was
/// derived from.
#[derive(Default)]
pub struct CompiledSchedule {
    pub steps: Vec<ExecutionStep>,
    pub tick_ps: u64,
}

impl CompiledSchedule {
    /// Sum of `step_duration_ps` across the schedule; should equal
    /// `period_steps * tick_ps` per the period-closure invariant.
    pub fn total_duration_ps(&self) -> u64 {
        self.steps.iter().map(|s| s.step_duration_ps).sum()
    }
}

/// Read-only diagnostics about the most recent compilation.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScheduleStats {
    pub lcm_frequency: u64,
    pub period_steps: u64,
    pub tick_ps: u64,
    pub step_count: usize,
}

fn round_div(numerator: u64, denominator: u64) -> u64 {
    (numerator + denominator / 2) / denominator
}

/// Compile a schedule from a point-in-time snapshot of the registry.
///
/// `period_warning_threshold` is the soft cap from spec §4.C step 5 /
/// §7 `ScheduleDegenerate`; exceeding it only logs a warning, it never
/// fails compilation.
pub fn compile(entries: &[Arc<Entry>], period_warning_threshold: u64) -> (CompiledSchedule, ScheduleStats) {
    // Step 1: frequency snapshot.
    let frequencies: Vec<u64> = entries
        .iter()
        .map(|e| {
            let f = e.clockable.frequency_hz();
            e.is_frequency_zero.store(f == 0, Ordering::Release);
            f
        })
        .collect();

    // Step 2: baseline LCM over precise entries; track max imprecise frequency.
    let mut lcm_precise: u64 = 0;
    let mut max_imprecise: u64 = 0;
    for (entry, &freq) in entries.iter().zip(&frequencies) {
        if freq == 0 {
            continue;
        }
        if entry.is_precise {
            lcm_precise = lcm_u64(lcm_precise, freq);
        } else if freq > max_imprecise {
            max_imprecise = freq;
        }
    }

    // Step 3: imprecise inclusion rule.
    let fold_imprecise = max_imprecise > 0 && lcm_precise < IMPRECISE_DRIFT_FACTOR * max_imprecise;

    let mut lcm_frequency = lcm_precise;
    if fold_imprecise {
        for (entry, &freq) in entries.iter().zip(&frequencies) {
            if freq == 0 || entry.is_precise {
                continue;
            }
            lcm_frequency = lcm_u64(lcm_frequency, freq);
        }
    }
    if lcm_frequency == 0 {
        // No active entries at all (every frequency is zero, or the
        // registry is empty). There is nothing to schedule.
        return (
            CompiledSchedule::default(),
            ScheduleStats::default(),
        );
    }

    // Step 4: per-entry threshold, rescaling counter_value to preserve phase.
    // `phases[i]` is the entry's due position within its own threshold cycle
    // (0 means "due at k == 0, 2*threshold, ..."); step 7 reads it back so a
    // live recompile resumes each entry where it actually was instead of
    // restarting every entry's cycle at k == 0.
    let mut thresholds = vec![0u64; entries.len()];
    let mut phases = vec![0u64; entries.len()];
    for (i, (entry, &freq)) in entries.iter().zip(&frequencies).enumerate() {
        if freq == 0 {
            entry.counter_threshold.store(0, Ordering::Release);
            continue;
        }
        let included_exactly = entry.is_precise || fold_imprecise;
        let new_threshold = if included_exactly {
            lcm_frequency / freq
        } else {
            round_div(lcm_frequency, freq).max(1)
        };

        let old_threshold = entry.counter_threshold.load(Ordering::Acquire);
        if old_threshold > 0 {
            let old_value = entry.counter_value.load(Ordering::Acquire);
            let new_value = ((old_value as u128 * new_threshold as u128) / old_threshold as u128) as u64;
            entry.counter_value.store(new_value, Ordering::Release);
        }
        entry.counter_threshold.store(new_threshold, Ordering::Release);
        thresholds[i] = new_threshold;
        phases[i] = entry.counter_value.load(Ordering::Acquire) % new_threshold;
    }

    // Step 5: counter-period LCM over all active thresholds.
    let mut period_steps: u64 = 1;
    for &t in &thresholds {
        if t > 0 {
            period_steps = lcm_u64(period_steps, t);
        }
    }
    if period_steps > period_warning_threshold {
        warn!(
            period_steps,
            period_warning_threshold, "compiled schedule period exceeds soft threshold; frequencies may be too disparate"
        );
    }

    // Step 6: base tick quantum.
    let tick_ps = PICOSECONDS_PER_SECOND / lcm_frequency;

    // Step 7: step emission, folding empty ticks into the previous step.
    // With every entry's phase at 0 (a fresh registry) k == 0 is always due,
    // so folding into a predecessor is well-defined from the first iteration
    // — the case the source algorithm assumes. Once entries carry a nonzero
    // phase (preserved across a live recompile, see `advance_phase` below),
    // the leading ticks before the first due position have no predecessor
    // yet; fold those into the *last* emitted step instead, since the
    // schedule is circular and the gap before position 0 is the same gap
    // as after the final step.
    let mut steps: Vec<ExecutionStep> = Vec::new();
    let mut leading_gap_ps: u64 = 0;
    for k in 0..period_steps {
        let mut due: Vec<Arc<Entry>> = Vec::new();
        for (entry, (&threshold, &phase)) in entries.iter().zip(thresholds.iter().zip(phases.iter())) {
            if threshold > 0 && k % threshold == phase {
                due.push(entry.clone());
            }
        }

        if due.is_empty() {
            match steps.last_mut() {
                Some(last) => last.step_duration_ps += tick_ps,
                None => leading_gap_ps += tick_ps,
            }
            continue;
        }
        steps.push(ExecutionStep {
            entries: due,
            step_duration_ps: tick_ps,
        });
    }
    if leading_gap_ps > 0 {
        // `lcm_frequency > 0` guarantees at least one entry has a finite
        // threshold dividing `period_steps`, so some k in this range was
        // due and `steps` is non-empty here.
        if let Some(last) = steps.last_mut() {
            last.step_duration_ps += leading_gap_ps;
        }
    }

    let stats = ScheduleStats {
        lcm_frequency,
        period_steps,
        tick_ps,
        step_count: steps.len(),
    };
    (CompiledSchedule { steps, tick_ps }, stats)
}

/// Advance every entry's stored phase (`counter_value`) by `ticks_elapsed`
/// base ticks of the *previous* schedule, before compiling a new one.
///
/// Without this, a live reschedule (a registry mutation or frequency change
/// while the engine is running) would recompile with every entry's phase
/// frozen at whatever it was after the last rescale — effectively snapping
/// every entry back to "due right now" and discarding however far it had
/// actually progressed through its cycle. Rolling `counter_value` forward by
/// the ticks that elapsed under the old schedule keeps compile's step-4
/// rescale operating on each entry's true current position, so the next-due
/// entry after a live reschedule matches the next-due entry without one
/// (testable property 5).
///
/// A full, uninterrupted period is a multiple of every entry's threshold, so
/// this is only needed when a reschedule cuts a period short; the engine
/// resets its own tick counter to zero on every clean period wraparound
/// rather than calling this with an ever-growing `ticks_elapsed`.
pub(crate) fn advance_phase(entries: &[Arc<Entry>], ticks_elapsed: u64) {
    if ticks_elapsed == 0 {
        return;
    }
    for entry in entries {
        let threshold = entry.counter_threshold.load(Ordering::Acquire);
        if threshold == 0 {
            continue;
        }
        let old = entry.counter_value.load(Ordering::Acquire) as u128;
        let step = (ticks_elapsed as u128) % (threshold as u128);
        let new = (old + threshold as u128 - step) % threshold as u128;
        entry.counter_value.store(new as u64, Ordering::Release);
    }
}
