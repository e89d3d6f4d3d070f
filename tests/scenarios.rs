//! End-to-end scenarios exercising the public API, mirroring the
//! quantified invariants and worked scenarios from the scheduler's
//! testable-properties section.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use masterclock::{
    ClockHandler, Clockable, ExitReason, MasterClock, MasterClockConfig, ParticipantFault,
    TickOutcome,
};

struct Periodic {
    frequency: AtomicU64,
    chip_id: u32,
    count: AtomicUsize,
}

impl Periodic {
    fn new(frequency: u64, chip_id: u32) -> Self {
        Self {
            frequency: AtomicU64::new(frequency),
            chip_id,
            count: AtomicUsize::new(0),
        }
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Clockable for Periodic {
    fn frequency_hz(&self) -> u64 {
        self.frequency.load(Ordering::SeqCst)
    }

    fn chip(&self) -> u32 {
        self.chip_id
    }

    fn on_clock_tick(&self) -> Result<TickOutcome, ParticipantFault> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(TickOutcome::Continue)
    }
}

#[derive(Default)]
struct RecordingHandler {
    exits: Mutex<Vec<String>>,
}

impl ClockHandler for RecordingHandler {
    fn on_normal_exit(&self, reason: &ExitReason) {
        self.exits.lock().unwrap().push(reason.to_string());
    }

    fn on_exception(&self, _error: &ParticipantFault) {}
}

/// Run the clock until at least `target_ps` picoseconds of virtual time
/// have elapsed, then stop and join the worker.
fn run_until(clock: &MasterClock, target_ps: i64) {
    clock.start().unwrap();
    while clock.get_elapsed_ps() < target_ps {
        std::thread::sleep(Duration::from_millis(1));
    }
    clock.stop();
    clock.join();
}

#[test]
fn rate_fidelity_over_one_period() {
    let clock = MasterClock::new(MasterClockConfig::default());
    let a = Arc::new(Periodic::new(3, 0));
    let b = Arc::new(Periodic::new(5, 0));
    clock.add(a.clone(), None, true, true);
    clock.add(b.clone(), None, true, true);
    clock
        .set_callback_handlers(vec![Arc::new(RecordingHandler::default())])
        .unwrap();

    run_until(&clock, masterclock::PICOSECONDS_PER_SECOND as i64);

    // Invariant 1: each entry activates floor(T*F/1e12) or that value + 1 times.
    let elapsed = clock.get_elapsed_ps() as u128;
    for (entry, freq) in [(&a, 3u128), (&b, 5u128)] {
        let expected = (elapsed * freq) / masterclock::PICOSECONDS_PER_SECOND as u128;
        let count = entry.count() as u128;
        assert!(
            count == expected || count == expected + 1,
            "expected {expected} or {expected}+1 activations, got {count}"
        );
    }
}

/// Sweeps a handful of small coprime and shared-factor frequency pairs and
/// checks invariant 1 (rate fidelity) over several full periods each, rather
/// than the single (3, 5) pair exercised above. Plain deterministic
/// iteration over a small domain is used in place of an external
/// property-testing crate, since this scheduler is fully deterministic: the
/// same pair always produces the same schedule, so there is nothing for
/// randomized sampling to find that exhaustive small-domain sweeping won't.
#[test]
fn rate_fidelity_sweep_small_frequency_pairs() {
    const PAIRS: &[(u64, u64)] = &[
        (3, 5),   // coprime
        (2, 3),   // coprime
        (5, 7),   // coprime
        (11, 13), // coprime
        (4, 6),   // shared factor 2
        (6, 10),  // shared factor 2
        (9, 12),  // shared factor 3
        (10, 15), // shared factor 5
    ];

    for &(fa, fb) in PAIRS {
        let clock = MasterClock::new(MasterClockConfig::default());
        let a = Arc::new(Periodic::new(fa, 0));
        let b = Arc::new(Periodic::new(fb, 0));
        clock.add(a.clone(), None, true, true);
        clock.add(b.clone(), None, true, true);
        clock.set_callback_handlers(vec![]).unwrap();

        clock.start().unwrap();
        // Wait for the first compile so `schedule_stats` reflects this pair.
        while clock.schedule_stats().period_steps == 0 {
            std::thread::sleep(Duration::from_micros(100));
        }
        let stats = clock.schedule_stats();
        let period_ps = stats.tick_ps as i64 * stats.period_steps as i64;
        run_until(&clock, period_ps.saturating_mul(3));

        let elapsed = clock.get_elapsed_ps() as u128;
        for (entry, freq) in [(&a, fa as u128), (&b, fb as u128)] {
            let expected = (elapsed * freq) / masterclock::PICOSECONDS_PER_SECOND as u128;
            let count = entry.count() as u128;
            assert!(
                count == expected || count == expected + 1,
                "pair ({fa}, {fb}): expected {expected} or {expected}+1 activations at {freq}Hz, got {count}"
            );
        }
    }
}

#[test]
fn idempotent_readd_does_not_duplicate_activations() {
    let clock = MasterClock::new(MasterClockConfig::default());
    let a: Arc<dyn Clockable> = Arc::new(Periodic::new(10, 0));
    let id1 = clock.add(a.clone(), None, false, true);
    let id2 = clock.add(a.clone(), None, true, true);
    assert_eq!(id1, id2);
    clock.set_callback_handlers(vec![]).unwrap();
    run_until(&clock, 5_000_000_000);
    // Only ever one entry: no double counting from a duplicate registration.
    assert_eq!(clock.schedule_stats().step_count, 1);
}

#[test]
fn phase_preserved_across_stop_start_cycle() {
    let clock = MasterClock::new(MasterClockConfig::default());
    let a = Arc::new(Periodic::new(1_000, 0));
    clock.add(a.clone(), None, true, true);
    clock.set_callback_handlers(vec![]).unwrap();

    run_until(&clock, 10_000_000_000);
    let elapsed_after_first_run = clock.get_elapsed_ps();
    let count_after_first_run = a.count();
    assert!(elapsed_after_first_run > 0);
    assert!(count_after_first_run > 0);

    // Restarting resumes rather than restarting the period from scratch;
    // elapsed time keeps climbing monotonically.
    run_until(&clock, elapsed_after_first_run + 10_000_000_000);
    assert!(clock.get_elapsed_ps() > elapsed_after_first_run);
    assert!(a.count() > count_after_first_run);
}

#[test]
fn s6_sync_play_cascade_through_public_api() {
    let clock = MasterClock::new(MasterClockConfig {
        sync_play: true,
        ..Default::default()
    });

    struct OneShotCpu {
        chip_id: u32,
    }
    impl Clockable for OneShotCpu {
        fn frequency_hz(&self) -> u64 {
            1_000
        }
        fn chip(&self) -> u32 {
            self.chip_id
        }
        fn on_clock_tick(&self) -> Result<TickOutcome, ParticipantFault> {
            Ok(TickOutcome::Exit(ExitReason::new("done")))
        }
        fn as_cpu_emulator(&self) -> Option<&dyn masterclock::CpuEmulator> {
            Some(self)
        }
    }
    impl masterclock::CpuEmulator for OneShotCpu {}

    let cpu0: Arc<dyn Clockable> = Arc::new(OneShotCpu { chip_id: 0 });
    let cpu1: Arc<dyn Clockable> = Arc::new(OneShotCpu { chip_id: 1 });
    let peri1 = Arc::new(Periodic::new(10, 1));

    let h0 = Arc::new(RecordingHandler::default());
    let h1 = Arc::new(RecordingHandler::default());

    clock.add(cpu0, Some(0), true, true);
    clock.add(cpu1, Some(1), true, true);
    clock.add(peri1.clone(), Some(1), true, true);
    clock
        .set_callback_handlers(vec![h0.clone(), h1.clone()])
        .unwrap();

    clock.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert!(!clock.is_running());
    clock.join();

    assert!(!h0.exits.lock().unwrap().is_empty());
    assert!(!h1.exits.lock().unwrap().is_empty());
}
