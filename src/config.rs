//! Configuration surface consumed from an external preferences collaborator.
//!
//! Preference/configuration loading itself is out of scope for this crate
//! (spec §1); this module only models the handful of knobs the scheduler
//! itself needs, constructible either programmatically or from environment
//! variables, in the style of `sisctl`'s `SISCTL_BIND` convention.

use crate::schedule::DEFAULT_PERIOD_WARNING_THRESHOLD;

/// Environment variable overriding the soft period-steps warning threshold.
pub const ENV_PERIOD_WARNING_THRESHOLD: &str = "MASTERCLOCK_PERIOD_WARNING_THRESHOLD";
/// Environment variable enabling sync-play at construction time.
pub const ENV_SYNC_PLAY: &str = "MASTERCLOCK_SYNC_PLAY";

/// Construction-time configuration for a [`MasterClock`](crate::MasterClock).
#[derive(Debug, Clone, Copy)]
pub struct MasterClockConfig {
    /// Compiled period length (in steps) above which compilation logs a
    /// warning instead of failing (see spec §4.C step 5, §7 `ScheduleDegenerate`).
    pub period_warning_threshold: u64,
    /// Initial value of the sync-play cross-chip cascade flag.
    pub sync_play: bool,
}

impl Default for MasterClockConfig {
    fn default() -> Self {
        Self {
            period_warning_threshold: DEFAULT_PERIOD_WARNING_THRESHOLD,
            sync_play: false,
        }
    }
}

impl MasterClockConfig {
    /// Load configuration, falling back to defaults for unset/unparsable variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(raw) = std::env::var(ENV_PERIOD_WARNING_THRESHOLD) {
            match raw.parse::<u64>() {
                Ok(parsed) => cfg.period_warning_threshold = parsed,
                Err(_) => tracing::warn!(
                    raw,
                    "ignoring unparsable {} value",
                    ENV_PERIOD_WARNING_THRESHOLD
                ),
            }
        }

        if let Ok(raw) = std::env::var(ENV_SYNC_PLAY) {
            cfg.sync_play = raw == "1" || raw.eq_ignore_ascii_case("true");
        }

        cfg
    }
}
