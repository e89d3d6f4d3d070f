//! Linked-stop policy: cascading disable across a chip's peripherals and,
//! under sync-play, across peer chips. See spec §4.E.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::clock::ClockInner;
use crate::clockable::ExitReason;
use crate::registry::Entry;

/// Apply the linked-stop cascade for an entry that was just disabled.
///
/// `entry.enabled` must already be `false` when this is called; the
/// entry's own handler notification (for its own voluntary exit or fault)
/// is the caller's responsibility — this function only notifies and
/// disables the *other* entries the policy pulls down with it.
pub(crate) fn cascade(inner: &ClockInner, entry: &Arc<Entry>) {
    if entry.clockable.as_cpu_emulator().is_none() {
        return;
    }
    let chip = entry.chip();
    let snapshot = inner.registry.snapshot();

    // 1. Peripherals sharing this chip id.
    for other in &snapshot {
        if Arc::ptr_eq(other, entry) {
            continue;
        }
        if other.chip() == chip && other.is_enabled() {
            other.set_enabled(false);
            notify_normal_exit(inner, other, &ExitReason::new(format!("chip {chip} stopped")));
        }
    }

    // 2. Sync-play cross-chip cascade.
    if inner.sync_play.load(Ordering::Acquire) {
        for other in &snapshot {
            if Arc::ptr_eq(other, entry) {
                continue;
            }
            if other.is_enabled() && other.clockable.as_cpu_emulator().is_some() {
                notify_normal_exit(
                    inner,
                    other,
                    &ExitReason::new(format!("Sync stop due to chip {chip} stopping")),
                );
                other.set_enabled(false);
                cascade(inner, other);
            }
        }
    }
}

pub(crate) fn notify_normal_exit(inner: &ClockInner, entry: &Arc<Entry>, reason: &ExitReason) {
    let Some(idx) = entry.callback_chip else { return };
    let handlers = inner.handlers.read().unwrap();
    if let Some(table) = handlers.as_ref() {
        if let Some(handler) = table.get(idx) {
            handler.on_normal_exit(reason);
        }
    }
}

pub(crate) fn notify_exception(inner: &ClockInner, entry: &Arc<Entry>, error: &crate::clockable::ParticipantFault) {
    let Some(idx) = entry.callback_chip else { return };
    let handlers = inner.handlers.read().unwrap();
    if let Some(table) = handlers.as_ref() {
        if let Some(handler) = table.get(idx) {
            handler.on_exception(error);
        }
    }
}
