//! Participant registry: the ordered collection of registered clockables.
//!
//! Mutation (add/remove/enable) is infrequent and takes a write lock on the
//! entry list; the fields that change every tick (`enabled`, the two
//! counters) live in atomics inside each [`Entry`] so the engine can read
//! and update them without taking that lock. This gives the engine a cheap
//! snapshot read (`Registry::snapshot`) to iterate during schedule
//! compilation and normal execution, matching the "snapshot or
//! copy-on-write discipline" required for concurrent iteration.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::clockable::Clockable;

/// Opaque handle returned by [`Registry::add`], used to remove/enable a
/// clockable without relying on trait-object reference identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClockableId(u64);

/// Identifies an entry either by its handle or by the clockable itself
/// (pointer identity via `Arc::ptr_eq`), mirroring the source's reliance
/// on reference identity for deduplication.
pub enum EntryKey<'a> {
    Id(ClockableId),
    Clockable(&'a Arc<dyn Clockable>),
}

impl From<ClockableId> for EntryKey<'static> {
    fn from(id: ClockableId) -> Self {
        EntryKey::Id(id)
    }
}

impl<'a> From<&'a Arc<dyn Clockable>> for EntryKey<'a> {
    fn from(c: &'a Arc<dyn Clockable>) -> Self {
        EntryKey::Clockable(c)
    }
}

/// The scheduler's wrapper around a registered clockable.
pub struct Entry {
    pub id: ClockableId,
    pub clockable: Arc<dyn Clockable>,
    /// Index into the callback handler table, or `None` for "no callback".
    pub callback_chip: Option<usize>,
    pub enabled: AtomicBool,
    /// Participates in LCM computation unconditionally.
    pub is_precise: bool,
    /// Cached result of the last frequency read being zero.
    pub is_frequency_zero: AtomicBool,
    /// Base ticks between two activations; 0 until first compile.
    pub counter_threshold: AtomicU64,
    /// Fractional progress, preserved (rescaled) across reschedules.
    pub counter_value: AtomicU64,
    /// Cached at registration time: does this clockable implement the
    /// CPU-emulator marker capability?
    pub is_cpu_emulator: bool,
}

impl Entry {
    fn new(id: ClockableId, clockable: Arc<dyn Clockable>, callback_chip: Option<usize>, enabled: bool, is_precise: bool) -> Self {
        let is_cpu_emulator = clockable.as_cpu_emulator().is_some();
        Self {
            id,
            clockable,
            callback_chip,
            enabled: AtomicBool::new(enabled),
            is_precise,
            is_frequency_zero: AtomicBool::new(false),
            counter_threshold: AtomicU64::new(0),
            counter_value: AtomicU64::new(0),
            is_cpu_emulator,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, value: bool) {
        self.enabled.store(value, Ordering::Release);
    }

    pub fn chip(&self) -> u32 {
        self.clockable.chip()
    }
}

/// Ordered collection of entries. Insertion order is preserved: mutators
/// append, removal preserves the relative order of survivors. Order matters
/// because compiled steps iterate participants in registry order.
#[derive(Default)]
pub struct Registry {
    entries: RwLock<Vec<Arc<Entry>>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn find_by_clockable(entries: &[Arc<Entry>], clockable: &Arc<dyn Clockable>) -> Option<usize> {
        entries
            .iter()
            .position(|e| Arc::ptr_eq(&e.clockable, clockable))
    }

    /// Add a clockable. If an entry already references this clockable
    /// (by pointer identity), mark it enabled and return its existing id —
    /// idempotent re-add re-enables rather than duplicating. Otherwise
    /// append a new entry with counters at zero.
    pub fn add(&self, clockable: Arc<dyn Clockable>, callback_chip: Option<usize>, enabled: bool, precise: bool) -> ClockableId {
        let mut entries = self.entries.write().unwrap();
        if let Some(idx) = Self::find_by_clockable(&entries, &clockable) {
            entries[idx].set_enabled(true);
            return entries[idx].id;
        }
        let id = ClockableId(self.next_id.fetch_add(1, Ordering::SeqCst));
        entries.push(Arc::new(Entry::new(id, clockable, callback_chip, enabled, precise)));
        id
    }

    /// Remove by identity if present. Absence is not an error.
    pub fn remove(&self, key: EntryKey<'_>) {
        let mut entries = self.entries.write().unwrap();
        let idx = match key {
            EntryKey::Id(id) => entries.iter().position(|e| e.id == id),
            EntryKey::Clockable(c) => Self::find_by_clockable(&entries, c),
        };
        if let Some(idx) = idx {
            entries.remove(idx);
        }
    }

    fn lookup(&self, key: &EntryKey<'_>) -> Option<Arc<Entry>> {
        let entries = self.entries.read().unwrap();
        match key {
            EntryKey::Id(id) => entries.iter().find(|e| e.id == *id).cloned(),
            EntryKey::Clockable(c) => {
                Self::find_by_clockable(&entries, c).map(|idx| entries[idx].clone())
            }
        }
    }

    /// Set `enabled = true`. If the clockable is CPU-class, also enable
    /// every entry sharing its chip id (linked enable, mirroring the
    /// linked-stop policy's grouping on the way back up).
    pub fn enable(&self, key: EntryKey<'_>) {
        let Some(entry) = self.lookup(&key) else { return };
        entry.set_enabled(true);
        if entry.is_cpu_emulator {
            let chip = entry.chip();
            let entries = self.entries.read().unwrap();
            for e in entries.iter() {
                if e.chip() == chip {
                    e.set_enabled(true);
                }
            }
        }
    }

    /// Set `enabled = false` on exactly this entry. Cascading is layered
    /// on top by the linked-stop policy, not performed here.
    pub fn disable(&self, key: EntryKey<'_>) {
        if let Some(entry) = self.lookup(&key) {
            entry.set_enabled(false);
        }
    }

    /// A read-only, point-in-time snapshot of the entry list for iteration.
    /// Cheap: clones the `Arc<Entry>` handles, not the entries themselves.
    pub fn snapshot(&self) -> Vec<Arc<Entry>> {
        self.entries.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clockable::test_support::CountingClockable;

    #[test]
    fn add_assigns_unique_ids() {
        let reg = Registry::new();
        let a: Arc<dyn Clockable> = Arc::new(CountingClockable::new(10, 0));
        let b: Arc<dyn Clockable> = Arc::new(CountingClockable::new(20, 0));
        let id_a = reg.add(a, None, true, true);
        let id_b = reg.add(b, None, true, true);
        assert_ne!(id_a, id_b);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn re_add_is_idempotent() {
        let reg = Registry::new();
        let a: Arc<dyn Clockable> = Arc::new(CountingClockable::new(10, 0));
        let id1 = reg.add(a.clone(), None, false, true);
        assert_eq!(reg.len(), 1);
        reg.disable(EntryKey::Id(id1));
        let id2 = reg.add(a.clone(), None, true, true);
        assert_eq!(id1, id2);
        assert_eq!(reg.len(), 1);
        let snap = reg.snapshot();
        assert!(snap[0].is_enabled());
    }

    #[test]
    fn remove_absent_is_not_an_error() {
        let reg = Registry::new();
        let a: Arc<dyn Clockable> = Arc::new(CountingClockable::new(10, 0));
        reg.remove(EntryKey::Clockable(&a));
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn remove_preserves_order_of_survivors() {
        let reg = Registry::new();
        let a: Arc<dyn Clockable> = Arc::new(CountingClockable::new(1, 0));
        let b: Arc<dyn Clockable> = Arc::new(CountingClockable::new(2, 0));
        let c: Arc<dyn Clockable> = Arc::new(CountingClockable::new(3, 0));
        reg.add(a.clone(), None, true, true);
        let id_b = reg.add(b, None, true, true);
        reg.add(c.clone(), None, true, true);
        reg.remove(EntryKey::Id(id_b));
        let snap = reg.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(Arc::ptr_eq(&snap[0].clockable, &a));
        assert!(Arc::ptr_eq(&snap[1].clockable, &c));
    }

    #[test]
    fn enabling_cpu_cascades_to_same_chip_peripherals() {
        let reg = Registry::new();
        let cpu: Arc<dyn Clockable> = Arc::new(CountingClockable::cpu(1_000, 0));
        let peripheral: Arc<dyn Clockable> = Arc::new(CountingClockable::new(100, 0));
        let cpu_id = reg.add(cpu, None, false, true);
        reg.add(peripheral, None, false, true);
        reg.enable(EntryKey::Id(cpu_id));
        for e in reg.snapshot() {
            assert!(e.is_enabled());
        }
    }
}
