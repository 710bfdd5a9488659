//! ==============================================================================
//! store.rs - shared swarm state
//! ==============================================================================
//!
//! the state is shared between:
//! - the ingestion loop (writes every accepted reading)
//! - the reset coordinator (clears it)
//! - the dashboard (reads snapshots)
//!
//! one rwlock guards the whole `SwarmState`, and callers only get whole
//! operations: a compound update (reading + color + master + duration)
//! happens under a single write guard, and a snapshot is a clone taken
//! under a single read guard. a reader never sees a half-applied message
//! or a half-cleared store.
//!
//! ==============================================================================

use parking_lot::RwLock;
use std::sync::Arc;

use crate::domain::{Palette, SwarmSnapshot, SwarmState};
use crate::reset::ResetGate;

/// Result of applying one reading to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub color: String,
    pub new_master: bool,
    pub duration: u64,
}

#[derive(Clone)]
pub struct SwarmStore {
    inner: Arc<RwLock<SwarmState>>,
}

impl SwarmStore {
    pub fn new(palette: Palette, capacity: usize) -> Self {
        Self::from_state(SwarmState::new(palette, capacity))
    }

    pub fn from_state(state: SwarmState) -> Self {
        Self { inner: Arc::new(RwLock::new(state)) }
    }

    /// Apply one accepted reading as a single atomic update.
    ///
    /// The gate is re-checked under the write lock. A reset raises the gate
    /// before it clears, so a message that raced past the ingestion loop's
    /// early check is either cleared by the reset or rejected here.
    pub fn apply_reading(&self, gate: &ResetGate, swarm_id: &str, reading: i64) -> Option<Applied> {
        let mut state = self.inner.write();
        if gate.is_active() {
            return None;
        }
        state.record_reading(reading);
        let color = state.assign_color_if_absent(swarm_id);
        let new_master = state.set_master(swarm_id);
        state.increment_master_duration(swarm_id);
        let duration = state.duration_of(swarm_id);
        Some(Applied { color, new_master, duration })
    }

    pub fn snapshot(&self) -> SwarmSnapshot {
        self.inner.read().snapshot()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }
}

impl Default for SwarmStore {
    fn default() -> Self {
        Self::from_state(SwarmState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_apply_reading_updates_everything_together() {
        let store = SwarmStore::default();
        let gate = ResetGate::new();

        let first = store.apply_reading(&gate, "A", 10).unwrap();
        assert_eq!(first, Applied { color: "red".into(), new_master: true, duration: 1 });

        let second = store.apply_reading(&gate, "A", 11).unwrap();
        assert!(!second.new_master);
        assert_eq!(second.duration, 2);

        store.apply_reading(&gate, "B", 12).unwrap();
        let snap = store.snapshot();
        assert_eq!(snap.current_master.as_deref(), Some("B"));
        assert_eq!(snap.recent_readings, vec![10, 11, 12]);
        assert_eq!(snap.master_duration, BTreeMap::from([("A".into(), 2), ("B".into(), 1)]));
        assert_eq!(snap.master_color(), Some("green"));
    }

    #[test]
    fn test_apply_is_rejected_while_gate_is_raised() {
        let store = SwarmStore::default();
        let gate = ResetGate::new();
        let guard = gate.try_begin().unwrap();

        assert!(store.apply_reading(&gate, "A", 1).is_none());
        assert_eq!(store.snapshot(), SwarmSnapshot::default());

        drop(guard);
        assert!(store.apply_reading(&gate, "A", 1).is_some());
    }

    #[test]
    fn test_concurrent_readers_never_see_master_without_duration() {
        let store = SwarmStore::default();
        let gate = ResetGate::new();

        let writer = {
            let store = store.clone();
            let gate = gate.clone();
            std::thread::spawn(move || {
                for i in 0..2_000_i64 {
                    let id = format!("node-{}", i % 7);
                    store.apply_reading(&gate, &id, i);
                    if i % 500 == 0 {
                        store.clear();
                    }
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..2_000 {
                        let snap = store.snapshot();
                        if let Some(master) = &snap.current_master {
                            assert!(snap.master_duration.get(master).copied().unwrap_or(0) >= 1);
                            assert!(snap.color_of.contains_key(master));
                            assert!(!snap.recent_readings.is_empty());
                        }
                        assert!(snap.recent_readings.len() <= 30);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}
