//! ==============================================================================
//! reset.rs - operator-triggered swarm reset
//! ==============================================================================
//!
//! sequence (each step completes before the next starts):
//!
//! ```text
//!     trigger handler:  claim the sequence, flush + rotate the log session
//!     coordinator:      1. raise gate      (ingestion starts dropping datagrams)
//!                       2. broadcast "+++RESET_REQUESTED***"
//!                       3. clear swarm state
//!                       4. indicator led on, hold, off
//!                       5. lower gate      (ingestion resumes)
//! ```
//!
//! a failed broadcast or led write is reported but never stops the sequence:
//! the local state is always cleared and the gate is always lowered.
//!
//! relationships:
//!     - called by: trigger.rs (on a rising button edge)
//!     - uses: store.rs, recorder.rs, transport.rs, hal.rs
//!
//! ==============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{ResetError, StorageError};
use crate::hal::{HardwareProvider, Level};
use crate::protocol::Framing;
use crate::recorder::LogRecorder;
use crate::store::SwarmStore;
use crate::transport::Transport;

/// The ResetRequest flag shared by the trigger monitor and the ingestion loop.
#[derive(Clone, Default)]
pub struct ResetGate {
    active: Arc<AtomicBool>,
}

impl ResetGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Raise the gate. Fails if a reset already holds it.
    pub fn try_begin(&self) -> Result<ResetGuard, ResetError> {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ResetError::InProgress)?;
        Ok(ResetGuard { gate: self.clone() })
    }
}

/// Lowers the gate when dropped.
pub struct ResetGuard {
    gate: ResetGate,
}

impl Drop for ResetGuard {
    fn drop(&mut self) {
        self.gate.active.store(false, Ordering::SeqCst);
    }
}

/// What happened during one reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetReport {
    pub announced: bool,
    pub indicator_ok: bool,
}

/// Exclusive right to run one reset sequence, held from the log flush
/// until the gate is lowered.
pub struct ResetClaim {
    _sequence: OwnedMutexGuard<()>,
}

#[derive(Clone)]
pub struct ResetCoordinator {
    gate: ResetGate,
    sequence: Arc<Mutex<()>>,
    store: SwarmStore,
    transport: Arc<dyn Transport>,
    hal: Arc<dyn HardwareProvider>,
    framing: Framing,
    indicator_pin: u8,
    hold: Duration,
}

impl ResetCoordinator {
    pub fn new(
        gate: ResetGate,
        store: SwarmStore,
        transport: Arc<dyn Transport>,
        hal: Arc<dyn HardwareProvider>,
        framing: Framing,
        indicator_pin: u8,
        hold: Duration,
    ) -> Self {
        Self { gate, sequence: Arc::new(Mutex::new(())), store, transport, hal, framing, indicator_pin, hold }
    }

    /// Reserve the next reset. Fails while another reset is claimed or running.
    pub fn claim(&self) -> Result<ResetClaim, ResetError> {
        if self.gate.is_active() {
            return Err(ResetError::InProgress);
        }
        let sequence = self.sequence.clone().try_lock_owned().map_err(|_| ResetError::InProgress)?;
        Ok(ResetClaim { _sequence: sequence })
    }

    pub async fn run(&self) -> Result<ResetReport, ResetError> {
        let claim = self.claim()?;
        self.run_claimed(claim).await
    }

    /// Steps 1-5 for a reset reserved with [`claim`](Self::claim).
    pub async fn run_claimed(&self, claim: ResetClaim) -> Result<ResetReport, ResetError> {
        let guard = self.gate.try_begin()?;
        tracing::info!("Reset started, ingestion paused");

        let announcement = self.framing.reset_announcement();
        let announced = match self.transport.broadcast(&announcement).await {
            Ok(()) => {
                tracing::info!("Broadcast: {}", String::from_utf8_lossy(&announcement));
                true
            }
            Err(e) => {
                tracing::warn!("Reset announcement not sent: {}", e);
                false
            }
        };

        self.store.clear();

        let indicator_ok = self.pulse_indicator().await;

        drop(guard);
        drop(claim);
        tracing::info!("Reset complete, ingestion resumed");
        Ok(ResetReport { announced, indicator_ok })
    }

    /// Led on for the hold interval, then off. The off write is attempted
    /// even when the on write failed.
    async fn pulse_indicator(&self) -> bool {
        let on = self.hal.write_output(self.indicator_pin, Level::High);
        if let Err(e) = &on {
            tracing::warn!("Indicator on failed: {:#}", e);
        }
        tokio::time::sleep(self.hold).await;
        let off = self.hal.write_output(self.indicator_pin, Level::Low);
        if let Err(e) = &off {
            tracing::warn!("Indicator off failed: {:#}", e);
        }
        on.is_ok() && off.is_ok()
    }
}

/// Outcome of one button press.
#[derive(Debug)]
pub struct TriggerOutcome {
    pub flush: Result<std::path::PathBuf, StorageError>,
    pub report: ResetReport,
}

/// What the trigger monitor runs on a rising edge: close the log session, then reset.
#[derive(Clone)]
pub struct ResetTrigger {
    recorder: LogRecorder,
    store: SwarmStore,
    coordinator: ResetCoordinator,
}

impl ResetTrigger {
    pub fn new(recorder: LogRecorder, store: SwarmStore, coordinator: ResetCoordinator) -> Self {
        Self { recorder, store, coordinator }
    }

    /// A refused press leaves the log session untouched.
    pub async fn fire(&self) -> Result<TriggerOutcome, ResetError> {
        let claim = self.coordinator.claim()?;

        let flush = self.recorder.close_session(|| self.store.snapshot().master_duration);
        if let Err(e) = &flush {
            tracing::error!("Log flush failed, session kept in memory: {}", e);
        }

        let report = self.coordinator.run_claimed(claim).await?;
        Ok(TriggerOutcome { flush, report })
    }
}

#[cfg(all(test, not(feature = "hardware")))]
mod tests {
    use super::*;
    use crate::hal::Hal;
    use crate::ingest::{Disposition, Ingestor};
    use crate::transport::testing::{peer, MemoryTransport};
    use std::collections::BTreeMap;

    const LED: u8 = 26;

    struct Rig {
        gate: ResetGate,
        store: SwarmStore,
        hal: Arc<Hal>,
        transport: Arc<MemoryTransport>,
        coordinator: ResetCoordinator,
    }

    fn rig(transport: MemoryTransport, gate: ResetGate, store: SwarmStore) -> Rig {
        let hal = Arc::new(Hal::new().unwrap());
        let transport = Arc::new(transport);
        let coordinator = ResetCoordinator::new(
            gate.clone(),
            store.clone(),
            transport.clone(),
            hal.clone(),
            Framing::default(),
            LED,
            Duration::from_secs(3),
        );
        Rig { gate, store, hal, transport, coordinator }
    }

    fn seeded_store(gate: &ResetGate) -> SwarmStore {
        let store = SwarmStore::default();
        for _ in 0..5 {
            store.apply_reading(gate, "A", 100).unwrap();
        }
        for _ in 0..3 {
            store.apply_reading(gate, "B", 200).unwrap();
        }
        store
    }

    #[test]
    fn test_gate_is_not_reentrant() {
        let gate = ResetGate::new();
        let guard = gate.try_begin().unwrap();
        assert!(gate.is_active());
        assert_eq!(gate.try_begin().err(), Some(ResetError::InProgress));
        drop(guard);
        assert!(!gate.is_active());
        assert!(gate.try_begin().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_store_broadcasts_and_pulses_indicator() {
        let gate = ResetGate::new();
        let store = seeded_store(&gate);
        let snap = store.snapshot();
        assert_eq!(snap.master_duration, BTreeMap::from([("A".into(), 5), ("B".into(), 3)]));
        assert_eq!(snap.current_master.as_deref(), Some("B"));

        let (transport, _inbox) = MemoryTransport::new();
        let rig = rig(transport, gate, store);

        let report = rig.coordinator.run().await.unwrap();
        assert_eq!(report, ResetReport { announced: true, indicator_ok: true });

        let snap = rig.store.snapshot();
        assert!(snap.master_duration.is_empty());
        assert!(snap.current_master.is_none());
        assert!(snap.recent_readings.is_empty());
        assert!(snap.color_of.is_empty());

        assert_eq!(rig.transport.sent(), vec![b"+++RESET_REQUESTED***".to_vec()]);

        let pulses = rig.hal.output_history(LED);
        assert_eq!(pulses.len(), 2);
        assert_eq!(pulses[0].level, Level::High);
        assert_eq!(pulses[1].level, Level::Low);
        assert!(pulses[1].at - pulses[0].at >= Duration::from_secs(3));

        assert!(!rig.gate.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_datagrams_during_reset_are_dropped() {
        let gate = ResetGate::new();
        let store = seeded_store(&gate);
        let dir = tempfile::tempdir().unwrap();
        let recorder = LogRecorder::new(dir.path(), "master_log");
        let ingestor = Arc::new(Ingestor::new(
            Framing::default(),
            gate.clone(),
            store.clone(),
            recorder.clone(),
            false,
        ));

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (transport, _inbox) = {
            let ingestor = ingestor.clone();
            let seen = seen.clone();
            let (t, inbox) = MemoryTransport::new();
            let t = t.on_broadcast(move || {
                seen.lock().push(ingestor.handle_datagram(b"+++C,7***", peer(9)));
            });
            (t, inbox)
        };
        let rig = rig(transport, gate, store);
        let entries_before = recorder.pending_entries();

        rig.coordinator.run().await.unwrap();

        assert_eq!(*seen.lock(), vec![Disposition::DroppedDuringReset]);
        assert_eq!(rig.store.snapshot().current_master, None);
        assert_eq!(recorder.pending_entries(), entries_before);
        assert_eq!(ingestor.stats().snapshot().dropped_during_reset, 1);

        // gate is down again: the same datagram is accepted now
        assert!(matches!(ingestor.handle_datagram(b"+++C,7***", peer(9)), Disposition::Applied { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_datagram_during_indicator_hold_is_dropped() {
        let gate = ResetGate::new();
        let store = seeded_store(&gate);
        let dir = tempfile::tempdir().unwrap();
        let recorder = LogRecorder::new(dir.path(), "master_log");
        let ingestor = Ingestor::new(Framing::default(), gate.clone(), store.clone(), recorder.clone(), false);
        let (transport, _inbox) = MemoryTransport::new();
        let rig = rig(transport, gate, store);

        let reset = {
            let coordinator = rig.coordinator.clone();
            tokio::spawn(async move { coordinator.run().await })
        };
        tokio::time::sleep(Duration::from_millis(1500)).await;

        // state is already cleared, the led is still lit
        assert!(rig.gate.is_active());
        assert_eq!(rig.hal.output_history(LED).len(), 1);
        assert_eq!(ingestor.handle_datagram(b"+++C,7***", peer(9)), Disposition::DroppedDuringReset);
        let snap = rig.store.snapshot();
        assert!(snap.current_master.is_none());
        assert!(snap.master_duration.is_empty());
        assert!(snap.recent_readings.is_empty());
        assert_eq!(recorder.pending_entries(), 0);

        reset.await.unwrap().unwrap();
        assert!(!rig.gate.is_active());
        assert!(matches!(ingestor.handle_datagram(b"+++C,7***", peer(9)), Disposition::Applied { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_broadcast_still_resets_locally() {
        let gate = ResetGate::new();
        let store = seeded_store(&gate);
        let (transport, _inbox) = MemoryTransport::new();
        let rig = rig(transport.failing_broadcast(), gate, store);

        let report = rig.coordinator.run().await.unwrap();
        assert!(!report.announced);
        assert!(report.indicator_ok);
        assert!(rig.store.snapshot().master_duration.is_empty());
        assert_eq!(rig.hal.output_history(LED).len(), 2);
        assert!(!rig.gate.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_while_gate_held_is_refused() {
        let gate = ResetGate::new();
        let store = seeded_store(&gate);
        let (transport, _inbox) = MemoryTransport::new();
        let rig = rig(transport, gate, store);

        let _held = rig.gate.try_begin().unwrap();
        assert_eq!(rig.coordinator.run().await, Err(ResetError::InProgress));
        assert!(rig.transport.sent().is_empty());
        assert!(!rig.store.snapshot().master_duration.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_flushes_rotates_then_resets() {
        let dir = tempfile::tempdir().unwrap();
        let gate = ResetGate::new();
        let store = seeded_store(&gate);
        let recorder = LogRecorder::new(dir.path(), "master_log");
        recorder.append(peer(4).ip(), "A", Some(100), chrono::Local::now());
        let first_session = recorder.session_id();

        let (transport, _inbox) = MemoryTransport::new();
        let rig = rig(transport, gate, store);
        let trigger = ResetTrigger::new(recorder.clone(), rig.store.clone(), rig.coordinator.clone());

        let outcome = trigger.fire().await.unwrap();
        let path = outcome.flush.unwrap();
        assert!(outcome.report.announced);

        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("Swarm ID: A, Total Master Duration: 5 seconds"));
        assert!(text.contains("Swarm ID: B, Total Master Duration: 3 seconds"));
        assert!(text.contains("IP: 192.168.1.4"));
        assert_ne!(recorder.session_id(), first_session);
        assert_eq!(recorder.pending_entries(), 0);
        assert!(rig.store.snapshot().master_duration.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_press_leaves_log_session_alone() {
        let dir = tempfile::tempdir().unwrap();
        let gate = ResetGate::new();
        let store = seeded_store(&gate);
        let recorder = LogRecorder::new(dir.path(), "master_log");
        recorder.append(peer(4).ip(), "A", Some(100), chrono::Local::now());
        let session = recorder.session_id();

        let (transport, _inbox) = MemoryTransport::new();
        let rig = rig(transport, gate, store);
        let trigger = ResetTrigger::new(recorder.clone(), rig.store.clone(), rig.coordinator.clone());

        let claim = rig.coordinator.claim().unwrap();
        assert!(matches!(trigger.fire().await, Err(ResetError::InProgress)));
        assert_eq!(recorder.session_id(), session);
        assert_eq!(recorder.pending_entries(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        drop(claim);

        // two presses racing: one resets, the other is refused before any flush
        let (first, second) = tokio::join!(trigger.fire(), trigger.fire());
        let refused = [&first, &second].iter().filter(|r| matches!(r, Err(ResetError::InProgress))).count();
        assert_eq!(refused, 1);
        assert!(first.or(second).unwrap().flush.is_ok());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(rig.transport.sent().len(), 1);
        assert!(!rig.gate.is_active());
    }
}
