//! ==============================================================================
//! ingest.rs - datagram ingestion loop
//! ==============================================================================
//!
//! per datagram:
//!     1. reset gate raised?        -> drop, do not decode
//!     2. utf-8 + framing + body    -> malformed datagrams are dropped
//!     3. append raw log line       (sentinel included)
//!     4. sentinel?                 -> stop here
//!     5. apply reading to the store (reading, color, master, duration)
//!
//! a bad datagram never ends the loop. only shutdown or a receive error does,
//! and both end it by returning, never by panicking.
//!
//! ==============================================================================

use chrono::Local;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{ParseError, TransportError};
use crate::protocol::{Body, Framing};
use crate::recorder::LogRecorder;
use crate::reset::ResetGate;
use crate::store::SwarmStore;
use crate::transport::Transport;

/// What happened to one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    DroppedDuringReset,
    Malformed(ParseError),
    /// reset sentinel: logged, no state change
    Acknowledged,
    Applied { swarm_id: String, reading: i64, new_master: bool },
}

/// Why the ingestion loop returned.
#[derive(Debug)]
pub enum IngestExit {
    Shutdown,
    TransportFailed(TransportError),
}

#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    dropped_during_reset: AtomicU64,
    malformed: AtomicU64,
    acknowledged: AtomicU64,
    applied: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStatsSnapshot {
    pub received: u64,
    pub dropped_during_reset: u64,
    pub malformed: u64,
    pub acknowledged: u64,
    pub applied: u64,
}

impl IngestStats {
    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            dropped_during_reset: self.dropped_during_reset.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct Ingestor {
    framing: Framing,
    gate: ResetGate,
    store: SwarmStore,
    recorder: LogRecorder,
    stats: Arc<IngestStats>,
    show_messages: bool,
}

impl Ingestor {
    pub fn new(
        framing: Framing,
        gate: ResetGate,
        store: SwarmStore,
        recorder: LogRecorder,
        show_messages: bool,
    ) -> Self {
        Self { framing, gate, store, recorder, stats: Arc::new(IngestStats::default()), show_messages }
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        self.stats.clone()
    }

    pub fn handle_datagram(&self, bytes: &[u8], from: SocketAddr) -> Disposition {
        IngestStats::bump(&self.stats.received);

        if self.gate.is_active() {
            IngestStats::bump(&self.stats.dropped_during_reset);
            tracing::debug!("Reset in progress, dropped datagram from {}", from);
            return Disposition::DroppedDuringReset;
        }

        let body = match self.framing.decode(bytes) {
            Ok(body) => body,
            Err(e) => {
                IngestStats::bump(&self.stats.malformed);
                tracing::debug!("Discarding datagram from {}: {}", from, e);
                return Disposition::Malformed(e);
            }
        };

        let at = Local::now();
        let (line, outcome) = match body {
            Body::Reading { swarm_id, reading } => {
                // applied under the recorder lock so a session close sees
                // the line and its effect on the durations together
                let (line, applied) = self.recorder.append_then(from.ip(), &swarm_id, Some(reading), at, || {
                    self.store.apply_reading(&self.gate, &swarm_id, reading)
                });
                (line, Some((swarm_id, reading, applied)))
            }
            Body::ResetSentinel => (self.recorder.append(from.ip(), self.framing.sentinel(), None, at), None),
        };
        if self.show_messages {
            tracing::info!("Received from {}: {}", from.ip(), line);
        } else {
            tracing::debug!("Received from {}: {}", from.ip(), line);
        }

        let Some((swarm_id, reading, applied)) = outcome else {
            IngestStats::bump(&self.stats.acknowledged);
            return Disposition::Acknowledged;
        };

        match applied {
            Some(applied) => {
                if applied.new_master {
                    tracing::info!("New master detected: {}", swarm_id);
                }
                IngestStats::bump(&self.stats.applied);
                Disposition::Applied { swarm_id, reading, new_master: applied.new_master }
            }
            None => {
                // gate went up between the first check and the store lock
                IngestStats::bump(&self.stats.dropped_during_reset);
                Disposition::DroppedDuringReset
            }
        }
    }

    /// Receive until shutdown or a transport failure.
    pub async fn run(&self, transport: Arc<dyn Transport>, shutdown: CancellationToken) -> IngestExit {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("Ingestion stopped");
                    return IngestExit::Shutdown;
                }
                received = transport.recv() => match received {
                    Ok((bytes, from)) => {
                        self.handle_datagram(&bytes, from);
                    }
                    Err(e) => {
                        tracing::error!("Ingestion ended: {}", e);
                        return IngestExit::TransportFailed(e);
                    }
                }
            }
        }
    }
}
