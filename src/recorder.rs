//! ==============================================================================
//! recorder.rs - raw message log and per-session log files
//! ==============================================================================
//!
//! purpose:
//!     every structurally valid datagram is kept as a human-readable line,
//!     grouped by sender ip. a session collects lines until the operator
//!     presses reset; the session is then written to one file and a fresh
//!     session starts.
//!
//! file layout:
//!
//! ```text
//!     Log File Created: 2026-10-18 14:02:11.482913
//!
//!     Masters Summary:
//!     Swarm ID: A, Total Master Duration: 42 seconds
//!
//!     Raw Data Logs:
//!
//!     IP: 192.168.1.40
//!     Time: 2026-10-18 14:01:29.011201, Swarm ID: A, Reading: 512
//! ```
//!
//! invariants:
//!     - a session is only rotated away once every appended line has been
//!       written by a successful flush
//!     - a failed flush leaves the in-memory session untouched
//!
//! ==============================================================================

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::LogsConfig;
use crate::error::StorageError;

/// Duration totals keyed by swarm id.
pub type DurationSummary = BTreeMap<String, u64>;

/// One raw log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub at: DateTime<Local>,
    pub swarm_id: String,
    /// `None` for the reset sentinel
    pub reading: Option<i64>,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Time: {}, Swarm ID: {}, Reading: ",
            self.at.format("%Y-%m-%d %H:%M:%S%.6f"),
            self.swarm_id
        )?;
        match self.reading {
            Some(r) => write!(f, "{}", r),
            None => f.write_str("-"),
        }
    }
}

/// Session identifier, derived from the session start time. Also the file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// `<prefix>_%Y-%m-%d_%H-%M-%S`, with `_2`, `_3`, ... appended when that
    /// name is already on disk or equals `previous`.
    pub fn derive(dir: &Path, prefix: &str, at: DateTime<Local>, previous: Option<&SessionId>) -> Self {
        let base = format!("{}_{}", prefix, at.format("%Y-%m-%d_%H-%M-%S"));
        let taken = |candidate: &str| {
            previous.is_some_and(|p| p.0 == candidate) || dir.join(format!("{}.txt", candidate)).exists()
        };

        let mut candidate = base.clone();
        let mut n = 2;
        while taken(&candidate) {
            candidate = format!("{}_{}", base, n);
            n += 1;
        }
        Self(candidate)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_in(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.txt", self.0))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
struct LogSession {
    id: SessionId,
    raw_entries: BTreeMap<IpAddr, Vec<LogLine>>,
    /// totals from earlier state epochs whose flush failed
    carried: DurationSummary,
    appended: u64,
    flushed: u64,
}

impl LogSession {
    fn new(id: SessionId) -> Self {
        Self { id, raw_entries: BTreeMap::new(), carried: BTreeMap::new(), appended: 0, flushed: 0 }
    }

    fn is_dirty(&self) -> bool {
        self.appended != self.flushed
    }

    fn summary(&self, live: &DurationSummary) -> DurationSummary {
        let mut merged = self.carried.clone();
        for (id, secs) in live {
            *merged.entry(id.clone()).or_insert(0) += secs;
        }
        merged
    }

    fn render(&self, live: &DurationSummary, now: DateTime<Local>) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Log File Created: {}\n", now.format("%Y-%m-%d %H:%M:%S%.6f"));
        out.push_str("Masters Summary:\n");
        for (id, secs) in self.summary(live) {
            let _ = writeln!(out, "Swarm ID: {}, Total Master Duration: {} seconds", id, secs);
        }
        out.push_str("\nRaw Data Logs:\n");
        for (ip, lines) in &self.raw_entries {
            let _ = writeln!(out, "\nIP: {}", ip);
            for line in lines {
                let _ = writeln!(out, "{}", line);
            }
        }
        out
    }
}

#[derive(Clone)]
pub struct LogRecorder {
    dir: PathBuf,
    prefix: String,
    session: Arc<Mutex<LogSession>>,
}

impl LogRecorder {
    /// Start the first session. Nothing touches the disk until a flush.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        let dir = dir.into();
        let prefix = prefix.into();
        let id = SessionId::derive(&dir, &prefix, Local::now(), None);
        tracing::info!("New log session: {}", id);
        Self { dir, prefix, session: Arc::new(Mutex::new(LogSession::new(id))) }
    }

    pub fn from_config(logs: &LogsConfig) -> Self {
        Self::new(logs.directory.clone(), logs.file_prefix.clone())
    }

    pub fn session_id(&self) -> SessionId {
        self.session.lock().id.clone()
    }

    /// Lines held by the active session.
    pub fn pending_entries(&self) -> usize {
        self.session.lock().raw_entries.values().map(Vec::len).sum()
    }

    pub fn append(&self, source: IpAddr, swarm_id: &str, reading: Option<i64>, at: DateTime<Local>) -> LogLine {
        self.append_then(source, swarm_id, reading, at, || ()).0
    }

    /// Append a line and run `then` before the session lock is released.
    ///
    /// Whatever `then` does is therefore reflected in the summary of the
    /// session that holds the line. Lock order is recorder first, store second.
    pub fn append_then<R>(
        &self,
        source: IpAddr,
        swarm_id: &str,
        reading: Option<i64>,
        at: DateTime<Local>,
        then: impl FnOnce() -> R,
    ) -> (LogLine, R) {
        let line = LogLine { at, swarm_id: swarm_id.to_string(), reading };
        let mut session = self.session.lock();
        session.raw_entries.entry(source).or_default().push(line.clone());
        session.appended += 1;
        let out = then();
        (line, out)
    }

    /// Write the active session, with `live` totals in the summary, to its file.
    ///
    /// The file is rewritten in full on every flush, so repeated flushes of the
    /// same session converge on the same content.
    pub fn flush(&self, live: &DurationSummary) -> Result<PathBuf, StorageError> {
        let mut session = self.session.lock();
        self.flush_locked(&mut session, live)
    }

    /// Start a new empty session. Refused while unflushed lines remain.
    pub fn rotate(&self) -> Result<SessionId, StorageError> {
        let mut session = self.session.lock();
        self.rotate_locked(&mut session)
    }

    /// Flush then rotate without letting an append slip in between.
    ///
    /// `live` is sampled under the session lock, so the summary covers exactly
    /// the lines in the file. Used right before the swarm state is cleared. If
    /// the flush fails, the session stays active and the sampled totals are
    /// folded into its carried summary so the next successful flush still
    /// reports them.
    pub fn close_session(&self, live: impl FnOnce() -> DurationSummary) -> Result<PathBuf, StorageError> {
        let mut session = self.session.lock();
        let live = live();
        match self.flush_locked(&mut session, &live) {
            Ok(path) => {
                self.rotate_locked(&mut session)?;
                Ok(path)
            }
            Err(e) => {
                session.carried = session.summary(&live);
                Err(e)
            }
        }
    }

    fn flush_locked(&self, session: &mut LogSession, live: &DurationSummary) -> Result<PathBuf, StorageError> {
        let path = session.id.file_in(&self.dir);
        let content = session.render(live, Local::now());

        std::fs::create_dir_all(&self.dir)
            .and_then(|_| std::fs::write(&path, content))
            .map_err(|source| StorageError::Write { path: path.clone(), source })?;

        session.flushed = session.appended;
        tracing::info!("Logs saved to {}", path.display());
        Ok(path)
    }

    fn rotate_locked(&self, session: &mut LogSession) -> Result<SessionId, StorageError> {
        if session.is_dirty() {
            return Err(StorageError::UnflushedSession(session.id.to_string()));
        }
        let id = SessionId::derive(&self.dir, &self.prefix, Local::now(), Some(&session.id));
        tracing::info!("New log session: {}", id);
        *session = LogSession::new(id.clone());
        Ok(id)
    }
}
