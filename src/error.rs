//! ==============================================================================
//! error.rs - failure taxonomy for the monitor node
//! ==============================================================================
//!
//! purpose:
//!     one enum per failure domain so callers can decide locally what is
//!     fatal and what is just noise on the wire.
//!
//! ```text
//!     - ParseError:     malformed datagram, always recovered by discarding it
//!     - TransportError: the udp socket failed to receive or send
//!     - StorageError:   a log session could not be written to disk
//!     - ResetError:     a reset was requested while one is running
//! ```
//!
//! ==============================================================================

use std::path::PathBuf;
use thiserror::Error;

/// Why a datagram was rejected by the framing / body grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("payload is not valid utf-8")]
    NotUtf8,
    #[error("payload does not begin with start marker {0:?}")]
    MissingStart(String),
    #[error("payload does not end with end marker {0:?}")]
    MissingEnd(String),
    #[error("body has no separator")]
    NoSeparator,
    #[error("body has {0} separators, expected exactly one")]
    TooManySeparators(usize),
    #[error("swarm id is empty")]
    EmptySwarmId,
    #[error("reading {0:?} is not an integer")]
    InvalidReading(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind udp socket on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("receive failed: {0}")]
    Receive(#[source] std::io::Error),
    #[error("broadcast failed: {0}")]
    Send(#[source] std::io::Error),
    #[error("transport closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to write log file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session {0} has entries that were never flushed")]
    UnflushedSession(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResetError {
    #[error("a reset is already in progress")]
    InProgress,
}
