//! ==============================================================================
//! protocol.rs - swarm datagram framing
//! ==============================================================================
//!
//! wire format (ascii, one datagram per message):
//!
//! ```text
//!     <START><swarm_id>,<reading><END>      e.g. "+++A,512***"
//!     <START>RESET_REQUESTED<END>           reset announcement / acknowledgement
//! ```
//!
//! the sentinel is its own grammar alternative and is matched before the
//! comma split is attempted, so it never needs a separator.
//!
//! relationships:
//!     - used by: ingest.rs (decode every inbound datagram)
//!     - used by: reset.rs (encode the outbound reset announcement)
//!
//! ==============================================================================

use crate::config::NetworkConfig;
use crate::error::ParseError;

const SEPARATOR: char = ',';

/// Decoded body of a well-framed datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Reading { swarm_id: String, reading: i64 },
    ResetSentinel,
}

/// Delimiters and sentinel agreed by every swarm member.
#[derive(Debug, Clone)]
pub struct Framing {
    start: String,
    end: String,
    sentinel: String,
}

impl Framing {
    pub fn new(start: impl Into<String>, end: impl Into<String>, sentinel: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            sentinel: sentinel.into(),
        }
    }

    pub fn from_config(network: &NetworkConfig) -> Self {
        Self::new(
            network.start_marker.clone(),
            network.end_marker.clone(),
            network.reset_sentinel.clone(),
        )
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Wrap a body in start/end markers.
    pub fn encode(&self, body: &str) -> Vec<u8> {
        format!("{}{}{}", self.start, body, self.end).into_bytes()
    }

    /// The datagram this node broadcasts when a reset is triggered.
    pub fn reset_announcement(&self) -> Vec<u8> {
        self.encode(&self.sentinel)
    }

    /// Decode raw bytes into a [`Body`].
    pub fn decode(&self, bytes: &[u8]) -> Result<Body, ParseError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ParseError::NotUtf8)?;
        self.parse(text)
    }

    pub fn parse(&self, payload: &str) -> Result<Body, ParseError> {
        let inner = self.strip_markers(payload)?;

        if inner == self.sentinel {
            return Ok(Body::ResetSentinel);
        }

        let separators = inner.matches(SEPARATOR).count();
        match separators {
            0 => return Err(ParseError::NoSeparator),
            1 => {}
            n => return Err(ParseError::TooManySeparators(n)),
        }

        let (swarm_id, raw_reading) = inner
            .split_once(SEPARATOR)
            .ok_or(ParseError::NoSeparator)?;
        if swarm_id.is_empty() {
            return Err(ParseError::EmptySwarmId);
        }
        let reading = raw_reading
            .trim()
            .parse::<i64>()
            .map_err(|_| ParseError::InvalidReading(raw_reading.to_string()))?;

        Ok(Body::Reading {
            swarm_id: swarm_id.to_string(),
            reading,
        })
    }

    fn strip_markers<'a>(&self, payload: &'a str) -> Result<&'a str, ParseError> {
        let rest = payload
            .strip_prefix(self.start.as_str())
            .ok_or_else(|| ParseError::MissingStart(self.start.clone()))?;
        rest.strip_suffix(self.end.as_str())
            .ok_or_else(|| ParseError::MissingEnd(self.end.clone()))
    }
}

impl Default for Framing {
    fn default() -> Self {
        Self::from_config(&NetworkConfig::default())
    }
}
