//! ==============================================================================
//! swarm-monitor - local monitor node for a udp device swarm
//! ==============================================================================
//!
//! devices broadcast "+++<swarm_id>,<reading>***" about once a second. the
//! node tracks who currently claims master, how long each device has held it,
//! the last readings, and keeps a raw log per session. pressing the reset
//! button closes the log session, tells the swarm to reset, clears the local
//! state and lights the indicator led.
//!
//! ```text
//!     ┌──────────────────────────────────────────────────────────────┐
//!     │                       monitor node                           │
//!     │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//!     │  │ ingestion    │  │ button poll  │  │ dashboard          │  │
//!     │  │ (udp 4210)   │  │ (100ms)      │  │ (snapshot reader)  │  │
//!     │  └──────┬───────┘  └──────┬───────┘  └─────────┬──────────┘  │
//!     │         │                 │ reset              │             │
//!     │         ▼                 ▼                    ▼             │
//!     │   ┌───────────┐     ┌───────────┐        ┌───────────┐       │
//!     │   │ recorder  │◄────│ reset     │───────►│ store     │       │
//!     │   └───────────┘     └───────────┘        └───────────┘       │
//!     └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ==============================================================================

pub mod config;
pub mod dashboard;
pub mod domain;
pub mod error;
pub mod hal;
pub mod ingest;
pub mod protocol;
pub mod recorder;
pub mod reset;
pub mod store;
pub mod transport;
pub mod trigger;
