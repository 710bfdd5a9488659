//! ==============================================================================
//! trigger.rs - reset button monitor
//! ==============================================================================
//!
//! polls the button pin at a fixed interval and fires the reset trigger on a
//! low -> high transition. the poll interval is the debounce: a press lasts
//! far longer than one interval, and the next press is seconds away.
//!
//! the reset runs inline in this loop, so a second press cannot start another
//! reset until the first has finished, and shutdown is only observed between
//! resets, never in the middle of one.
//!
//! ==============================================================================

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::hal::{HardwareProvider, Level};
use crate::reset::ResetTrigger;

/// Rising-edge detector over successive samples.
#[derive(Debug, Default)]
pub struct EdgeDetector {
    previous: Level,
}

impl EdgeDetector {
    /// Returns `true` only for a low -> high transition.
    pub fn observe(&mut self, level: Level) -> bool {
        let rising = self.previous == Level::Low && level == Level::High;
        self.previous = level;
        rising
    }
}

pub struct TriggerMonitor {
    hal: Arc<dyn HardwareProvider>,
    pin: u8,
    interval: Duration,
    edges: EdgeDetector,
}

impl TriggerMonitor {
    pub fn new(hal: Arc<dyn HardwareProvider>, pin: u8, interval: Duration) -> Self {
        Self { hal, pin, interval, edges: EdgeDetector::default() }
    }

    /// Poll until shutdown. Returns the number of resets fired.
    pub async fn run(mut self, trigger: ResetTrigger, shutdown: CancellationToken) -> u64 {
        let mut fired = 0;
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let level = match self.hal.read_input(self.pin) {
                Ok(level) => level,
                Err(e) => {
                    tracing::warn!("Button read failed on pin {}: {:#}", self.pin, e);
                    continue;
                }
            };

            if self.edges.observe(level) {
                tracing::info!("Button is pressed");
                match trigger.fire().await {
                    Ok(_) => fired += 1,
                    Err(e) => tracing::warn!("Button press ignored: {}", e),
                }
            }
        }

        tracing::info!("Button monitor stopped");
        fired
    }
}
