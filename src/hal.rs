//! ==============================================================================
//! hal.rs - Hardware Abstraction Layer
//! ==============================================================================
//!
//! purpose:
//!     the monitor only needs two digital lines: the reset button (input) and
//!     the yellow indicator led (output). this module hides whether those are
//!     real Raspberry Pi pins (using `rppal`) or an in-memory mock.
//!
//! design philosophy:
//!     - "Compile Anywhere": the default build uses the mock and runs on any
//!       machine; `--features hardware` switches to rppal.
//!     - the mock is also the test double: tests set input levels and read
//!       back a timestamped history of output writes.
//!
//! relationships:
//!     - used by: trigger.rs (polls the button)
//!     - used by: reset.rs (drives the indicator led)
//!     - uses: rppal (on feature="hardware")
//!
//! ==============================================================================

use anyhow::Result;

/// Digital line level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    #[default]
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

pub trait HardwareProvider: Send + Sync {
    fn read_input(&self, pin: u8) -> Result<Level>;
    fn write_output(&self, pin: u8, level: Level) -> Result<()>;
}

/// One recorded output write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputEvent {
    pub pin: u8,
    pub level: Level,
    pub at: tokio::time::Instant,
}

// ==============================================================================================
// MOCK IMPLEMENTATION (For WSL / Non-Hardware Build)
// ==============================================================================================
#[cfg(not(feature = "hardware"))]
pub struct Hal {
    inputs: parking_lot::Mutex<std::collections::HashMap<u8, Level>>,
    outputs: parking_lot::Mutex<Vec<OutputEvent>>,
}

#[cfg(not(feature = "hardware"))]
impl Hal {
    pub fn new() -> Result<Self> {
        tracing::info!("Using MOCK HAL (No hardware access)");
        Ok(Self {
            inputs: parking_lot::Mutex::new(std::collections::HashMap::new()),
            outputs: parking_lot::Mutex::new(Vec::new()),
        })
    }

    /// Simulate the physical level on an input pin.
    pub fn set_input(&self, pin: u8, level: Level) {
        self.inputs.lock().insert(pin, level);
    }

    pub fn output_history(&self, pin: u8) -> Vec<OutputEvent> {
        self.outputs.lock().iter().filter(|e| e.pin == pin).copied().collect()
    }
}

#[cfg(not(feature = "hardware"))]
impl HardwareProvider for Hal {
    fn read_input(&self, pin: u8) -> Result<Level> {
        Ok(self.inputs.lock().get(&pin).copied().unwrap_or_default())
    }

    fn write_output(&self, pin: u8, level: Level) -> Result<()> {
        tracing::debug!("[MOCK GPIO] Pin {} write {:?}", pin, level);
        self.outputs.lock().push(OutputEvent { pin, level, at: tokio::time::Instant::now() });
        Ok(())
    }
}

// ==============================================================================================
// REAL IMPLEMENTATION (For Raspberry Pi)
// ==============================================================================================
#[cfg(feature = "hardware")]
pub struct Hal {
    gpio: rppal::gpio::Gpio,
}

#[cfg(feature = "hardware")]
impl Hal {
    pub fn new() -> Result<Self> {
        tracing::info!("Using REAL HARDWARE HAL (rppal)");
        Ok(Self { gpio: rppal::gpio::Gpio::new()? })
    }
}

#[cfg(feature = "hardware")]
impl HardwareProvider for Hal {
    fn read_input(&self, pin: u8) -> Result<Level> {
        let mut p = self.gpio.get(pin)?.into_input();
        // keep the pin configured between polls
        p.set_reset_on_drop(false);
        Ok(Level::from(p.is_high()))
    }

    fn write_output(&self, pin: u8, level: Level) -> Result<()> {
        let mut p = self.gpio.get(pin)?.into_output();
        // CRITICAL: Prevent GPIO from resetting when dropped
        // Without this, the led turns off as soon as this function returns
        p.set_reset_on_drop(false);
        if level.is_high() { p.set_high(); } else { p.set_low(); }
        Ok(())
    }
}

#[cfg(all(test, not(feature = "hardware")))]
mod tests {
    use super::*;

    #[test]
    fn test_unset_inputs_read_low() {
        let hal = Hal::new().unwrap();
        assert_eq!(hal.read_input(22).unwrap(), Level::Low);
        hal.set_input(22, Level::High);
        assert_eq!(hal.read_input(22).unwrap(), Level::High);
    }

    #[tokio::test]
    async fn test_outputs_are_recorded_per_pin() {
        let hal = Hal::new().unwrap();
        hal.write_output(26, Level::High).unwrap();
        hal.write_output(5, Level::High).unwrap();
        hal.write_output(26, Level::Low).unwrap();

        let levels: Vec<_> = hal.output_history(26).iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![Level::High, Level::Low]);
    }

    #[test]
    fn test_level_from_bool() {
        assert_eq!(Level::from(true), Level::High);
        assert!(!Level::from(false).is_high());
    }
}
