use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::config::{DisplayConfig, PaletteExhaustion};

/// Ordered display colors handed out to swarm ids by first appearance.
#[derive(Debug, Clone)]
pub struct Palette {
    colors: Vec<String>,
    exhaustion: PaletteExhaustion,
}

impl Palette {
    /// An empty color list falls back to a single "blue" entry.
    pub fn new(colors: Vec<String>, exhaustion: PaletteExhaustion) -> Self {
        let colors = if colors.is_empty() { vec!["blue".to_string()] } else { colors };
        Self { colors, exhaustion }
    }

    pub fn from_config(display: &DisplayConfig) -> Self {
        Self::new(display.palette.clone(), display.palette_exhaustion)
    }

    /// Color for the `ordinal`-th distinct id (0-based).
    pub fn color_for(&self, ordinal: usize) -> &str {
        let index = match self.exhaustion {
            PaletteExhaustion::ReuseLast => ordinal.min(self.colors.len() - 1),
            PaletteExhaustion::Cycle => ordinal % self.colors.len(),
        };
        &self.colors[index]
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::from_config(&DisplayConfig::default())
    }
}

/// Swarm-wide tracking state. Pure data; locking lives in [`crate::store`].
///
/// `master_duration` counts accepted messages per master, not wall-clock
/// seconds. Devices broadcast at roughly 1 Hz, so one message stands in for
/// one second of mastership.
#[derive(Debug, Clone)]
pub struct SwarmState {
    palette: Palette,
    capacity: usize,
    color_of: BTreeMap<String, String>,
    current_master: Option<String>,
    recent_readings: VecDeque<i64>,
    master_duration: BTreeMap<String, u64>,
    epoch: u64,
}

impl SwarmState {
    pub fn new(palette: Palette, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            palette,
            capacity,
            color_of: BTreeMap::new(),
            current_master: None,
            recent_readings: VecDeque::with_capacity(capacity),
            master_duration: BTreeMap::new(),
            epoch: 0,
        }
    }

    /// First caller for an id fixes its color for the rest of the epoch.
    pub fn assign_color_if_absent(&mut self, swarm_id: &str) -> String {
        if let Some(color) = self.color_of.get(swarm_id) {
            return color.clone();
        }
        let color = self.palette.color_for(self.color_of.len()).to_string();
        self.color_of.insert(swarm_id.to_string(), color.clone());
        color
    }

    /// Readings are opaque; no range check.
    pub fn record_reading(&mut self, reading: i64) {
        if self.recent_readings.len() == self.capacity {
            self.recent_readings.pop_front();
        }
        self.recent_readings.push_back(reading);
    }

    /// Returns `true` when the master changed.
    pub fn set_master(&mut self, swarm_id: &str) -> bool {
        if self.current_master.as_deref() == Some(swarm_id) {
            return false;
        }
        self.current_master = Some(swarm_id.to_string());
        true
    }

    pub fn increment_master_duration(&mut self, swarm_id: &str) {
        *self.master_duration.entry(swarm_id.to_string()).or_insert(0) += 1;
    }

    pub fn duration_of(&self, swarm_id: &str) -> u64 {
        self.master_duration.get(swarm_id).copied().unwrap_or(0)
    }

    /// Back to the initial empty state. Palette and capacity survive.
    pub fn clear(&mut self) {
        self.color_of.clear();
        self.current_master = None;
        self.recent_readings.clear();
        self.master_duration.clear();
        self.epoch += 1;
    }

    pub fn snapshot(&self) -> SwarmSnapshot {
        SwarmSnapshot {
            recent_readings: self.recent_readings.iter().copied().collect(),
            current_master: self.current_master.clone(),
            color_of: self.color_of.clone(),
            master_duration: self.master_duration.clone(),
            epoch: self.epoch,
        }
    }
}

impl Default for SwarmState {
    fn default() -> Self {
        Self::new(Palette::default(), DisplayConfig::default().history)
    }
}

/// Immutable copy of [`SwarmState`] taken at a single instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmSnapshot {
    /// oldest first
    pub recent_readings: Vec<i64>,
    pub current_master: Option<String>,
    pub color_of: BTreeMap<String, String>,
    pub master_duration: BTreeMap<String, u64>,
    /// number of resets since startup
    pub epoch: u64,
}

impl SwarmSnapshot {
    pub fn master_color(&self) -> Option<&str> {
        self.current_master
            .as_ref()
            .and_then(|m| self.color_of.get(m))
            .map(String::as_str)
    }
}
