//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `monitor.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - NetworkConfig: udp port, broadcast address, framing markers.
//!     - GpioConfig: reset button / indicator led pins and poll interval.
//!     - ResetConfig: how long the indicator stays lit after a reset.
//!     - DisplayConfig: color palette and reading history length.
//!     - LogsConfig: where session log files are written.
//!     - DashboardConfig: snapshot http server.
//!     - LoggingConfig: tracing level and per-message verbosity.
//!
//! ==============================================================================

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that points at an explicit config file.
pub const CONFIG_ENV: &str = "SWARM_MONITOR_CONFIG";

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MonitorConfig {
    pub network: NetworkConfig,
    pub gpio: GpioConfig,
    pub reset: ResetConfig,
    pub display: DisplayConfig,
    pub logs: LogsConfig,
    pub dashboard: DashboardConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NetworkConfig {
    pub port: u16,
    pub bind_address: String,
    pub broadcast_address: String,
    pub start_marker: String,
    pub end_marker: String,
    pub reset_sentinel: String,
    pub max_datagram: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GpioConfig {
    pub button_pin: u8,
    pub indicator_pin: u8,
    pub poll_interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ResetConfig {
    pub indicator_hold_seconds: u64,
}

/// What a device gets once every palette color has been handed out.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PaletteExhaustion {
    #[default]
    ReuseLast,
    Cycle,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub palette: Vec<String>,
    pub palette_exhaustion: PaletteExhaustion,
    pub history: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogsConfig {
    pub directory: PathBuf,
    pub file_prefix: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub bind: String,
    pub refresh_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_messages: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: 4210,
            bind_address: "0.0.0.0".to_string(),
            broadcast_address: "255.255.255.255".to_string(),
            start_marker: "+++".to_string(),
            end_marker: "***".to_string(),
            reset_sentinel: "RESET_REQUESTED".to_string(),
            max_datagram: 1024,
        }
    }
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self { button_pin: 22, indicator_pin: 26, poll_interval_ms: 100 }
    }
}

impl GpioConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self { indicator_hold_seconds: 3 }
    }
}

impl ResetConfig {
    pub fn indicator_hold(&self) -> Duration {
        Duration::from_secs(self.indicator_hold_seconds)
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            palette: vec!["red".to_string(), "green".to_string(), "yellow".to_string()],
            palette_exhaustion: PaletteExhaustion::ReuseLast,
            history: 30,
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self { directory: PathBuf::from("logs"), file_prefix: "master_log".to_string() }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { enabled: true, bind: "0.0.0.0:3000".to_string(), refresh_seconds: 1 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_messages: true }
    }
}

/// Where the effective configuration came from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults { rejected: Vec<(PathBuf, String)> },
}

impl MonitorConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config: MonitorConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Load with default fallback.
    ///
    /// Runs before the tracing subscriber exists, so problems are returned in
    /// the [`ConfigSource`] instead of being logged here.
    pub fn load_or_default() -> (Self, ConfigSource) {
        let mut paths = Vec::new();
        if let Ok(explicit) = std::env::var(CONFIG_ENV) {
            paths.push(PathBuf::from(explicit));
        }
        paths.push(PathBuf::from("config").join("monitor.toml"));
        paths.push(PathBuf::from("..").join("config").join("monitor.toml"));

        let mut rejected = Vec::new();
        for path in paths {
            if !path.exists() {
                continue;
            }
            match Self::load(&path) {
                Ok(config) => return (config, ConfigSource::File(path)),
                Err(e) => rejected.push((path, e.to_string())),
            }
        }

        (Self::default(), ConfigSource::Defaults { rejected })
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.display.palette.is_empty() {
            anyhow::bail!("display.palette must name at least one color");
        }
        if self.display.history == 0 {
            anyhow::bail!("display.history must be at least 1");
        }
        if self.network.start_marker.is_empty() || self.network.end_marker.is_empty() {
            anyhow::bail!("network start/end markers must not be empty");
        }
        if self.network.reset_sentinel.is_empty() {
            anyhow::bail!("network.reset_sentinel must not be empty");
        }
        if self.network.reset_sentinel.contains(',') {
            anyhow::bail!("network.reset_sentinel must not contain a comma");
        }
        Ok(())
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        tracing::info!(
            port = self.network.port,
            broadcast = %self.network.broadcast_address,
            button_pin = self.gpio.button_pin,
            indicator_pin = self.gpio.indicator_pin,
            poll_ms = self.gpio.poll_interval_ms,
            "network / gpio"
        );
        tracing::info!(
            palette = ?self.display.palette,
            exhaustion = ?self.display.palette_exhaustion,
            history = self.display.history,
            log_dir = %self.logs.directory.display(),
            dashboard = self.dashboard.enabled,
            "display / logs"
        );
    }
}
