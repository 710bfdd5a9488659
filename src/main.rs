//! ==============================================================================
//! main.rs - swarm monitor node entry point
//! ==============================================================================
//!
//! purpose:
//!     wires the core together and runs three activities until Ctrl-C:
//!     - udp ingestion loop (writes swarm state + raw log)
//!     - reset button monitor (runs the reset sequence inline)
//!     - dashboard server (reads state snapshots)
//!
//! shutdown:
//!     Ctrl-C cancels one token. every loop checks it between iterations,
//!     so a reset in progress finishes first. the active log session is
//!     flushed once all activities have stopped.
//!
//! ==============================================================================

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use swarm_monitor::config::{ConfigSource, MonitorConfig};
use swarm_monitor::dashboard::{self, DashboardState};
use swarm_monitor::domain::Palette;
use swarm_monitor::hal::{Hal, HardwareProvider, Level};
use swarm_monitor::ingest::Ingestor;
use swarm_monitor::protocol::Framing;
use swarm_monitor::recorder::LogRecorder;
use swarm_monitor::reset::{ResetCoordinator, ResetGate, ResetTrigger};
use swarm_monitor::store::SwarmStore;
use swarm_monitor::transport::{Transport, UdpTransport};
use swarm_monitor::trigger::TriggerMonitor;

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: load configuration, then start logging at the configured level
    let (config, source) = MonitorConfig::load_or_default();
    init_tracing(&config.logging.level);
    match &source {
        ConfigSource::File(path) => tracing::info!("[CONFIG] Loaded from {}", path.display()),
        ConfigSource::Defaults { rejected } => {
            for (path, err) in rejected {
                tracing::warn!("[CONFIG] Failed to load {}: {}", path.display(), err);
            }
            tracing::warn!("[CONFIG] No config file found - using defaults");
        }
    }
    config.log_summary();

    // step 2: hardware and transport
    let hal: Arc<dyn HardwareProvider> = Arc::new(Hal::new()?);
    if let Err(e) = hal.write_output(config.gpio.indicator_pin, Level::Low) {
        tracing::warn!("Indicator init failed: {:#}", e);
    }
    let transport: Arc<dyn Transport> = Arc::new(UdpTransport::bind(&config.network).await?);

    // step 3: shared state
    let framing = Framing::from_config(&config.network);
    let gate = ResetGate::new();
    let store = SwarmStore::new(Palette::from_config(&config.display), config.display.history);
    let recorder = LogRecorder::from_config(&config.logs);
    let shutdown = CancellationToken::new();

    // step 4: activities
    let ingestor = Arc::new(Ingestor::new(
        framing.clone(),
        gate.clone(),
        store.clone(),
        recorder.clone(),
        config.logging.show_messages,
    ));
    let ingest_task = {
        let ingestor = ingestor.clone();
        let transport = transport.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { ingestor.run(transport, shutdown).await })
    };

    let coordinator = ResetCoordinator::new(
        gate,
        store.clone(),
        transport,
        hal.clone(),
        framing,
        config.gpio.indicator_pin,
        config.reset.indicator_hold(),
    );
    let trigger = ResetTrigger::new(recorder.clone(), store.clone(), coordinator);
    let monitor = TriggerMonitor::new(hal, config.gpio.button_pin, config.gpio.poll_interval());
    let monitor_task = tokio::spawn(monitor.run(trigger, shutdown.clone()));

    let dashboard_task = config.dashboard.enabled.then(|| {
        let state = DashboardState {
            store: store.clone(),
            stats: ingestor.stats(),
            refresh_seconds: config.dashboard.refresh_seconds,
        };
        let bind = config.dashboard.bind.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = dashboard::run_server(&bind, state, shutdown).await {
                tracing::error!("Web server error: {:#}", e);
            }
        })
    });

    // step 5: wait for Ctrl-C
    tokio::signal::ctrl_c().await?;
    tracing::info!("Keyboard interrupt detected. Shutting down...");
    shutdown.cancel();

    let exit = ingest_task.await?;
    tracing::debug!("Ingestion exit: {:?}", exit);
    let resets = monitor_task.await?;
    tracing::debug!("Resets during this run: {}", resets);
    if let Some(task) = dashboard_task {
        task.await?;
    }

    // final session flush so the last session is not lost
    if let Err(e) = recorder.flush(&store.snapshot().master_duration) {
        tracing::error!("Final log flush failed: {}", e);
    }
    tracing::info!("Shutdown complete.");
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
