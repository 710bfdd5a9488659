//! ==============================================================================
//! dashboard.rs - snapshot feed over http
//! ==============================================================================
//!
//! the display side of the node. it never mutates anything: every request
//! takes one `SwarmStore::snapshot()` (a consistent copy) and renders it.
//!
//! ```text
//!     GET /              html page, auto-refresh (~1 Hz by default)
//!     GET /api/snapshot  SwarmSnapshot as json
//!     GET /api/stats     ingestion counters as json
//! ```
//!
//! ==============================================================================

use anyhow::Result;
use axum::{
    extract::State,
    response::{Html, Json},
    routing::get,
    Router,
};
use std::fmt::Write as _;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::domain::SwarmSnapshot;
use crate::ingest::{IngestStats, IngestStatsSnapshot};
use crate::store::SwarmStore;

#[derive(Clone)]
pub struct DashboardState {
    pub store: SwarmStore,
    pub stats: Arc<IngestStats>,
    pub refresh_seconds: u64,
}

pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/api/snapshot", get(snapshot_handler))
        .route("/api/stats", get(stats_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(bind: &str, state: DashboardState, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Dashboard live at http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn dashboard_handler(State(state): State<DashboardState>) -> Html<String> {
    Html(render_page(&state.store.snapshot(), state.refresh_seconds))
}

/// json api endpoint for programmatic access
async fn snapshot_handler(State(state): State<DashboardState>) -> Json<SwarmSnapshot> {
    Json(state.store.snapshot())
}

async fn stats_handler(State(state): State<DashboardState>) -> Json<IngestStatsSnapshot> {
    Json(state.stats.snapshot())
}

fn render_page(snap: &SwarmSnapshot, refresh_seconds: u64) -> String {
    let master = snap.current_master.as_deref().unwrap_or("none");
    let master_color = snap.master_color().unwrap_or("blue");

    let mut readings = String::new();
    for (i, r) in snap.recent_readings.iter().enumerate() {
        if i > 0 {
            readings.push_str(", ");
        }
        let _ = write!(readings, "{}", r);
    }

    let mut rows = String::new();
    for (id, secs) in &snap.master_duration {
        let color = snap.color_of.get(id).map(String::as_str).unwrap_or("blue");
        let _ = write!(
            rows,
            r#"<tr><td style="color: {c};">{id}</td><td>{secs} s</td></tr>"#,
            c = html_escape(color),
            id = html_escape(id),
            secs = secs
        );
    }

    format!(
        r#"<!doctype html>
<html>
<head><title>swarm monitor</title><meta http-equiv="refresh" content="{refresh}"></head>
<body style="font-family: system-ui; padding: 2rem; background: #1a1a2e; color: #eee;">
    <h1>swarm monitor</h1>
    <p>current master: <strong style="color: {color};">{master}</strong> (reset epoch {epoch})</p>
    <h2>last {count} readings</h2>
    <pre style="background: #16213e; padding: 1rem; border-radius: 8px;">{readings}</pre>
    <h2>master durations</h2>
    <table>{rows}</table>
</body>
</html>"#,
        refresh = refresh_seconds.max(1),
        color = html_escape(master_color),
        master = html_escape(master),
        epoch = snap.epoch,
        count = snap.recent_readings.len(),
        readings = readings,
        rows = rows,
    )
}

/// escape html special characters to prevent xss
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
     .replace('<', "&lt;")
     .replace('>', "&gt;")
     .replace('"', "&quot;")
}
