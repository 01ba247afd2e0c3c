//! CloudSecMonitor -- security log monitoring for a small server fleet.
//!
//! This crate scans stored security events for SSH brute-force and port-scan
//! patterns, records each detected attack once as an incident, and exposes
//! the results to operators through the CLI and a read-only JSON API.

pub mod api;
pub mod config;
pub mod detect;
pub mod events;
pub mod monitor;
pub mod storage;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::CloudSecConfig;
use crate::monitor::{CycleReport, Monitor};
use crate::storage::{SharedStore, SqliteStore};

/// Open the event store named by the configuration.
pub fn open_store(config: &CloudSecConfig) -> Result<SqliteStore> {
    tracing::info!(db_path = %config.storage.path, "Initializing database");
    let pool = storage::open_pool(&config.storage).context("cannot open the event store")?;
    Ok(SqliteStore::new(pool))
}

/// Wire a monitor for the configured rules and alert sink.
pub fn build_monitor(config: &CloudSecConfig, store: SharedStore) -> Monitor {
    Monitor::new(store, config.alerts.sink.build(), config.active_rules())
}

/// Run a single detection cycle.
pub fn analyze_once(config: &CloudSecConfig) -> Result<CycleReport> {
    let store: SharedStore = Arc::new(open_store(config)?);
    let monitor = build_monitor(config, store);
    Ok(monitor.run_cycle())
}

/// Monitor continuously until `shutdown` is cancelled. Returns the number
/// of cycles run. The store is released when this returns.
pub async fn run_monitor(config: &CloudSecConfig, shutdown: CancellationToken) -> Result<u64> {
    let store: SharedStore = Arc::new(open_store(config)?);
    let monitor = Arc::new(build_monitor(config, store));
    let interval = Duration::from_secs(config.monitor.interval_secs);

    Ok(monitor::run_monitor_loop(monitor, interval, shutdown).await)
}

/// Serve the read-only dashboard API until `shutdown` is cancelled.
pub async fn serve(config: &CloudSecConfig, shutdown: CancellationToken) -> Result<()> {
    let store = open_store(config)?;
    let addr: std::net::SocketAddr = config
        .api
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.api.bind))?;
    let app = api::router(api::state::AppState { store });

    tracing::info!(%addr, "Dashboard API listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
