//! secmon daemon
//!
//! Composes the security pipeline at the process root, restores persisted
//! events and incidents, runs periodic maintenance and shuts down cleanly on Ctrl+C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use secmon_core::constants::{APP_NAME, APP_VERSION};
use secmon_core::logic::incident::RecordingContainment;
use secmon_core::logic::store::{
    default_database_path, EventStore, KeyValueStore, SqliteEventStore, SqliteKeyValueStore,
};
use secmon_core::{SecurityConfig, SecurityPipeline};

/// Retention sweep interval across all engines
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting {} v{}...", APP_NAME, APP_VERSION);

    let config = SecurityConfig::load().context("invalid configuration")?;

    let db_path = config
        .storage
        .database_path
        .clone()
        .unwrap_or_else(default_database_path);
    log::info!("Database: {}", db_path.display());

    let events: Arc<dyn EventStore> = Arc::new(
        SqliteEventStore::open(&db_path)
            .with_context(|| format!("failed to open event store at {}", db_path.display()))?,
    );
    let kv: Arc<dyn KeyValueStore> = Arc::new(
        SqliteKeyValueStore::open(&db_path)
            .with_context(|| format!("failed to open keyed store at {}", db_path.display()))?,
    );

    let pipeline = Arc::new(SecurityPipeline::from_config(
        &config,
        events,
        kv,
        Arc::new(RecordingContainment::new()),
    ));

    let restored = pipeline.restore().await;
    log::info!(
        "Restored {} buffered events and {} incidents",
        restored.events,
        restored.incidents
    );

    pipeline.start();
    let maintenance = tokio::spawn(maintenance_loop(pipeline.clone()));

    let report = pipeline.status_report().await;
    log::info!(
        "Security posture: {} ({}/{} controls passing)",
        report.posture.as_str(),
        report.controls.iter().filter(|c| c.passed).count(),
        report.controls.len()
    );
    for control in report.controls.iter().filter(|c| !c.passed) {
        log::warn!("Control '{}' failing: {}", control.name, control.detail);
    }

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    log::info!("Shutdown requested");

    maintenance.abort();
    pipeline.shutdown().await;
    Ok(())
}

async fn maintenance_loop(pipeline: Arc<SecurityPipeline>) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
    interval.tick().await;
    loop {
        interval.tick().await;
        let removed = pipeline.run_maintenance().await;
        if removed > 0 {
            log::info!("Maintenance removed {} expired records", removed);
        }
    }
}
