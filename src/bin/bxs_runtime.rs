//! BXS Runtime - periodic metric refresh and alert evaluation
//!
//! This binary hosts the metrics engine:
//! - Initializes the SQLite database with schema
//! - Optionally recomputes cumulative metrics from full history
//! - Spawns the evaluation scheduler (refresh + alert rules)
//!
//! Usage:
//!   cargo run --release --bin bxs_runtime
//!
//! Environment variables:
//!   BXS_DB_PATH - SQLite database path (default: data/bxs.sqlite)
//!   BXS_SCHEMA_DIR - Schema directory (default: sql)
//!   BXS_EVAL_INTERVAL_MS - Evaluation interval (default: 600000)
//!   BXS_EVAL_TIMEOUT_MS - Per-run timeout (default: 30000)
//!   BXS_RECOMPUTE_ON_START - Full recompute before first run (default: false)

use bxs::metrics::{
    config::EngineConfig,
    db::{open_database, run_schema_migrations},
    engine::{MetricsEngine, RecomputeOutcome},
    scheduler::evaluation_scheduler_task,
};
use dotenv::dotenv;
use log::{error, info, warn};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 BXS Runtime - metrics computation & alerting");

    let config = EngineConfig::from_env();

    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Evaluation interval: {}ms", config.eval_interval_ms);
    info!("   ├─ Evaluation timeout: {}ms", config.eval_timeout_ms);
    info!(
        "   └─ Alert window: {} days, threshold {}%",
        config.alerts.window_days, config.alerts.decline_threshold_pct
    );

    info!("🔧 Initializing database...");
    let mut conn = open_database(&config.db_path)?;
    if Path::new(&config.schema_dir).exists() {
        run_schema_migrations(&mut conn, &config.schema_dir)?;
    } else {
        warn!("⚠️  Schema directory {} not found, using embedded schema", config.schema_dir);
    }

    let recompute_on_start = config.recompute_on_start;
    let interval_ms = config.eval_interval_ms;
    let timeout_ms = config.eval_timeout_ms;

    let mut engine = MetricsEngine::new(conn, config)?;
    info!("✅ MetricsEngine created");

    if recompute_on_start {
        match engine.recompute_cumulative()? {
            RecomputeOutcome::NoData => info!("ℹ️  No observations yet, nothing to recompute"),
            RecomputeOutcome::Success { processed, latest_t } => {
                info!("✅ Recomputed {} cumulative rows (latest t={})", processed, latest_t)
            }
        }
    }

    let engine = Arc::new(Mutex::new(engine));

    let engine_scheduler = engine.clone();
    let scheduler = tokio::spawn(async move {
        evaluation_scheduler_task(engine_scheduler, interval_ms, timeout_ms).await;
    });
    info!("✅ Evaluation scheduler spawned");
    info!("🔄 Press CTRL+C to shutdown gracefully");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("");
            info!("⚠️  Received CTRL+C, shutting down...");
        }
        Err(err) => {
            error!("❌ Failed to listen for CTRL+C: {}", err);
        }
    }

    scheduler.abort();

    info!("✅ BXS runtime stopped");
    Ok(())
}
