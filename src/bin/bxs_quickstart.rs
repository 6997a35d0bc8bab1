//! Write the latest persisted state to a quickstart JSON file
//!
//! Usage:
//!   cargo run --bin bxs_quickstart -- [DB_PATH] [OUTPUT_PATH]
//!
//! Defaults come from BXS_DB_PATH and BXS_QUICKSTART_OUTPUT.

use bxs::metrics::{
    config::EngineConfig,
    engine::MetricsEngine,
    quickstart::{save_quickstart, QuickstartSnapshot},
};
use dotenv::dotenv;
use log::{info, warn};
use std::env;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let mut config = EngineConfig::from_env();
    let mut args = env::args().skip(1);
    if let Some(db_path) = args.next() {
        config.db_path = db_path;
    }
    let output = args.next().unwrap_or_else(|| config.quickstart_output.clone());

    let engine = MetricsEngine::open(config)?;

    let Some(latest) = engine.latest_snapshot()? else {
        warn!("⚠️  No wallet data found, nothing written");
        return Ok(());
    };

    let snapshot = QuickstartSnapshot::from(&latest);
    save_quickstart(&snapshot, &output)?;

    info!(
        "📊 t={} ({}) SSR={:.4} f={:.4}",
        snapshot.timestamp,
        latest.timestamp_iso().unwrap_or_default(),
        latest.ssr_display(),
        snapshot.wallet.f
    );
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
