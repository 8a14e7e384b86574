//! Stake Report - one-shot staking analytics for both networks
//!
//! Resolves every dataset through the source gate (SQLite store first when it
//! is reachable, HEX subgraph otherwise), then prints active-stake analytics
//! as JSON on stdout. Logs go to stderr.
//!
//! Usage:
//!   cargo run --release --bin stake_report
//!
//! Environment variables:
//!   HEXSTAKE_DB_PATH - SQLite database path (default: hexstake.db)
//!   HEXSTAKE_RUN_MIGRATIONS - Apply sql/ migrations to the database first (default: false)
//!   HEX_PRICE_USD - HEX price for USD totals (default: 0)
//!   ETH_CURRENT_DAY / PLS_CURRENT_DAY - Override the protocol day
//!   EXIT_TARGET_DAY / EXIT_AMOUNT_HEX / EXIT_VARIANCE_DAYS - Plan an exit

use dotenv::dotenv;
use hexstake::config::{DashboardConfig, ReportConfig};
use hexstake::dashboard::{NetworkReport, StakingDashboard};
use hexstake::source::{
    run_schema_migrations, AvailabilityProbe, CachedProbe, SourceGate, SqliteProbe, SqliteStakeStore, StakeSource,
    SubgraphClient, UnavailableSource,
};
use log::{info, warn};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize environment and logging
    dotenv().ok();
    env_logger::init();

    let config = DashboardConfig::from_env();
    let report_config = ReportConfig::from_env();

    info!("🚀 Stake Report");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Migrations: {}", if config.run_migrations { "enabled" } else { "disabled" });
    info!("   ├─ Ethereum subgraph: {}", config.ethereum_subgraph_url);
    info!("   ├─ PulseChain subgraph: {}", config.pulsechain_subgraph_url);
    info!("   ├─ Fetch attempts: {} (step {}ms)", config.fetch_attempts, config.fetch_backoff_step_ms);
    info!("   └─ Retry delay: {}ms", config.retry_delay_ms);

    // The store is read-only unless migrations are asked for; a missing file means remote-only
    let db_exists = Path::new(&config.db_path).exists();
    if !db_exists {
        warn!("⚠️  No database at {}, using the subgraph only", config.db_path);
    } else if config.run_migrations {
        let mut conn = Connection::open(&config.db_path)?;
        run_schema_migrations(&mut conn, &config.schema_dir)?;
    }

    let probe: Arc<dyn AvailabilityProbe> = Arc::new(CachedProbe::new(SqliteProbe::new(&config.db_path)));
    let store: Arc<dyn StakeSource> = match SqliteStakeStore::open(&config.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("⚠️  Store not opened: {}", e);
            Arc::new(UnavailableSource)
        }
    };
    let remote: Arc<dyn StakeSource> = Arc::new(SubgraphClient::new(
        config.endpoints(),
        config.remote_timeout(),
        config.retry_policy(),
        config.remote_page_size,
    )?);

    let gate = SourceGate::new(store, remote, probe, config.gate_config());
    let (recheck_tx, recheck_rx) = mpsc::channel::<()>(4);
    let watcher = gate.spawn_promotion_watcher(recheck_rx);

    let dashboard = StakingDashboard::new(gate);
    let snapshots = dashboard.load_all().await;

    // Anything served remotely gets one chance to move back to the store
    recheck_tx.send(()).await.ok();
    drop(recheck_tx);
    watcher.await.ok();

    let reports: Vec<NetworkReport> = snapshots
        .iter()
        .map(|snapshot| {
            NetworkReport::build(
                snapshot,
                report_config.current_day(snapshot.network),
                report_config.hex_price_usd,
                report_config.exit.as_ref(),
            )
        })
        .collect();

    for report in &reports {
        info!(
            "✅ {}: {} active stakes, day {:?}",
            report.network, report.active_stakes, report.current_day
        );
    }

    let statuses: std::collections::BTreeMap<String, _> = dashboard
        .gate()
        .statuses()
        .into_iter()
        .map(|(key, entry)| (key.to_string(), entry))
        .collect();

    let output = serde_json::json!({
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "statuses": statuses,
        "networks": reports,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
