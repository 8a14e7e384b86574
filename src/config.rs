//! Configuration from environment variables

use crate::analytics::ExitIntent;
use crate::source::{GateConfig, RetryPolicy, SubgraphEndpoints};
use crate::source::remote::{DEFAULT_ETHEREUM_ENDPOINT, DEFAULT_PULSECHAIN_ENDPOINT};
use crate::types::Network;
use std::env;
use std::str::FromStr;
use std::time::Duration;

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn env_opt<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Source and gate settings
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Path to the SQLite stake database
    pub db_path: String,

    /// Directory holding the `.sql` migrations
    pub schema_dir: String,

    /// Apply migrations to the database at startup. Off by default: the
    /// report otherwise never writes to the store.
    pub run_migrations: bool,

    pub ethereum_subgraph_url: String,
    pub pulsechain_subgraph_url: String,

    /// Delay before the gate's one-shot retry
    pub retry_delay_ms: u64,

    pub fetch_attempts: u32,
    pub fetch_backoff_step_ms: u64,
    pub remote_timeout_secs: u64,
    pub remote_page_size: usize,
    pub top_stakes_limit: usize,
}

impl DashboardConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `HEXSTAKE_DB_PATH` (default: hexstake.db)
    /// - `HEXSTAKE_SCHEMA_DIR` (default: sql)
    /// - `HEXSTAKE_RUN_MIGRATIONS` (default: false)
    /// - `ETH_SUBGRAPH_URL` / `PLS_SUBGRAPH_URL` (default: public HEX subgraphs)
    /// - `SOURCE_RETRY_DELAY_MS` (default: 2000)
    /// - `FETCH_ATTEMPTS` (default: 3)
    /// - `FETCH_BACKOFF_STEP_MS` (default: 1000)
    /// - `REMOTE_TIMEOUT_SECS` (default: 10)
    /// - `REMOTE_PAGE_SIZE` (default: 1000)
    /// - `TOP_STAKES_LIMIT` (default: 100)
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("HEXSTAKE_DB_PATH").unwrap_or_else(|_| "hexstake.db".to_string()),
            schema_dir: env::var("HEXSTAKE_SCHEMA_DIR").unwrap_or_else(|_| "sql".to_string()),
            run_migrations: env_or("HEXSTAKE_RUN_MIGRATIONS", false),
            ethereum_subgraph_url: env::var("ETH_SUBGRAPH_URL")
                .unwrap_or_else(|_| DEFAULT_ETHEREUM_ENDPOINT.to_string()),
            pulsechain_subgraph_url: env::var("PLS_SUBGRAPH_URL")
                .unwrap_or_else(|_| DEFAULT_PULSECHAIN_ENDPOINT.to_string()),
            retry_delay_ms: env_or("SOURCE_RETRY_DELAY_MS", 2_000),
            fetch_attempts: env_or("FETCH_ATTEMPTS", 3),
            fetch_backoff_step_ms: env_or("FETCH_BACKOFF_STEP_MS", 1_000),
            remote_timeout_secs: env_or("REMOTE_TIMEOUT_SECS", 10),
            remote_page_size: env_or("REMOTE_PAGE_SIZE", 1_000),
            top_stakes_limit: env_or("TOP_STAKES_LIMIT", 100),
        }
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            top_limit: self.top_stakes_limit,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.fetch_attempts, Duration::from_millis(self.fetch_backoff_step_ms))
    }

    pub fn endpoints(&self) -> SubgraphEndpoints {
        SubgraphEndpoints {
            ethereum: self.ethereum_subgraph_url.clone(),
            pulsechain: self.pulsechain_subgraph_url.clone(),
        }
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}

/// Caller inputs for the report: price, current day per network and an
/// optional exit plan
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub hex_price_usd: f64,
    pub ethereum_current_day: Option<i64>,
    pub pulsechain_current_day: Option<i64>,
    pub exit: Option<ExitIntent>,
}

impl ReportConfig {
    /// Environment variables:
    /// - `HEX_PRICE_USD` (default: 0)
    /// - `ETH_CURRENT_DAY` / `PLS_CURRENT_DAY` (default: taken from global info)
    /// - `EXIT_TARGET_DAY`, `EXIT_AMOUNT_HEX` (both required for an exit plan)
    /// - `EXIT_VARIANCE_DAYS` (default: 7)
    pub fn from_env() -> Self {
        let exit = match (env_opt::<i64>("EXIT_TARGET_DAY"), env_opt::<f64>("EXIT_AMOUNT_HEX")) {
            (Some(target_day), Some(amount_hex)) => Some(ExitIntent {
                target_day,
                amount_hex,
                variance_days: env_or("EXIT_VARIANCE_DAYS", 7),
            }),
            _ => None,
        };

        Self {
            hex_price_usd: env_or("HEX_PRICE_USD", 0.0),
            ethereum_current_day: env_opt("ETH_CURRENT_DAY"),
            pulsechain_current_day: env_opt("PLS_CURRENT_DAY"),
            exit,
        }
    }

    pub fn current_day(&self, network: Network) -> Option<i64> {
        match network {
            Network::Ethereum => self.ethereum_current_day,
            Network::Pulsechain => self.pulsechain_current_day,
        }
    }
}
