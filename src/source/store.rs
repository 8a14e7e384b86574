//! SQLite-backed persistent store
//!
//! Read-only client over the `stake_starts`, `stake_ends` and `global_info`
//! tables (schema in `sql/`). Rows are mapped into the canonical records
//! here; missing numeric columns default to 0 (staked days to 1) so that
//! aggregates stay total.

use super::backend::StakeSource;
use super::error::SourceError;
use crate::types::{GlobalInfo, Network, StakeEnd, StakeStart, StakingOverview};
use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const START_COLUMNS: &str = "s.stake_id, s.staker_addr, s.staked_hearts, s.stake_shares, s.staked_days,
     s.start_day, s.is_auto_stake, s.transaction_hash, s.block_number, s.timestamp";

const OPEN_STAKE_FILTER: &str = "NOT EXISTS (
        SELECT 1 FROM stake_ends e
        WHERE e.network = s.network AND e.stake_id = s.stake_id
     )";

/// Tables every query in this module reads
pub const STAKE_TABLES: [&str; 3] = ["stake_starts", "stake_ends", "global_info"];

/// Stake tables not present in the database, in `STAKE_TABLES` order
pub fn missing_stake_tables(conn: &Connection) -> rusqlite::Result<Vec<&'static str>> {
    let mut stmt = conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
    let mut missing = Vec::new();
    for table in STAKE_TABLES {
        if !stmt.exists([table])? {
            missing.push(table);
        }
    }
    Ok(missing)
}

/// Create or upgrade the stake schema from the `.sql` files in `schema_dir`
///
/// Files run in file-name order, each in its own transaction, and must be
/// rerunnable (`IF NOT EXISTS`). Fails if the directory has no migrations or
/// if the stake tables are still missing afterwards. Returns the number of
/// files applied.
pub fn run_schema_migrations(conn: &mut Connection, schema_dir: &str) -> Result<usize, Box<dyn std::error::Error>> {
    let schema_path = Path::new(schema_dir);
    if !schema_path.is_dir() {
        return Err(format!("Stake schema directory not found: {}", schema_dir).into());
    }

    let mut migrations: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();
    migrations.sort();

    if migrations.is_empty() {
        return Err(format!("No .sql migrations in {}", schema_dir).into());
    }

    conn.pragma_update(None, "journal_mode", "WAL")?;
    log::info!("🔧 Applying {} stake schema migration(s) from {}", migrations.len(), schema_dir);

    for path in &migrations {
        let sql = fs::read_to_string(path)?;
        let tx = conn.transaction()?;
        tx.execute_batch(&sql)?;
        tx.commit()?;
        log::debug!("   ├─ Applied {}", path.display());
    }

    let missing = missing_stake_tables(conn)?;
    if !missing.is_empty() {
        return Err(format!("Stake schema incomplete after migrations, missing: {}", missing.join(", ")).into());
    }

    log::info!("✅ Stake schema ready ({})", STAKE_TABLES.join(", "));
    Ok(migrations.len())
}

pub struct SqliteStakeStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStakeStore {
    /// Open an existing store in query-only mode
    ///
    /// Fails if the database file does not exist; the store never creates
    /// its own schema.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let conn = Connection::open_with_flags(
            db_path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        // Must come after open: writes are rejected from here on
        conn.pragma_update(None, "query_only", true)?;

        log::info!("📥 SQLite stake store opened: {}", db_path.as_ref().display());

        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SourceError> {
        self.conn
            .lock()
            .map_err(|_| SourceError::Transport("store connection lock poisoned".to_string()))
    }

    fn query_starts(&self, network: Network) -> Result<Vec<StakeStart>, SourceError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM stake_starts s WHERE s.network = ?1 ORDER BY s.stake_id ASC",
            START_COLUMNS
        ))?;

        let starts = stmt
            .query_map([network.as_str()], row_to_start)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(starts)
    }

    fn query_ends(&self, network: Network) -> Result<Vec<StakeEnd>, SourceError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT stake_id, payout_hearts, penalty_hearts, served_days, transaction_hash, timestamp
             FROM stake_ends
             WHERE network = ?1
             ORDER BY stake_id ASC",
        )?;

        let ends = stmt
            .query_map([network.as_str()], |row| {
                Ok(StakeEnd {
                    stake_id: row.get::<_, i64>(0)?.max(0) as u64,
                    payout_hearts: hearts_column(row, 1),
                    penalty_hearts: hearts_column(row, 2),
                    served_days: row.get::<_, i64>(3).unwrap_or(0).max(0) as u32,
                    transaction_hash: row.get::<_, String>(4).unwrap_or_default(),
                    timestamp: row.get(5).unwrap_or(0),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ends)
    }

    fn query_top(&self, network: Network, limit: usize) -> Result<Vec<StakeStart>, SourceError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM stake_starts s
             WHERE s.network = ?1 AND {}
             ORDER BY s.staked_hearts DESC
             LIMIT ?2",
            START_COLUMNS, OPEN_STAKE_FILTER
        ))?;

        let top = stmt
            .query_map(rusqlite::params![network.as_str(), limit as i64], row_to_start)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(top)
    }

    fn query_overview(&self, network: Network) -> Result<StakingOverview, SourceError> {
        let conn = self.lock()?;
        let overview = conn.query_row(
            &format!(
                "SELECT COUNT(*), TOTAL(s.staked_hearts), TOTAL(s.stake_shares),
                        COALESCE(AVG(s.staked_days), 0), COUNT(DISTINCT s.staker_addr)
                 FROM stake_starts s
                 WHERE s.network = ?1 AND {}",
                OPEN_STAKE_FILTER
            ),
            [network.as_str()],
            |row| {
                Ok(StakingOverview {
                    active_stakes: row.get::<_, i64>(0)?.max(0) as u64,
                    total_staked_hearts: float_to_u128(row.get(1).unwrap_or(0.0)),
                    total_shares: float_to_u128(row.get(2).unwrap_or(0.0)),
                    average_staked_days: row.get(3).unwrap_or(0.0),
                    unique_stakers: row.get::<_, i64>(4).unwrap_or(0).max(0) as u64,
                })
            },
        )?;

        Ok(overview)
    }

    fn query_global_info(&self, network: Network) -> Result<GlobalInfo, SourceError> {
        let conn = self.lock()?;
        let info = conn
            .query_row(
                "SELECT current_day, share_rate, total_supply_hearts, locked_hearts,
                        stake_shares_total, stake_penalty_total, timestamp
                 FROM global_info
                 WHERE network = ?1
                 ORDER BY current_day DESC
                 LIMIT 1",
                [network.as_str()],
                |row| {
                    Ok(GlobalInfo {
                        current_day: row.get(0).unwrap_or(0),
                        share_rate: row.get(1).unwrap_or(0.0),
                        total_supply_hearts: float_to_u128(row.get(2).unwrap_or(0.0)),
                        locked_hearts: float_to_u128(row.get(3).unwrap_or(0.0)),
                        stake_shares_total: float_to_u128(row.get(4).unwrap_or(0.0)),
                        stake_penalty_total: float_to_u128(row.get(5).unwrap_or(0.0)),
                        timestamp: row.get(6).unwrap_or(0),
                    })
                },
            )
            .optional()?;

        info.ok_or(SourceError::Empty)
    }
}

#[async_trait]
impl StakeSource for SqliteStakeStore {
    async fn staking_overview(&self, network: Network) -> Result<StakingOverview, SourceError> {
        self.query_overview(network)
    }

    async fn global_info(&self, network: Network) -> Result<GlobalInfo, SourceError> {
        self.query_global_info(network)
    }

    async fn top_stakes(&self, network: Network, limit: usize) -> Result<Vec<StakeStart>, SourceError> {
        self.query_top(network, limit)
    }

    async fn stake_starts(&self, network: Network) -> Result<Vec<StakeStart>, SourceError> {
        self.query_starts(network)
    }

    async fn stake_ends(&self, network: Network) -> Result<Vec<StakeEnd>, SourceError> {
        self.query_ends(network)
    }

    fn source_name(&self) -> &'static str {
        "sqlite"
    }
}

/// Map a row selected with `START_COLUMNS`
fn row_to_start(row: &Row<'_>) -> rusqlite::Result<StakeStart> {
    let staked_days = row.get::<_, i64>(4).unwrap_or(1).clamp(1, u32::MAX as i64) as u32;
    let start_day: i64 = row.get(5).unwrap_or(0);

    Ok(StakeStart {
        stake_id: row.get::<_, i64>(0)?.max(0) as u64,
        staker_addr: row.get::<_, String>(1).unwrap_or_default(),
        staked_hearts: hearts_column(row, 2),
        stake_shares: hearts_column(row, 3),
        staked_days,
        start_day,
        end_day: start_day + staked_days as i64,
        is_auto_stake: row.get::<_, i64>(6).unwrap_or(0) != 0,
        transaction_hash: row.get::<_, String>(7).unwrap_or_default(),
        block_number: row.get::<_, i64>(8).unwrap_or(0).max(0) as u64,
        timestamp: row.get(9).unwrap_or(0),
    })
}

/// Integer amount column, falling back to REAL for values SQLite could not
/// keep as a 64-bit integer
fn hearts_column(row: &Row<'_>, idx: usize) -> u128 {
    match row.get::<_, i64>(idx) {
        Ok(v) => v.max(0) as u128,
        Err(_) => float_to_u128(row.get(idx).unwrap_or(0.0)),
    }
}

fn float_to_u128(v: f64) -> u128 {
    if v.is_finite() && v > 0.0 {
        v as u128
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HEARTS_PER_HEX;
    use rusqlite::params;
    use tempfile::tempdir;

    fn setup_test_db() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("stakes.db");

        let mut conn = Connection::open(&db_path).unwrap();
        run_schema_migrations(&mut conn, "sql").unwrap();

        (dir, db_path)
    }

    #[test]
    fn test_migrations_report_missing_stake_tables() {
        let schema = tempdir().unwrap();
        fs::write(
            schema.path().join("01_starts_only.sql"),
            "CREATE TABLE IF NOT EXISTS stake_starts (network TEXT, stake_id INTEGER);",
        )
        .unwrap();
        let mut conn = Connection::open_in_memory().unwrap();

        let err = run_schema_migrations(&mut conn, &schema.path().to_string_lossy()).unwrap_err();

        assert!(err.to_string().contains("missing: stake_ends, global_info"));
        assert_eq!(missing_stake_tables(&conn).unwrap(), vec!["stake_ends", "global_info"]);
    }

    #[test]
    fn test_migrations_need_sql_files() {
        let schema = tempdir().unwrap();
        fs::write(schema.path().join("README.txt"), "not a migration").unwrap();
        let mut conn = Connection::open_in_memory().unwrap();

        let err = run_schema_migrations(&mut conn, &schema.path().to_string_lossy()).unwrap_err();
        assert!(err.to_string().contains("No .sql migrations"));
        assert!(run_schema_migrations(&mut conn, "no/such/dir").is_err());
    }

    #[test]
    fn test_migrations_are_rerunnable() {
        let (_dir, db_path) = setup_test_db();
        let mut conn = Connection::open(&db_path).unwrap();

        assert_eq!(run_schema_migrations(&mut conn, "sql").unwrap(), 3);
        assert!(missing_stake_tables(&conn).unwrap().is_empty());
    }

    fn insert_start(conn: &Connection, network: &str, stake_id: i64, addr: &str, hex: i64, days: i64, start_day: i64) {
        conn.execute(
            "INSERT INTO stake_starts (network, stake_id, staker_addr, staked_hearts, stake_shares,
             staked_days, start_day, end_day, is_auto_stake, transaction_hash, block_number, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, '0xtx', 100, 1600000000)",
            params![
                network,
                stake_id,
                addr,
                hex * HEARTS_PER_HEX as i64,
                hex * 1_000,
                days,
                start_day,
                start_day + days
            ],
        )
        .unwrap();
    }

    fn insert_end(conn: &Connection, network: &str, stake_id: i64) {
        conn.execute(
            "INSERT INTO stake_ends (network, stake_id, payout_hearts, penalty_hearts, served_days,
             transaction_hash, timestamp)
             VALUES (?1, ?2, 500, 0, 10, '0xend', 1600001000)",
            params![network, stake_id],
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_reads_starts_and_ends_per_network() {
        let (_dir, db_path) = setup_test_db();
        let conn = Connection::open(&db_path).unwrap();
        insert_start(&conn, "ethereum", 1, "0xa", 100, 365, 10);
        insert_start(&conn, "ethereum", 2, "0xb", 50, 30, 20);
        insert_start(&conn, "pulsechain", 1, "0xa", 70, 10, 5);
        insert_end(&conn, "ethereum", 2);
        drop(conn);

        let store = SqliteStakeStore::open(&db_path).unwrap();

        let starts = store.stake_starts(Network::Ethereum).await.unwrap();
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[0].stake_id, 1);
        assert_eq!(starts[0].staked_hearts, 100 * HEARTS_PER_HEX);
        assert_eq!(starts[0].end_day, 375);

        let ends = store.stake_ends(Network::Ethereum).await.unwrap();
        assert_eq!(ends.len(), 1);
        assert_eq!(ends[0].stake_id, 2);
        assert_eq!(ends[0].payout_hearts, 500);

        let pls_ends = store.stake_ends(Network::Pulsechain).await.unwrap();
        assert!(pls_ends.is_empty());
    }

    #[tokio::test]
    async fn test_overview_counts_only_open_stakes() {
        let (_dir, db_path) = setup_test_db();
        let conn = Connection::open(&db_path).unwrap();
        insert_start(&conn, "ethereum", 1, "0xa", 100, 300, 10);
        insert_start(&conn, "ethereum", 2, "0xa", 50, 100, 20);
        insert_start(&conn, "ethereum", 3, "0xb", 25, 10, 20);
        insert_end(&conn, "ethereum", 3);
        drop(conn);

        let store = SqliteStakeStore::open(&db_path).unwrap();
        let overview = store.staking_overview(Network::Ethereum).await.unwrap();

        assert_eq!(overview.active_stakes, 2);
        assert_eq!(overview.total_staked_hearts, 150 * HEARTS_PER_HEX);
        assert_eq!(overview.unique_stakers, 1);
        assert_eq!(overview.average_staked_days, 200.0);
    }

    #[tokio::test]
    async fn test_top_stakes_ordered_and_limited() {
        let (_dir, db_path) = setup_test_db();
        let conn = Connection::open(&db_path).unwrap();
        insert_start(&conn, "ethereum", 1, "0xa", 10, 30, 1);
        insert_start(&conn, "ethereum", 2, "0xb", 900, 30, 1);
        insert_start(&conn, "ethereum", 3, "0xc", 500, 30, 1);
        insert_start(&conn, "ethereum", 4, "0xd", 1_000, 30, 1);
        insert_end(&conn, "ethereum", 4);
        drop(conn);

        let store = SqliteStakeStore::open(&db_path).unwrap();
        let top = store.top_stakes(Network::Ethereum, 2).await.unwrap();

        let ids: Vec<u64> = top.iter().map(|s| s.stake_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_global_info_latest_day_or_empty() {
        let (_dir, db_path) = setup_test_db();
        let conn = Connection::open(&db_path).unwrap();
        conn.execute(
            "INSERT INTO global_info (network, current_day, share_rate, locked_hearts, timestamp)
             VALUES ('ethereum', 1500, 250000.0, 42, 1700000000),
                    ('ethereum', 1501, 250100.0, 43, 1700086400)",
            [],
        )
        .unwrap();
        drop(conn);

        let store = SqliteStakeStore::open(&db_path).unwrap();
        let info = store.global_info(Network::Ethereum).await.unwrap();
        assert_eq!(info.current_day, 1501);
        assert_eq!(info.locked_hearts, 43);

        let missing = store.global_info(Network::Pulsechain).await;
        assert!(matches!(missing, Err(SourceError::Empty)));
    }

    #[test]
    fn test_zero_staked_days_read_as_one() {
        let (_dir, db_path) = setup_test_db();
        let conn = Connection::open(&db_path).unwrap();
        insert_start(&conn, "ethereum", 7, "0xa", 10, 0, 50);
        drop(conn);

        let store = SqliteStakeStore::open(&db_path).unwrap();
        let starts = store.query_starts(Network::Ethereum).unwrap();
        assert_eq!(starts[0].staked_days, 1);
        assert_eq!(starts[0].end_day, 51);
    }

    #[test]
    fn test_open_missing_database_fails() {
        let dir = tempdir().unwrap();
        let result = SqliteStakeStore::open(dir.path().join("nope.db"));
        assert!(result.is_err());
    }

    #[test]
    fn test_store_is_read_only() {
        let (_dir, db_path) = setup_test_db();
        let store = SqliteStakeStore::open(&db_path).unwrap();

        let conn = store.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO stake_ends (network, stake_id) VALUES ('ethereum', 1)",
            [],
        );
        assert!(result.is_err());
    }
}
