//! Persistent store reachability
//!
//! The gate asks the probe before every store query. Probe results are
//! cached for the session; `invalidate` forces the next call to probe again,
//! which is what drives promotion back to the store.

use super::store::missing_stake_tables;
use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags};
use std::path::PathBuf;
use std::sync::Mutex;

#[async_trait]
pub trait AvailabilityProbe: Send + Sync {
    /// Returns true if the store can currently serve queries
    async fn is_available(&self) -> bool;

    /// Drop any cached answer so the next call probes again
    fn invalidate(&self) {}
}

/// Probes an SQLite file: it must exist, open, and contain the stake tables
pub struct SqliteProbe {
    db_path: PathBuf,
}

impl SqliteProbe {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self { db_path: db_path.into() }
    }

    fn probe(&self) -> Result<bool, rusqlite::Error> {
        if !self.db_path.exists() {
            return Ok(false);
        }

        let conn = Connection::open_with_flags(&self.db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(missing_stake_tables(&conn)?.is_empty())
    }
}

#[async_trait]
impl AvailabilityProbe for SqliteProbe {
    async fn is_available(&self) -> bool {
        match self.probe() {
            Ok(available) => {
                log::debug!("🔍 Store probe {}: {}", self.db_path.display(), available);
                available
            }
            Err(e) => {
                log::warn!("⚠️  Store probe failed for {}: {}", self.db_path.display(), e);
                false
            }
        }
    }
}

/// Session cache in front of another probe
pub struct CachedProbe<P> {
    inner: P,
    cached: Mutex<Option<bool>>,
}

impl<P: AvailabilityProbe> CachedProbe<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
        }
    }

    fn cached_value(&self) -> Option<bool> {
        self.cached.lock().ok().and_then(|guard| *guard)
    }

    fn store_value(&self, available: bool) {
        if let Ok(mut guard) = self.cached.lock() {
            *guard = Some(available);
        }
    }
}

#[async_trait]
impl<P: AvailabilityProbe> AvailabilityProbe for CachedProbe<P> {
    async fn is_available(&self) -> bool {
        if let Some(available) = self.cached_value() {
            return available;
        }

        let available = self.inner.is_available().await;
        self.store_value(available);
        available
    }

    fn invalidate(&self) {
        if let Ok(mut guard) = self.cached.lock() {
            *guard = None;
        }
        self.inner.invalidate();
    }
}
