//! Per-dataset status map
//!
//! One entry per `DatasetKey`, changed only through `transition`. The map is
//! read by presentation code; nothing in the core branches on it.

use crate::types::DatasetKey;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetStatus {
    /// Served from the persistent store
    Database,
    /// Served from the remote query service
    Remote,
    /// No result committed yet
    Transitioning,
    /// Every source failed
    Error,
}

impl DatasetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetStatus::Database => "database",
            DatasetStatus::Remote => "remote",
            DatasetStatus::Transitioning => "transitioning",
            DatasetStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: DatasetStatus,
    pub last_error: Option<String>,
    /// Unix seconds of the last transition
    pub last_updated: Option<i64>,
}

impl Default for StatusEntry {
    fn default() -> Self {
        Self {
            status: DatasetStatus::Transitioning,
            last_error: None,
            last_updated: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatusMap {
    entries: Arc<RwLock<HashMap<DatasetKey, StatusEntry>>>,
}

impl StatusMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `key` to `status`. Successful states clear the stored error.
    pub fn transition(&self, key: DatasetKey, status: DatasetStatus, error: Option<String>) {
        let Ok(mut entries) = self.entries.write() else {
            log::error!("❌ Status map lock poisoned, dropping transition for {}", key);
            return;
        };

        let entry = entries.entry(key).or_default();
        let previous = entry.status;

        entry.status = status;
        entry.last_error = match status {
            DatasetStatus::Database | DatasetStatus::Remote => None,
            DatasetStatus::Error => error,
            DatasetStatus::Transitioning => error.or_else(|| entry.last_error.take()),
        };
        entry.last_updated = Some(chrono::Utc::now().timestamp());

        if previous != status {
            log::debug!("🔄 {}: {} → {}", key, previous, status);
        }
    }

    /// Status for `key`; unseen keys are `transitioning`
    pub fn get(&self, key: DatasetKey) -> StatusEntry {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(&key).cloned())
            .unwrap_or_default()
    }

    pub fn status(&self, key: DatasetKey) -> DatasetStatus {
        self.get(key).status
    }

    /// Keys currently in `status`, sorted
    pub fn keys_with_status(&self, status: DatasetStatus) -> Vec<DatasetKey> {
        let mut keys: Vec<DatasetKey> = self
            .entries
            .read()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, entry)| entry.status == status)
                    .map(|(key, _)| *key)
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn snapshot(&self) -> HashMap<DatasetKey, StatusEntry> {
        self.entries.read().map(|entries| entries.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DatasetKind, Network};

    fn key() -> DatasetKey {
        DatasetKey::new(Network::Ethereum, DatasetKind::StakeStarts)
    }

    #[test]
    fn test_unseen_key_is_transitioning() {
        let map = StatusMap::new();
        let entry = map.get(key());
        assert_eq!(entry.status, DatasetStatus::Transitioning);
        assert!(entry.last_updated.is_none());
    }

    #[test]
    fn test_error_then_success_clears_error() {
        let map = StatusMap::new();

        map.transition(key(), DatasetStatus::Error, Some("Transport error: refused".to_string()));
        let entry = map.get(key());
        assert_eq!(entry.status, DatasetStatus::Error);
        assert_eq!(entry.last_error.as_deref(), Some("Transport error: refused"));
        assert!(entry.last_updated.is_some());

        map.transition(key(), DatasetStatus::Remote, None);
        let entry = map.get(key());
        assert_eq!(entry.status, DatasetStatus::Remote);
        assert!(entry.last_error.is_none());
    }

    #[test]
    fn test_keys_with_status() {
        let map = StatusMap::new();
        let pls = DatasetKey::new(Network::Pulsechain, DatasetKind::GlobalInfo);

        map.transition(key(), DatasetStatus::Remote, None);
        map.transition(pls, DatasetStatus::Database, None);

        assert_eq!(map.keys_with_status(DatasetStatus::Remote), vec![key()]);
        assert_eq!(map.snapshot().len(), 2);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&DatasetStatus::Transitioning).unwrap(), "\"transitioning\"");
    }
}
