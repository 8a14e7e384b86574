//! Source gate: store-or-remote failover per dataset
//!
//! ## Resolution pass
//!
//! 1. Ask the availability probe (cached per session). If the store is
//!    reachable it is tried first.
//! 2. The first source tried must return a usable result; an empty or failed
//!    answer falls through to the next source. The last source tried accepts
//!    an empty-but-successful answer.
//! 3. If every source fails the key goes to `error` and a single retry is
//!    scheduled after `retry_delay`, starting from the remote source.
//!
//! ## Promotion
//!
//! Keys served by the remote source are re-read from the store whenever
//! availability is rechecked (see `spawn_promotion_watcher`). At most one
//! promotion per key is in flight.
//!
//! Every pass takes a per-key generation number; a result whose generation
//! is no longer current is returned to its caller but never committed to the
//! cache or status map. A promotion only advances the generation once its
//! store read is usable and no pass started meanwhile, so a promotion that
//! finds nothing never invalidates an in-flight resolve.

use super::availability::AvailabilityProbe;
use super::backend::{fetch_dataset, StakeSource};
use super::error::SourceError;
use super::status::{DatasetStatus, StatusEntry, StatusMap};
use crate::types::{DatasetKey, DatasetPayload};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Delay before the one-shot retry after a failed pass
    pub retry_delay: Duration,
    /// Row limit for the TopStakes dataset
    pub top_limit: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(2),
            top_limit: 100,
        }
    }
}

/// Outcome of one `resolve` call
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub key: DatasetKey,
    /// Fresh data, or the last committed data when the pass failed
    pub data: Option<DatasetPayload>,
    pub status: DatasetStatus,
    pub last_error: Option<String>,
}

impl Resolution {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, DatasetStatus::Database | DatasetStatus::Remote)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceOrder {
    StoreFirst,
    RemoteFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Store,
    Remote,
}

impl SourceKind {
    fn status(&self) -> DatasetStatus {
        match self {
            SourceKind::Store => DatasetStatus::Database,
            SourceKind::Remote => DatasetStatus::Remote,
        }
    }
}

struct GateInner {
    store: Arc<dyn StakeSource>,
    remote: Arc<dyn StakeSource>,
    probe: Arc<dyn AvailabilityProbe>,
    statuses: StatusMap,
    cache: RwLock<HashMap<DatasetKey, DatasetPayload>>,
    generations: Mutex<HashMap<DatasetKey, u64>>,
    promoting: Mutex<HashSet<DatasetKey>>,
    config: GateConfig,
}

#[derive(Clone)]
pub struct SourceGate {
    inner: Arc<GateInner>,
}

/// Clears the in-flight promotion marker for a key when dropped
struct PromotionGuard<'a> {
    promoting: &'a Mutex<HashSet<DatasetKey>>,
    key: DatasetKey,
}

impl Drop for PromotionGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut promoting) = self.promoting.lock() {
            promoting.remove(&self.key);
        }
    }
}

impl SourceGate {
    pub fn new(
        store: Arc<dyn StakeSource>,
        remote: Arc<dyn StakeSource>,
        probe: Arc<dyn AvailabilityProbe>,
        config: GateConfig,
    ) -> Self {
        Self {
            inner: Arc::new(GateInner {
                store,
                remote,
                probe,
                statuses: StatusMap::new(),
                cache: RwLock::new(HashMap::new()),
                generations: Mutex::new(HashMap::new()),
                promoting: Mutex::new(HashSet::new()),
                config,
            }),
        }
    }

    /// Resolve one dataset. Never fails: errors are reported through the
    /// returned status.
    pub async fn resolve(&self, key: DatasetKey) -> Resolution {
        let generation = self.next_generation(key);
        let resolution = self.run_pass(key, generation, SourceOrder::StoreFirst).await;

        if resolution.status == DatasetStatus::Error && self.is_current(key, generation) {
            self.schedule_retry(key, generation);
        }

        resolution
    }

    /// Last committed data for `key`
    pub fn cached(&self, key: DatasetKey) -> Option<DatasetPayload> {
        self.inner.cache.read().ok().and_then(|cache| cache.get(&key).cloned())
    }

    pub fn status(&self, key: DatasetKey) -> StatusEntry {
        self.inner.statuses.get(key)
    }

    pub fn statuses(&self) -> HashMap<DatasetKey, StatusEntry> {
        self.inner.statuses.snapshot()
    }

    pub fn status_map(&self) -> &StatusMap {
        &self.inner.statuses
    }

    /// Re-read a remote-served key from the store and promote it to
    /// `database`. Returns true if the key was promoted.
    pub async fn promote_if_reachable(&self, key: DatasetKey) -> bool {
        if self.inner.statuses.status(key) != DatasetStatus::Remote {
            return false;
        }

        let Some(_guard) = self.begin_promotion(key) else {
            log::debug!("⏭️  Promotion already in flight for {}", key);
            return false;
        };

        if !self.inner.probe.is_available().await {
            return false;
        }

        // Bumped only at commit; a fruitless promotion leaves in-flight passes current
        let observed = self.current_generation(key);
        match fetch_dataset(self.inner.store.as_ref(), key, self.inner.config.top_limit).await {
            Ok(payload) if payload.is_usable() => {
                let promoted = match self.advance_if_current(key, observed) {
                    Some(generation) => self.commit(key, generation, &payload, SourceKind::Store),
                    None => {
                        log::debug!("Promotion of {} superseded by a newer pass", key);
                        false
                    }
                };
                if promoted {
                    log::info!("⬆️  Promoted {} to database", key);
                }
                promoted
            }
            Ok(_) => {
                log::debug!("Store still empty for {}, staying on remote", key);
                false
            }
            Err(e) => {
                log::warn!("⚠️  Promotion of {} failed: {}", key, e);
                false
            }
        }
    }

    /// Drop the cached probe answer and try to promote every remote-served key
    pub async fn recheck_availability(&self) -> usize {
        self.inner.probe.invalidate();

        let mut promoted = 0;
        for key in self.inner.statuses.keys_with_status(DatasetStatus::Remote) {
            if self.promote_if_reachable(key).await {
                promoted += 1;
            }
        }

        if promoted > 0 {
            log::info!("✅ Availability recheck promoted {} dataset(s)", promoted);
        }
        promoted
    }

    /// Run an availability recheck for every message on `rx`. The task ends
    /// when all senders are dropped.
    pub fn spawn_promotion_watcher(&self, mut rx: mpsc::Receiver<()>) -> JoinHandle<()> {
        let gate = self.clone();

        tokio::spawn(async move {
            log::debug!("👀 Promotion watcher started");
            while rx.recv().await.is_some() {
                gate.recheck_availability().await;
            }
            log::debug!("Promotion watcher stopped");
        })
    }

    fn next_generation(&self, key: DatasetKey) -> u64 {
        match self.inner.generations.lock() {
            Ok(mut generations) => {
                let generation = generations.entry(key).or_insert(0);
                *generation += 1;
                *generation
            }
            Err(_) => 0,
        }
    }

    fn current_generation(&self, key: DatasetKey) -> u64 {
        self.inner
            .generations
            .lock()
            .map(|generations| generations.get(&key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Bump the generation only if it still equals `observed`
    fn advance_if_current(&self, key: DatasetKey, observed: u64) -> Option<u64> {
        let mut generations = self.inner.generations.lock().ok()?;
        let generation = generations.entry(key).or_insert(0);
        if *generation != observed {
            return None;
        }
        *generation += 1;
        Some(*generation)
    }

    fn is_current(&self, key: DatasetKey, generation: u64) -> bool {
        self.inner
            .generations
            .lock()
            .map(|generations| generations.get(&key).copied().unwrap_or(0) == generation)
            .unwrap_or(false)
    }

    fn begin_promotion(&self, key: DatasetKey) -> Option<PromotionGuard<'_>> {
        let mut promoting = self.inner.promoting.lock().ok()?;
        if !promoting.insert(key) {
            return None;
        }
        Some(PromotionGuard {
            promoting: &self.inner.promoting,
            key,
        })
    }

    fn schedule_retry(&self, key: DatasetKey, generation: u64) {
        let gate = self.clone();
        let delay = self.inner.config.retry_delay;

        log::info!("⏳ Scheduling retry for {} in {}ms", key, delay.as_millis());

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if !gate.is_current(key, generation) {
                log::debug!("Retry for {} superseded, skipping", key);
                return;
            }

            let resolution = gate.run_pass(key, generation, SourceOrder::RemoteFirst).await;
            if resolution.is_ok() {
                log::info!("✅ Retry recovered {} ({})", key, resolution.status);
            } else {
                log::error!("❌ Retry for {} failed: {:?}", key, resolution.last_error);
            }
        });
    }

    async fn run_pass(&self, key: DatasetKey, generation: u64, order: SourceOrder) -> Resolution {
        self.mark_transitioning(key);

        let store_available = self.inner.probe.is_available().await;
        if !store_available {
            log::debug!("Store unavailable, skipping it for {}", key);
        }

        let mut sources: Vec<SourceKind> = Vec::with_capacity(2);
        match order {
            SourceOrder::StoreFirst => {
                if store_available {
                    sources.push(SourceKind::Store);
                }
                sources.push(SourceKind::Remote);
            }
            SourceOrder::RemoteFirst => {
                sources.push(SourceKind::Remote);
                if store_available {
                    sources.push(SourceKind::Store);
                }
            }
        }

        let mut last_error: Option<SourceError> = None;
        for (i, kind) in sources.iter().enumerate() {
            let last = i + 1 == sources.len();
            let source = match kind {
                SourceKind::Store => self.inner.store.as_ref(),
                SourceKind::Remote => self.inner.remote.as_ref(),
            };

            match fetch_dataset(source, key, self.inner.config.top_limit).await {
                Ok(payload) if payload.is_usable() || last => {
                    self.commit(key, generation, &payload, *kind);
                    return Resolution {
                        key,
                        data: Some(payload),
                        status: kind.status(),
                        last_error: None,
                    };
                }
                Ok(_) => {
                    log::debug!("{} returned no usable data for {}, falling back", source.source_name(), key);
                    last_error = Some(SourceError::Empty);
                }
                Err(e) => {
                    log::warn!("⚠️  {} failed for {}: {}", source.source_name(), key, e);
                    last_error = Some(e);
                }
            }
        }

        let message = last_error.unwrap_or(SourceError::Unavailable).to_string();
        if self.is_current(key, generation) {
            self.inner
                .statuses
                .transition(key, DatasetStatus::Error, Some(message.clone()));
        }

        Resolution {
            key,
            data: self.cached(key),
            status: DatasetStatus::Error,
            last_error: Some(message),
        }
    }

    /// `transitioning` only for keys that have never resolved or are in error
    fn mark_transitioning(&self, key: DatasetKey) {
        let entry = self.inner.statuses.get(key);
        if entry.last_updated.is_none() || entry.status == DatasetStatus::Error {
            self.inner.statuses.transition(key, DatasetStatus::Transitioning, None);
        }
    }

    /// Store a result unless a newer pass for the key has started
    fn commit(&self, key: DatasetKey, generation: u64, payload: &DatasetPayload, kind: SourceKind) -> bool {
        if !self.is_current(key, generation) {
            log::debug!("Dropping stale {} result for {}", kind.status(), key);
            return false;
        }

        if let Ok(mut cache) = self.inner.cache.write() {
            cache.insert(key, payload.clone());
        }
        self.inner.statuses.transition(key, kind.status(), None);

        log::info!("📥 {} resolved from {} ({} record(s))", key, kind.status(), payload.len());
        true
    }
}
