//! Per-network loading of every dataset through the source gate
//!
//! Datasets of one network are resolved concurrently and both networks load
//! concurrently. A failed dataset leaves its slot empty; the others are still
//! used. Each load takes a per-network generation number and only the latest
//! load for a network is committed, so a slow response for an abandoned
//! request never overwrites a newer view.

use crate::analytics::{
    derive_active, plan_exit, EndingStake, EndingSummary, EndingWindow, ExitIntent, Recommendation, StakeSortKey,
    WindowedAggregator,
};
use crate::source::{DatasetStatus, Resolution, SourceGate};
use crate::types::{ActiveStake, DatasetKey, DatasetKind, GlobalInfo, Network, StakeEnd, StakeStart, StakingOverview};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

const REPORT_ENDING_ROWS: usize = 10;

/// Everything loaded for one network
#[derive(Debug, Clone, Serialize)]
pub struct NetworkSnapshot {
    pub network: Network,
    pub overview: Option<StakingOverview>,
    pub global_info: Option<GlobalInfo>,
    pub top_stakes: Vec<StakeStart>,
    pub starts: Vec<StakeStart>,
    pub ends: Vec<StakeEnd>,
    pub statuses: BTreeMap<DatasetKind, DatasetStatus>,
    pub errors: BTreeMap<DatasetKind, String>,
    pub loaded_at: i64,
}

impl NetworkSnapshot {
    fn new(network: Network) -> Self {
        Self {
            network,
            overview: None,
            global_info: None,
            top_stakes: Vec::new(),
            starts: Vec::new(),
            ends: Vec::new(),
            statuses: BTreeMap::new(),
            errors: BTreeMap::new(),
            loaded_at: chrono::Utc::now().timestamp(),
        }
    }

    fn apply(&mut self, resolution: Resolution) {
        let kind = resolution.key.kind;
        self.statuses.insert(kind, resolution.status);
        if let Some(error) = resolution.last_error {
            self.errors.insert(kind, error);
        }

        let Some(data) = resolution.data else {
            return;
        };

        match kind {
            DatasetKind::StakingOverview => self.overview = data.into_overview(),
            DatasetKind::GlobalInfo => self.global_info = data.into_global_info(),
            DatasetKind::TopStakes => self.top_stakes = data.into_starts().unwrap_or_default(),
            DatasetKind::StakeStarts => self.starts = data.into_starts().unwrap_or_default(),
            DatasetKind::StakeEnds => self.ends = data.into_ends().unwrap_or_default(),
        }
    }

    /// Caller-supplied day, else the day reported by global info
    pub fn current_day(&self, override_day: Option<i64>) -> Option<i64> {
        override_day.or_else(|| self.global_info.as_ref().filter(|g| g.is_usable()).map(|g| g.current_day))
    }

    pub fn active(&self, current_day: i64) -> Vec<ActiveStake> {
        derive_active(&self.starts, &self.ends, current_day)
    }

    /// Datasets that ended the load in `error`
    pub fn failed(&self) -> Vec<DatasetKind> {
        self.statuses
            .iter()
            .filter(|(_, status)| **status == DatasetStatus::Error)
            .map(|(kind, _)| *kind)
            .collect()
    }
}

/// Analytics for one network, as printed by the report binary
#[derive(Debug, Clone, Serialize)]
pub struct NetworkReport {
    pub network: Network,
    pub current_day: Option<i64>,
    pub statuses: BTreeMap<DatasetKind, DatasetStatus>,
    pub errors: BTreeMap<DatasetKind, String>,
    pub overview: Option<StakingOverview>,
    pub global_info: Option<GlobalInfo>,
    pub active_stakes: usize,
    pub ending_soon: Vec<EndingSummary>,
    pub ending_this_month: Vec<EndingStake>,
    pub exit_plan: Option<Recommendation>,
}

impl NetworkReport {
    pub fn build(
        snapshot: &NetworkSnapshot,
        override_day: Option<i64>,
        hex_price_usd: f64,
        exit: Option<&ExitIntent>,
    ) -> Self {
        let current_day = snapshot.current_day(override_day);
        let aggregator = WindowedAggregator::new(hex_price_usd);

        let (active_stakes, ending_soon, ending_this_month, exit_plan) = match current_day {
            Some(day) => {
                let active = snapshot.active(day);
                let mut rows = aggregator.ending_soon(&active, day, EndingWindow::Month, StakeSortKey::Amount);
                rows.truncate(REPORT_ENDING_ROWS);
                (
                    active.len(),
                    aggregator.summarize_all(&active, day),
                    rows,
                    exit.and_then(|intent| plan_exit(&active, intent)),
                )
            }
            None => {
                log::warn!("⚠️  No current day for {}, skipping analytics", snapshot.network);
                (0, Vec::new(), Vec::new(), None)
            }
        };

        Self {
            network: snapshot.network,
            current_day,
            statuses: snapshot.statuses.clone(),
            errors: snapshot.errors.clone(),
            overview: snapshot.overview.clone(),
            global_info: snapshot.global_info.clone(),
            active_stakes,
            ending_soon,
            ending_this_month,
            exit_plan,
        }
    }
}

#[derive(Clone)]
pub struct StakingDashboard {
    gate: SourceGate,
    snapshots: Arc<RwLock<HashMap<Network, NetworkSnapshot>>>,
    generations: Arc<Mutex<HashMap<Network, u64>>>,
    selected: Arc<RwLock<Network>>,
}

impl StakingDashboard {
    pub fn new(gate: SourceGate) -> Self {
        Self {
            gate,
            snapshots: Arc::new(RwLock::new(HashMap::new())),
            generations: Arc::new(Mutex::new(HashMap::new())),
            selected: Arc::new(RwLock::new(Network::Ethereum)),
        }
    }

    pub fn gate(&self) -> &SourceGate {
        &self.gate
    }

    /// Resolve every dataset of `network` concurrently. Returns the snapshot
    /// if it was committed, None if a newer load for the network started
    /// meanwhile.
    pub async fn load_network(&self, network: Network) -> Option<NetworkSnapshot> {
        let generation = self.next_generation(network);
        log::info!("📥 Loading {} datasets (load #{})", network, generation);

        let key = |kind| DatasetKey::new(network, kind);
        let (overview, global_info, top, starts, ends) = tokio::join!(
            self.gate.resolve(key(DatasetKind::StakingOverview)),
            self.gate.resolve(key(DatasetKind::GlobalInfo)),
            self.gate.resolve(key(DatasetKind::TopStakes)),
            self.gate.resolve(key(DatasetKind::StakeStarts)),
            self.gate.resolve(key(DatasetKind::StakeEnds)),
        );

        let mut snapshot = NetworkSnapshot::new(network);
        for resolution in [overview, global_info, top, starts, ends] {
            snapshot.apply(resolution);
        }

        let failed = snapshot.failed();
        if !failed.is_empty() {
            log::warn!("⚠️  {} loaded with {} failed dataset(s): {:?}", network, failed.len(), failed);
        }

        if self.commit(network, generation, snapshot.clone()) {
            log::info!(
                "✅ {} loaded: {} starts, {} ends, {} top stakes",
                network,
                snapshot.starts.len(),
                snapshot.ends.len(),
                snapshot.top_stakes.len()
            );
            Some(snapshot)
        } else {
            log::debug!("Dropping superseded load #{} for {}", generation, network);
            None
        }
    }

    /// Load both networks concurrently
    pub async fn load_all(&self) -> Vec<NetworkSnapshot> {
        let (eth, pls) = tokio::join!(
            self.load_network(Network::Ethereum),
            self.load_network(Network::Pulsechain)
        );
        eth.into_iter().chain(pls).collect()
    }

    pub fn select_network(&self, network: Network) {
        if let Ok(mut selected) = self.selected.write() {
            *selected = network;
        }
    }

    pub fn selected_network(&self) -> Network {
        self.selected.read().map(|s| *s).unwrap_or(Network::Ethereum)
    }

    pub fn snapshot(&self, network: Network) -> Option<NetworkSnapshot> {
        self.snapshots.read().ok().and_then(|s| s.get(&network).cloned())
    }

    /// Snapshot of the selected network
    pub fn current_view(&self) -> Option<NetworkSnapshot> {
        self.snapshot(self.selected_network())
    }

    fn next_generation(&self, network: Network) -> u64 {
        match self.generations.lock() {
            Ok(mut generations) => {
                let generation = generations.entry(network).or_insert(0);
                *generation += 1;
                *generation
            }
            Err(_) => 0,
        }
    }

    fn commit(&self, network: Network, generation: u64, snapshot: NetworkSnapshot) -> bool {
        let current = self
            .generations
            .lock()
            .map(|g| g.get(&network).copied().unwrap_or(0) == generation)
            .unwrap_or(false);
        if !current {
            return false;
        }

        match self.snapshots.write() {
            Ok(mut snapshots) => {
                snapshots.insert(network, snapshot);
                true
            }
            Err(_) => false,
        }
    }
}
