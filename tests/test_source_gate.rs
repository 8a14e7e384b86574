//! Source gate failover tests with injected fake store/remote clients

use async_trait::async_trait;
use hexstake::analytics::{open_stakes, overview_of, top_stakes};
use hexstake::source::{AvailabilityProbe, DatasetStatus, GateConfig, SourceError, SourceGate, StakeSource};
use hexstake::types::{
    DatasetKey, DatasetKind, DatasetPayload, GlobalInfo, Network, StakeEnd, StakeStart, StakingOverview,
    HEARTS_PER_HEX,
};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Data,
    Empty,
    Down,
}

struct FakeSource {
    name: &'static str,
    mode: Mutex<Mode>,
    calls: AtomicU32,
    delay_ms: AtomicU64,
    current_day: AtomicI64,
}

impl FakeSource {
    fn new(name: &'static str, mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            name,
            mode: Mutex::new(mode),
            calls: AtomicU32::new(0),
            delay_ms: AtomicU64::new(0),
            current_day: AtomicI64::new(1000),
        })
    }

    fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn starts() -> Vec<StakeStart> {
        vec![
            StakeStart::new(1, "0xaaa", 500 * HEARTS_PER_HEX, 365, 900),
            StakeStart::new(2, "0xbbb", 900 * HEARTS_PER_HEX, 30, 980),
            StakeStart::new(3, "0xaaa", 100 * HEARTS_PER_HEX, 5555, 10),
        ]
    }

    fn ends() -> Vec<StakeEnd> {
        vec![StakeEnd::new(2).with_payout(950 * HEARTS_PER_HEX, 0, 30)]
    }

    /// Count the call, wait the configured delay, then report the mode
    async fn enter(&self) -> Result<Mode, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let mode = *self.mode.lock().unwrap();
        match mode {
            Mode::Down => Err(SourceError::Transport(format!("{} unreachable", self.name))),
            other => Ok(other),
        }
    }
}

#[async_trait]
impl StakeSource for FakeSource {
    async fn staking_overview(&self, _network: Network) -> Result<StakingOverview, SourceError> {
        Ok(match self.enter().await? {
            Mode::Data => overview_of(&open_stakes(&Self::starts(), &Self::ends())),
            _ => overview_of(&[]),
        })
    }

    async fn global_info(&self, _network: Network) -> Result<GlobalInfo, SourceError> {
        // Day is read before the delay so a slow call returns what was current when it started
        let day = self.current_day.load(Ordering::SeqCst);
        let mode = self.enter().await?;
        Ok(GlobalInfo {
            current_day: if mode == Mode::Data { day } else { 0 },
            share_rate: 100_000.0,
            total_supply_hearts: 0,
            locked_hearts: 0,
            stake_shares_total: 0,
            stake_penalty_total: 0,
            timestamp: 0,
        })
    }

    async fn top_stakes(&self, _network: Network, limit: usize) -> Result<Vec<StakeStart>, SourceError> {
        Ok(match self.enter().await? {
            Mode::Data => top_stakes(&Self::starts(), &Self::ends(), limit),
            _ => Vec::new(),
        })
    }

    async fn stake_starts(&self, _network: Network) -> Result<Vec<StakeStart>, SourceError> {
        Ok(match self.enter().await? {
            Mode::Data => Self::starts(),
            _ => Vec::new(),
        })
    }

    async fn stake_ends(&self, _network: Network) -> Result<Vec<StakeEnd>, SourceError> {
        Ok(match self.enter().await? {
            Mode::Data => Self::ends(),
            _ => Vec::new(),
        })
    }

    fn source_name(&self) -> &'static str {
        self.name
    }
}

struct FakeProbe {
    available: AtomicBool,
    calls: AtomicU32,
}

impl FakeProbe {
    fn new(available: bool) -> Arc<Self> {
        Arc::new(Self {
            available: AtomicBool::new(available),
            calls: AtomicU32::new(0),
        })
    }

    fn set(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl AvailabilityProbe for FakeProbe {
    async fn is_available(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.available.load(Ordering::SeqCst)
    }
}

fn gate_with(store: &Arc<FakeSource>, remote: &Arc<FakeSource>, probe: &Arc<FakeProbe>) -> SourceGate {
    SourceGate::new(
        store.clone(),
        remote.clone(),
        probe.clone(),
        GateConfig {
            retry_delay: Duration::from_millis(20),
            top_limit: 10,
        },
    )
}

fn starts_key() -> DatasetKey {
    DatasetKey::new(Network::Ethereum, DatasetKind::StakeStarts)
}

#[tokio::test]
async fn test_store_used_first_when_reachable() {
    let store = FakeSource::new("store", Mode::Data);
    let remote = FakeSource::new("remote", Mode::Data);
    let probe = FakeProbe::new(true);
    let gate = gate_with(&store, &remote, &probe);

    let resolution = gate.resolve(starts_key()).await;

    assert_eq!(resolution.status, DatasetStatus::Database);
    assert_eq!(resolution.data.unwrap().len(), 3);
    assert_eq!(store.calls(), 1);
    assert_eq!(remote.calls(), 0);
    assert_eq!(gate.status(starts_key()).status, DatasetStatus::Database);
}

#[tokio::test]
async fn test_probe_false_goes_remote_without_touching_store() {
    let store = FakeSource::new("store", Mode::Data);
    let remote = FakeSource::new("remote", Mode::Data);
    let probe = FakeProbe::new(false);
    let gate = gate_with(&store, &remote, &probe);

    let resolution = gate.resolve(starts_key()).await;

    assert_eq!(resolution.status, DatasetStatus::Remote);
    assert!(resolution.last_error.is_none());
    assert_eq!(store.calls(), 0);
    assert_eq!(remote.calls(), 1);

    // The retry is only scheduled on error, so the store stays untouched
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_empty_store_result_falls_back_to_remote() {
    let store = FakeSource::new("store", Mode::Empty);
    let remote = FakeSource::new("remote", Mode::Data);
    let probe = FakeProbe::new(true);
    let gate = gate_with(&store, &remote, &probe);

    let key = DatasetKey::new(Network::Pulsechain, DatasetKind::GlobalInfo);
    let resolution = gate.resolve(key).await;

    assert_eq!(resolution.status, DatasetStatus::Remote);
    match resolution.data {
        Some(DatasetPayload::GlobalInfo(info)) => assert_eq!(info.current_day, 1000),
        other => panic!("expected global info, got {:?}", other),
    }
    assert_eq!(store.calls(), 1);
}

#[tokio::test]
async fn test_store_failure_falls_back_to_remote() {
    let store = FakeSource::new("store", Mode::Down);
    let remote = FakeSource::new("remote", Mode::Data);
    let probe = FakeProbe::new(true);
    let gate = gate_with(&store, &remote, &probe);

    let key = DatasetKey::new(Network::Ethereum, DatasetKind::TopStakes);
    let resolution = gate.resolve(key).await;

    assert_eq!(resolution.status, DatasetStatus::Remote);
    let top = resolution.data.unwrap().into_starts().unwrap();
    let ids: Vec<u64> = top.iter().map(|s| s.stake_id).collect();
    assert_eq!(ids, vec![1, 3]);
}

#[tokio::test]
async fn test_remote_empty_is_accepted_as_last_resort() {
    let store = FakeSource::new("store", Mode::Down);
    let remote = FakeSource::new("remote", Mode::Empty);
    let probe = FakeProbe::new(true);
    let gate = gate_with(&store, &remote, &probe);

    let resolution = gate.resolve(starts_key()).await;

    assert_eq!(resolution.status, DatasetStatus::Remote);
    assert!(resolution.data.unwrap().is_empty());
}

#[tokio::test]
async fn test_both_down_sets_error_then_retries_once() {
    let store = FakeSource::new("store", Mode::Down);
    let remote = FakeSource::new("remote", Mode::Down);
    let probe = FakeProbe::new(true);
    let gate = gate_with(&store, &remote, &probe);

    let resolution = gate.resolve(starts_key()).await;

    assert_eq!(resolution.status, DatasetStatus::Error);
    assert!(resolution.data.is_none());
    let error = resolution.last_error.unwrap();
    assert!(error.contains("remote unreachable"), "unexpected error: {}", error);

    let entry = gate.status(starts_key());
    assert_eq!(entry.status, DatasetStatus::Error);
    assert!(entry.last_error.is_some());

    // Remote recovers before the scheduled retry fires
    remote.set_mode(Mode::Data);
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(gate.status(starts_key()).status, DatasetStatus::Remote);
    assert!(gate.status(starts_key()).last_error.is_none());
    assert_eq!(gate.cached(starts_key()).unwrap().len(), 3);
    assert_eq!(remote.calls(), 2);
    // Retry starts from the remote, which answered, so the store saw one call
    assert_eq!(store.calls(), 1);
}

#[tokio::test]
async fn test_failed_retry_is_not_repeated() {
    let store = FakeSource::new("store", Mode::Down);
    let remote = FakeSource::new("remote", Mode::Down);
    let probe = FakeProbe::new(true);
    let gate = gate_with(&store, &remote, &probe);

    gate.resolve(starts_key()).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Initial pass plus exactly one retry
    assert_eq!(remote.calls(), 2);
    assert_eq!(store.calls(), 2);
    assert_eq!(gate.status(starts_key()).status, DatasetStatus::Error);
}

#[tokio::test]
async fn test_superseded_retry_is_skipped() {
    let store = FakeSource::new("store", Mode::Down);
    let remote = FakeSource::new("remote", Mode::Down);
    let probe = FakeProbe::new(true);
    let gate = gate_with(&store, &remote, &probe);

    assert_eq!(gate.resolve(starts_key()).await.status, DatasetStatus::Error);

    remote.set_mode(Mode::Data);
    assert_eq!(gate.resolve(starts_key()).await.status, DatasetStatus::Remote);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(remote.calls(), 2);
    assert_eq!(gate.status(starts_key()).status, DatasetStatus::Remote);
}

#[tokio::test]
async fn test_error_keeps_previous_data() {
    let store = FakeSource::new("store", Mode::Down);
    let remote = FakeSource::new("remote", Mode::Data);
    let probe = FakeProbe::new(false);
    let gate = gate_with(&store, &remote, &probe);

    gate.resolve(starts_key()).await;
    remote.set_mode(Mode::Down);

    let resolution = gate.resolve(starts_key()).await;
    assert_eq!(resolution.status, DatasetStatus::Error);
    assert_eq!(resolution.data.unwrap().len(), 3);
}

#[tokio::test]
async fn test_recheck_promotes_remote_keys_to_database() {
    let store = FakeSource::new("store", Mode::Data);
    let remote = FakeSource::new("remote", Mode::Data);
    let probe = FakeProbe::new(false);
    let gate = gate_with(&store, &remote, &probe);

    let overview = DatasetKey::new(Network::Ethereum, DatasetKind::StakingOverview);
    gate.resolve(starts_key()).await;
    gate.resolve(overview).await;
    assert_eq!(gate.status(overview).status, DatasetStatus::Remote);

    // Still unreachable: nothing moves
    assert_eq!(gate.recheck_availability().await, 0);
    assert_eq!(store.calls(), 0);

    probe.set(true);
    assert_eq!(gate.recheck_availability().await, 2);

    assert_eq!(gate.status(starts_key()).status, DatasetStatus::Database);
    assert_eq!(gate.status(overview).status, DatasetStatus::Database);
    assert_eq!(store.calls(), 2);

    // Nothing left on remote
    assert_eq!(gate.recheck_availability().await, 0);
    assert_eq!(store.calls(), 2);
}

#[tokio::test]
async fn test_promotion_watcher_reacts_to_recheck_events() {
    let store = FakeSource::new("store", Mode::Data);
    let remote = FakeSource::new("remote", Mode::Data);
    let probe = FakeProbe::new(false);
    let gate = gate_with(&store, &remote, &probe);

    gate.resolve(starts_key()).await;
    let (tx, rx) = mpsc::channel(1);
    let watcher = gate.spawn_promotion_watcher(rx);

    probe.set(true);
    tx.send(()).await.unwrap();
    drop(tx);
    watcher.await.unwrap();

    assert_eq!(gate.status(starts_key()).status, DatasetStatus::Database);
}

#[tokio::test]
async fn test_concurrent_promotions_run_once() {
    let store = FakeSource::new("store", Mode::Data);
    let remote = FakeSource::new("remote", Mode::Data);
    let probe = FakeProbe::new(false);
    let gate = gate_with(&store, &remote, &probe);

    gate.resolve(starts_key()).await;
    probe.set(true);
    store.delay_ms.store(50, Ordering::SeqCst);

    let (a, b) = tokio::join!(gate.promote_if_reachable(starts_key()), gate.promote_if_reachable(starts_key()));

    assert!(a ^ b, "exactly one promotion should run");
    assert_eq!(store.calls(), 1);
    assert_eq!(gate.status(starts_key()).status, DatasetStatus::Database);
}

#[tokio::test]
async fn test_promotion_ignores_non_remote_keys() {
    let store = FakeSource::new("store", Mode::Data);
    let remote = FakeSource::new("remote", Mode::Data);
    let probe = FakeProbe::new(true);
    let gate = gate_with(&store, &remote, &probe);

    gate.resolve(starts_key()).await;
    assert!(!gate.promote_if_reachable(starts_key()).await);
    assert!(!gate.promote_if_reachable(DatasetKey::new(Network::Pulsechain, DatasetKind::StakeEnds)).await);
    assert_eq!(store.calls(), 1);
}

#[tokio::test]
async fn test_failed_promotion_keeps_in_flight_refresh() {
    let store = FakeSource::new("store", Mode::Empty);
    let remote = FakeSource::new("remote", Mode::Data);
    let probe = FakeProbe::new(false);
    let gate = gate_with(&store, &remote, &probe);
    let key = DatasetKey::new(Network::Ethereum, DatasetKind::GlobalInfo);

    remote.current_day.store(100, Ordering::SeqCst);
    gate.resolve(key).await;
    assert_eq!(gate.status(key).status, DatasetStatus::Remote);

    remote.current_day.store(200, Ordering::SeqCst);
    remote.delay_ms.store(100, Ordering::SeqCst);
    let refresh = {
        let gate = gate.clone();
        tokio::spawn(async move { gate.resolve(key).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    probe.set(true);
    assert!(!gate.promote_if_reachable(key).await);

    let refreshed = refresh.await.unwrap();
    assert_eq!(refreshed.data.unwrap().into_global_info().unwrap().current_day, 200);

    let cached = gate.cached(key).unwrap().into_global_info().unwrap();
    assert_eq!(cached.current_day, 200);
    assert_eq!(gate.status(key).status, DatasetStatus::Remote);
}

#[tokio::test]
async fn test_failed_promotion_keeps_in_flight_error_and_retry() {
    let store = FakeSource::new("store", Mode::Empty);
    let remote = FakeSource::new("remote", Mode::Data);
    let probe = FakeProbe::new(false);
    let gate = gate_with(&store, &remote, &probe);

    gate.resolve(starts_key()).await;
    remote.set_mode(Mode::Down);
    remote.delay_ms.store(100, Ordering::SeqCst);
    let refresh = {
        let gate = gate.clone();
        tokio::spawn(async move { gate.resolve(starts_key()).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    probe.set(true);
    assert!(!gate.promote_if_reachable(starts_key()).await);

    let failed = refresh.await.unwrap();
    assert_eq!(failed.status, DatasetStatus::Error);
    assert_eq!(gate.status(starts_key()).status, DatasetStatus::Error);

    // The one-shot retry still runs against the remote
    remote.delay_ms.store(0, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(remote.calls(), 3);
}

#[tokio::test]
async fn test_stale_result_is_not_committed() {
    let store = FakeSource::new("store", Mode::Data);
    let remote = FakeSource::new("remote", Mode::Data);
    let probe = FakeProbe::new(true);
    let gate = gate_with(&store, &remote, &probe);
    let key = DatasetKey::new(Network::Ethereum, DatasetKind::GlobalInfo);

    store.delay_ms.store(150, Ordering::SeqCst);
    store.current_day.store(111, Ordering::SeqCst);
    let slow = {
        let gate = gate.clone();
        tokio::spawn(async move { gate.resolve(key).await })
    };

    tokio::time::sleep(Duration::from_millis(30)).await;
    store.delay_ms.store(0, Ordering::SeqCst);
    store.current_day.store(222, Ordering::SeqCst);
    let fresh = gate.resolve(key).await;
    assert_eq!(fresh.data.clone().unwrap().into_global_info().unwrap().current_day, 222);

    let late = slow.await.unwrap();
    assert_eq!(late.data.unwrap().into_global_info().unwrap().current_day, 111);

    let cached = gate.cached(key).unwrap().into_global_info().unwrap();
    assert_eq!(cached.current_day, 222);
    assert_eq!(gate.status(key).status, DatasetStatus::Database);
}

#[tokio::test]
async fn test_statuses_snapshot_covers_resolved_keys() {
    let store = FakeSource::new("store", Mode::Data);
    let remote = FakeSource::new("remote", Mode::Down);
    let probe = FakeProbe::new(true);
    let gate = gate_with(&store, &remote, &probe);

    for kind in DatasetKind::all() {
        gate.resolve(DatasetKey::new(Network::Pulsechain, kind)).await;
    }

    let statuses = gate.statuses();
    assert_eq!(statuses.len(), 5);
    assert!(statuses.values().all(|entry| entry.status == DatasetStatus::Database));
    assert_eq!(probe.calls.load(Ordering::SeqCst), 5);
}
