//! Canonical staking records
//!
//! Every source (SQLite store, remote subgraph) is mapped into these types
//! before anything downstream looks at it. Amounts stay in integer hearts;
//! conversion to HEX happens only at the analytics edge.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest HEX unit: 10^8 hearts = 1 HEX
pub const HEARTS_PER_HEX: u128 = 100_000_000;

/// 10^12 shares = 1 T-Share
pub const SHARES_PER_TSHARE: u128 = 1_000_000_000_000;

pub fn hearts_to_hex(hearts: u128) -> f64 {
    hearts as f64 / HEARTS_PER_HEX as f64
}

pub fn hex_to_hearts(hex: f64) -> u128 {
    if hex <= 0.0 {
        return 0;
    }
    (hex * HEARTS_PER_HEX as f64).round() as u128
}

pub fn shares_to_tshares(shares: u128) -> f64 {
    shares as f64 / SHARES_PER_TSHARE as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Ethereum,
    Pulsechain,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Ethereum => "ethereum",
            Network::Pulsechain => "pulsechain",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ethereum" | "eth" => Some(Network::Ethereum),
            "pulsechain" | "pls" => Some(Network::Pulsechain),
            _ => None,
        }
    }

    pub fn all() -> [Network; 2] {
        [Network::Ethereum, Network::Pulsechain]
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical dataset served by the source gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    StakingOverview,
    GlobalInfo,
    TopStakes,
    StakeStarts,
    StakeEnds,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::StakingOverview => "staking_overview",
            DatasetKind::GlobalInfo => "global_info",
            DatasetKind::TopStakes => "top_stakes",
            DatasetKind::StakeStarts => "stake_starts",
            DatasetKind::StakeEnds => "stake_ends",
        }
    }

    pub fn all() -> [DatasetKind; 5] {
        [
            DatasetKind::StakingOverview,
            DatasetKind::GlobalInfo,
            DatasetKind::TopStakes,
            DatasetKind::StakeStarts,
            DatasetKind::StakeEnds,
        ]
    }
}

/// Status and cache key: one dataset on one network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetKey {
    pub network: Network,
    pub kind: DatasetKind,
}

impl DatasetKey {
    pub fn new(network: Network, kind: DatasetKind) -> Self {
        Self { network, kind }
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network.as_str(), self.kind.as_str())
    }
}

/// Lockup event. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeStart {
    pub stake_id: u64,
    pub staker_addr: String,
    pub staked_hearts: u128,
    pub stake_shares: u128,
    pub staked_days: u32,
    pub start_day: i64,
    /// Always `start_day + staked_days`
    pub end_day: i64,
    pub is_auto_stake: bool,
    pub transaction_hash: String,
    pub block_number: u64,
    pub timestamp: i64,
}

impl StakeStart {
    pub fn new(
        stake_id: u64,
        staker_addr: impl Into<String>,
        staked_hearts: u128,
        staked_days: u32,
        start_day: i64,
    ) -> Self {
        Self {
            stake_id,
            staker_addr: staker_addr.into(),
            staked_hearts,
            stake_shares: 0,
            staked_days,
            start_day,
            end_day: start_day + staked_days as i64,
            is_auto_stake: false,
            transaction_hash: String::new(),
            block_number: 0,
            timestamp: 0,
        }
    }

    pub fn with_shares(mut self, stake_shares: u128) -> Self {
        self.stake_shares = stake_shares;
        self
    }

    pub fn with_origin(mut self, transaction_hash: impl Into<String>, block_number: u64, timestamp: i64) -> Self {
        self.transaction_hash = transaction_hash.into();
        self.block_number = block_number;
        self.timestamp = timestamp;
        self
    }

    pub fn with_auto_stake(mut self, is_auto_stake: bool) -> Self {
        self.is_auto_stake = is_auto_stake;
        self
    }

    pub fn staked_hex(&self) -> f64 {
        hearts_to_hex(self.staked_hearts)
    }

    pub fn tshares(&self) -> f64 {
        shares_to_tshares(self.stake_shares)
    }
}

/// Unlock event, joined to its start by `stake_id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeEnd {
    pub stake_id: u64,
    pub payout_hearts: u128,
    pub penalty_hearts: u128,
    pub served_days: u32,
    pub transaction_hash: String,
    pub timestamp: i64,
}

impl StakeEnd {
    pub fn new(stake_id: u64) -> Self {
        Self {
            stake_id,
            payout_hearts: 0,
            penalty_hearts: 0,
            served_days: 0,
            transaction_hash: String::new(),
            timestamp: 0,
        }
    }

    pub fn with_payout(mut self, payout_hearts: u128, penalty_hearts: u128, served_days: u32) -> Self {
        self.payout_hearts = payout_hearts;
        self.penalty_hearts = penalty_hearts;
        self.served_days = served_days;
        self
    }

    pub fn with_origin(mut self, transaction_hash: impl Into<String>, timestamp: i64) -> Self {
        self.transaction_hash = transaction_hash.into();
        self.timestamp = timestamp;
        self
    }
}

/// A start with no matching end, with day fields computed for one protocol day.
/// Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveStake {
    #[serde(flatten)]
    pub stake: StakeStart,
    pub is_active: bool,
    pub days_served: i64,
    /// Negative when the stake is overdue
    pub days_left: i64,
}

impl ActiveStake {
    pub fn hex_amount(&self) -> f64 {
        self.stake.staked_hex()
    }

    /// Staked days, with zero treated as one
    pub fn effective_days(&self) -> u32 {
        self.stake.staked_days.max(1)
    }

    pub fn is_overdue(&self) -> bool {
        self.days_left < 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingOverview {
    pub active_stakes: u64,
    pub total_staked_hearts: u128,
    pub total_shares: u128,
    pub average_staked_days: f64,
    pub unique_stakers: u64,
}

impl StakingOverview {
    pub fn is_usable(&self) -> bool {
        self.active_stakes > 0 || self.total_staked_hearts > 0
    }

    pub fn average_stake_hex(&self) -> f64 {
        if self.active_stakes == 0 {
            return 0.0;
        }
        hearts_to_hex(self.total_staked_hearts) / self.active_stakes as f64
    }
}

/// Protocol-wide counters for one network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalInfo {
    pub current_day: i64,
    pub share_rate: f64,
    pub total_supply_hearts: u128,
    pub locked_hearts: u128,
    pub stake_shares_total: u128,
    pub stake_penalty_total: u128,
    pub timestamp: i64,
}

impl GlobalInfo {
    pub fn is_usable(&self) -> bool {
        self.current_day > 0
    }
}

/// Data returned for one dataset, whichever source produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum DatasetPayload {
    StakingOverview(StakingOverview),
    GlobalInfo(GlobalInfo),
    TopStakes(Vec<StakeStart>),
    StakeStarts(Vec<StakeStart>),
    StakeEnds(Vec<StakeEnd>),
}

impl DatasetPayload {
    pub fn kind(&self) -> DatasetKind {
        match self {
            DatasetPayload::StakingOverview(_) => DatasetKind::StakingOverview,
            DatasetPayload::GlobalInfo(_) => DatasetKind::GlobalInfo,
            DatasetPayload::TopStakes(_) => DatasetKind::TopStakes,
            DatasetPayload::StakeStarts(_) => DatasetKind::StakeStarts,
            DatasetPayload::StakeEnds(_) => DatasetKind::StakeEnds,
        }
    }

    /// Non-empty and structurally valid
    pub fn is_usable(&self) -> bool {
        match self {
            DatasetPayload::StakingOverview(o) => o.is_usable(),
            DatasetPayload::GlobalInfo(g) => g.is_usable(),
            DatasetPayload::TopStakes(s) | DatasetPayload::StakeStarts(s) => !s.is_empty(),
            DatasetPayload::StakeEnds(e) => !e.is_empty(),
        }
    }

    /// Record count, for logging
    pub fn len(&self) -> usize {
        match self {
            DatasetPayload::StakingOverview(_) | DatasetPayload::GlobalInfo(_) => 1,
            DatasetPayload::TopStakes(s) | DatasetPayload::StakeStarts(s) => s.len(),
            DatasetPayload::StakeEnds(e) => e.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_starts(self) -> Option<Vec<StakeStart>> {
        match self {
            DatasetPayload::StakeStarts(s) | DatasetPayload::TopStakes(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_ends(self) -> Option<Vec<StakeEnd>> {
        match self {
            DatasetPayload::StakeEnds(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_overview(self) -> Option<StakingOverview> {
        match self {
            DatasetPayload::StakingOverview(o) => Some(o),
            _ => None,
        }
    }

    pub fn into_global_info(self) -> Option<GlobalInfo> {
        match self {
            DatasetPayload::GlobalInfo(g) => Some(g),
            _ => None,
        }
    }
}
