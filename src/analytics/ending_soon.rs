//! "Ending soon" totals over 7/30/90-day windows

use crate::types::{hearts_to_hex, ActiveStake};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndingWindow {
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
}

impl EndingWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndingWindow::Week => "7d",
            EndingWindow::Month => "30d",
            EndingWindow::Quarter => "90d",
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            EndingWindow::Week => 7,
            EndingWindow::Month => 30,
            EndingWindow::Quarter => 90,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "7d" | "7" => Some(EndingWindow::Week),
            "30d" | "30" => Some(EndingWindow::Month),
            "90d" | "90" => Some(EndingWindow::Quarter),
            _ => None,
        }
    }

    pub fn all() -> [EndingWindow; 3] {
        [EndingWindow::Week, EndingWindow::Month, EndingWindow::Quarter]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndingSummary {
    pub window: EndingWindow,
    pub count: usize,
    pub total_hearts: u128,
    pub total_usd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StakeSortKey {
    Amount,
    UsdValue,
    Apy,
    Progress,
}

impl StakeSortKey {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "amount" => Some(StakeSortKey::Amount),
            "usd" | "usd_value" => Some(StakeSortKey::UsdValue),
            "apy" => Some(StakeSortKey::Apy),
            "progress" => Some(StakeSortKey::Progress),
            _ => None,
        }
    }
}

/// Display row for one stake ending inside a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndingStake {
    pub stake: ActiveStake,
    pub hex_amount: f64,
    pub usd_value: f64,
    /// Rough yield estimate, not the protocol payout formula
    pub estimated_apy: f64,
    pub progress_pct: f64,
}

/// Approximate APY: `(tShares / hearts) × 365 × 100 / stakedDays`
///
/// Divides by raw hearts, not HEX, so values are tiny. Sort order is what
/// callers use it for.
pub fn estimated_apy(stake: &ActiveStake) -> f64 {
    let hearts = stake.stake.staked_hearts as f64;
    if hearts <= 0.0 {
        return 0.0;
    }
    (stake.stake.tshares() / hearts) * 365.0 * 100.0 / stake.effective_days() as f64
}

pub fn progress_pct(stake: &ActiveStake) -> f64 {
    (stake.days_served as f64 / stake.effective_days() as f64 * 100.0).clamp(0.0, 100.0)
}

pub struct WindowedAggregator {
    hex_price_usd: f64,
}

impl WindowedAggregator {
    pub fn new(hex_price_usd: f64) -> Self {
        Self {
            hex_price_usd: if hex_price_usd.is_finite() { hex_price_usd.max(0.0) } else { 0.0 },
        }
    }

    pub fn usd_value(&self, hearts: u128) -> f64 {
        hearts_to_hex(hearts) * self.hex_price_usd
    }

    fn in_window(stake: &ActiveStake, current_day: i64, window_days: i64) -> bool {
        (0..=window_days).contains(&(stake.stake.end_day - current_day))
    }

    /// Count and totals of stakes with `0 ≤ end_day − current_day ≤ window`
    pub fn summarize(&self, active: &[ActiveStake], current_day: i64, window: EndingWindow) -> EndingSummary {
        let mut count = 0;
        let mut total_hearts = 0u128;

        for stake in active.iter().filter(|s| Self::in_window(s, current_day, window.days())) {
            count += 1;
            total_hearts = total_hearts.saturating_add(stake.stake.staked_hearts);
        }

        EndingSummary {
            window,
            count,
            total_hearts,
            total_usd: self.usd_value(total_hearts),
        }
    }

    pub fn summarize_all(&self, active: &[ActiveStake], current_day: i64) -> Vec<EndingSummary> {
        EndingWindow::all()
            .iter()
            .map(|w| self.summarize(active, current_day, *w))
            .collect()
    }

    /// Stakes ending inside `window`, sorted descending by `sort`
    pub fn ending_soon(
        &self,
        active: &[ActiveStake],
        current_day: i64,
        window: EndingWindow,
        sort: StakeSortKey,
    ) -> Vec<EndingStake> {
        let mut rows: Vec<EndingStake> = active
            .iter()
            .filter(|s| Self::in_window(s, current_day, window.days()))
            .map(|s| EndingStake {
                stake: s.clone(),
                hex_amount: s.hex_amount(),
                usd_value: self.usd_value(s.stake.staked_hearts),
                estimated_apy: estimated_apy(s),
                progress_pct: progress_pct(s),
            })
            .collect();

        rows.sort_by(|a, b| {
            let (x, y) = match sort {
                StakeSortKey::Amount => (a.hex_amount, b.hex_amount),
                StakeSortKey::UsdValue => (a.usd_value, b.usd_value),
                StakeSortKey::Apy => (a.estimated_apy, b.estimated_apy),
                StakeSortKey::Progress => (a.progress_pct, b.progress_pct),
            };
            y.partial_cmp(&x)
                .unwrap_or(Ordering::Equal)
                .then(a.stake.stake.stake_id.cmp(&b.stake.stake.stake_id))
        });

        rows
    }
}
