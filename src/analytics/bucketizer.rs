//! Per-day risk buckets for a planned stake exit
//!
//! Risk is relative: it compares the supply unlocking on a day against the
//! caller's own exit amount, not against an absolute HEX threshold.
//!
//! # Rules (applied in order, each can only raise the level)
//! 1. Baseline `low`
//! 2. Total ending > 50% of caller amount → `high`, > 20% → `medium`
//! 3. Any single stake > 30% of caller amount → one level up
//! 4. More than 50 stakes ending → one level up

use crate::types::{hearts_to_hex, ActiveStake};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const HIGH_PRESSURE_RATIO: f64 = 0.5;
const MODERATE_PRESSURE_RATIO: f64 = 0.2;
const LARGE_STAKE_RATIO: f64 = 0.3;
const MANY_STAKES: usize = 50;

/// Widest window bucketized in one call, in days
pub const MAX_WINDOW_DAYS: i64 = 11_110;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    /// One level up, saturating at `high`
    pub fn escalate(self) -> Self {
        match self {
            RiskLevel::Low => RiskLevel::Medium,
            RiskLevel::Medium | RiskLevel::High => RiskLevel::High,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stakes ending on one day, counted in days from the current day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskBucket {
    pub day: i64,
    pub total_hearts: u128,
    pub stake_count: usize,
    pub largest_hearts: u128,
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<String>,
}

impl RiskBucket {
    pub fn empty(day: i64) -> Self {
        Self {
            day,
            total_hearts: 0,
            stake_count: 0,
            largest_hearts: 0,
            risk_level: RiskLevel::Low,
            risk_factors: Vec::new(),
        }
    }

    fn add(&mut self, stake: &ActiveStake) {
        self.total_hearts = self.total_hearts.saturating_add(stake.stake.staked_hearts);
        self.stake_count += 1;
        self.largest_hearts = self.largest_hearts.max(stake.stake.staked_hearts);
    }

    pub fn total_hex(&self) -> f64 {
        hearts_to_hex(self.total_hearts)
    }

    pub fn largest_hex(&self) -> f64 {
        hearts_to_hex(self.largest_hearts)
    }

    pub fn average_hex(&self) -> f64 {
        if self.stake_count == 0 {
            return 0.0;
        }
        self.total_hex() / self.stake_count as f64
    }
}

/// Classify a day from its totals and the caller's exit amount
///
/// Rules 2 and 3 are relative to the caller amount and are skipped when it
/// is not positive.
pub fn classify(total_hex: f64, largest_hex: f64, stake_count: usize, caller_amount_hex: f64) -> (RiskLevel, Vec<String>) {
    let mut level = RiskLevel::Low;
    let mut factors = Vec::new();

    if caller_amount_hex > 0.0 {
        if total_hex > caller_amount_hex * HIGH_PRESSURE_RATIO {
            level = RiskLevel::High;
            factors.push(format!("High selling pressure: {:.0} HEX ending", total_hex));
        } else if total_hex > caller_amount_hex * MODERATE_PRESSURE_RATIO {
            level = RiskLevel::Medium;
            factors.push(format!("Moderate selling pressure: {:.0} HEX ending", total_hex));
        }

        if largest_hex > caller_amount_hex * LARGE_STAKE_RATIO {
            level = level.escalate();
            factors.push(format!("Large stake ending: {:.0} HEX", largest_hex));
        }
    }

    if stake_count > MANY_STAKES {
        level = level.escalate();
        factors.push(format!("Many stakes ending: {} stakes", stake_count));
    }

    (level, factors)
}

pub struct RiskBucketizer {
    caller_amount_hex: f64,
}

impl RiskBucketizer {
    pub fn new(caller_amount_hex: f64) -> Self {
        Self {
            caller_amount_hex: caller_amount_hex.max(0.0),
        }
    }

    pub fn caller_amount_hex(&self) -> f64 {
        self.caller_amount_hex
    }

    /// One bucket per day in `[window_start, window_end]`, days without
    /// ending stakes included as empty `low` buckets. Ascending by day.
    pub fn bucketize(&self, active: &[ActiveStake], window_start: i64, window_end: i64) -> Vec<RiskBucket> {
        if window_end < window_start {
            return Vec::new();
        }

        let span = window_end.saturating_sub(window_start);
        let window_end = if span > MAX_WINDOW_DAYS {
            log::warn!("⚠️  Risk window of {} days clamped to {}", span, MAX_WINDOW_DAYS);
            window_start.saturating_add(MAX_WINDOW_DAYS)
        } else {
            window_end
        };

        let mut buckets: BTreeMap<i64, RiskBucket> =
            (window_start..=window_end).map(|day| (day, RiskBucket::empty(day))).collect();

        for stake in active {
            if let Some(bucket) = buckets.get_mut(&stake.days_left) {
                bucket.add(stake);
            }
        }

        buckets.into_values().map(|bucket| self.reclassify(bucket)).collect()
    }

    /// Recompute level and factors from the bucket's totals
    pub fn reclassify(&self, mut bucket: RiskBucket) -> RiskBucket {
        let (level, factors) = classify(
            bucket.total_hex(),
            bucket.largest_hex(),
            bucket.stake_count,
            self.caller_amount_hex,
        );
        bucket.risk_level = level;
        bucket.risk_factors = factors;
        bucket
    }
}
