//! Active-set resolution from stake start and end events
//!
//! A stake is active while no end event exists for its id. Protocol days do
//! not close a stake: overdue stakes stay active with a negative `days_left`
//! until the unlock transaction shows up.

use crate::types::{ActiveStake, StakeEnd, StakeStart, StakingOverview};
use std::collections::HashSet;

fn ended_ids(ends: &[StakeEnd]) -> HashSet<u64> {
    ends.iter().map(|end| end.stake_id).collect()
}

/// Starts with no matching end, first occurrence of each id kept, input order
/// preserved
pub fn open_stakes(starts: &[StakeStart], ends: &[StakeEnd]) -> Vec<StakeStart> {
    let ended = ended_ids(ends);
    let mut seen = HashSet::with_capacity(starts.len());
    let mut open = Vec::new();

    for start in starts {
        if !seen.insert(start.stake_id) {
            log::debug!("Duplicate stake start {} ignored", start.stake_id);
            continue;
        }
        if !ended.contains(&start.stake_id) {
            open.push(start.clone());
        }
    }

    open
}

/// Active stakes with day fields computed for `current_day`
pub fn derive_active(starts: &[StakeStart], ends: &[StakeEnd], current_day: i64) -> Vec<ActiveStake> {
    open_stakes(starts, ends)
        .into_iter()
        .map(|start| to_active(start, current_day))
        .collect()
}

fn to_active(mut stake: StakeStart, current_day: i64) -> ActiveStake {
    if stake.staked_days == 0 {
        stake.staked_days = 1;
        stake.end_day = stake.start_day + 1;
    }

    let days_served = (current_day - stake.start_day).clamp(0, stake.staked_days as i64);
    let days_left = stake.end_day - current_day;

    ActiveStake {
        stake,
        is_active: true,
        days_served,
        days_left,
    }
}

/// Largest open stakes by staked hearts, descending; ties by stake id
pub fn top_stakes(starts: &[StakeStart], ends: &[StakeEnd], limit: usize) -> Vec<StakeStart> {
    let mut open = open_stakes(starts, ends);
    open.sort_by(|a, b| b.staked_hearts.cmp(&a.staked_hearts).then(a.stake_id.cmp(&b.stake_id)));
    open.truncate(limit);
    open
}

/// Overview counters over a set of open stakes
pub fn overview_of(open: &[StakeStart]) -> StakingOverview {
    let mut stakers = HashSet::new();
    let mut total_staked_hearts = 0u128;
    let mut total_shares = 0u128;
    let mut total_days = 0u64;

    for stake in open {
        stakers.insert(stake.staker_addr.as_str());
        total_staked_hearts = total_staked_hearts.saturating_add(stake.staked_hearts);
        total_shares = total_shares.saturating_add(stake.stake_shares);
        total_days += stake.staked_days.max(1) as u64;
    }

    let average_staked_days = if open.is_empty() {
        0.0
    } else {
        total_days as f64 / open.len() as f64
    };

    StakingOverview {
        active_stakes: open.len() as u64,
        total_staked_hearts,
        total_shares,
        average_staked_days,
        unique_stakers: stakers.len() as u64,
    }
}
