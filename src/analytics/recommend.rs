//! Exit-day recommendation over risk buckets
//!
//! Greedy nearest-acceptable-day search: the closest `low` day to the target
//! wins, then the closest `medium` day, then the closest day of any level.
//! Only days inside the bucketized window are ever considered.

use super::bucketizer::{RiskBucket, RiskBucketizer, RiskLevel};
use crate::types::ActiveStake;
use serde::{Deserialize, Serialize};

const MAX_ALTERNATIVES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Days from the current day
    pub day: i64,
    pub reasoning: Vec<String>,
    pub risk_assessment: RiskLevel,
    pub alternative_days: Vec<i64>,
    pub market_impact: String,
    pub market_impact_pct: f64,
    pub confidence: Confidence,
}

/// What the caller wants to do: exit `amount_hex` around `target_day`
/// (days from now), give or take `variance_days`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitIntent {
    pub target_day: i64,
    pub amount_hex: f64,
    pub variance_days: i64,
}

impl ExitIntent {
    pub fn window(&self) -> (i64, i64) {
        let variance = self.variance_days.max(0);
        (
            self.target_day.saturating_sub(variance).max(0),
            self.target_day.saturating_add(variance),
        )
    }
}

/// First bucket matching `accept` with the smallest distance to `target_day`
fn closest<'a>(buckets: &'a [RiskBucket], target_day: i64, accept: impl Fn(&RiskBucket) -> bool) -> Option<&'a RiskBucket> {
    let mut best: Option<&RiskBucket> = None;
    for bucket in buckets.iter().filter(|b| accept(b)) {
        let closer = match best {
            Some(current) => bucket.day.abs_diff(target_day) < current.day.abs_diff(target_day),
            None => true,
        };
        if closer {
            best = Some(bucket);
        }
    }
    best
}

pub struct RecommendationEngine {
    caller_amount_hex: f64,
}

impl RecommendationEngine {
    pub fn new(caller_amount_hex: f64) -> Self {
        Self {
            caller_amount_hex: caller_amount_hex.max(0.0),
        }
    }

    /// Pick an exit day from `buckets`. None when there are no buckets.
    pub fn recommend(&self, buckets: &[RiskBucket], target_day: i64) -> Option<Recommendation> {
        let (chosen, confidence) = if let Some(b) = closest(buckets, target_day, |b| b.risk_level == RiskLevel::Low) {
            (b, Confidence::High)
        } else if let Some(b) = closest(buckets, target_day, |b| b.risk_level == RiskLevel::Medium) {
            (b, Confidence::Medium)
        } else {
            (closest(buckets, target_day, |_| true)?, Confidence::Low)
        };

        let alternative_days: Vec<i64> = buckets
            .iter()
            .filter(|b| b.risk_level == RiskLevel::Low && b.day != chosen.day)
            .map(|b| b.day)
            .take(MAX_ALTERNATIVES)
            .collect();

        let market_impact_pct = self.market_impact_pct(chosen);
        let market_impact = format!(
            "Your {:.0} HEX would be {:.1}% of the HEX unlocking on day {}",
            self.caller_amount_hex, market_impact_pct, chosen.day
        );

        Some(Recommendation {
            day: chosen.day,
            reasoning: self.reasoning(chosen, target_day, confidence),
            risk_assessment: chosen.risk_level,
            alternative_days,
            market_impact,
            market_impact_pct,
            confidence,
        })
    }

    /// Caller amount as a percentage of caller amount plus the bucket total
    pub fn market_impact_pct(&self, bucket: &RiskBucket) -> f64 {
        let denominator = self.caller_amount_hex + bucket.total_hex();
        if denominator <= 0.0 {
            return 0.0;
        }
        self.caller_amount_hex / denominator * 100.0
    }

    fn reasoning(&self, chosen: &RiskBucket, target_day: i64, confidence: Confidence) -> Vec<String> {
        let mut reasoning = Vec::new();

        reasoning.push(match confidence {
            Confidence::High => format!("Day {} has low unlock pressure", chosen.day),
            Confidence::Medium => format!("No low-risk day in range; day {} has moderate risk", chosen.day),
            Confidence::Low => format!("Every day in range is high risk; day {} is closest to target", chosen.day),
        });

        let distance = chosen.day.abs_diff(target_day);
        if distance == 0 {
            reasoning.push("Matches the target day".to_string());
        } else {
            reasoning.push(format!("{} day(s) from target day {}", distance, target_day));
        }

        if chosen.stake_count > 0 {
            reasoning.push(format!(
                "{} stake(s) ending with {:.0} HEX in total (avg {:.0} HEX)",
                chosen.stake_count,
                chosen.total_hex(),
                chosen.average_hex()
            ));
        } else {
            reasoning.push("No other stakes end that day".to_string());
        }

        reasoning.extend(chosen.risk_factors.iter().cloned());
        reasoning
    }
}

/// Bucketize the intent's window and recommend a day for it
pub fn plan_exit(active: &[ActiveStake], intent: &ExitIntent) -> Option<Recommendation> {
    let (window_start, window_end) = intent.window();
    let buckets = RiskBucketizer::new(intent.amount_hex).bucketize(active, window_start, window_end);

    log::debug!(
        "🔧 Planning exit of {:.0} HEX over days {}..={} ({} buckets)",
        intent.amount_hex,
        window_start,
        window_end,
        buckets.len()
    );

    RecommendationEngine::new(intent.amount_hex).recommend(&buckets, intent.target_day)
}
