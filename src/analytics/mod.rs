//! Staking analytics over canonical records
//!
//! Pure functions: nothing here does I/O or sees a `SourceError`, only
//! possibly-empty collections.

pub mod active;
pub mod bucketizer;
pub mod ending_soon;
pub mod recommend;

pub use active::{derive_active, open_stakes, overview_of, top_stakes};
pub use bucketizer::{classify, RiskBucket, RiskBucketizer, RiskLevel};
pub use ending_soon::{EndingStake, EndingSummary, EndingWindow, StakeSortKey, WindowedAggregator};
pub use recommend::{plan_exit, Confidence, ExitIntent, Recommendation, RecommendationEngine};
