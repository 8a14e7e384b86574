//! HEX staking reconciliation and analytics
//!
//! - `source`: store/remote failover with per-dataset status
//! - `analytics`: active set, risk buckets, exit recommendation, ending-soon totals
//! - `dashboard`: concurrent per-network loading

pub mod analytics;
pub mod config;
pub mod dashboard;
pub mod source;
pub mod types;
