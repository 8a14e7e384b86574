//! Source backend trait
//!
//! Both the persistent store and the remote query service implement
//! `StakeSource`; the gate only ever talks to this trait, so tests can swap
//! in fake clients.

use super::error::SourceError;
use crate::types::{DatasetKey, DatasetKind, DatasetPayload, GlobalInfo, Network, StakeEnd, StakeStart, StakingOverview};
use async_trait::async_trait;

#[async_trait]
pub trait StakeSource: Send + Sync {
    async fn staking_overview(&self, network: Network) -> Result<StakingOverview, SourceError>;

    async fn global_info(&self, network: Network) -> Result<GlobalInfo, SourceError>;

    /// Largest open stakes by staked hearts, descending
    async fn top_stakes(&self, network: Network, limit: usize) -> Result<Vec<StakeStart>, SourceError>;

    async fn stake_starts(&self, network: Network) -> Result<Vec<StakeStart>, SourceError>;

    async fn stake_ends(&self, network: Network) -> Result<Vec<StakeEnd>, SourceError>;

    /// Backend type for logging
    fn source_name(&self) -> &'static str;
}

/// Dispatch a dataset key to the matching source method
pub async fn fetch_dataset(
    source: &dyn StakeSource,
    key: DatasetKey,
    top_limit: usize,
) -> Result<DatasetPayload, SourceError> {
    let payload = match key.kind {
        DatasetKind::StakingOverview => DatasetPayload::StakingOverview(source.staking_overview(key.network).await?),
        DatasetKind::GlobalInfo => DatasetPayload::GlobalInfo(source.global_info(key.network).await?),
        DatasetKind::TopStakes => DatasetPayload::TopStakes(source.top_stakes(key.network, top_limit).await?),
        DatasetKind::StakeStarts => DatasetPayload::StakeStarts(source.stake_starts(key.network).await?),
        DatasetKind::StakeEnds => DatasetPayload::StakeEnds(source.stake_ends(key.network).await?),
    };

    log::debug!(
        "📥 {} returned {} record(s) for {}",
        source.source_name(),
        payload.len(),
        key
    );

    Ok(payload)
}

/// Source that is never reachable, used when the store cannot be opened
pub struct UnavailableSource;

#[async_trait]
impl StakeSource for UnavailableSource {
    async fn staking_overview(&self, _network: Network) -> Result<StakingOverview, SourceError> {
        Err(SourceError::Unavailable)
    }

    async fn global_info(&self, _network: Network) -> Result<GlobalInfo, SourceError> {
        Err(SourceError::Unavailable)
    }

    async fn top_stakes(&self, _network: Network, _limit: usize) -> Result<Vec<StakeStart>, SourceError> {
        Err(SourceError::Unavailable)
    }

    async fn stake_starts(&self, _network: Network) -> Result<Vec<StakeStart>, SourceError> {
        Err(SourceError::Unavailable)
    }

    async fn stake_ends(&self, _network: Network) -> Result<Vec<StakeEnd>, SourceError> {
        Err(SourceError::Unavailable)
    }

    fn source_name(&self) -> &'static str {
        "unavailable"
    }
}
