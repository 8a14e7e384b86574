//! Remote query service (HEX subgraph) client
//!
//! One GraphQL endpoint per network. The subgraph returns big integers as
//! strings and may omit fields, so every response is parsed into the raw
//! shapes below and then mapped explicitly into the canonical records.
//!
//! ## Endpoints
//!
//! - Ethereum: https://api.thegraph.com/subgraphs/name/codeakk/hex
//! - PulseChain: https://graph.pulsechain.com/subgraphs/name/Codeakk/Hex
//!
//! Collection queries page through results ordered by `stakeId`, using
//! `stakeId_gt` as the cursor.

use super::backend::StakeSource;
use super::error::SourceError;
use super::retry::{with_retry, RetryPolicy};
use crate::analytics::active::{open_stakes, overview_of, top_stakes};
use crate::types::{GlobalInfo, Network, StakeEnd, StakeStart, StakingOverview};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_ETHEREUM_ENDPOINT: &str = "https://api.thegraph.com/subgraphs/name/codeakk/hex";
pub const DEFAULT_PULSECHAIN_ENDPOINT: &str = "https://graph.pulsechain.com/subgraphs/name/Codeakk/Hex";

const STAKE_START_FIELDS: &str =
    "stakeId stakerAddr stakedHearts stakeShares stakedDays startDay isAutoStake transactionHash blockNumber timestamp";
const STAKE_END_FIELDS: &str = "stakeId payout penalty servedDays transactionHash timestamp";
const GLOBAL_INFO_FIELDS: &str =
    "hexDay shareRate totalSupply lockedHeartsTotal stakeSharesTotal stakePenaltyTotal timestamp";

/// Numeric field as the subgraph may send it: JSON number or decimal string
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Int(u64),
    Float(f64),
    Text(String),
}

impl RawNumber {
    pub fn as_u128(&self) -> Option<u128> {
        match self {
            RawNumber::Int(v) => Some(*v as u128),
            RawNumber::Float(v) if v.is_finite() && *v >= 0.0 => Some(*v as u128),
            RawNumber::Float(_) => None,
            RawNumber::Text(s) => {
                let s = s.trim();
                s.parse::<u128>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u128))
            }
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RawNumber::Int(v) => i64::try_from(*v).ok(),
            RawNumber::Float(v) if v.is_finite() => Some(*v as i64),
            RawNumber::Float(_) => None,
            RawNumber::Text(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i64))
            }
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawNumber::Int(v) => Some(*v as f64),
            RawNumber::Float(v) => Some(*v),
            RawNumber::Text(s) => s.trim().parse().ok(),
        }
    }
}

fn u128_or_zero(v: &Option<RawNumber>) -> u128 {
    v.as_ref().and_then(RawNumber::as_u128).unwrap_or(0)
}

fn i64_or_zero(v: &Option<RawNumber>) -> i64 {
    v.as_ref().and_then(RawNumber::as_i64).unwrap_or(0)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStakeStart {
    pub stake_id: Option<RawNumber>,
    pub staker_addr: Option<String>,
    pub staked_hearts: Option<RawNumber>,
    pub stake_shares: Option<RawNumber>,
    pub staked_days: Option<RawNumber>,
    pub start_day: Option<RawNumber>,
    pub is_auto_stake: Option<bool>,
    pub transaction_hash: Option<String>,
    pub block_number: Option<RawNumber>,
    pub timestamp: Option<RawNumber>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStakeEnd {
    pub stake_id: Option<RawNumber>,
    pub payout: Option<RawNumber>,
    pub penalty: Option<RawNumber>,
    pub served_days: Option<RawNumber>,
    pub transaction_hash: Option<String>,
    pub timestamp: Option<RawNumber>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawGlobalInfo {
    pub hex_day: Option<RawNumber>,
    pub share_rate: Option<RawNumber>,
    pub total_supply: Option<RawNumber>,
    pub locked_hearts_total: Option<RawNumber>,
    pub stake_shares_total: Option<RawNumber>,
    pub stake_penalty_total: Option<RawNumber>,
    pub timestamp: Option<RawNumber>,
}

/// Map a raw subgraph start into the canonical record
///
/// Returns None when the stake id is missing: such a record cannot be joined
/// to its end event. Other missing numbers default to 0, staked days to 1.
pub fn normalize_stake_start(raw: &RawStakeStart) -> Option<StakeStart> {
    let stake_id = raw.stake_id.as_ref().and_then(RawNumber::as_u128)?;
    let staked_days = raw
        .staked_days
        .as_ref()
        .and_then(RawNumber::as_u128)
        .unwrap_or(1)
        .clamp(1, u32::MAX as u128) as u32;
    let start_day = i64_or_zero(&raw.start_day);

    Some(StakeStart {
        stake_id: stake_id.min(u64::MAX as u128) as u64,
        staker_addr: raw.staker_addr.clone().unwrap_or_default().to_lowercase(),
        staked_hearts: u128_or_zero(&raw.staked_hearts),
        stake_shares: u128_or_zero(&raw.stake_shares),
        staked_days,
        start_day,
        end_day: start_day + staked_days as i64,
        is_auto_stake: raw.is_auto_stake.unwrap_or(false),
        transaction_hash: raw.transaction_hash.clone().unwrap_or_default(),
        block_number: u128_or_zero(&raw.block_number).min(u64::MAX as u128) as u64,
        timestamp: i64_or_zero(&raw.timestamp),
    })
}

pub fn normalize_stake_end(raw: &RawStakeEnd) -> Option<StakeEnd> {
    let stake_id = raw.stake_id.as_ref().and_then(RawNumber::as_u128)?;

    Some(StakeEnd {
        stake_id: stake_id.min(u64::MAX as u128) as u64,
        payout_hearts: u128_or_zero(&raw.payout),
        penalty_hearts: u128_or_zero(&raw.penalty),
        served_days: u128_or_zero(&raw.served_days).min(u32::MAX as u128) as u32,
        transaction_hash: raw.transaction_hash.clone().unwrap_or_default(),
        timestamp: i64_or_zero(&raw.timestamp),
    })
}

pub fn normalize_global_info(raw: &RawGlobalInfo) -> GlobalInfo {
    GlobalInfo {
        current_day: i64_or_zero(&raw.hex_day),
        share_rate: raw.share_rate.as_ref().and_then(RawNumber::as_f64).unwrap_or(0.0),
        total_supply_hearts: u128_or_zero(&raw.total_supply),
        locked_hearts: u128_or_zero(&raw.locked_hearts_total),
        stake_shares_total: u128_or_zero(&raw.stake_shares_total),
        stake_penalty_total: u128_or_zero(&raw.stake_penalty_total),
        timestamp: i64_or_zero(&raw.timestamp),
    }
}

/// Normalize a page, logging how many records were unusable
fn normalize_page<R, T>(raw: &[R], normalize: fn(&R) -> Option<T>, label: &str) -> Vec<T> {
    let records: Vec<T> = raw.iter().filter_map(normalize).collect();
    let skipped = raw.len() - records.len();
    if skipped > 0 {
        log::debug!("Skipped {} {} record(s) without a stake id", skipped, label);
    }
    records
}

fn parse_stake_id(id: &Option<RawNumber>) -> Option<u64> {
    id.as_ref().and_then(RawNumber::as_u128).and_then(|v| u64::try_from(v).ok())
}

fn raw_start_id(raw: &RawStakeStart) -> Option<u64> {
    parse_stake_id(&raw.stake_id)
}

fn raw_end_id(raw: &RawStakeEnd) -> Option<u64> {
    parse_stake_id(&raw.stake_id)
}

/// Page through a collection with a `stakeId_gt` cursor
///
/// `fetch_page` gets the cursor and returns one raw page. The cursor moves to
/// the largest stake id on the raw page, so records dropped by `normalize`
/// never end paging. Stops on a short page, after `max_pages`, or when a
/// full page carries no id past the cursor.
async fn collect_pages<R, T, F, Fut>(
    page_size: usize,
    max_pages: usize,
    label: &str,
    raw_id: fn(&R) -> Option<u64>,
    normalize: fn(&R) -> Option<T>,
    mut fetch_page: F,
) -> Result<Vec<T>, SourceError>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<Vec<R>, SourceError>>,
{
    let mut records = Vec::new();
    let mut cursor = 0u64;

    for _ in 0..max_pages {
        let page = fetch_page(cursor).await?;
        let next_cursor = page.iter().filter_map(raw_id).max();
        records.extend(normalize_page(&page, normalize, label));

        if page.len() < page_size {
            return Ok(records);
        }

        match next_cursor {
            Some(id) if id > cursor => cursor = id,
            _ => {
                log::warn!("⚠️  {} paging stuck at stake id {}, stopping", label, cursor);
                return Ok(records);
            }
        }
    }

    log::warn!("⚠️  {} paging stopped at {} pages", label, max_pages);
    Ok(records)
}

#[derive(Debug, Deserialize)]
struct GraphResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphError>>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StakeStartsData {
    stake_starts: Vec<RawStakeStart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StakeEndsData {
    stake_ends: Vec<RawStakeEnd>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GlobalInfosData {
    global_infos: Vec<RawGlobalInfo>,
}

/// Unwrap a GraphQL envelope into its data, turning `errors` into a query error
fn unwrap_graph_response<T>(response: GraphResponse<T>) -> Result<T, SourceError> {
    if let Some(errors) = response.errors {
        if !errors.is_empty() {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(SourceError::Query(messages.join("; ")));
        }
    }
    response.data.ok_or(SourceError::Empty)
}

/// Build a paged collection query ordered by stake id
pub fn paged_query(entity: &str, fields: &str, page_size: usize, after_stake_id: u64) -> String {
    format!(
        "{{ {}(first: {}, orderBy: stakeId, orderDirection: asc, where: {{ stakeId_gt: \"{}\" }}) {{ {} }} }}",
        entity, page_size, after_stake_id, fields
    )
}

#[derive(Debug, Clone)]
pub struct SubgraphEndpoints {
    pub ethereum: String,
    pub pulsechain: String,
}

impl Default for SubgraphEndpoints {
    fn default() -> Self {
        Self {
            ethereum: DEFAULT_ETHEREUM_ENDPOINT.to_string(),
            pulsechain: DEFAULT_PULSECHAIN_ENDPOINT.to_string(),
        }
    }
}

impl SubgraphEndpoints {
    pub fn for_network(&self, network: Network) -> &str {
        match network {
            Network::Ethereum => &self.ethereum,
            Network::Pulsechain => &self.pulsechain,
        }
    }
}

pub struct SubgraphClient {
    http: reqwest::Client,
    endpoints: SubgraphEndpoints,
    retry: RetryPolicy,
    page_size: usize,
    max_pages: usize,
}

impl SubgraphClient {
    pub fn new(
        endpoints: SubgraphEndpoints,
        timeout: Duration,
        retry: RetryPolicy,
        page_size: usize,
    ) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            endpoints,
            retry,
            page_size: page_size.clamp(1, 1000),
            max_pages: 10_000,
        })
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    async fn post_once<T: DeserializeOwned + Send>(&self, endpoint: &str, body: &serde_json::Value) -> Result<T, SourceError> {
        let response = self
            .http
            .post(endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::Transport(format!("Subgraph API error: {}", status)));
        }
        if !status.is_success() {
            return Err(SourceError::Query(format!("Subgraph API error: {}", status)));
        }

        let parsed: GraphResponse<T> = response.json().await?;
        unwrap_graph_response(parsed)
    }

    /// POST one GraphQL query with the bounded retry policy
    async fn query<T: DeserializeOwned + Send>(&self, network: Network, query: String) -> Result<T, SourceError> {
        let endpoint = self.endpoints.for_network(network);
        let body = json!({ "query": query });
        let label = format!("subgraph query ({})", network);

        with_retry(self.retry, &label, || self.post_once::<T>(endpoint, &body)).await
    }

    async fn fetch_all_starts(&self, network: Network) -> Result<Vec<StakeStart>, SourceError> {
        let starts = collect_pages(
            self.page_size,
            self.max_pages,
            "stakeStart",
            raw_start_id,
            normalize_stake_start,
            move |cursor| {
                let query = paged_query("stakeStarts", STAKE_START_FIELDS, self.page_size, cursor);
                async move {
                    let data: StakeStartsData = self.query(network, query).await?;
                    Ok(data.stake_starts)
                }
            },
        )
        .await?;

        log::info!("📡 Fetched {} stake starts from subgraph ({})", starts.len(), network);
        Ok(starts)
    }

    async fn fetch_all_ends(&self, network: Network) -> Result<Vec<StakeEnd>, SourceError> {
        let ends = collect_pages(
            self.page_size,
            self.max_pages,
            "stakeEnd",
            raw_end_id,
            normalize_stake_end,
            move |cursor| {
                let query = paged_query("stakeEnds", STAKE_END_FIELDS, self.page_size, cursor);
                async move {
                    let data: StakeEndsData = self.query(network, query).await?;
                    Ok(data.stake_ends)
                }
            },
        )
        .await?;

        log::info!("📡 Fetched {} stake ends from subgraph ({})", ends.len(), network);
        Ok(ends)
    }
}

#[async_trait]
impl StakeSource for SubgraphClient {
    async fn staking_overview(&self, network: Network) -> Result<StakingOverview, SourceError> {
        let (starts, ends) = tokio::try_join!(self.fetch_all_starts(network), self.fetch_all_ends(network))?;
        Ok(overview_of(&open_stakes(&starts, &ends)))
    }

    async fn global_info(&self, network: Network) -> Result<GlobalInfo, SourceError> {
        let query = format!(
            "{{ globalInfos(first: 1, orderBy: hexDay, orderDirection: desc) {{ {} }} }}",
            GLOBAL_INFO_FIELDS
        );
        let data: GlobalInfosData = self.query(network, query).await?;

        data.global_infos
            .first()
            .map(normalize_global_info)
            .ok_or(SourceError::Empty)
    }

    async fn top_stakes(&self, network: Network, limit: usize) -> Result<Vec<StakeStart>, SourceError> {
        let (starts, ends) = tokio::try_join!(self.fetch_all_starts(network), self.fetch_all_ends(network))?;
        Ok(top_stakes(&starts, &ends, limit))
    }

    async fn stake_starts(&self, network: Network) -> Result<Vec<StakeStart>, SourceError> {
        self.fetch_all_starts(network).await
    }

    async fn stake_ends(&self, network: Network) -> Result<Vec<StakeEnd>, SourceError> {
        self.fetch_all_ends(network).await
    }

    fn source_name(&self) -> &'static str {
        "subgraph"
    }
}
