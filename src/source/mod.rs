//! Data sources and the gate that chooses between them
//!
//! - `store`: persistent SQLite store
//! - `remote`: HEX subgraph over GraphQL
//! - `availability`: store reachability probe
//! - `gate`: failover and per-dataset status

pub mod availability;
pub mod backend;
pub mod error;
pub mod gate;
pub mod remote;
pub mod retry;
pub mod status;
pub mod store;

pub use availability::{AvailabilityProbe, CachedProbe, SqliteProbe};
pub use backend::{fetch_dataset, StakeSource, UnavailableSource};
pub use error::SourceError;
pub use gate::{GateConfig, Resolution, SourceGate};
pub use remote::{SubgraphClient, SubgraphEndpoints};
pub use retry::{with_retry, RetryPolicy};
pub use status::{DatasetStatus, StatusEntry, StatusMap};
pub use store::{run_schema_migrations, SqliteStakeStore};
