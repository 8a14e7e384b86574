//! Error taxonomy for data sources
//!
//! Errors never leave the source gate: they are converted into a dataset
//! status plus a `last_error` string.

#[derive(Debug)]
pub enum SourceError {
    /// Store or remote endpoint could not be reached
    Transport(String),
    Http(reqwest::Error),
    Database(rusqlite::Error),
    Serialization(serde_json::Error),
    /// The query service answered with GraphQL errors
    Query(String),
    /// Successful call with nothing usable in it
    Empty,
    /// Source was not attempted (e.g. store probe says unreachable)
    Unavailable,
}

impl SourceError {
    /// Transport-level failures are worth retrying; the rest are not
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Transport(_) => true,
            SourceError::Http(e) => !e.is_decode(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Http(err)
    }
}

impl From<rusqlite::Error> for SourceError {
    fn from(err: rusqlite::Error) -> Self {
        SourceError::Database(err)
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Serialization(err)
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Transport(e) => write!(f, "Transport error: {}", e),
            SourceError::Http(e) => write!(f, "HTTP error: {}", e),
            SourceError::Database(e) => write!(f, "Database error: {}", e),
            SourceError::Serialization(e) => write!(f, "Serialization error: {}", e),
            SourceError::Query(e) => write!(f, "Query error: {}", e),
            SourceError::Empty => write!(f, "Empty result"),
            SourceError::Unavailable => write!(f, "Source unavailable"),
        }
    }
}

impl std::error::Error for SourceError {}
