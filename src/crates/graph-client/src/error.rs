//! Error types for the prerequisite graph client.

use thiserror::Error;

/// Result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphClientError>;

/// Errors that can occur while talking to the concept graph store.
#[derive(Debug, Error)]
pub enum GraphClientError {
    /// The requested concept or neighborhood does not exist.
    #[error("concept not found: {0}")]
    NotFound(String),

    /// A session or connection-acquisition deadline elapsed.
    #[error("graph operation timed out: {0}")]
    Timeout(String),

    /// The underlying graph store is unreachable or rejected the query.
    #[error("graph backend unavailable: {0}")]
    Unavailable(String),

    /// A write would have introduced a prerequisite cycle.
    #[error("prerequisite write rejected, would introduce a cycle: {0} -> {1}")]
    CycleRejected(String, String),

    /// Any other backend error, preserved for logging.
    #[error("graph client error: {0}")]
    Other(String),
}

impl GraphClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GraphClientError::NotFound(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GraphClientError::Timeout(_) | GraphClientError::Unavailable(_)
        )
    }
}

impl From<neo4rs::Error> for GraphClientError {
    fn from(err: neo4rs::Error) -> Self {
        GraphClientError::Unavailable(err.to_string())
    }
}
