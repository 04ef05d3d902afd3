//! Error types for the vector search client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorClientError>;

#[derive(Debug, Error)]
pub enum VectorClientError {
    #[error("vector operation timed out: {0}")]
    Timeout(String),

    #[error("vector backend unavailable: {0}")]
    Unavailable(String),

    #[error("vector client error: {0}")]
    Other(String),
}

impl VectorClientError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, VectorClientError::Timeout(_) | VectorClientError::Unavailable(_))
    }
}
