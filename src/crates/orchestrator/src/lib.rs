//! Query-orchestration engine for the math-tutoring RAG pipeline.
//!
//! Wires together a knowledge-graph client, a vector-search client, and an
//! LLM completion client into a single pipeline that turns a free-text
//! question into a tutor-style explanation, streaming intermediate
//! artifacts to the caller as they become available.

pub mod api;
pub mod breaker;
pub mod config;
pub mod db;
pub mod pipeline;
pub mod retry;
pub mod smart_query;
pub mod staging;
pub mod stream;
pub mod version;

use thiserror::Error;

/// Errors surfaced by the orchestration engine.
///
/// These are the error *kinds* from the design: each maps to an HTTP status
/// at the API boundary (see [`api::error`]) and to a retry/degrade decision
/// inside the pipeline.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("backend timeout: {0}")]
    BackendTimeout(String),

    #[error("model truncation: {0}")]
    ModelTruncation(String),

    #[error("circuit open for operation: {0}")]
    CircuitOpen(String),

    #[error("cancelled")]
    Cancelled,

    #[error("graph client error: {0}")]
    Graph(#[from] graph_client::GraphClientError),

    #[error("vector client error: {0}")]
    Vector(#[from] vector_client::VectorClientError),

    #[error("llm client error: {0}")]
    Llm(#[from] llm_client::LlmError),

    #[error("database error: {0}")]
    Database(#[from] db::DatabaseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl OrchestratorError {
    /// Whether the pipeline should short-circuit without persisting (only
    /// `Cancelled` and `ValidationError` do, per the propagation policy).
    pub fn short_circuits_persistence(&self) -> bool {
        matches!(self, Self::Cancelled | Self::ValidationError(_))
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
