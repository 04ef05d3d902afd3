//! Client for semantic search over textbook chunks.
//!
//! The vector store itself (Weaviate) is an external collaborator; this
//! crate owns schema provisioning and the single `search` operation the
//! orchestrator calls on its context branch.

pub mod error;
pub mod types;
pub mod weaviate;

pub use error::{Result, VectorClientError};
pub use types::{VectorResult, DEFAULT_K_GROUNDING, DEFAULT_K_PIPELINE};

use async_trait::async_trait;

/// Everything the orchestrator needs from the vector index.
///
/// The backend performs the embedding server-side: callers pass raw query
/// text and get back ranked hits. A search failure is never fatal to the
/// pipeline -- callers should treat `Err` the same as an empty result set.
#[async_trait]
pub trait VectorClient: Send + Sync {
    /// Top-`k` semantically similar chunks for `query`, ranked by
    /// descending certainty.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<VectorResult>>;

    /// Whether the backend answered its readiness check at startup.
    async fn is_healthy(&self) -> bool;
}
