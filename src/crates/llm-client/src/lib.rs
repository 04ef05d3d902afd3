//! Completion client for the math-tutoring pipeline.
//!
//! Three typed prompts run against a cloud completion provider: concept
//! extraction, explanation generation, and new-concept analysis. Providers
//! are otherwise opaque -- the orchestrator only depends on the
//! [`CompletionClient`] trait.

pub mod config;
pub mod error;
pub mod prompts;

#[cfg(feature = "remote")]
pub mod remote;

pub use config::RemoteLlmConfig;
pub use error::{LlmError, Result};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use graph_client::Concept;

/// Output of the "analyze new concept" prompt (spec §4.3), consumed by the
/// staging workflow before a candidate concept is queued for review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConceptAnalysis {
    pub description: String,
    pub suggested_prereqs: Vec<String>,
    /// 1 (easiest) through 10 (hardest).
    pub suggested_difficulty: u8,
    pub suggested_category: String,
    pub reasoning: String,
    pub is_likely_new_concept: bool,
}

/// Everything the orchestrator needs from a completion provider.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Deduplicated, ordered list of mathematical concept names found in
    /// `text`. Output is lowercase-trimmed so identical phrasings of the
    /// same question are cacheable. An empty list is a valid answer.
    async fn identify_concepts(&self, text: &str) -> Result<Vec<String>>;

    /// Student-facing explanation referencing the prerequisite path and
    /// retrieved context. The orchestrator checks the result for
    /// truncation markers itself; this call just returns the raw text.
    async fn generate_explanation(
        &self,
        query: &str,
        path: &[Concept],
        context_chunks: &[String],
    ) -> Result<String>;

    /// Free-form analysis of a newly identified concept the graph does not
    /// know about yet, used by the staging workflow before enqueueing it.
    async fn analyze_new_concept(&self, name: &str, query_context: &str) -> Result<NewConceptAnalysis>;

    /// Provider name, e.g. `"anthropic"` or `"openai"`.
    fn provider(&self) -> &str;

    /// Model identifier currently in use.
    fn model(&self) -> &str;

    /// Lightweight reachability probe, used at startup and by the circuit
    /// breaker's health reporting.
    async fn is_healthy(&self) -> bool;
}
