//! Vector search domain types.

use serde::{Deserialize, Serialize};

/// A single semantic-search hit over the textbook chunk index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorResult {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    /// Weaviate `_additional.certainty`, in `[0, 1]`.
    pub score: f32,
}

/// Defaults used by the orchestrator's two call sites (spec §4.7): tight
/// `k` on the main pipeline branch, wider `k` wherever extra grounding
/// helps (e.g. the new-concept analysis path).
pub const DEFAULT_K_PIPELINE: usize = 3;
pub const DEFAULT_K_GROUNDING: usize = 5;
