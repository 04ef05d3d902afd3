//! The `Query` aggregate — the single mutable record a pipeline run builds
//! up and persists exactly once on terminal completion or failure.

use chrono::{DateTime, Utc};
use graph_client::Concept;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One step of the pipeline, recorded for observability and replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStep {
    pub name: String,
    pub duration_ms: u64,
    pub ok: bool,
    pub error: Option<String>,
}

impl ProcessingStep {
    pub fn ok(name: impl Into<String>, duration_ms: u64) -> Self {
        Self { name: name.into(), duration_ms, ok: true, error: None }
    }

    pub fn failed(name: impl Into<String>, duration_ms: u64, error: impl Into<String>) -> Self {
        Self { name: name.into(), duration_ms, ok: false, error: Some(error.into()) }
    }
}

/// The completion-generation result embedded in a `Query`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    pub explanation: String,
    pub retrieved_context: Vec<String>,
    pub llm_provider: String,
    pub llm_model: String,
}

/// A single pipeline run, created at request arrival and persisted exactly
/// once on terminal completion or failure (spec invariant: no query is
/// persisted without a terminal success flag).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub identified_concepts: Vec<String>,
    pub prerequisite_path: Vec<Concept>,
    pub response: QueryResponse,
    pub processing_steps: Vec<ProcessingStep>,
    pub success: bool,
    pub error: Option<String>,
}

impl Query {
    /// Start a new, not-yet-completed query record for the given question.
    pub fn new(text: impl Into<String>, user_id: Option<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            text: text.into(),
            timestamp: Utc::now(),
            identified_concepts: Vec::new(),
            prerequisite_path: Vec::new(),
            response: QueryResponse::default(),
            processing_steps: Vec::new(),
            success: false,
            error: None,
        }
    }

    /// Whether `name` (case-insensitive) is among the identified concepts.
    pub fn mentions_concept(&self, name: &str) -> bool {
        self.identified_concepts.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    /// Whether this record is still usable as a cache hit, given a freshness
    /// window (spec §4.4/§4.8, P8).
    pub fn is_fresh(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now.signed_duration_since(self.timestamp) <= window
    }
}
