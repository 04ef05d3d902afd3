//! Concept graph domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role a concept plays within a single prerequisite-path response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptType {
    /// The concept the question was actually about.
    Target,
    /// An ancestor the student must understand first.
    Prerequisite,
    /// A concept that builds on the target (surfaced by concept-detail, not path lookups).
    NextConcept,
}

/// A node in the prerequisite DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    /// Stable, unique slug. Not guaranteed human readable.
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concept_type: Option<ConceptType>,
    /// 1 (easiest) through 10 (hardest).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Concept {
    pub fn slug(name: &str) -> String {
        name.trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }
}

/// A new concept to be written during the approval workflow (see the
/// orchestrator's staging review path).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConcept {
    pub name: String,
    pub description: String,
    pub difficulty: Option<u8>,
    pub category: Option<String>,
}

/// Depth-1 neighborhood of a single concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptDetail {
    pub concept: Concept,
    pub prerequisites: Vec<Concept>,
    pub leads_to: Vec<Concept>,
}

pub const MAX_TRAVERSAL_DEPTH: u32 = 5;
pub const MAX_PATH_NODES: usize = 100;
