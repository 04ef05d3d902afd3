//! Candidate concepts awaiting expert review before they join the graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a [`StagedConcept`]. Monotone: once terminal
/// (`Approved`, `Rejected`, `Merged`), it never reverts (spec invariant I5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagedStatus {
    Pending,
    Approved,
    Rejected,
    Merged,
}

impl StagedStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StagedStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StagedStatus::Pending => "pending",
            StagedStatus::Approved => "approved",
            StagedStatus::Rejected => "rejected",
            StagedStatus::Merged => "merged",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(StagedStatus::Pending),
            "approved" => Some(StagedStatus::Approved),
            "rejected" => Some(StagedStatus::Rejected),
            "merged" => Some(StagedStatus::Merged),
            _ => None,
        }
    }
}

/// A concept the extraction stage identified but the graph does not yet
/// know, queued for expert review (C9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedConcept {
    pub id: Uuid,
    pub concept_name: String,
    pub description: String,
    pub source_query_id: Uuid,
    pub source_query_text: String,
    pub identified_at: DateTime<Utc>,
    pub suggested_prerequisites: Vec<String>,
    pub suggested_difficulty: Option<u8>,
    pub suggested_category: Option<String>,
    pub llm_reasoning: String,
    pub status: StagedStatus,
    pub submitted_by: Option<String>,
    pub occurrence_count: u32,
    pub related_query_ids: Vec<Uuid>,
    pub reviewer_id: Option<String>,
    pub review_notes: Option<String>,
    pub merged_into_concept_id: Option<String>,
}

impl StagedConcept {
    pub fn new(
        concept_name: impl Into<String>,
        source_query_id: Uuid,
        source_query_text: impl Into<String>,
        analysis: &llm_client::NewConceptAnalysis,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            concept_name: concept_name.into(),
            description: analysis.description.clone(),
            source_query_id,
            source_query_text: source_query_text.into(),
            identified_at: Utc::now(),
            suggested_prerequisites: analysis.suggested_prereqs.clone(),
            suggested_difficulty: Some(analysis.suggested_difficulty),
            suggested_category: Some(analysis.suggested_category.clone()),
            llm_reasoning: analysis.reasoning.clone(),
            status: StagedStatus::Pending,
            submitted_by: None,
            occurrence_count: 1,
            related_query_ids: vec![source_query_id],
            reviewer_id: None,
            review_notes: None,
            merged_into_concept_id: None,
        }
    }

    /// Record a re-sighting of the same unknown concept in another query
    /// (spec P9: N submissions of the same name produce one record with
    /// `occurrence_count = N`).
    pub fn record_sighting(&mut self, query_id: Uuid) {
        self.occurrence_count += 1;
        self.related_query_ids.push(query_id);
    }

    pub fn approve(&mut self, reviewer_id: impl Into<String>, notes: Option<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = StagedStatus::Approved;
        self.reviewer_id = Some(reviewer_id.into());
        self.review_notes = notes;
    }

    pub fn reject(&mut self, reviewer_id: impl Into<String>, notes: Option<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = StagedStatus::Rejected;
        self.reviewer_id = Some(reviewer_id.into());
        self.review_notes = notes;
    }

    pub fn merge(&mut self, reviewer_id: impl Into<String>, target_id: impl Into<String>, notes: Option<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = StagedStatus::Merged;
        self.reviewer_id = Some(reviewer_id.into());
        self.merged_into_concept_id = Some(target_id.into());
        self.review_notes = notes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis() -> llm_client::NewConceptAnalysis {
        llm_client::NewConceptAnalysis {
            description: "a tensor field assigns a tensor to each point".to_string(),
            suggested_prereqs: vec!["vectors".to_string(), "manifolds".to_string()],
            suggested_difficulty: 8,
            suggested_category: "differential geometry".to_string(),
            reasoning: "not present in the graph".to_string(),
            is_likely_new_concept: true,
        }
    }

    #[test]
    fn record_sighting_increments_occurrence() {
        let mut sc = StagedConcept::new("tensor field", Uuid::new_v4(), "what is a tensor field?", &analysis());
        assert_eq!(sc.occurrence_count, 1);
        for _ in 0..4 {
            sc.record_sighting(Uuid::new_v4());
        }
        assert_eq!(sc.occurrence_count, 5);
        assert_eq!(sc.related_query_ids.len(), 5);
    }

    #[test]
    fn approval_is_idempotent_once_terminal() {
        let mut sc = StagedConcept::new("tensor field", Uuid::new_v4(), "q", &analysis());
        sc.approve("reviewer-1", Some("looks good".to_string()));
        assert_eq!(sc.status, StagedStatus::Approved);

        // Second call on an already-terminal record is a no-op (P5).
        sc.reject("reviewer-2", Some("changed my mind".to_string()));
        assert_eq!(sc.status, StagedStatus::Approved);
        assert_eq!(sc.reviewer_id, Some("reviewer-1".to_string()));
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [StagedStatus::Pending, StagedStatus::Approved, StagedStatus::Rejected, StagedStatus::Merged] {
            assert_eq!(StagedStatus::parse(s.as_str()), Some(s));
        }
    }
}
