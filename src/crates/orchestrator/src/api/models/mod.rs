//! API data transfer objects (DTOs) for the query, concept, and staging
//! endpoints, with validation enforcing spec §6's request-body bounds.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::api::middleware::validation::validate_string_length;
use crate::staging::ReviewAction;

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequestDto {
    pub question: String,
    pub user_id: Option<Uuid>,
}

impl QueryRequestDto {
    pub fn validate(&self) -> ApiResult<()> {
        validate_string_length(&self.question, "question", 3, 1000)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConceptQueryRequestDto {
    pub concept_name: String,
    pub user_id: Option<Uuid>,
}

impl ConceptQueryRequestDto {
    pub fn validate(&self) -> ApiResult<()> {
        validate_string_length(&self.concept_name, "concept_name", 2, 100)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConceptDetailRequestDto {
    pub id_or_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StagedConceptReviewRequestDto {
    pub reviewer_id: String,
    pub action: ReviewActionDto,
    pub notes: Option<String>,
    pub existing_concept_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewActionDto {
    Approve,
    Reject,
    Merge,
}

impl From<ReviewActionDto> for ReviewAction {
    fn from(dto: ReviewActionDto) -> Self {
        match dto {
            ReviewActionDto::Approve => ReviewAction::Approve,
            ReviewActionDto::Reject => ReviewAction::Reject,
            ReviewActionDto::Merge => ReviewAction::Merge,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

impl PaginationQuery {
    pub fn limit_or(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, 200)
    }

    pub fn offset_or(&self, default: i64) -> i64 {
        self.offset.unwrap_or(default).max(0)
    }
}

/// `GET /api/v1/health` response: overall status plus per-backend detail
/// (spec §6: "additionally reports each backend client's reachability").
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub graph: String,
    pub vector: String,
    pub llm: String,
    pub version: String,
    pub timestamp: String,
}

impl HealthResponse {
    pub fn new(database_ok: bool, graph_ok: bool, vector_ok: bool, llm_ok: bool) -> Self {
        let status_word = |ok: bool| if ok { "ok" } else { "error" }.to_string();
        let overall = if database_ok && graph_ok && vector_ok && llm_ok { "ok" } else { "degraded" };

        Self {
            status: overall.to_string(),
            database: status_word(database_ok),
            graph: status_word(graph_ok),
            vector: status_word(vector_ok),
            llm: status_word(llm_ok),
            version: crate::version::VERSION.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_must_be_at_least_3_chars() {
        let dto = QueryRequestDto { question: "hi".into(), user_id: None };
        assert!(dto.validate().is_err());
    }

    #[test]
    fn question_within_bounds_is_valid() {
        let dto = QueryRequestDto { question: "What is a derivative?".into(), user_id: None };
        assert!(dto.validate().is_ok());
    }

    #[test]
    fn concept_name_too_short_is_rejected() {
        let dto = ConceptQueryRequestDto { concept_name: "x".into(), user_id: None };
        assert!(dto.validate().is_err());
    }

    #[test]
    fn health_response_reports_overall_degraded_on_any_failure() {
        let health = HealthResponse::new(true, true, false, true);
        assert_eq!(health.status, "degraded");
        assert_eq!(health.vector, "error");
    }

    #[test]
    fn pagination_defaults_and_clamps() {
        let q = PaginationQuery { limit: Some(10_000), offset: None };
        assert_eq!(q.limit_or(20), 200);
        assert_eq!(q.offset_or(0), 0);
    }
}
