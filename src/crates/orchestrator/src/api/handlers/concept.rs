//! `POST /api/v1/concept-query`, `POST /api/v1/concept-detail`, and
//! `GET /api/v1/concepts` handlers.

use axum::extract::State;
use axum::Json;
use graph_client::{Concept, ConceptDetail};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{ConceptDetailRequestDto, ConceptQueryRequestDto};
use crate::api::routes::AppState;
use crate::pipeline::QueryOutcome;
use crate::OrchestratorError;

pub async fn concept_query(
    State(app_state): State<AppState>,
    Json(body): Json<ConceptQueryRequestDto>,
) -> ApiResult<Json<QueryOutcome>> {
    body.validate()?;

    let outcome = app_state
        .smart_query
        .smart_concept(&app_state.pipeline, &body.concept_name, body.user_id)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(outcome))
}

pub async fn concept_detail(
    State(app_state): State<AppState>,
    Json(body): Json<ConceptDetailRequestDto>,
) -> ApiResult<Json<ConceptDetail>> {
    let detail = app_state
        .graph
        .concept_detail(&body.id_or_name)
        .await
        .map_err(OrchestratorError::from)
        .map_err(ApiError::from)?;
    Ok(Json(detail))
}

pub async fn list_concepts(State(app_state): State<AppState>) -> ApiResult<Json<Vec<Concept>>> {
    let concepts = app_state
        .graph
        .all_concepts()
        .await
        .map_err(OrchestratorError::from)
        .map_err(ApiError::from)?;
    Ok(Json(concepts))
}
