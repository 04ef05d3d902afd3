//! Admin endpoints for the staged-concept review queue (C9).

use axum::extract::{Path, Query, State};
use axum::Json;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::{PaginationQuery, StagedConceptReviewRequestDto};
use crate::api::routes::AppState;
use crate::db::{StagedConcept, StagingRepository, StagingStats};

const DEFAULT_PAGE_SIZE: i64 = 20;

pub async fn pending_staged_concepts(
    State(app_state): State<AppState>,
    Query(pagination): Query<PaginationQuery>,
) -> ApiResult<Json<Vec<StagedConcept>>> {
    let concepts = StagingRepository::get_pending(
        &app_state.pool,
        pagination.limit_or(DEFAULT_PAGE_SIZE),
        pagination.offset_or(0),
    )
    .await?;
    Ok(Json(concepts))
}

pub async fn staged_concept_stats(State(app_state): State<AppState>) -> ApiResult<Json<StagingStats>> {
    let stats = StagingRepository::stats(&app_state.pool).await?;
    Ok(Json(stats))
}

pub async fn review_staged_concept(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<StagedConceptReviewRequestDto>,
) -> ApiResult<Json<StagedConcept>> {
    let reviewed = app_state
        .staging
        .review(id, body.action.into(), body.reviewer_id, body.notes, body.existing_concept_id)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(reviewed))
}
