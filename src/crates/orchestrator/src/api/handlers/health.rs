//! Health check endpoint handler.
//!
//! Reports overall status plus each backend client's reachability, per
//! spec §6's note on `GET /api/v1/health`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::models::HealthResponse;
use crate::api::routes::AppState;

/// `GET /api/v1/health`. The database check runs a real query; the graph
/// check is a cheap existence probe since `GraphClient` has no dedicated
/// health method; vector and LLM clients expose `is_healthy()` directly.
pub async fn health(State(app_state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database_ok = sqlx::query("SELECT 1").execute(&app_state.pool).await.is_ok();
    let graph_ok = app_state.graph.all_concepts().await.is_ok();
    let vector_ok = app_state.vector.is_healthy().await;
    let llm_ok = app_state.llm.is_healthy().await;

    let health = HealthResponse::new(database_ok, graph_ok, vector_ok, llm_ok);
    let status = if health.status == "ok" { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(health))
}
