//! API route definitions.
//!
//! Wires the 9 HTTP endpoints from spec §6 onto the pipeline, smart-query
//! cache, and staging workflow.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use graph_client::GraphClient;
use llm_client::CompletionClient;
use vector_client::VectorClient;

use crate::api::{handlers, middleware};
use crate::db::connection::DatabasePool;
use crate::pipeline::Pipeline;
use crate::smart_query::SmartQueryLayer;
use crate::staging::StagingWorkflow;

/// Shared application state, cloned into each request.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub smart_query: Arc<SmartQueryLayer>,
    pub staging: StagingWorkflow,
    pub graph: Arc<dyn GraphClient>,
    pub vector: Arc<dyn VectorClient>,
    pub llm: Arc<dyn CompletionClient>,
    pub pool: DatabasePool,
}

/// Build the complete API router.
pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(handlers::health))
        .route("/api/v1/query", post(handlers::query))
        .route("/api/v1/query/stream", post(handlers::query_stream))
        .route("/api/v1/concept-query", post(handlers::concept_query))
        .route("/api/v1/concept-detail", post(handlers::concept_detail))
        .route("/api/v1/concepts", get(handlers::list_concepts))
        .route("/api/v1/admin/staged-concepts/pending", get(handlers::pending_staged_concepts))
        .route("/api/v1/admin/staged-concepts/stats", get(handlers::staged_concept_stats))
        .route("/api/v1/admin/staged-concepts/:id/review", post(handlers::review_staged_concept))
        .layer(middleware::logging_layer())
        .layer(middleware::cors_layer())
        .with_state(app_state)
}
