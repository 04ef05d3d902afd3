//! REST API layer for the orchestrator.
//!
//! Exposes the pipeline, the smart-query cache, and the staging review
//! queue over HTTP, plus an SSE endpoint for streaming pipeline runs.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;

pub use error::{ApiError, ApiErrorResponse, ApiResult};
pub use middleware::cors_layer;
pub use routes::{create_router, AppState};

/// Re-export commonly used items.
pub mod prelude {
    pub use crate::api::error::{ApiError, ApiResult};
    pub use crate::api::models::*;
}
