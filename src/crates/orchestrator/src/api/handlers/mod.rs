//! HTTP handler functions, one module per resource.

pub mod admin;
pub mod concept;
pub mod health;
pub mod query;

pub use admin::{pending_staged_concepts, review_staged_concept, staged_concept_stats};
pub use concept::{concept_detail, concept_query, list_concepts};
pub use health::health;
pub use query::{query, query_stream};
