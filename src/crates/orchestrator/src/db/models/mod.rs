//! Persisted data model: completed queries (analytics) and staged concepts.
//!
//! All timestamp fields are stored as RFC3339 text (sqlx's SQLite backend
//! has no native datetime type) and exposed as `chrono::DateTime<Utc>`.

pub mod query;
pub mod staged_concept;

pub use query::{ProcessingStep, Query, QueryResponse};
pub use staged_concept::{StagedConcept, StagedStatus};
