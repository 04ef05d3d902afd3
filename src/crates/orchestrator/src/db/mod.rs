//! Analytics and staging persistence.
//!
//! Both stores are backed by SQLite through the same pooled connection;
//! they differ only in schema and query shape (append-only log vs. a
//! reviewer queue with status transitions).

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;

pub use connection::{DatabaseConnection, DatabasePool};
pub use error::{DatabaseError, DbResult};
pub use models::{ProcessingStep, Query, QueryResponse, StagedConcept, StagedStatus};
pub use repositories::{AnalyticsRepository, AnalyticsStats, DailyTrend, StagingRepository, StagingStats};
