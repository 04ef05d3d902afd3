//! Cache-first concept lookup (C8): replay a recent answer or fall through
//! to the full pipeline with a synthesized question.

use chrono::{Duration as ChronoDuration, Utc};

use crate::db::connection::DatabasePool;
use crate::db::models::query::Query;
use crate::db::repositories::analytics_repo::AnalyticsRepository;
use crate::pipeline::{Pipeline, QueryOutcome, QueryRequest, QuerySource};
use crate::Result;

/// Spec §4.8 default; overridable via [`AppConfig`](crate::config::AppConfig).
pub const DEFAULT_FRESHNESS_WINDOW_DAYS: i64 = 7;

pub struct SmartQueryLayer {
    pool: DatabasePool,
    freshness_window: ChronoDuration,
}

impl SmartQueryLayer {
    pub fn new(pool: DatabasePool, freshness_window_days: i64) -> Self {
        Self { pool, freshness_window: ChronoDuration::days(freshness_window_days) }
    }

    /// `smart_concept(concept_name, user_id?)` from spec §4.8. The cache key
    /// is lowercase-trimmed; matching is exact membership, not substring.
    pub async fn smart_concept(
        &self,
        pipeline: &Pipeline,
        concept_name: &str,
        user_id: Option<uuid::Uuid>,
    ) -> Result<QueryOutcome> {
        let key = concept_name.trim().to_lowercase();

        if let Some(cached) = AnalyticsRepository::find_by_concept_name(&self.pool, &key).await? {
            if cached.is_fresh(Utc::now(), self.freshness_window) {
                pipeline.fetch_resources_in_background(key.clone());
                return Ok(QueryOutcome { query: cached, source: QuerySource::Cache, degraded: false });
            }
        }

        let synthesized = format!("Explain {concept_name} in detail with prerequisites and examples");
        let mut outcome = pipeline.process_query(QueryRequest { text: synthesized, user_id }).await?;
        outcome.source = QuerySource::Processed;
        Ok(outcome)
    }
}
