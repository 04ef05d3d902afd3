//! Append-only store of completed queries (C4).
//!
//! Timestamps and the nested list/struct fields of [`Query`] have no native
//! SQLite representation, so the row shape stores them as JSON text columns
//! and the repository converts to/from the domain type at the boundary.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::connection::DatabasePool;
use crate::db::error::{DatabaseError, DbResult};
use crate::db::models::query::{ProcessingStep, Query, QueryResponse};

#[derive(Debug, FromRow)]
struct QueryRow {
    id: String,
    user_id: Option<String>,
    text: String,
    timestamp: String,
    identified_concepts: String,
    prerequisite_path: String,
    explanation: String,
    retrieved_context: String,
    llm_provider: String,
    llm_model: String,
    processing_steps: String,
    success: i64,
    error: Option<String>,
}

impl QueryRow {
    fn from_query(q: &Query) -> DbResult<Self> {
        Ok(Self {
            id: q.id.to_string(),
            user_id: q.user_id.map(|u| u.to_string()),
            text: q.text.clone(),
            timestamp: q.timestamp.to_rfc3339(),
            identified_concepts: serde_json::to_string(&q.identified_concepts)
                .map_err(|e| DatabaseError::type_error(e.to_string()))?,
            prerequisite_path: serde_json::to_string(&q.prerequisite_path)
                .map_err(|e| DatabaseError::type_error(e.to_string()))?,
            explanation: q.response.explanation.clone(),
            retrieved_context: serde_json::to_string(&q.response.retrieved_context)
                .map_err(|e| DatabaseError::type_error(e.to_string()))?,
            llm_provider: q.response.llm_provider.clone(),
            llm_model: q.response.llm_model.clone(),
            processing_steps: serde_json::to_string(&q.processing_steps)
                .map_err(|e| DatabaseError::type_error(e.to_string()))?,
            success: q.success as i64,
            error: q.error.clone(),
        })
    }

    fn into_query(self) -> DbResult<Query> {
        Ok(Query {
            id: Uuid::parse_str(&self.id).map_err(|e| DatabaseError::type_error(e.to_string()))?,
            user_id: self
                .user_id
                .map(|u| Uuid::parse_str(&u))
                .transpose()
                .map_err(|e| DatabaseError::type_error(e.to_string()))?,
            text: self.text,
            timestamp: DateTime::parse_from_rfc3339(&self.timestamp)
                .map_err(|e| DatabaseError::type_error(e.to_string()))?
                .with_timezone(&Utc),
            identified_concepts: serde_json::from_str(&self.identified_concepts)
                .map_err(|e| DatabaseError::type_error(e.to_string()))?,
            prerequisite_path: serde_json::from_str(&self.prerequisite_path)
                .map_err(|e| DatabaseError::type_error(e.to_string()))?,
            response: QueryResponse {
                explanation: self.explanation,
                retrieved_context: serde_json::from_str(&self.retrieved_context)
                    .map_err(|e| DatabaseError::type_error(e.to_string()))?,
                llm_provider: self.llm_provider,
                llm_model: self.llm_model,
            },
            processing_steps: serde_json::from_str::<Vec<ProcessingStep>>(&self.processing_steps)
                .map_err(|e| DatabaseError::type_error(e.to_string()))?,
            success: self.success != 0,
            error: self.error,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AnalyticsStats {
    pub total: i64,
    pub success_count: i64,
    pub success_rate: f64,
    pub avg_response_time_ms: Option<f64>,
}

/// Query volume and success rate for a single calendar day (spec §4.4's
/// "daily trends" aggregation), keyed by the UTC date prefix of `timestamp`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DailyTrend {
    pub date: String,
    pub total: i64,
    pub success_count: i64,
}

pub struct AnalyticsRepository;

impl AnalyticsRepository {
    const COLUMNS: &'static str = "id, user_id, text, timestamp, identified_concepts, \
        prerequisite_path, explanation, retrieved_context, llm_provider, llm_model, \
        processing_steps, success, error";

    /// Write-behind save from the pipeline; never on the request's
    /// critical path (spec §4.4).
    pub async fn save(pool: &DatabasePool, query: &Query) -> DbResult<()> {
        let row = QueryRow::from_query(query)?;
        sqlx::query(
            "INSERT INTO queries (id, user_id, text, timestamp, identified_concepts, \
             prerequisite_path, explanation, retrieved_context, llm_provider, llm_model, \
             processing_steps, success, error) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.user_id)
        .bind(&row.text)
        .bind(&row.timestamp)
        .bind(&row.identified_concepts)
        .bind(&row.prerequisite_path)
        .bind(&row.explanation)
        .bind(&row.retrieved_context)
        .bind(&row.llm_provider)
        .bind(&row.llm_model)
        .bind(&row.processing_steps)
        .bind(row.success)
        .bind(&row.error)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Most recent successful query whose `identified_concepts` contains
    /// `name` (case-insensitive, exact membership — spec §4.8).
    pub async fn find_by_concept_name(pool: &DatabasePool, name: &str) -> DbResult<Option<Query>> {
        let needle = name.to_lowercase();
        let rows: Vec<QueryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM queries WHERE success = 1 ORDER BY timestamp DESC",
            Self::COLUMNS
        ))
        .fetch_all(pool)
        .await?;

        for row in rows {
            let query = row.into_query()?;
            if query.identified_concepts.iter().any(|c| c.to_lowercase() == needle) {
                return Ok(Some(query));
            }
        }
        Ok(None)
    }

    pub async fn stats(pool: &DatabasePool) -> DbResult<AnalyticsStats> {
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM queries").fetch_one(pool).await?;
        let success: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM queries WHERE success = 1")
            .fetch_one(pool)
            .await?;

        let success_rate = if total.0 > 0 { success.0 as f64 / total.0 as f64 } else { 0.0 };
        let avg_response_time_ms = Self::avg_response_time_ms(pool).await?;

        Ok(AnalyticsStats { total: total.0, success_count: success.0, success_rate, avg_response_time_ms })
    }

    /// Mean of each query's total processing time (sum of its
    /// `processing_steps` durations), across every persisted query.
    async fn avg_response_time_ms(pool: &DatabasePool) -> DbResult<Option<f64>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT processing_steps FROM queries").fetch_all(pool).await?;

        let mut total_ms: u64 = 0;
        let mut counted: u64 = 0;
        for (raw,) in rows {
            let steps: Vec<ProcessingStep> = match serde_json::from_str(&raw) {
                Ok(steps) => steps,
                Err(_) => continue,
            };
            total_ms += steps.iter().map(|s| s.duration_ms).sum::<u64>();
            counted += 1;
        }

        Ok((counted > 0).then(|| total_ms as f64 / counted as f64))
    }

    /// Per-day query volume and success counts, most recent `days` days
    /// present in the data (spec §4.4).
    pub async fn daily_trends(pool: &DatabasePool, days: i64) -> DbResult<Vec<DailyTrend>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT timestamp, success FROM queries ORDER BY timestamp ASC").fetch_all(pool).await?;

        let mut by_day: std::collections::BTreeMap<String, (i64, i64)> = std::collections::BTreeMap::new();
        for (timestamp, success) in rows {
            let date = timestamp.get(0..10).unwrap_or(&timestamp).to_string();
            let entry = by_day.entry(date).or_insert((0, 0));
            entry.0 += 1;
            if success != 0 {
                entry.1 += 1;
            }
        }

        let mut trends: Vec<DailyTrend> =
            by_day.into_iter().map(|(date, (total, success_count))| DailyTrend { date, total, success_count }).collect();

        if days > 0 && trends.len() as i64 > days {
            let skip = trends.len() - days as usize;
            trends = trends.split_off(skip);
        }

        Ok(trends)
    }

    pub async fn popular_concepts(pool: &DatabasePool, limit: i64) -> DbResult<Vec<(String, i64)>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT identified_concepts FROM queries WHERE success = 1")
            .fetch_all(pool)
            .await?;

        let mut counts: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
        for (raw,) in rows {
            let concepts: Vec<String> = serde_json::from_str(&raw).unwrap_or_default();
            for c in concepts {
                *counts.entry(c.to_lowercase()).or_insert(0) += 1;
            }
        }

        let mut popular: Vec<(String, i64)> = counts.into_iter().collect();
        popular.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        popular.truncate(limit.max(0) as usize);
        Ok(popular)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::query::ProcessingStep;

    async fn setup_db() -> DatabasePool {
        let pool = DatabasePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE queries (
                id TEXT PRIMARY KEY NOT NULL,
                user_id TEXT,
                text TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                identified_concepts TEXT NOT NULL,
                prerequisite_path TEXT NOT NULL,
                explanation TEXT NOT NULL,
                retrieved_context TEXT NOT NULL,
                llm_provider TEXT NOT NULL,
                llm_model TEXT NOT NULL,
                processing_steps TEXT NOT NULL,
                success INTEGER NOT NULL,
                error TEXT
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn sample_query(concepts: Vec<&str>) -> Query {
        let mut q = Query::new("what is a derivative?", None);
        q.identified_concepts = concepts.into_iter().map(String::from).collect();
        q.response.explanation = "A derivative measures instantaneous rate of change.".to_string();
        q.response.llm_provider = "anthropic".to_string();
        q.response.llm_model = "claude-3-5-sonnet".to_string();
        q.processing_steps.push(ProcessingStep::ok("extract_concepts", 120));
        q.success = true;
        q
    }

    #[tokio::test]
    async fn save_and_find_by_concept_name() {
        let pool = setup_db().await;
        let query = sample_query(vec!["derivatives", "power rule"]);
        AnalyticsRepository::save(&pool, &query).await.unwrap();

        let found = AnalyticsRepository::find_by_concept_name(&pool, "Derivatives").await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().id, query.id);

        let missing = AnalyticsRepository::find_by_concept_name(&pool, "integrals").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn find_by_concept_name_ignores_failed_queries() {
        let pool = setup_db().await;
        let mut query = sample_query(vec!["limits"]);
        query.success = false;
        AnalyticsRepository::save(&pool, &query).await.unwrap();

        let found = AnalyticsRepository::find_by_concept_name(&pool, "limits").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn stats_computes_success_rate() {
        let pool = setup_db().await;
        AnalyticsRepository::save(&pool, &sample_query(vec!["a"])).await.unwrap();
        let mut failed = sample_query(vec!["b"]);
        failed.success = false;
        AnalyticsRepository::save(&pool, &failed).await.unwrap();

        let stats = AnalyticsRepository::stats(&pool).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.success_count, 1);
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn stats_averages_response_time_across_processing_steps() {
        let pool = setup_db().await;

        let mut q1 = sample_query(vec!["a"]);
        q1.processing_steps = vec![ProcessingStep::ok("extract_concepts", 100), ProcessingStep::ok("generate_explanation", 300)];
        AnalyticsRepository::save(&pool, &q1).await.unwrap();

        let mut q2 = sample_query(vec!["b"]);
        q2.processing_steps = vec![ProcessingStep::ok("extract_concepts", 200)];
        AnalyticsRepository::save(&pool, &q2).await.unwrap();

        let stats = AnalyticsRepository::stats(&pool).await.unwrap();
        // q1 totals 400ms, q2 totals 200ms; mean of the two queries is 300ms.
        assert_eq!(stats.avg_response_time_ms, Some(300.0));
    }

    #[tokio::test]
    async fn stats_avg_response_time_is_none_with_no_queries() {
        let pool = setup_db().await;
        let stats = AnalyticsRepository::stats(&pool).await.unwrap();
        assert_eq!(stats.avg_response_time_ms, None);
    }

    #[tokio::test]
    async fn daily_trends_groups_by_calendar_day() {
        let pool = setup_db().await;

        let mut day1_a = sample_query(vec!["a"]);
        day1_a.timestamp = DateTime::parse_from_rfc3339("2026-07-30T08:00:00+00:00").unwrap().with_timezone(&Utc);
        AnalyticsRepository::save(&pool, &day1_a).await.unwrap();

        let mut day1_b = sample_query(vec!["b"]);
        day1_b.timestamp = DateTime::parse_from_rfc3339("2026-07-30T20:00:00+00:00").unwrap().with_timezone(&Utc);
        day1_b.success = false;
        AnalyticsRepository::save(&pool, &day1_b).await.unwrap();

        let mut day2 = sample_query(vec!["c"]);
        day2.timestamp = DateTime::parse_from_rfc3339("2026-07-31T09:00:00+00:00").unwrap().with_timezone(&Utc);
        AnalyticsRepository::save(&pool, &day2).await.unwrap();

        let trends = AnalyticsRepository::daily_trends(&pool, 30).await.unwrap();
        assert_eq!(trends.len(), 2);
        assert_eq!(trends[0], DailyTrend { date: "2026-07-30".to_string(), total: 2, success_count: 1 });
        assert_eq!(trends[1], DailyTrend { date: "2026-07-31".to_string(), total: 1, success_count: 1 });
    }

    #[tokio::test]
    async fn daily_trends_caps_to_most_recent_days() {
        let pool = setup_db().await;
        for day in 1..=5 {
            let mut q = sample_query(vec!["a"]);
            q.timestamp = DateTime::parse_from_rfc3339(&format!("2026-07-{:02}T00:00:00+00:00", day)).unwrap().with_timezone(&Utc);
            AnalyticsRepository::save(&pool, &q).await.unwrap();
        }

        let trends = AnalyticsRepository::daily_trends(&pool, 2).await.unwrap();
        assert_eq!(trends.len(), 2);
        assert_eq!(trends[0].date, "2026-07-04");
        assert_eq!(trends[1].date, "2026-07-05");
    }

    #[tokio::test]
    async fn popular_concepts_counts_across_queries() {
        let pool = setup_db().await;
        AnalyticsRepository::save(&pool, &sample_query(vec!["derivatives"])).await.unwrap();
        AnalyticsRepository::save(&pool, &sample_query(vec!["derivatives", "limits"])).await.unwrap();

        let popular = AnalyticsRepository::popular_concepts(&pool, 10).await.unwrap();
        assert_eq!(popular[0], ("derivatives".to_string(), 2));
    }
}
