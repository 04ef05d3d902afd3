//! Reviewer queue for LLM-extracted concepts the graph does not yet know
//! about (C5).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::connection::DatabasePool;
use crate::db::error::{DatabaseError, DbResult};
use crate::db::models::staged_concept::{StagedConcept, StagedStatus};

#[derive(Debug, FromRow)]
struct StagedConceptRow {
    id: String,
    concept_name: String,
    description: String,
    source_query_id: String,
    source_query_text: String,
    identified_at: String,
    suggested_prerequisites: String,
    suggested_difficulty: Option<i64>,
    suggested_category: Option<String>,
    llm_reasoning: String,
    status: String,
    submitted_by: Option<String>,
    occurrence_count: i64,
    related_query_ids: String,
    reviewer_id: Option<String>,
    review_notes: Option<String>,
    merged_into_concept_id: Option<String>,
}

impl StagedConceptRow {
    fn from_model(sc: &StagedConcept) -> DbResult<Self> {
        Ok(Self {
            id: sc.id.to_string(),
            concept_name: sc.concept_name.clone(),
            description: sc.description.clone(),
            source_query_id: sc.source_query_id.to_string(),
            source_query_text: sc.source_query_text.clone(),
            identified_at: sc.identified_at.to_rfc3339(),
            suggested_prerequisites: serde_json::to_string(&sc.suggested_prerequisites)
                .map_err(|e| DatabaseError::type_error(e.to_string()))?,
            suggested_difficulty: sc.suggested_difficulty.map(|d| d as i64),
            suggested_category: sc.suggested_category.clone(),
            llm_reasoning: sc.llm_reasoning.clone(),
            status: sc.status.as_str().to_string(),
            submitted_by: sc.submitted_by.clone(),
            occurrence_count: sc.occurrence_count as i64,
            related_query_ids: serde_json::to_string(
                &sc.related_query_ids.iter().map(|u| u.to_string()).collect::<Vec<_>>(),
            )
            .map_err(|e| DatabaseError::type_error(e.to_string()))?,
            reviewer_id: sc.reviewer_id.clone(),
            review_notes: sc.review_notes.clone(),
            merged_into_concept_id: sc.merged_into_concept_id.clone(),
        })
    }

    fn into_model(self) -> DbResult<StagedConcept> {
        let related_query_ids: Vec<String> = serde_json::from_str(&self.related_query_ids)
            .map_err(|e| DatabaseError::type_error(e.to_string()))?;

        Ok(StagedConcept {
            id: Uuid::parse_str(&self.id).map_err(|e| DatabaseError::type_error(e.to_string()))?,
            concept_name: self.concept_name,
            description: self.description,
            source_query_id: Uuid::parse_str(&self.source_query_id)
                .map_err(|e| DatabaseError::type_error(e.to_string()))?,
            source_query_text: self.source_query_text,
            identified_at: DateTime::parse_from_rfc3339(&self.identified_at)
                .map_err(|e| DatabaseError::type_error(e.to_string()))?
                .with_timezone(&Utc),
            suggested_prerequisites: serde_json::from_str(&self.suggested_prerequisites)
                .map_err(|e| DatabaseError::type_error(e.to_string()))?,
            suggested_difficulty: self.suggested_difficulty.map(|d| d as u8),
            suggested_category: self.suggested_category,
            llm_reasoning: self.llm_reasoning,
            status: StagedStatus::parse(&self.status)
                .ok_or_else(|| DatabaseError::type_error(format!("unknown status {}", self.status)))?,
            submitted_by: self.submitted_by,
            occurrence_count: self.occurrence_count as u32,
            related_query_ids: related_query_ids
                .into_iter()
                .map(|s| Uuid::parse_str(&s))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| DatabaseError::type_error(e.to_string()))?,
            reviewer_id: self.reviewer_id,
            review_notes: self.review_notes,
            merged_into_concept_id: self.merged_into_concept_id,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StagingStats {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub merged: i64,
    /// Most recently identified concept still awaiting review (spec §4.5).
    pub most_recent_pending: Option<StagedConcept>,
}

pub struct StagingRepository;

impl StagingRepository {
    const COLUMNS: &'static str = "id, concept_name, description, source_query_id, \
        source_query_text, identified_at, suggested_prerequisites, suggested_difficulty, \
        suggested_category, llm_reasoning, status, submitted_by, occurrence_count, \
        related_query_ids, reviewer_id, review_notes, merged_into_concept_id";

    pub async fn save(pool: &DatabasePool, sc: &StagedConcept) -> DbResult<()> {
        let row = StagedConceptRow::from_model(sc)?;
        sqlx::query(
            "INSERT INTO staged_concepts (id, concept_name, description, source_query_id, \
             source_query_text, identified_at, suggested_prerequisites, suggested_difficulty, \
             suggested_category, llm_reasoning, status, submitted_by, occurrence_count, \
             related_query_ids, reviewer_id, review_notes, merged_into_concept_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
             status = excluded.status, occurrence_count = excluded.occurrence_count, \
             related_query_ids = excluded.related_query_ids, reviewer_id = excluded.reviewer_id, \
             review_notes = excluded.review_notes, merged_into_concept_id = excluded.merged_into_concept_id",
        )
        .bind(&row.id)
        .bind(&row.concept_name)
        .bind(&row.description)
        .bind(&row.source_query_id)
        .bind(&row.source_query_text)
        .bind(&row.identified_at)
        .bind(&row.suggested_prerequisites)
        .bind(row.suggested_difficulty)
        .bind(&row.suggested_category)
        .bind(&row.llm_reasoning)
        .bind(&row.status)
        .bind(&row.submitted_by)
        .bind(row.occurrence_count)
        .bind(&row.related_query_ids)
        .bind(&row.reviewer_id)
        .bind(&row.review_notes)
        .bind(&row.merged_into_concept_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_name(pool: &DatabasePool, name: &str) -> DbResult<Option<StagedConcept>> {
        let row: Option<StagedConceptRow> = sqlx::query_as(&format!(
            "SELECT {} FROM staged_concepts WHERE LOWER(concept_name) = LOWER(?)",
            Self::COLUMNS
        ))
        .bind(name)
        .fetch_optional(pool)
        .await?;

        row.map(|r| r.into_model()).transpose()
    }

    pub async fn get_by_id(pool: &DatabasePool, id: Uuid) -> DbResult<Option<StagedConcept>> {
        let row: Option<StagedConceptRow> =
            sqlx::query_as(&format!("SELECT {} FROM staged_concepts WHERE id = ?", Self::COLUMNS))
                .bind(id.to_string())
                .fetch_optional(pool)
                .await?;

        row.map(|r| r.into_model()).transpose()
    }

    /// Pending queue ordered by `occurrence_count desc, identified_at desc`.
    pub async fn get_pending(pool: &DatabasePool, limit: i64, offset: i64) -> DbResult<Vec<StagedConcept>> {
        let rows: Vec<StagedConceptRow> = sqlx::query_as(&format!(
            "SELECT {} FROM staged_concepts WHERE status = 'pending' \
             ORDER BY occurrence_count DESC, identified_at DESC LIMIT ? OFFSET ?",
            Self::COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(|r| r.into_model()).collect()
    }

    pub async fn get_by_status(pool: &DatabasePool, status: StagedStatus) -> DbResult<Vec<StagedConcept>> {
        let rows: Vec<StagedConceptRow> = sqlx::query_as(&format!(
            "SELECT {} FROM staged_concepts WHERE status = ? ORDER BY identified_at DESC",
            Self::COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(|r| r.into_model()).collect()
    }

    pub async fn stats(pool: &DatabasePool) -> DbResult<StagingStats> {
        let count = |status: &'static str| {
            sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM staged_concepts WHERE status = ?")
                .bind(status)
        };

        let pending: (i64,) = count("pending").fetch_one(pool).await?;
        let approved: (i64,) = count("approved").fetch_one(pool).await?;
        let rejected: (i64,) = count("rejected").fetch_one(pool).await?;
        let merged: (i64,) = count("merged").fetch_one(pool).await?;

        let most_recent_row: Option<StagedConceptRow> = sqlx::query_as(&format!(
            "SELECT {} FROM staged_concepts WHERE status = 'pending' ORDER BY identified_at DESC LIMIT 1",
            Self::COLUMNS
        ))
        .fetch_optional(pool)
        .await?;
        let most_recent_pending = most_recent_row.map(|r| r.into_model()).transpose()?;

        Ok(StagingStats {
            pending: pending.0,
            approved: approved.0,
            rejected: rejected.0,
            merged: merged.0,
            most_recent_pending,
        })
    }

    pub async fn delete(pool: &DatabasePool, id: Uuid) -> DbResult<()> {
        sqlx::query("DELETE FROM staged_concepts WHERE id = ?")
            .bind(id.to_string())
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> DatabasePool {
        let pool = DatabasePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE staged_concepts (
                id TEXT PRIMARY KEY NOT NULL,
                concept_name TEXT NOT NULL,
                description TEXT NOT NULL,
                source_query_id TEXT NOT NULL,
                source_query_text TEXT NOT NULL,
                identified_at TEXT NOT NULL,
                suggested_prerequisites TEXT NOT NULL,
                suggested_difficulty INTEGER,
                suggested_category TEXT,
                llm_reasoning TEXT NOT NULL,
                status TEXT NOT NULL,
                submitted_by TEXT,
                occurrence_count INTEGER NOT NULL,
                related_query_ids TEXT NOT NULL,
                reviewer_id TEXT,
                review_notes TEXT,
                merged_into_concept_id TEXT
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn sample() -> StagedConcept {
        let analysis = llm_client::NewConceptAnalysis {
            description: "desc".to_string(),
            suggested_prereqs: vec!["vectors".to_string()],
            suggested_difficulty: 7,
            suggested_category: "geometry".to_string(),
            reasoning: "not in graph".to_string(),
            is_likely_new_concept: true,
        };
        StagedConcept::new("tensor field", Uuid::new_v4(), "what is a tensor field?", &analysis)
    }

    #[tokio::test]
    async fn save_and_find_by_name_case_insensitive() {
        let pool = setup_db().await;
        let sc = sample();
        StagingRepository::save(&pool, &sc).await.unwrap();

        let found = StagingRepository::find_by_name(&pool, "Tensor Field").await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().id, sc.id);
    }

    #[tokio::test]
    async fn dedup_via_record_sighting_then_resave() {
        let pool = setup_db().await;
        let mut sc = sample();
        StagingRepository::save(&pool, &sc).await.unwrap();

        for _ in 0..4 {
            sc.record_sighting(Uuid::new_v4());
            StagingRepository::save(&pool, &sc).await.unwrap();
        }

        let stored = StagingRepository::find_by_name(&pool, "tensor field").await.unwrap().unwrap();
        assert_eq!(stored.occurrence_count, 5);
    }

    #[tokio::test]
    async fn pending_queue_orders_by_occurrence_then_recency() {
        let pool = setup_db().await;
        let mut low = sample();
        low.concept_name = "low".to_string();
        let mut high = sample();
        high.concept_name = "high".to_string();
        high.occurrence_count = 10;

        StagingRepository::save(&pool, &low).await.unwrap();
        StagingRepository::save(&pool, &high).await.unwrap();

        let pending = StagingRepository::get_pending(&pool, 10, 0).await.unwrap();
        assert_eq!(pending[0].concept_name, "high");
    }

    #[tokio::test]
    async fn stats_counts_by_status() {
        let pool = setup_db().await;
        let mut approved = sample();
        approved.approve("reviewer", None);
        StagingRepository::save(&pool, &approved).await.unwrap();
        StagingRepository::save(&pool, &sample()).await.unwrap();

        let stats = StagingRepository::stats(&pool).await.unwrap();
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.pending, 1);
    }

    #[tokio::test]
    async fn stats_reports_most_recently_identified_pending_concept() {
        let pool = setup_db().await;

        let mut older = sample();
        older.concept_name = "older".to_string();
        older.identified_at = DateTime::parse_from_rfc3339("2026-07-01T00:00:00+00:00").unwrap().with_timezone(&Utc);
        StagingRepository::save(&pool, &older).await.unwrap();

        let mut newer = sample();
        newer.concept_name = "newer".to_string();
        newer.identified_at = DateTime::parse_from_rfc3339("2026-07-15T00:00:00+00:00").unwrap().with_timezone(&Utc);
        StagingRepository::save(&pool, &newer).await.unwrap();

        let mut approved = sample();
        approved.concept_name = "approved-later".to_string();
        approved.identified_at = DateTime::parse_from_rfc3339("2026-07-20T00:00:00+00:00").unwrap().with_timezone(&Utc);
        approved.approve("reviewer", None);
        StagingRepository::save(&pool, &approved).await.unwrap();

        let stats = StagingRepository::stats(&pool).await.unwrap();
        let most_recent = stats.most_recent_pending.expect("a pending concept exists");
        assert_eq!(most_recent.concept_name, "newer");
    }

    #[tokio::test]
    async fn stats_most_recent_pending_is_none_with_empty_queue() {
        let pool = setup_db().await;
        let stats = StagingRepository::stats(&pool).await.unwrap();
        assert!(stats.most_recent_pending.is_none());
    }
}
