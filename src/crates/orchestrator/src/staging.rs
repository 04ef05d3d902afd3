//! Staging workflow for concepts the graph does not yet know (C9).

use std::sync::Arc;

use graph_client::{GraphClient, NewConcept};
use llm_client::CompletionClient;
use uuid::Uuid;

use crate::db::connection::DatabasePool;
use crate::db::models::query::Query;
use crate::db::models::staged_concept::StagedConcept;
use crate::db::repositories::staging_repo::StagingRepository;
use crate::{OrchestratorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Approve,
    Reject,
    Merge,
}

#[derive(Clone)]
pub struct StagingWorkflow {
    graph: Arc<dyn GraphClient>,
    llm: Arc<dyn CompletionClient>,
    pool: DatabasePool,
}

impl StagingWorkflow {
    pub fn new(graph: Arc<dyn GraphClient>, llm: Arc<dyn CompletionClient>, pool: DatabasePool) -> Self {
        Self { graph, llm, pool }
    }

    /// Called once extraction completes (spec §4.9). Never fatal to the
    /// owning pipeline run: a staging failure for one concept is logged and
    /// skipped rather than aborting the rest.
    pub async fn stage_unknown_concepts(&self, query: &Query) {
        for name in &query.identified_concepts {
            if let Err(e) = self.stage_one(name, query).await {
                tracing::warn!(concept = name, error = ?e, "failed to stage concept");
            }
        }
    }

    async fn stage_one(&self, name: &str, query: &Query) -> Result<()> {
        if self.graph.exists_by_name(name).await.unwrap_or(false) {
            return Ok(());
        }

        match StagingRepository::find_by_name(&self.pool, name).await? {
            Some(mut existing) if !existing.status.is_terminal() => {
                existing.record_sighting(query.id);
                StagingRepository::save(&self.pool, &existing).await?;
            }
            Some(_) => {
                // A terminal record (rejected/merged) already speaks for this
                // name; do not resurrect it on re-sighting.
            }
            None => {
                let analysis = self.llm.analyze_new_concept(name, &query.text).await?;
                let staged = StagedConcept::new(name.to_string(), query.id, query.text.clone(), &analysis);
                StagingRepository::save(&self.pool, &staged).await?;
            }
        }

        Ok(())
    }

    /// Apply a reviewer verdict. Idempotent once the record is terminal
    /// (spec P5): a second call returns the unchanged record rather than
    /// re-running graph writes.
    pub async fn review(
        &self,
        id: Uuid,
        action: ReviewAction,
        reviewer_id: String,
        notes: Option<String>,
        existing_concept_id: Option<String>,
    ) -> Result<StagedConcept> {
        let mut staged = StagingRepository::get_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("staged concept {id}")))?;

        if staged.status.is_terminal() {
            return Ok(staged);
        }

        match action {
            ReviewAction::Approve => {
                // Graph first, status update second: a crash in between is
                // recovered by re-running approve, since C1 writes merge on id.
                let concept = self
                    .graph
                    .create_concept(NewConcept {
                        name: staged.concept_name.clone(),
                        description: staged.description.clone(),
                        difficulty: staged.suggested_difficulty,
                        category: staged.suggested_category.clone(),
                    })
                    .await?;

                for prereq_name in &staged.suggested_prerequisites {
                    let ids = self.graph.resolve_ids(std::slice::from_ref(prereq_name)).await?;
                    if let Some(prereq_id) = ids.into_iter().next() {
                        self.graph.create_prerequisite(&concept.id, &prereq_id).await?;
                    }
                }

                staged.approve(reviewer_id, notes);
            }
            ReviewAction::Reject => staged.reject(reviewer_id, notes),
            ReviewAction::Merge => {
                let target = existing_concept_id
                    .ok_or_else(|| OrchestratorError::ValidationError("merge requires existing_concept_id".into()))?;
                staged.merge(reviewer_id, target, notes);
            }
        }

        StagingRepository::save(&self.pool, &staged).await?;
        Ok(staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use graph_client::{Concept, ConceptDetail};
    use llm_client::NewConceptAnalysis;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct FakeGraph {
        known: HashSet<String>,
    }

    #[async_trait]
    impl GraphClient for FakeGraph {
        async fn resolve_ids(&self, names: &[String]) -> graph_client::Result<Vec<String>> {
            Ok(names.iter().filter(|n| self.known.contains(n.as_str())).cloned().collect())
        }
        async fn prerequisite_path(&self, _target_ids: &[String]) -> graph_client::Result<Vec<Concept>> {
            Ok(vec![])
        }
        async fn concept_detail(&self, _id_or_name: &str) -> graph_client::Result<ConceptDetail> {
            Err(graph_client::GraphClientError::NotFound("n/a".into()))
        }
        async fn all_concepts(&self) -> graph_client::Result<Vec<Concept>> {
            Ok(vec![])
        }
        async fn create_concept(&self, concept: NewConcept) -> graph_client::Result<Concept> {
            Ok(Concept {
                id: Concept::slug(&concept.name),
                name: concept.name,
                description: concept.description,
                concept_type: None,
                difficulty: concept.difficulty,
                category: concept.category,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
        }
        async fn create_prerequisite(&self, _concept_id: &str, _prereq_id: &str) -> graph_client::Result<()> {
            Ok(())
        }
        async fn exists_by_name(&self, name: &str) -> graph_client::Result<bool> {
            Ok(self.known.contains(&name.to_lowercase()))
        }
    }

    struct FakeLlm {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl CompletionClient for FakeLlm {
        async fn identify_concepts(&self, _text: &str) -> llm_client::Result<Vec<String>> {
            Ok(vec![])
        }
        async fn generate_explanation(&self, _q: &str, _p: &[Concept], _c: &[String]) -> llm_client::Result<String> {
            Ok(String::new())
        }
        async fn analyze_new_concept(&self, name: &str, _ctx: &str) -> llm_client::Result<NewConceptAnalysis> {
            *self.calls.lock().unwrap() += 1;
            Ok(NewConceptAnalysis {
                description: format!("auto-description for {name}"),
                suggested_prereqs: vec![],
                suggested_difficulty: 5,
                suggested_category: "algebra".into(),
                reasoning: "looks new".into(),
                is_likely_new_concept: true,
            })
        }
        fn provider(&self) -> &str {
            "fake"
        }
        fn model(&self) -> &str {
            "fake-model"
        }
        async fn is_healthy(&self) -> bool {
            true
        }
    }

    async fn setup_pool() -> DatabasePool {
        let pool = DatabasePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE staged_concepts (
                id TEXT PRIMARY KEY NOT NULL, concept_name TEXT NOT NULL, description TEXT NOT NULL,
                source_query_id TEXT NOT NULL, source_query_text TEXT NOT NULL, identified_at TEXT NOT NULL,
                suggested_prerequisites TEXT NOT NULL, suggested_difficulty INTEGER, suggested_category TEXT,
                llm_reasoning TEXT NOT NULL, status TEXT NOT NULL, submitted_by TEXT,
                occurrence_count INTEGER NOT NULL, related_query_ids TEXT NOT NULL,
                reviewer_id TEXT, review_notes TEXT, merged_into_concept_id TEXT
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn repeated_sightings_dedupe_into_one_record() {
        let pool = setup_pool().await;
        let graph = Arc::new(FakeGraph { known: HashSet::new() });
        let llm = Arc::new(FakeLlm { calls: Mutex::new(0) });
        let workflow = StagingWorkflow::new(graph, llm.clone(), pool.clone());

        for _ in 0..5 {
            let mut q = Query::new("what is a tensor field?", None);
            q.identified_concepts = vec!["tensor field".to_string()];
            workflow.stage_unknown_concepts(&q).await;
        }

        let staged = StagingRepository::find_by_name(&pool, "tensor field").await.unwrap().unwrap();
        assert_eq!(staged.occurrence_count, 5);
        assert_eq!(*llm.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn known_concepts_are_never_staged() {
        let pool = setup_pool().await;
        let mut known = HashSet::new();
        known.insert("limits".to_string());
        let graph = Arc::new(FakeGraph { known });
        let llm = Arc::new(FakeLlm { calls: Mutex::new(0) });
        let workflow = StagingWorkflow::new(graph, llm, pool.clone());

        let mut q = Query::new("what is a limit?", None);
        q.identified_concepts = vec!["limits".to_string()];
        workflow.stage_unknown_concepts(&q).await;

        assert!(StagingRepository::find_by_name(&pool, "limits").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn approve_is_idempotent() {
        let pool = setup_pool().await;
        let graph = Arc::new(FakeGraph { known: HashSet::new() });
        let llm = Arc::new(FakeLlm { calls: Mutex::new(0) });
        let workflow = StagingWorkflow::new(graph, llm, pool.clone());

        let mut q = Query::new("what is a tensor field?", None);
        q.identified_concepts = vec!["tensor field".to_string()];
        workflow.stage_unknown_concepts(&q).await;
        let staged = StagingRepository::find_by_name(&pool, "tensor field").await.unwrap().unwrap();

        let first =
            workflow.review(staged.id, ReviewAction::Approve, "prof-1".into(), None, None).await.unwrap();
        let second =
            workflow.review(staged.id, ReviewAction::Approve, "prof-2".into(), None, None).await.unwrap();

        assert_eq!(first.reviewer_id, second.reviewer_id);
        assert_eq!(second.reviewer_id, Some("prof-1".to_string()));
    }

    #[tokio::test]
    async fn merge_requires_target_id() {
        let pool = setup_pool().await;
        let graph = Arc::new(FakeGraph { known: HashSet::new() });
        let llm = Arc::new(FakeLlm { calls: Mutex::new(0) });
        let workflow = StagingWorkflow::new(graph, llm, pool.clone());

        let mut q = Query::new("what is a tensor field?", None);
        q.identified_concepts = vec!["tensor field".to_string()];
        workflow.stage_unknown_concepts(&q).await;
        let staged = StagingRepository::find_by_name(&pool, "tensor field").await.unwrap().unwrap();

        let result = workflow.review(staged.id, ReviewAction::Merge, "prof-1".into(), None, None).await;
        assert!(result.is_err());
    }
}
