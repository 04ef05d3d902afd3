//! The RAG pipeline itself (C7): concept extraction, fan-out, explanation,
//! persistence, and staging — shared by the synchronous and streaming
//! entry points.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use graph_client::{Concept, ConceptType, GraphClient};
use llm_client::prompts::looks_truncated;
use llm_client::CompletionClient;
use serde::Serialize;
use uuid::Uuid;
use vector_client::{VectorClient, DEFAULT_K_PIPELINE};

use crate::breaker::BreakerRegistry;
use crate::db::connection::DatabasePool;
use crate::db::models::query::{ProcessingStep, Query};
use crate::db::repositories::analytics_repo::AnalyticsRepository;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::staging::StagingWorkflow;
use crate::stream::{QueryStreamSink, StreamEvent};
use crate::{OrchestratorError, Result};

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub text: String,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuerySource {
    /// Produced by a fresh run of this pipeline.
    Live,
    /// Replayed from the analytics store by the smart-query layer.
    Cache,
    /// Synthesized and run through the pipeline by the smart-query layer.
    Processed,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub query: Query,
    pub source: QuerySource,
    pub degraded: bool,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub extraction_timeout: Duration,
    pub path_timeout: Duration,
    pub context_timeout: Duration,
    pub explanation_timeout: Duration,
    pub persist_timeout: Duration,
    pub resource_concept_cap: usize,
    pub vector_k: usize,
    pub retry: RetryConfig,
    pub breaker: crate::breaker::BreakerConfig,
}

impl Default for PipelineConfig {
    /// Timeouts from spec §5's defaults table.
    fn default() -> Self {
        Self {
            extraction_timeout: Duration::from_secs(180),
            path_timeout: Duration::from_secs(60),
            context_timeout: Duration::from_secs(60),
            explanation_timeout: Duration::from_secs(480),
            persist_timeout: Duration::from_secs(10),
            resource_concept_cap: 5,
            vector_k: DEFAULT_K_PIPELINE,
            retry: RetryConfig::default(),
            breaker: crate::breaker::BreakerConfig::default(),
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    graph: Arc<dyn GraphClient>,
    vector: Arc<dyn VectorClient>,
    llm: Arc<dyn CompletionClient>,
    pool: DatabasePool,
    breakers: Arc<BreakerRegistry>,
    staging: StagingWorkflow,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        graph: Arc<dyn GraphClient>,
        vector: Arc<dyn VectorClient>,
        llm: Arc<dyn CompletionClient>,
        pool: DatabasePool,
        config: PipelineConfig,
    ) -> Self {
        let staging = StagingWorkflow::new(graph.clone(), llm.clone(), pool.clone());
        let breakers = Arc::new(BreakerRegistry::new(config.breaker.clone()));
        Self { graph, vector, llm, pool, breakers, staging, config }
    }

    pub async fn process_query(&self, request: QueryRequest) -> Result<QueryOutcome> {
        self.run(request, None).await
    }

    pub async fn process_query_stream(&self, request: QueryRequest, sink: QueryStreamSink) -> Result<QueryOutcome> {
        self.run(request, Some(sink)).await
    }

    /// Resources are served by a web scraper that is an external
    /// collaborator out of scope for this engine (spec §1); this only
    /// guarantees the wire contract's `resources` event exists.
    pub fn fetch_resources_in_background(&self, concept: String) {
        tracing::debug!(concept = %concept, "resource fetch requested (scraper is an external collaborator)");
    }

    async fn run(&self, request: QueryRequest, sink: Option<QueryStreamSink>) -> Result<QueryOutcome> {
        let mut query = Query::new(&request.text, request.user_id);

        const TOTAL_STEPS: u32 = 5;

        if let Some(sink) = &sink {
            sink.send(StreamEvent::Start { query_id: query.id, timestamp: Utc::now() }).await.ok();
            sink.send(StreamEvent::Progress {
                query_id: query.id,
                timestamp: Utc::now(),
                stage: "extract_concepts".into(),
                message: "identifying concepts".into(),
                current_step: 1,
                total_steps: TOTAL_STEPS,
            })
            .await
            .ok();
        }

        if !self.still_active(&sink) {
            return Err(OrchestratorError::Cancelled);
        }

        let extraction_start = Instant::now();
        let concepts = match self.extract_concepts_resilient(&request.text).await {
            Ok(concepts) => {
                query.processing_steps.push(ProcessingStep::ok("extract_concepts", elapsed_ms(extraction_start)));
                concepts
            }
            Err(e) => {
                query.processing_steps.push(ProcessingStep::failed("extract_concepts", elapsed_ms(extraction_start), e.to_string()));
                query.success = true;
                query.error = Some(e.to_string());
                query.response.explanation = degraded_explanation(&[]);
                return Ok(self.finish(query, sink, true).await);
            }
        };

        if concepts.is_empty() {
            query.identified_concepts = vec![];
            query.response.explanation =
                "I couldn't identify any specific mathematical concepts in that question. Could you rephrase it or add more detail?".to_string();
            query.response.llm_provider = self.llm.provider().to_string();
            query.response.llm_model = self.llm.model().to_string();
            query.success = true;

            if let Some(sink) = &sink {
                sink.send(StreamEvent::Concepts { query_id: query.id, timestamp: Utc::now(), concepts: vec![] }).await.ok();
            }

            return Ok(self.finish(query, sink, false).await);
        }

        query.identified_concepts = concepts.clone();
        if let Some(sink) = &sink {
            sink.send(StreamEvent::Concepts { query_id: query.id, timestamp: Utc::now(), concepts: concepts.clone() }).await.ok();
        }

        if !self.still_active(&sink) {
            return Err(OrchestratorError::Cancelled);
        }

        if let Some(sink) = &sink {
            sink.send(StreamEvent::Progress {
                query_id: query.id,
                timestamp: Utc::now(),
                stage: "fan_out".into(),
                message: "fetching prerequisites and context".into(),
                current_step: 2,
                total_steps: TOTAL_STEPS,
            })
            .await
            .ok();
        }

        let (path, context_chunks) = self.fan_out(&mut query, &concepts, &request.text, &sink).await;

        self.spawn_resource_fetch(query.id, concepts.clone(), sink.clone());

        if !self.still_active(&sink) {
            return Err(OrchestratorError::Cancelled);
        }

        if let Some(sink) = &sink {
            sink.send(StreamEvent::Progress {
                query_id: query.id,
                timestamp: Utc::now(),
                stage: "generate_explanation".into(),
                message: "generating explanation".into(),
                current_step: 3,
                total_steps: TOTAL_STEPS,
            })
            .await
            .ok();
        }

        let explanation_start = Instant::now();
        match self.generate_explanation_resilient(&request.text, &path, &context_chunks).await {
            Ok(raw) => {
                query.processing_steps.push(ProcessingStep::ok("generate_explanation", elapsed_ms(explanation_start)));
                let explanation = if looks_truncated(&raw) || raw.len() < 800 {
                    enhance_explanation(&raw, &path)
                } else {
                    raw
                };
                query.response.explanation = explanation;
                query.response.llm_provider = self.llm.provider().to_string();
                query.response.llm_model = self.llm.model().to_string();
                query.success = true;

                if let Some(sink) = &sink {
                    sink.send(StreamEvent::ExplanationChunk {
                        query_id: query.id,
                        timestamp: Utc::now(),
                        text: query.response.explanation.clone(),
                    })
                    .await
                    .ok();
                    sink.send(StreamEvent::ExplanationComplete {
                        query_id: query.id,
                        timestamp: Utc::now(),
                        full_explanation: query.response.explanation.clone(),
                    })
                    .await
                    .ok();
                    sink.send(StreamEvent::Progress {
                        query_id: query.id,
                        timestamp: Utc::now(),
                        stage: "finalize".into(),
                        message: "persisting and finishing".into(),
                        current_step: 4,
                        total_steps: TOTAL_STEPS,
                    })
                    .await
                    .ok();
                }

                Ok(self.finish(query, sink, false).await)
            }
            Err(e) => {
                query.processing_steps.push(ProcessingStep::failed("generate_explanation", elapsed_ms(explanation_start), e.to_string()));
                query.success = true;
                query.error = Some(e.to_string());
                query.response.explanation = degraded_explanation(&concepts);
                query.response.llm_provider = self.llm.provider().to_string();
                query.response.llm_model = self.llm.model().to_string();

                Ok(self.finish(query, sink, true).await)
            }
        }
    }

    /// Path and context branches run concurrently (spec §4.7 fan-out);
    /// events are emitted in deterministic path-then-context order rather
    /// than true arrival order, a simplification over a multi-producer
    /// channel.
    async fn fan_out(
        &self,
        query: &mut Query,
        concepts: &[String],
        question: &str,
        sink: &Option<QueryStreamSink>,
    ) -> (Vec<Concept>, Vec<String>) {
        let path_start = Instant::now();
        let context_start = Instant::now();

        let path_future = {
            let graph = self.graph.clone();
            let concepts = concepts.to_vec();
            let timeout = self.config.path_timeout;
            async move {
                let ids = match tokio::time::timeout(timeout, graph.resolve_ids(&concepts)).await {
                    Ok(Ok(ids)) => ids,
                    _ => return Vec::new(),
                };
                if ids.is_empty() {
                    return Vec::new();
                }
                match tokio::time::timeout(timeout, graph.prerequisite_path(&ids)).await {
                    Ok(Ok(path)) => path,
                    _ => Vec::new(),
                }
            }
        };

        let context_future = {
            let vector = self.vector.clone();
            let question = question.to_string();
            let k = self.config.vector_k;
            let timeout = self.config.context_timeout;
            async move {
                match tokio::time::timeout(timeout, vector.search(&question, k)).await {
                    Ok(Ok(results)) => results.into_iter().map(|r| r.content).collect(),
                    _ => Vec::new(),
                }
            }
        };

        let (path, context_chunks): (Vec<Concept>, Vec<String>) = tokio::join!(path_future, context_future);

        query.processing_steps.push(ProcessingStep::ok("prerequisite_path", elapsed_ms(path_start)));
        query.processing_steps.push(ProcessingStep::ok("context_search", elapsed_ms(context_start)));
        query.prerequisite_path = path.clone();
        query.response.retrieved_context = context_chunks.clone();

        if let Some(sink) = sink {
            sink.send(StreamEvent::Prerequisites { query_id: query.id, timestamp: Utc::now(), path: path.clone() }).await.ok();
            sink.send(StreamEvent::Context { query_id: query.id, timestamp: Utc::now(), chunks: context_chunks.clone() }).await.ok();
        }

        (path, context_chunks)
    }

    fn spawn_resource_fetch(&self, query_id: Uuid, concepts: Vec<String>, sink: Option<QueryStreamSink>) {
        let pipeline = self.clone();
        let cap = self.config.resource_concept_cap;
        tokio::spawn(async move {
            for concept in concepts.into_iter().take(cap) {
                pipeline.fetch_resources_in_background(concept.clone());
                if let Some(sink) = &sink {
                    sink.send(StreamEvent::Resources {
                        query_id,
                        timestamp: Utc::now(),
                        concept,
                        resources: Vec::new(),
                    })
                    .await
                    .ok();
                }
            }
        });
    }

    async fn extract_concepts_resilient(&self, text: &str) -> Result<Vec<String>> {
        let breaker = self.breakers.get_or_create("extract_concepts");
        let retry = &self.config.retry;
        let timeout = self.config.extraction_timeout;
        let llm = self.llm.clone();
        let text = text.to_string();

        breaker
            .call(|| async {
                let llm = llm.clone();
                let text = text.clone();
                retry_with_backoff(retry, "extract_concepts", move || {
                    let llm = llm.clone();
                    let text = text.clone();
                    async move {
                        match tokio::time::timeout(timeout, llm.identify_concepts(&text)).await {
                            Ok(result) => result.map_err(OrchestratorError::from),
                            Err(_) => Err(OrchestratorError::BackendTimeout("extract_concepts".into())),
                        }
                    }
                })
                .await
            })
            .await
    }

    async fn generate_explanation_resilient(&self, question: &str, path: &[Concept], context: &[String]) -> Result<String> {
        let breaker = self.breakers.get_or_create("generate_explanation");
        let retry = &self.config.retry;
        let timeout = self.config.explanation_timeout;
        let llm = self.llm.clone();
        let question = question.to_string();
        let path = path.to_vec();
        let context = context.to_vec();

        breaker
            .call(|| async {
                let llm = llm.clone();
                let question = question.clone();
                let path = path.clone();
                let context = context.clone();
                retry_with_backoff(retry, "generate_explanation", move || {
                    let llm = llm.clone();
                    let question = question.clone();
                    let path = path.clone();
                    let context = context.clone();
                    async move {
                        match tokio::time::timeout(timeout, llm.generate_explanation(&question, &path, &context)).await {
                            Ok(result) => result.map_err(OrchestratorError::from),
                            Err(_) => Err(OrchestratorError::BackendTimeout("generate_explanation".into())),
                        }
                    }
                })
                .await
            })
            .await
    }

    fn still_active(&self, sink: &Option<QueryStreamSink>) -> bool {
        sink.as_ref().map(|s| s.is_active()).unwrap_or(true)
    }

    /// Persist and stage in the background so neither ever extends
    /// client-visible latency, then emit the terminal stream event.
    async fn finish(&self, query: Query, sink: Option<QueryStreamSink>, degraded: bool) -> QueryOutcome {
        self.spawn_persist(query.clone());
        self.spawn_staging(query.clone());

        if let Some(sink) = &sink {
            sink.send(StreamEvent::Complete { query_id: query.id, timestamp: Utc::now(), degraded }).await.ok();
        }

        QueryOutcome { query, source: QuerySource::Live, degraded }
    }

    fn spawn_persist(&self, query: Query) {
        let pool = self.pool.clone();
        let timeout = self.config.persist_timeout;
        tokio::spawn(async move {
            if tokio::time::timeout(timeout, AnalyticsRepository::save(&pool, &query)).await.is_err() {
                tracing::warn!(query_id = %query.id, "analytics save timed out");
            }
        });
    }

    fn spawn_staging(&self, query: Query) {
        let staging = self.staging.clone();
        tokio::spawn(async move {
            staging.stage_unknown_concepts(&query).await;
        });
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn enhance_explanation(base: &str, path: &[Concept]) -> String {
    let mut text = base.trim().to_string();
    if !matches!(text.chars().last(), Some('.') | Some('!') | Some('?')) {
        text.push('.');
    }

    let prereqs: Vec<&str> = path
        .iter()
        .filter(|c| !matches!(c.concept_type, Some(ConceptType::Target)))
        .take(3)
        .map(|c| c.name.as_str())
        .collect();

    if !prereqs.is_empty() {
        text.push_str(&format!(" Key prerequisites to review: {}.", prereqs.join(", ")));
    }

    text
}

fn degraded_explanation(concepts: &[String]) -> String {
    if concepts.is_empty() {
        "We're experiencing high demand right now and couldn't generate a full explanation. Please try again shortly.".to_string()
    } else {
        format!(
            "We identified the following concepts in your question but couldn't generate a full explanation right now: {}. Please try again shortly.",
            concepts.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use graph_client::{ConceptDetail, NewConcept};
    use llm_client::NewConceptAnalysis;
    use vector_client::VectorResult;

    struct StubGraph;

    #[async_trait]
    impl GraphClient for StubGraph {
        async fn resolve_ids(&self, names: &[String]) -> graph_client::Result<Vec<String>> {
            Ok(names.to_vec())
        }
        async fn prerequisite_path(&self, target_ids: &[String]) -> graph_client::Result<Vec<Concept>> {
            Ok(target_ids
                .iter()
                .map(|id| Concept {
                    id: id.clone(),
                    name: id.clone(),
                    description: format!("{id} description"),
                    concept_type: Some(ConceptType::Target),
                    difficulty: Some(3),
                    category: None,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                })
                .collect())
        }
        async fn concept_detail(&self, _id_or_name: &str) -> graph_client::Result<ConceptDetail> {
            Err(graph_client::GraphClientError::NotFound("n/a".into()))
        }
        async fn all_concepts(&self) -> graph_client::Result<Vec<Concept>> {
            Ok(vec![])
        }
        async fn create_concept(&self, _concept: NewConcept) -> graph_client::Result<Concept> {
            unimplemented!()
        }
        async fn create_prerequisite(&self, _concept_id: &str, _prereq_id: &str) -> graph_client::Result<()> {
            Ok(())
        }
        async fn exists_by_name(&self, _name: &str) -> graph_client::Result<bool> {
            Ok(true)
        }
    }

    struct StubVector;

    #[async_trait]
    impl VectorClient for StubVector {
        async fn search(&self, _query: &str, _k: usize) -> vector_client::Result<Vec<VectorResult>> {
            Ok(vec![VectorResult { content: "a passage about derivatives".into(), concept: None, chapter: None, score: 0.9 }])
        }
        async fn is_healthy(&self) -> bool {
            true
        }
    }

    struct StubLlm {
        explanation: String,
    }

    #[async_trait]
    impl CompletionClient for StubLlm {
        async fn identify_concepts(&self, text: &str) -> llm_client::Result<Vec<String>> {
            if text.to_lowercase().contains("hello") {
                Ok(vec![])
            } else {
                Ok(vec!["derivatives".to_string()])
            }
        }
        async fn generate_explanation(&self, _q: &str, _p: &[Concept], _c: &[String]) -> llm_client::Result<String> {
            Ok(self.explanation.clone())
        }
        async fn analyze_new_concept(&self, name: &str, _ctx: &str) -> llm_client::Result<NewConceptAnalysis> {
            Ok(NewConceptAnalysis {
                description: format!("{name} description"),
                suggested_prereqs: vec![],
                suggested_difficulty: 4,
                suggested_category: "calculus".into(),
                reasoning: "n/a".into(),
                is_likely_new_concept: true,
            })
        }
        fn provider(&self) -> &str {
            "stub"
        }
        fn model(&self) -> &str {
            "stub-model"
        }
        async fn is_healthy(&self) -> bool {
            true
        }
    }

    async fn setup_pool() -> DatabasePool {
        let pool = DatabasePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE queries (
                id TEXT PRIMARY KEY NOT NULL, user_id TEXT, text TEXT NOT NULL, timestamp TEXT NOT NULL,
                identified_concepts TEXT NOT NULL, prerequisite_path TEXT NOT NULL, explanation TEXT NOT NULL,
                retrieved_context TEXT NOT NULL, llm_provider TEXT NOT NULL, llm_model TEXT NOT NULL,
                processing_steps TEXT NOT NULL, success INTEGER NOT NULL, error TEXT
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
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

    fn long_explanation() -> String {
        let mut s = "A derivative measures the instantaneous rate of change of a function. ".repeat(15);
        s.push('.');
        s
    }

    #[tokio::test]
    async fn happy_path_produces_successful_query() {
        let pool = setup_pool().await;
        let pipeline = Pipeline::new(
            Arc::new(StubGraph),
            Arc::new(StubVector),
            Arc::new(StubLlm { explanation: long_explanation() }),
            pool,
            PipelineConfig::default(),
        );

        let outcome = pipeline
            .process_query(QueryRequest { text: "What is the derivative of x^2?".to_string(), user_id: None })
            .await
            .unwrap();

        assert!(outcome.query.success);
        assert!(!outcome.query.identified_concepts.is_empty());
        assert!(!outcome.query.prerequisite_path.is_empty());
        assert!(outcome.query.response.explanation.len() >= 800);
        assert!(!outcome.degraded);
    }

    #[tokio::test]
    async fn empty_extraction_short_circuits() {
        let pool = setup_pool().await;
        let pipeline = Pipeline::new(
            Arc::new(StubGraph),
            Arc::new(StubVector),
            Arc::new(StubLlm { explanation: long_explanation() }),
            pool,
            PipelineConfig::default(),
        );

        let outcome = pipeline.process_query(QueryRequest { text: "hello".to_string(), user_id: None }).await.unwrap();

        assert!(outcome.query.success);
        assert!(outcome.query.identified_concepts.is_empty());
        assert!(outcome.query.prerequisite_path.is_empty());
    }

    #[tokio::test]
    async fn short_explanation_gets_enhanced() {
        let pool = setup_pool().await;
        let pipeline = Pipeline::new(
            Arc::new(StubGraph),
            Arc::new(StubVector),
            Arc::new(StubLlm { explanation: "Too short.".to_string() }),
            pool,
            PipelineConfig::default(),
        );

        let outcome = pipeline
            .process_query(QueryRequest { text: "What is a derivative?".to_string(), user_id: None })
            .await
            .unwrap();

        assert!(outcome.query.response.explanation.contains("Key prerequisites"));
    }

    #[tokio::test]
    async fn stream_emits_explanation_complete_before_terminal_event() {
        let pool = setup_pool().await;
        let pipeline = Pipeline::new(
            Arc::new(StubGraph),
            Arc::new(StubVector),
            Arc::new(StubLlm { explanation: long_explanation() }),
            pool,
            PipelineConfig::default(),
        );

        let (sink, mut rx) = QueryStreamSink::new(32);
        let request = QueryRequest { text: "What is the derivative of x^2?".to_string(), user_id: None };
        let outcome = pipeline.process_query_stream(request, sink).await.unwrap();
        assert!(!outcome.degraded);

        let mut names = Vec::new();
        while let Some(event) = rx.recv().await {
            names.push(event.event_name());
        }

        let explanation_idx = names.iter().position(|n| *n == "explanation_complete").unwrap();
        let complete_idx = names.iter().position(|n| *n == "complete").unwrap();
        assert!(explanation_idx < complete_idx);
        assert_eq!(names.last(), Some(&"complete"));
    }

    #[tokio::test]
    async fn closed_sink_cancels_before_explanation_stage() {
        let pool = setup_pool().await;
        let pipeline = Pipeline::new(
            Arc::new(StubGraph),
            Arc::new(StubVector),
            Arc::new(StubLlm { explanation: long_explanation() }),
            pool,
            PipelineConfig::default(),
        );

        let (sink, _rx) = QueryStreamSink::new(32);
        sink.close();

        let request = QueryRequest { text: "What is the derivative of x^2?".to_string(), user_id: None };
        let result = pipeline.process_query_stream(request, sink).await;
        assert!(matches!(result, Err(OrchestratorError::Cancelled)));
    }

    #[tokio::test]
    async fn prerequisite_path_is_bounded_by_resolved_ids() {
        let pool = setup_pool().await;
        let pipeline = Pipeline::new(
            Arc::new(StubGraph),
            Arc::new(StubVector),
            Arc::new(StubLlm { explanation: long_explanation() }),
            pool,
            PipelineConfig::default(),
        );

        let outcome = pipeline
            .process_query(QueryRequest { text: "What is the derivative of x^2?".to_string(), user_id: None })
            .await
            .unwrap();

        // StubGraph.resolve_ids is the identity, so the path length tracks
        // the identified-concept count exactly; it must never exceed it.
        assert_eq!(outcome.query.prerequisite_path.len(), outcome.query.identified_concepts.len());
    }
}
