//! Neo4j-backed implementation of [`crate::GraphClient`].

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use neo4rs::{query, Graph};
use tracing::{debug, warn};

use crate::error::{GraphClientError, Result};
use crate::types::{Concept, ConceptDetail, ConceptType, NewConcept, MAX_PATH_NODES, MAX_TRAVERSAL_DEPTH};
use crate::GraphClient;

/// Pool and timeout knobs for the Neo4j driver.
///
/// `max_connections` should stay at or above the orchestrator's expected
/// fan-out concurrency (the spec calls for headroom of ~50 concurrent
/// readers) or path lookups start queueing behind the connection pool
/// instead of the graph itself.
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: usize,
    pub session_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "neo4j://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
            max_connections: 50,
            session_timeout: Duration::from_secs(8),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

pub struct Neo4jGraphClient {
    graph: Graph,
    session_timeout: Duration,
}

impl Neo4jGraphClient {
    pub async fn connect(config: Neo4jConfig) -> Result<Self> {
        let graph = tokio::time::timeout(
            config.connect_timeout,
            Graph::new(&config.uri, &config.user, &config.password),
        )
        .await
        .map_err(|_| GraphClientError::Timeout("connection acquisition".to_string()))?
        .map_err(GraphClientError::from)?;

        let client = Self {
            graph,
            session_timeout: config.session_timeout,
        };
        client.ensure_constraints().await?;
        Ok(client)
    }

    async fn ensure_constraints(&self) -> Result<()> {
        let stmt = query("CREATE CONSTRAINT IF NOT EXISTS FOR (c:Concept) REQUIRE c.id IS UNIQUE");
        match self.graph.run(stmt).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let msg = err.to_string();
                if msg.contains("already exists") || msg.contains("EquivalentSchemaRule") {
                    Ok(())
                } else {
                    Err(GraphClientError::from(err))
                }
            }
        }
    }

    async fn with_session_timeout<F, T>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = std::result::Result<T, neo4rs::Error>>,
    {
        match tokio::time::timeout(self.session_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(GraphClientError::from(err)),
            Err(_) => Err(GraphClientError::Timeout("graph session".to_string())),
        }
    }

    fn row_to_concept(row: &neo4rs::Row) -> Option<Concept> {
        let id: String = row.get("id").ok()?;
        let name: String = row.get("name").ok()?;
        let description: String = row.get("description").unwrap_or_default();
        let difficulty: Option<i64> = row.get("difficulty").ok();
        let category: Option<String> = row.get("category").ok();
        let created_ms: i64 = row.get("created_at").unwrap_or(0);
        let updated_ms: i64 = row.get("updated_at").unwrap_or(created_ms);

        Some(Concept {
            id,
            name,
            description,
            concept_type: None,
            difficulty: difficulty.map(|d| d.clamp(1, 10) as u8),
            category,
            created_at: millis_to_datetime(created_ms),
            updated_at: millis_to_datetime(updated_ms),
        })
    }
}

fn millis_to_datetime(ms: i64) -> chrono::DateTime<Utc> {
    chrono::DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

#[async_trait]
impl GraphClient for Neo4jGraphClient {
    async fn resolve_ids(&self, names: &[String]) -> Result<Vec<String>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let ids_lower: Vec<String> = names.iter().map(|n| n.trim().to_lowercase()).collect();
        let names_lower = ids_lower.clone();

        let stmt = query(
            "MATCH (c:Concept)
             WHERE toLower(c.id) IN $ids
                OR any(n IN $names WHERE toLower(c.name) CONTAINS n OR n CONTAINS toLower(c.name))
             RETURN DISTINCT c.id AS id",
        )
        .param("ids", ids_lower)
        .param("names", names_lower);

        let mut stream = self
            .with_session_timeout(self.graph.execute(stmt))
            .await?;

        let mut resolved = HashSet::new();
        loop {
            let next = self
                .with_session_timeout(stream.next())
                .await
                .map_err(|e| match e {
                    GraphClientError::Timeout(_) => e,
                    other => other,
                })?;
            match next {
                Some(row) => {
                    if let Ok(id) = row.get::<String>("id") {
                        resolved.insert(id);
                    }
                }
                None => break,
            }
        }

        Ok(resolved.into_iter().collect())
    }

    async fn prerequisite_path(&self, target_ids: &[String]) -> Result<Vec<Concept>> {
        if target_ids.is_empty() {
            return Ok(Vec::new());
        }

        let target_set: HashSet<&str> = target_ids.iter().map(String::as_str).collect();
        let mut by_id: std::collections::HashMap<String, Concept> = std::collections::HashMap::new();

        let targets_stmt = query("MATCH (c:Concept) WHERE c.id IN $ids RETURN c.id AS id, c.name AS name, c.description AS description, c.difficulty AS difficulty, c.category AS category, c.created_at AS created_at, c.updated_at AS updated_at")
            .param("ids", target_ids.to_vec());
        let mut stream = self.with_session_timeout(self.graph.execute(targets_stmt)).await?;
        while let Some(row) = self.with_session_timeout(stream.next()).await? {
            if let Some(mut c) = Self::row_to_concept(&row) {
                c.concept_type = Some(ConceptType::Target);
                by_id.insert(c.id.clone(), c);
            }
        }

        let ancestors_stmt = query(
            "MATCH (anc:Concept)-[:PREREQUISITE_FOR*1..5]->(target:Concept)
             WHERE target.id IN $ids
             RETURN DISTINCT anc.id AS id, anc.name AS name, anc.description AS description,
                    anc.difficulty AS difficulty, anc.category AS category,
                    anc.created_at AS created_at, anc.updated_at AS updated_at
             LIMIT $limit",
        )
        .param("ids", target_ids.to_vec())
        .param("limit", MAX_PATH_NODES as i64);

        let mut stream = self.with_session_timeout(self.graph.execute(ancestors_stmt)).await?;
        let mut ancestor_count = 0usize;
        while let Some(row) = self.with_session_timeout(stream.next()).await? {
            if ancestor_count >= MAX_PATH_NODES {
                break;
            }
            if let Some(mut c) = Self::row_to_concept(&row) {
                if target_set.contains(c.id.as_str()) {
                    // Already present as a target; never downgrade its role.
                    continue;
                }
                c.concept_type = Some(ConceptType::Prerequisite);
                by_id.insert(c.id.clone(), c);
                ancestor_count += 1;
            }
        }

        let mut concepts: Vec<Concept> = by_id.into_values().collect();
        concepts.sort_by(|a, b| {
            let rank = |t: Option<ConceptType>| match t {
                Some(ConceptType::Target) => 0,
                _ => 1,
            };
            rank(a.concept_type).cmp(&rank(b.concept_type)).then_with(|| a.name.cmp(&b.name))
        });

        Ok(concepts)
    }

    async fn concept_detail(&self, id_or_name: &str) -> Result<ConceptDetail> {
        let stmt = query(
            "MATCH (c:Concept)
             WHERE c.id = $key OR toLower(c.name) = toLower($key)
             RETURN c.id AS id, c.name AS name, c.description AS description,
                    c.difficulty AS difficulty, c.category AS category,
                    c.created_at AS created_at, c.updated_at AS updated_at
             LIMIT 1",
        )
        .param("key", id_or_name);

        let mut stream = self.with_session_timeout(self.graph.execute(stmt)).await?;
        let row = self
            .with_session_timeout(stream.next())
            .await?
            .ok_or_else(|| GraphClientError::NotFound(id_or_name.to_string()))?;
        let concept = Self::row_to_concept(&row)
            .ok_or_else(|| GraphClientError::NotFound(id_or_name.to_string()))?;

        let prereq_stmt = query(
            "MATCH (p:Concept)-[:PREREQUISITE_FOR]->(c:Concept {id: $id})
             RETURN p.id AS id, p.name AS name, p.description AS description,
                    p.difficulty AS difficulty, p.category AS category,
                    p.created_at AS created_at, p.updated_at AS updated_at",
        )
        .param("id", concept.id.clone());
        let mut stream = self.with_session_timeout(self.graph.execute(prereq_stmt)).await?;
        let mut prerequisites = Vec::new();
        while let Some(row) = self.with_session_timeout(stream.next()).await? {
            if let Some(mut c) = Self::row_to_concept(&row) {
                c.concept_type = Some(ConceptType::Prerequisite);
                prerequisites.push(c);
            }
        }

        let leads_to_stmt = query(
            "MATCH (c:Concept {id: $id})-[:PREREQUISITE_FOR]->(n:Concept)
             RETURN n.id AS id, n.name AS name, n.description AS description,
                    n.difficulty AS difficulty, n.category AS category,
                    n.created_at AS created_at, n.updated_at AS updated_at",
        )
        .param("id", concept.id.clone());
        let mut stream = self.with_session_timeout(self.graph.execute(leads_to_stmt)).await?;
        let mut leads_to = Vec::new();
        while let Some(row) = self.with_session_timeout(stream.next()).await? {
            if let Some(mut c) = Self::row_to_concept(&row) {
                c.concept_type = Some(ConceptType::NextConcept);
                leads_to.push(c);
            }
        }

        prerequisites.sort_by(|a, b| a.name.cmp(&b.name));
        leads_to.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(ConceptDetail { concept, prerequisites, leads_to })
    }

    async fn all_concepts(&self) -> Result<Vec<Concept>> {
        let stmt = query(
            "MATCH (c:Concept)
             RETURN c.id AS id, c.name AS name, c.description AS description,
                    c.difficulty AS difficulty, c.category AS category,
                    c.created_at AS created_at, c.updated_at AS updated_at
             ORDER BY c.name",
        );
        let mut stream = self.with_session_timeout(self.graph.execute(stmt)).await?;
        let mut concepts = Vec::new();
        while let Some(row) = self.with_session_timeout(stream.next()).await? {
            if let Some(c) = Self::row_to_concept(&row) {
                concepts.push(c);
            }
        }
        Ok(concepts)
    }

    async fn create_concept(&self, concept: NewConcept) -> Result<Concept> {
        let id = Concept::slug(&concept.name);
        let now = Utc::now().timestamp_millis();

        let stmt = query(
            "MERGE (c:Concept {id: $id})
             ON CREATE SET c.created_at = $now
             SET c.name = $name, c.description = $description, c.difficulty = $difficulty,
                 c.category = $category, c.updated_at = $now
             RETURN c.id AS id, c.name AS name, c.description AS description,
                    c.difficulty AS difficulty, c.category AS category,
                    c.created_at AS created_at, c.updated_at AS updated_at",
        )
        .param("id", id.clone())
        .param("name", concept.name.clone())
        .param("description", concept.description.clone())
        .param("difficulty", concept.difficulty.map(|d| d as i64).unwrap_or(0))
        .param("category", concept.category.clone().unwrap_or_default())
        .param("now", now);

        let mut stream = self.with_session_timeout(self.graph.execute(stmt)).await?;
        let row = self
            .with_session_timeout(stream.next())
            .await?
            .ok_or_else(|| GraphClientError::Other("create_concept returned no row".to_string()))?;
        Self::row_to_concept(&row).ok_or_else(|| GraphClientError::Other("malformed concept row".to_string()))
    }

    async fn create_prerequisite(&self, concept_id: &str, prereq_id: &str) -> Result<()> {
        if concept_id == prereq_id {
            return Err(GraphClientError::CycleRejected(prereq_id.to_string(), concept_id.to_string()));
        }

        // Reject the write if `concept_id` is already an ancestor of
        // `prereq_id` -- adding the edge the other way would close a cycle.
        if self.is_ancestor(concept_id, prereq_id).await? {
            return Err(GraphClientError::CycleRejected(prereq_id.to_string(), concept_id.to_string()));
        }

        let stmt = query(
            "MATCH (prereq:Concept {id: $prereq_id}), (target:Concept {id: $concept_id})
             MERGE (prereq)-[:PREREQUISITE_FOR]->(target)",
        )
        .param("prereq_id", prereq_id)
        .param("concept_id", concept_id);

        self.with_session_timeout(self.graph.run(stmt)).await?;
        Ok(())
    }

    async fn exists_by_name(&self, name: &str) -> Result<bool> {
        let stmt = query("MATCH (c:Concept) WHERE toLower(c.name) = toLower($name) RETURN count(c) AS n")
            .param("name", name);
        let mut stream = self.with_session_timeout(self.graph.execute(stmt)).await?;
        let row = self.with_session_timeout(stream.next()).await?;
        let count: i64 = row.and_then(|r| r.get("n").ok()).unwrap_or(0);
        Ok(count > 0)
    }
}

impl Neo4jGraphClient {
    async fn is_ancestor(&self, maybe_ancestor: &str, of: &str) -> Result<bool> {
        let stmt = query(
            "MATCH (anc:Concept {id: $anc})-[:PREREQUISITE_FOR*1..5]->(target:Concept {id: $of})
             RETURN count(anc) AS n LIMIT 1",
        )
        .param("anc", maybe_ancestor)
        .param("of", of);
        let mut stream = self.with_session_timeout(self.graph.execute(stmt)).await?;
        let row = self.with_session_timeout(stream.next()).await?;
        let count: i64 = row.and_then(|r| r.get("n").ok()).unwrap_or(0);
        Ok(count > 0)
    }
}

/// In-memory fallback used in tests and to demonstrate the trait without a
/// live Neo4j instance. Honors the same depth/size bounds as the driver
/// implementation so orchestrator tests can run without network access.
pub struct InMemoryGraphClient {
    pub concepts: tokio::sync::RwLock<std::collections::HashMap<String, Concept>>,
    pub edges: tokio::sync::RwLock<Vec<(String, String)>>, // (prereq_id, concept_id)
}

impl Default for InMemoryGraphClient {
    fn default() -> Self {
        Self {
            concepts: tokio::sync::RwLock::new(std::collections::HashMap::new()),
            edges: tokio::sync::RwLock::new(Vec::new()),
        }
    }
}

impl InMemoryGraphClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, name: &str, description: &str, prereqs: &[&str]) -> String {
        let id = Concept::slug(name);
        let now = Utc::now();
        let mut concepts = self.concepts.write().await;
        concepts.insert(
            id.clone(),
            Concept {
                id: id.clone(),
                name: name.to_string(),
                description: description.to_string(),
                concept_type: None,
                difficulty: None,
                category: None,
                created_at: now,
                updated_at: now,
            },
        );
        drop(concepts);
        let mut edges = self.edges.write().await;
        for p in prereqs {
            edges.push((Concept::slug(p), id.clone()));
        }
        id
    }
}

#[async_trait]
impl GraphClient for InMemoryGraphClient {
    async fn resolve_ids(&self, names: &[String]) -> Result<Vec<String>> {
        let concepts = self.concepts.read().await;
        let mut out = HashSet::new();
        for name in names {
            let needle = name.trim().to_lowercase();
            for c in concepts.values() {
                if c.id.to_lowercase() == needle
                    || c.name.to_lowercase().contains(&needle)
                    || needle.contains(&c.name.to_lowercase())
                {
                    out.insert(c.id.clone());
                }
            }
        }
        Ok(out.into_iter().collect())
    }

    async fn prerequisite_path(&self, target_ids: &[String]) -> Result<Vec<Concept>> {
        let concepts = self.concepts.read().await;
        let edges = self.edges.read().await;
        let target_set: HashSet<&str> = target_ids.iter().map(String::as_str).collect();

        let mut result: std::collections::HashMap<String, Concept> = std::collections::HashMap::new();
        for id in target_ids {
            if let Some(c) = concepts.get(id) {
                let mut c = c.clone();
                c.concept_type = Some(ConceptType::Target);
                result.insert(id.clone(), c);
            }
        }

        let mut queue: VecDeque<(String, u32)> = target_ids.iter().map(|id| (id.clone(), 0)).collect();
        let mut visited: HashSet<String> = target_ids.iter().cloned().collect();
        let mut ancestor_count = 0usize;

        while let Some((id, depth)) = queue.pop_front() {
            if depth >= MAX_TRAVERSAL_DEPTH {
                continue;
            }
            for (prereq_id, concept_id) in edges.iter() {
                if concept_id != &id || visited.contains(prereq_id) {
                    continue;
                }
                visited.insert(prereq_id.clone());
                if let Some(c) = concepts.get(prereq_id) {
                    if !target_set.contains(prereq_id.as_str()) && ancestor_count < MAX_PATH_NODES {
                        let mut c = c.clone();
                        c.concept_type = Some(ConceptType::Prerequisite);
                        result.insert(prereq_id.clone(), c);
                        ancestor_count += 1;
                    }
                }
                queue.push_back((prereq_id.clone(), depth + 1));
            }
        }

        let mut out: Vec<Concept> = result.into_values().collect();
        out.sort_by(|a, b| {
            let rank = |t: Option<ConceptType>| match t {
                Some(ConceptType::Target) => 0,
                _ => 1,
            };
            rank(a.concept_type).cmp(&rank(b.concept_type)).then_with(|| a.name.cmp(&b.name))
        });
        Ok(out)
    }

    async fn concept_detail(&self, id_or_name: &str) -> Result<ConceptDetail> {
        let concepts = self.concepts.read().await;
        let edges = self.edges.read().await;
        let needle = id_or_name.to_lowercase();
        let concept = concepts
            .values()
            .find(|c| c.id == id_or_name || c.name.to_lowercase() == needle)
            .cloned()
            .ok_or_else(|| GraphClientError::NotFound(id_or_name.to_string()))?;

        let mut prerequisites: Vec<Concept> = edges
            .iter()
            .filter(|(_, target)| target == &concept.id)
            .filter_map(|(prereq, _)| concepts.get(prereq).cloned())
            .collect();
        let mut leads_to: Vec<Concept> = edges
            .iter()
            .filter(|(prereq, _)| prereq == &concept.id)
            .filter_map(|(_, target)| concepts.get(target).cloned())
            .collect();
        prerequisites.sort_by(|a, b| a.name.cmp(&b.name));
        leads_to.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(ConceptDetail { concept, prerequisites, leads_to })
    }

    async fn all_concepts(&self) -> Result<Vec<Concept>> {
        let concepts = self.concepts.read().await;
        let mut out: Vec<Concept> = concepts.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn create_concept(&self, new_concept: NewConcept) -> Result<Concept> {
        let id = Concept::slug(&new_concept.name);
        let now = Utc::now();
        let mut concepts = self.concepts.write().await;
        let created_at = concepts.get(&id).map(|c| c.created_at).unwrap_or(now);
        let concept = Concept {
            id: id.clone(),
            name: new_concept.name,
            description: new_concept.description,
            concept_type: None,
            difficulty: new_concept.difficulty,
            category: new_concept.category,
            created_at,
            updated_at: now,
        };
        concepts.insert(id, concept.clone());
        Ok(concept)
    }

    async fn create_prerequisite(&self, concept_id: &str, prereq_id: &str) -> Result<()> {
        if concept_id == prereq_id {
            return Err(GraphClientError::CycleRejected(prereq_id.to_string(), concept_id.to_string()));
        }
        if self.would_cycle(concept_id, prereq_id).await {
            return Err(GraphClientError::CycleRejected(prereq_id.to_string(), concept_id.to_string()));
        }
        let mut edges = self.edges.write().await;
        let pair = (prereq_id.to_string(), concept_id.to_string());
        if !edges.contains(&pair) {
            edges.push(pair);
        }
        Ok(())
    }

    async fn exists_by_name(&self, name: &str) -> Result<bool> {
        let concepts = self.concepts.read().await;
        let needle = name.to_lowercase();
        Ok(concepts.values().any(|c| c.name.to_lowercase() == needle))
    }
}

impl InMemoryGraphClient {
    async fn would_cycle(&self, maybe_ancestor: &str, of: &str) -> bool {
        let edges = self.edges.read().await;
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(of.to_string());
        while let Some(id) = queue.pop_front() {
            if id == maybe_ancestor {
                return true;
            }
            if !visited.insert(id.clone()) {
                continue;
            }
            for (prereq, target) in edges.iter() {
                if target == &id {
                    queue.push_back(prereq.clone());
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_by_substring_case_insensitive() {
        let client = InMemoryGraphClient::new();
        client.seed("Derivatives", "rate of change", &[]).await;

        let ids = client
            .resolve_ids(&["derivative".to_string(), "nonexistent thing".to_string()])
            .await
            .unwrap();

        assert_eq!(ids, vec!["derivatives".to_string()]);
    }

    #[tokio::test]
    async fn prerequisite_path_tags_target_and_dedupes() {
        let client = InMemoryGraphClient::new();
        let algebra = client.seed("Algebra", "basics", &[]).await;
        let limits = client.seed("Limits", "limits", &["Algebra"]).await;
        let target = client.seed("Derivatives", "slopes", &["Limits", "Algebra"]).await;

        let path = client.prerequisite_path(&[target.clone()]).await.unwrap();
        let ids: Vec<_> = path.iter().map(|c| c.id.clone()).collect();
        assert!(ids.contains(&target));
        assert!(ids.contains(&limits));
        assert!(ids.contains(&algebra));
        // Algebra must appear exactly once even though two paths reach it.
        assert_eq!(ids.iter().filter(|id| **id == algebra).count(), 1);

        let target_concept = path.iter().find(|c| c.id == target).unwrap();
        assert_eq!(target_concept.concept_type, Some(ConceptType::Target));
    }

    #[tokio::test]
    async fn create_prerequisite_rejects_cycles() {
        let client = InMemoryGraphClient::new();
        let a = client.seed("A", "", &[]).await;
        let b = client.seed("B", "", &["A"]).await;

        let err = client.create_prerequisite(&a, &b).await.unwrap_err();
        assert!(matches!(err, GraphClientError::CycleRejected(_, _)));
    }

    #[tokio::test]
    async fn exists_by_name_is_case_insensitive() {
        let client = InMemoryGraphClient::new();
        client.seed("Tensor Field", "", &[]).await;
        assert!(client.exists_by_name("tensor FIELD").await.unwrap());
        assert!(!client.exists_by_name("manifold").await.unwrap());
    }
}
