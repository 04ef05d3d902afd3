//! Weaviate-backed implementation of [`crate::VectorClient`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;
use weaviate_community::collections::query::GetQuery;
use weaviate_community::collections::schema::{Class, Properties, Property};
use weaviate_community::WeaviateClient;

use crate::error::{Result, VectorClientError};
use crate::types::VectorResult;

const CLASS_CHUNK: &str = "TextbookChunk";
const FIELDS: [&str; 4] = ["content", "concept", "chapter", "_additional { certainty }"];

pub struct WeaviateVectorClient {
    client: WeaviateClient,
    query_timeout: Duration,
}

impl WeaviateVectorClient {
    pub async fn connect(host: &str, query_timeout: Duration) -> Result<Self> {
        let client = WeaviateClient::builder(host)
            .build()
            .map_err(|e| VectorClientError::Unavailable(e.to_string()))?;

        let schema = client
            .schema
            .get()
            .await
            .map_err(|e| VectorClientError::Unavailable(e.to_string()))?;

        if !schema.classes.iter().any(|c| c.class == CLASS_CHUNK) {
            let chunk_class = Class::builder(CLASS_CHUNK)
                .with_description("A short textbook passage indexed for semantic search")
                .with_properties(Properties::new(vec![
                    Property::builder("content", vec!["text"])
                        .with_description("The passage text")
                        .build(),
                    Property::builder("concept", vec!["string"])
                        .with_description("The concept id this passage primarily supports")
                        .build(),
                    Property::builder("chapter", vec!["string"])
                        .with_description("Source chapter or section label")
                        .build(),
                ]))
                .build();
            client
                .schema
                .create_class(&chunk_class)
                .await
                .map_err(|e| VectorClientError::Unavailable(e.to_string()))?;
        }

        Ok(Self { client, query_timeout })
    }

    fn parse_hits(result: &Value) -> Vec<VectorResult> {
        let objects = result
            .get("data")
            .and_then(|d| d.get("Get"))
            .and_then(|g| g.get(CLASS_CHUNK))
            .and_then(|v| v.as_array());

        let Some(objects) = objects else {
            return Vec::new();
        };

        objects
            .iter()
            .filter_map(|obj| {
                let content = obj.get("content")?.as_str()?.to_string();
                let concept = obj.get("concept").and_then(|v| v.as_str()).map(str::to_string);
                let chapter = obj.get("chapter").and_then(|v| v.as_str()).map(str::to_string);
                let score = obj
                    .get("_additional")
                    .and_then(|a| a.get("certainty"))
                    .and_then(|c| c.as_f64())
                    .unwrap_or(0.0) as f32;
                Some(VectorResult { content, concept, chapter, score })
            })
            .collect()
    }
}

#[async_trait]
impl crate::VectorClient for WeaviateVectorClient {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<VectorResult>> {
        let get_query = GetQuery::builder(CLASS_CHUNK, FIELDS.to_vec())
            .with_near_text(query)
            .with_limit(k as u32)
            .build();

        let result = tokio::time::timeout(self.query_timeout, self.client.query.get(get_query))
            .await
            .map_err(|_| VectorClientError::Timeout("vector search".to_string()))?
            .map_err(|e| VectorClientError::Unavailable(e.to_string()))?;

        let mut hits = Self::parse_hits(&result);
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(hits)
    }

    async fn is_healthy(&self) -> bool {
        match self.client.schema.get().await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "weaviate health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_hits_and_drops_malformed_objects() {
        let body = json!({
            "data": {
                "Get": {
                    CLASS_CHUNK: [
                        {"content": "the derivative measures rate of change", "concept": "derivatives", "chapter": "ch3", "_additional": {"certainty": 0.92}},
                        {"content": "no certainty field", "_additional": {}},
                        {"concept": "missing-content"},
                    ]
                }
            }
        });

        let hits = WeaviateVectorClient::parse_hits(&body);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].score, 0.92);
        assert_eq!(hits[1].content, "no certainty field");
        assert_eq!(hits[1].score, 0.0);
    }

    #[test]
    fn parses_empty_result_set() {
        let body = json!({"data": {"Get": {CLASS_CHUNK: []}}});
        assert!(WeaviateVectorClient::parse_hits(&body).is_empty());
    }
}
