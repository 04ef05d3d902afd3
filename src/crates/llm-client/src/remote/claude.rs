//! Anthropic Claude completion provider.

use async_trait::async_trait;
use graph_client::Concept;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::RemoteLlmConfig;
use crate::error::{LlmError, Result};
use crate::prompts::{concept_extraction_prompt, explanation_prompt, new_concept_prompt, strip_json_fence};
use crate::{CompletionClient, NewConceptAnalysis};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API client.
#[derive(Clone)]
pub struct ClaudeClient {
    config: RemoteLlmConfig,
    client: Client,
}

impl ClaudeClient {
    pub fn new(config: RemoteLlmConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build HTTP client");
        Self { config, client }
    }

    async fn complete(&self, user_prompt: &str) -> Result<String> {
        let url = format!("{}/v1/messages", self.config.base_url);

        let body = ClaudeRequest {
            model: self.config.model.clone(),
            messages: vec![ClaudeMessage { role: "user".to_string(), content: user_prompt.to_string() }],
            max_tokens: 4096,
            temperature: Some(0.3),
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => LlmError::AuthenticationError(error_text),
                429 => LlmError::RateLimitExceeded(error_text),
                _ => LlmError::ProviderError(format!("claude API error {status}: {error_text}")),
            });
        }

        let parsed: ClaudeResponse = response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(parsed
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .filter_map(|c| c.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[async_trait]
impl CompletionClient for ClaudeClient {
    async fn identify_concepts(&self, text: &str) -> Result<Vec<String>> {
        let raw = self.complete(&concept_extraction_prompt(text)).await?;
        let names: Vec<String> = serde_json::from_str(strip_json_fence(&raw))
            .map_err(|e| LlmError::InvalidResponse(format!("concept extraction: {e}")))?;
        let mut seen = std::collections::HashSet::new();
        Ok(names
            .into_iter()
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty() && seen.insert(n.clone()))
            .collect())
    }

    async fn generate_explanation(&self, query: &str, path: &[Concept], context_chunks: &[String]) -> Result<String> {
        self.complete(&explanation_prompt(query, path, context_chunks)).await
    }

    async fn analyze_new_concept(&self, name: &str, query_context: &str) -> Result<NewConceptAnalysis> {
        let raw = self.complete(&new_concept_prompt(name, query_context)).await?;
        serde_json::from_str(strip_json_fence(&raw))
            .map_err(|e| LlmError::InvalidResponse(format!("new concept analysis: {e}")))
    }

    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn is_healthy(&self) -> bool {
        self.complete("Reply with the single word: ok").await.is_ok()
    }
}

#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    messages: Vec<ClaudeMessage>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let config = RemoteLlmConfig::new("test-key", "https://api.anthropic.com", "claude-3-5-sonnet-20241022");
        let client = ClaudeClient::new(config);
        assert_eq!(client.provider(), "anthropic");
        assert_eq!(client.model(), "claude-3-5-sonnet-20241022");
    }
}
