//! OpenAI completion provider.

use async_trait::async_trait;
use graph_client::Concept;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::RemoteLlmConfig;
use crate::error::{LlmError, Result};
use crate::prompts::{concept_extraction_prompt, explanation_prompt, new_concept_prompt, strip_json_fence};
use crate::{CompletionClient, NewConceptAnalysis};

/// OpenAI Chat Completions API client.
#[derive(Clone)]
pub struct OpenAiClient {
    config: RemoteLlmConfig,
    client: Client,
}

impl OpenAiClient {
    pub fn new(config: RemoteLlmConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build HTTP client");
        Self { config, client }
    }

    async fn complete(&self, user_prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let body = OpenAiRequest {
            model: self.config.model.clone(),
            messages: vec![OpenAiMessage::new("user", user_prompt.to_string())],
            temperature: Some(0.3),
        };

        let mut req = self.client.post(&url).json(&body).header("Authorization", format!("Bearer {}", self.config.api_key));
        if let Some(org) = &self.config.organization {
            req = req.header("OpenAI-Organization", org);
        }

        let response = req.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => LlmError::AuthenticationError(error_text),
                429 => LlmError::RateLimitExceeded(error_text),
                _ => LlmError::ProviderError(format!("openai API error {status}: {error_text}")),
            });
        }

        let parsed: OpenAiResponse = response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
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
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn is_healthy(&self) -> bool {
        self.complete("Reply with the single word: ok").await.is_ok()
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

impl OpenAiMessage {
    fn new(role: &str, content: String) -> Self {
        Self { role: role.to_string(), content: Some(content) }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let config = RemoteLlmConfig::new("test-key", "https://api.openai.com/v1", "gpt-4o");
        let client = OpenAiClient::new(config);
        assert_eq!(client.provider(), "openai");
        assert_eq!(client.model(), "gpt-4o");
    }
}
