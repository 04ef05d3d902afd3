//! Application configuration.
//!
//! Loaded once at startup from a YAML file with `$include` composition and
//! `${ENV:default}` expansion (see [`loader`]), then overlaid with
//! environment variables under the `MATHTUTOR_` prefix. Defaults match
//! spec §6.

pub mod loader;

pub use loader::{deep_merge, load_yaml_config, load_yaml_file};

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_port() -> u16 {
    8000
}
fn default_graph_uri() -> String {
    "neo4j://localhost:7687".to_string()
}
fn default_graph_user() -> String {
    "neo4j".to_string()
}
fn default_vector_host() -> String {
    "localhost:8080".to_string()
}
fn default_llm_provider() -> String {
    "anthropic".to_string()
}
fn default_llm_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_freshness_window_days() -> i64 {
    crate::smart_query::DEFAULT_FRESHNESS_WINDOW_DAYS
}
fn default_breaker_failure_threshold() -> u32 {
    3
}
fn default_breaker_open_seconds() -> u64 {
    30
}
fn default_database_url() -> String {
    "sqlite://mathtutor.db".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSettings {
    #[serde(default = "default_graph_uri")]
    pub uri: String,
    #[serde(default = "default_graph_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self { uri: default_graph_uri(), user: default_graph_user(), password: String::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSettings {
    #[serde(default = "default_vector_host")]
    pub host: String,
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self { host: default_vector_host() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    #[serde(default = "default_breaker_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_breaker_open_seconds")]
    pub open_seconds: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self { failure_threshold: default_breaker_failure_threshold(), open_seconds: default_breaker_open_seconds() }
    }
}

impl BreakerSettings {
    pub fn to_breaker_config(&self) -> crate::breaker::BreakerConfig {
        crate::breaker::BreakerConfig {
            failure_threshold: self.failure_threshold,
            open_duration: Duration::from_secs(self.open_seconds),
        }
    }
}

/// Root configuration object, deserialized from the merged YAML + env view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub graph: GraphSettings,
    #[serde(default)]
    pub vector: VectorSettings,
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub breaker: BreakerSettings,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_freshness_window_days")]
    pub freshness_window_days: i64,
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            graph: GraphSettings::default(),
            vector: VectorSettings::default(),
            llm: LlmSettings::default(),
            breaker: BreakerSettings::default(),
            log_level: default_log_level(),
            freshness_window_days: default_freshness_window_days(),
            database_url: default_database_url(),
        }
    }
}

impl AppConfig {
    /// Load from `path` if given, falling back to defaults overlaid with
    /// environment variables read directly by each client (API keys are
    /// never placed in the YAML file itself).
    pub fn load(path: Option<&std::path::Path>) -> crate::Result<Self> {
        let mut config = match path {
            Some(p) => load_yaml_config::<Self, _>(p)?,
            None => Self::default(),
        };

        if let Ok(key) = std::env::var("MATHTUTOR_LLM_API_KEY") {
            config.llm.api_key = key;
        }
        if let Ok(port) = std::env::var("MATHTUTOR_SERVER_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| crate::OrchestratorError::Config(format!("invalid MATHTUTOR_SERVER_PORT: {port}")))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.graph.uri, "neo4j://localhost:7687");
        assert_eq!(config.vector.host, "localhost:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.freshness_window_days, 7);
        assert_eq!(config.breaker.failure_threshold, 3);
        assert_eq!(config.breaker.open_seconds, 30);
    }

    #[test]
    fn env_override_applies_port() {
        std::env::set_var("MATHTUTOR_SERVER_PORT", "9100");
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.server.port, 9100);
        std::env::remove_var("MATHTUTOR_SERVER_PORT");
    }
}
