//! Exponential backoff retry for calls to the graph, vector, and LLM backends (C7).
//!
//! Errors are classified transient/permanent before a retry is attempted so a
//! validation failure never gets retried into a timeout.

use crate::{OrchestratorError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// May succeed on retry: timeouts, backend-unavailable, rate limits.
    Transient,
    /// Won't succeed on retry: validation, not-found, circuit open.
    Permanent,
    Unknown,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    /// Spec §4.7: exponential backoff with jitter, base 3s, max 3 attempts.
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 3_000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries, ..Default::default() }
    }

    pub fn with_initial_backoff(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    pub fn with_max_backoff(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay_ms =
            (self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32)) as u64;
        let delay_ms = delay_ms.min(self.max_backoff_ms);

        let delay_ms = if self.jitter {
            let jitter_amount = (delay_ms as f64 * 0.25 * rand::random::<f64>()) as u64;
            delay_ms + jitter_amount
        } else {
            delay_ms
        };

        Duration::from_millis(delay_ms)
    }
}

/// Classify an [`OrchestratorError`] for retry purposes.
pub fn classify_error(error: &OrchestratorError) -> ErrorClass {
    match error {
        OrchestratorError::BackendTimeout(_) => ErrorClass::Transient,
        OrchestratorError::BackendUnavailable(_) => ErrorClass::Transient,
        OrchestratorError::Graph(_) | OrchestratorError::Vector(_) | OrchestratorError::Llm(_) => {
            classify_by_message(&error.to_string())
        }
        OrchestratorError::ValidationError(_)
        | OrchestratorError::NotFound(_)
        | OrchestratorError::ModelTruncation(_)
        | OrchestratorError::CircuitOpen(_)
        | OrchestratorError::Cancelled => ErrorClass::Permanent,
        OrchestratorError::Database(_) | OrchestratorError::Serialization(_) | OrchestratorError::Config(_) => {
            ErrorClass::Unknown
        }
    }
}

fn classify_by_message(msg: &str) -> ErrorClass {
    let msg_lower = msg.to_lowercase();

    if msg_lower.contains("rate limit")
        || msg_lower.contains("too many requests")
        || msg_lower.contains("429")
        || msg_lower.contains("timeout")
        || msg_lower.contains("timed out")
        || msg_lower.contains("deadline exceeded")
        || msg_lower.contains("503")
        || msg_lower.contains("service unavailable")
        || msg_lower.contains("502")
        || msg_lower.contains("bad gateway")
        || msg_lower.contains("500")
        || msg_lower.contains("internal server error")
        || msg_lower.contains("connection")
        || msg_lower.contains("network")
        || msg_lower.contains("dns")
    {
        return ErrorClass::Transient;
    }

    if msg_lower.contains("401")
        || msg_lower.contains("unauthorized")
        || msg_lower.contains("invalid api key")
        || msg_lower.contains("authentication failed")
        || msg_lower.contains("403")
        || msg_lower.contains("forbidden")
        || msg_lower.contains("404")
        || msg_lower.contains("not found")
        || msg_lower.contains("400")
        || msg_lower.contains("bad request")
        || msg_lower.contains("invalid request")
    {
        return ErrorClass::Permanent;
    }

    ErrorClass::Unknown
}

/// Run `f` up to `config.max_retries` total attempts, skipping permanent errors.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;
    let last_attempt = config.max_retries.saturating_sub(1);

    for attempt in 0..config.max_retries {
        if attempt > 0 {
            info!(operation = operation_name, attempt, max_retries = config.max_retries, "retrying operation");
        }

        match f().await {
            Ok(result) => {
                if attempt > 0 {
                    info!(operation = operation_name, attempt, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                let error_class = classify_error(&e);

                debug!(operation = operation_name, attempt, error = ?e, classification = ?error_class, "operation failed");

                if error_class == ErrorClass::Permanent {
                    error!(operation = operation_name, error = ?e, "permanent error, aborting retries");
                    return Err(e);
                }

                last_error = Some(e);

                if attempt < last_attempt {
                    let delay = config.backoff_delay(attempt);
                    warn!(operation = operation_name, attempt, delay_ms = delay.as_millis(), "transient error, retrying after delay");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    let final_error = last_error.unwrap_or_else(|| {
        OrchestratorError::BackendUnavailable(format!(
            "operation '{}' failed after {} attempts",
            operation_name, config.max_retries
        ))
    });

    error!(operation = operation_name, max_retries = config.max_retries, error = ?final_error, "all retry attempts exhausted");

    Err(final_error)
}
