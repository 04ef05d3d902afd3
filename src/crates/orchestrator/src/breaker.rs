//! Per-operation circuit breaker (C6).
//!
//! A single process-local instance per named operation (`"graph"`,
//! `"vector"`, `"llm"`); no cluster coordination. Opens after 3 failures
//! inside a 30s window and short-circuits for the rest of that window
//! without issuing the wrapped call (spec P6).

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::{OrchestratorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub open_duration: Duration,
}

impl Default for BreakerConfig {
    /// Spec §4.6: opens at 3 failures within a 30s window.
    fn default() -> Self {
        Self { failure_threshold: 3, open_duration: Duration::from_secs(30) }
    }
}

struct BreakerState {
    circuit: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
}

/// Breaker guarding a single named operation.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState { circuit: CircuitState::Closed, failure_count: 0, last_failure_at: None }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state.lock().unwrap().circuit
    }

    /// Decide, without running `f`, whether the call is allowed right now.
    /// An `Open` breaker inside its window transitions nothing and rejects
    /// immediately; once the window elapses it flips to `HalfOpen` and lets
    /// exactly one probe through.
    fn admit(&self) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        match guard.circuit {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = guard.last_failure_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
                if elapsed >= self.config.open_duration {
                    guard.circuit = CircuitState::HalfOpen;
                    Ok(())
                } else {
                    Err(OrchestratorError::CircuitOpen(self.name.clone()))
                }
            }
        }
    }

    fn record_success(&self) {
        let mut guard = self.state.lock().unwrap();
        guard.failure_count = 0;
        guard.circuit = CircuitState::Closed;
    }

    fn record_failure(&self) {
        let mut guard = self.state.lock().unwrap();
        guard.failure_count += 1;
        guard.last_failure_at = Some(Instant::now());
        if guard.circuit == CircuitState::HalfOpen || guard.failure_count >= self.config.failure_threshold {
            guard.circuit = CircuitState::Open;
        }
    }

    /// Run `f` under breaker protection. Returns `CircuitOpen` without
    /// calling `f` at all when the breaker is tripped.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.admit()?;

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }
}

/// Process-wide map of named breakers, one per backend operation.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: RwLock<HashMap<String, std::sync::Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self { config, breakers: RwLock::new(HashMap::new()) }
    }

    pub fn get_or_create(&self, operation: &str) -> std::sync::Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().unwrap().get(operation) {
            return breaker.clone();
        }
        let mut guard = self.breakers.write().unwrap();
        guard
            .entry(operation.to_string())
            .or_insert_with(|| std::sync::Arc::new(CircuitBreaker::new(operation, self.config.clone())))
            .clone()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn closed_breaker_allows_calls() {
        let breaker = CircuitBreaker::new("graph", BreakerConfig::default());
        let result = breaker.call(|| async { Ok::<_, OrchestratorError>(1) }).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new("graph", BreakerConfig { failure_threshold: 3, open_duration: Duration::from_secs(30) });

        for _ in 0..3 {
            let _ = breaker.call(|| async { Err::<(), _>(OrchestratorError::BackendTimeout("slow".into())) }).await;
        }

        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn open_breaker_rejects_without_calling_operation() {
        let breaker = CircuitBreaker::new("vector", BreakerConfig { failure_threshold: 1, open_duration: Duration::from_secs(30) });
        let _ = breaker.call(|| async { Err::<(), _>(OrchestratorError::BackendTimeout("slow".into())) }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let result = breaker
            .call(move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, OrchestratorError>(())
                }
            })
            .await;

        assert!(matches!(result, Err(OrchestratorError::CircuitOpen(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn half_open_probe_closes_on_success() {
        let breaker = CircuitBreaker::new("llm", BreakerConfig { failure_threshold: 1, open_duration: Duration::from_millis(10) });
        let _ = breaker.call(|| async { Err::<(), _>(OrchestratorError::BackendTimeout("slow".into())) }).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = breaker.call(|| async { Ok::<_, OrchestratorError>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_probe_reopens_on_failure() {
        let breaker = CircuitBreaker::new("llm", BreakerConfig { failure_threshold: 1, open_duration: Duration::from_millis(10) });
        let _ = breaker.call(|| async { Err::<(), _>(OrchestratorError::BackendTimeout("slow".into())) }).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = breaker.call(|| async { Err::<(), _>(OrchestratorError::BackendTimeout("still slow".into())) }).await;
        assert!(result.is_err());
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn registry_reuses_breaker_per_operation() {
        let registry = BreakerRegistry::default();
        let a = registry.get_or_create("graph");
        let b = registry.get_or_create("graph");
        assert!(std::sync::Arc::ptr_eq(&a, &b));

        let c = registry.get_or_create("vector");
        assert!(!std::sync::Arc::ptr_eq(&a, &c));
    }
}
