//! Server-sent event stream for `/api/v1/query/stream` (C7).
//!
//! Every event carries the owning query id and a timestamp; the channel
//! closes itself after a terminal event (`complete` or `error`) so a client
//! can treat channel-close as end-of-stream (spec invariant I2/I3).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Discriminated union mirrored 1:1 onto the SSE wire format: `event: <kind>`
/// with a JSON `data:` payload shaped by `kind`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamEvent {
    Start {
        query_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    Progress {
        query_id: Uuid,
        timestamp: DateTime<Utc>,
        stage: String,
        message: String,
        /// Monotone non-decreasing across a stream (spec P3); `percentage`
        /// is advisory and derived from it, not independently tracked.
        current_step: u32,
        total_steps: u32,
    },
    Concepts {
        query_id: Uuid,
        timestamp: DateTime<Utc>,
        concepts: Vec<String>,
    },
    Prerequisites {
        query_id: Uuid,
        timestamp: DateTime<Utc>,
        path: Vec<graph_client::Concept>,
    },
    Context {
        query_id: Uuid,
        timestamp: DateTime<Utc>,
        chunks: Vec<String>,
    },
    Resources {
        query_id: Uuid,
        timestamp: DateTime<Utc>,
        concept: String,
        resources: Vec<String>,
    },
    ExplanationChunk {
        query_id: Uuid,
        timestamp: DateTime<Utc>,
        text: String,
    },
    ExplanationComplete {
        query_id: Uuid,
        timestamp: DateTime<Utc>,
        full_explanation: String,
    },
    Complete {
        query_id: Uuid,
        timestamp: DateTime<Utc>,
        degraded: bool,
    },
    Error {
        query_id: Uuid,
        timestamp: DateTime<Utc>,
        message: String,
    },
}

impl StreamEvent {
    pub fn query_id(&self) -> Uuid {
        match self {
            Self::Start { query_id, .. }
            | Self::Progress { query_id, .. }
            | Self::Concepts { query_id, .. }
            | Self::Prerequisites { query_id, .. }
            | Self::Context { query_id, .. }
            | Self::Resources { query_id, .. }
            | Self::ExplanationChunk { query_id, .. }
            | Self::ExplanationComplete { query_id, .. }
            | Self::Complete { query_id, .. }
            | Self::Error { query_id, .. } => *query_id,
        }
    }

    /// Name used as the SSE `event:` field.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Progress { .. } => "progress",
            Self::Concepts { .. } => "concepts",
            Self::Prerequisites { .. } => "prerequisites",
            Self::Context { .. } => "context",
            Self::Resources { .. } => "resources",
            Self::ExplanationChunk { .. } => "explanation_chunk",
            Self::ExplanationComplete { .. } => "explanation_complete",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// Render as the wire envelope from spec §6:
    /// `{"type","query_id","timestamp","data":{...}}`.
    pub fn to_wire_json(&self) -> serde_json::Value {
        use serde_json::json;

        let data = match self {
            Self::Start { .. } => json!({}),
            Self::Progress { stage, message, current_step, total_steps, .. } => json!({
                "stage": stage,
                "message": message,
                "current_step": current_step,
                "total_steps": total_steps,
                "percentage": if *total_steps == 0 { 0 } else { (*current_step * 100) / *total_steps },
            }),
            Self::Concepts { concepts, .. } => json!({ "concepts": concepts, "count": concepts.len() }),
            Self::Prerequisites { path, .. } => json!({ "prerequisites": path, "count": path.len() }),
            Self::Context { chunks, .. } => json!({ "chunks": chunks, "count": chunks.len() }),
            Self::Resources { concept, resources, .. } => {
                json!({ "concept": concept, "resources": resources, "count": resources.len() })
            }
            Self::ExplanationChunk { text, .. } => json!({ "chunk": text, "total_chars": text.len() }),
            Self::ExplanationComplete { full_explanation, .. } => {
                json!({ "full_explanation": full_explanation, "total_length": full_explanation.len() })
            }
            Self::Complete { degraded, .. } => json!({ "success": true, "degraded": degraded }),
            Self::Error { message, .. } => json!({ "error": self.event_name(), "message": message }),
        };

        json!({
            "type": self.event_name(),
            "query_id": self.query_id(),
            "timestamp": self.timestamp(),
            "data": data,
        })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Start { timestamp, .. }
            | Self::Progress { timestamp, .. }
            | Self::Concepts { timestamp, .. }
            | Self::Prerequisites { timestamp, .. }
            | Self::Context { timestamp, .. }
            | Self::Resources { timestamp, .. }
            | Self::ExplanationChunk { timestamp, .. }
            | Self::ExplanationComplete { timestamp, .. }
            | Self::Complete { timestamp, .. }
            | Self::Error { timestamp, .. } => *timestamp,
        }
    }
}

/// Per-request sink handed to the pipeline; the pipeline never sees axum.
#[derive(Clone)]
pub struct QueryStreamSink {
    sender: mpsc::Sender<StreamEvent>,
    active: Arc<AtomicBool>,
}

impl QueryStreamSink {
    pub fn new(buffer_size: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(buffer_size);
        let sink = Self { sender: tx, active: Arc::new(AtomicBool::new(true)) };
        (sink, rx)
    }

    /// Send an event. A dropped receiver (client disconnected) or a prior
    /// terminal event both return `Err` without panicking.
    pub async fn send(&self, event: StreamEvent) -> Result<(), String> {
        if !self.active.load(Ordering::SeqCst) {
            return Err("stream already closed".to_string());
        }

        let terminal = event.is_terminal();
        let result = self
            .sender
            .send(event)
            .await
            .map_err(|e| format!("failed to send stream event: {e}"));

        if terminal || result.is_err() {
            self.active.store(false, Ordering::SeqCst);
        }
        result
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}
