//! Version information for the orchestrator crate.

/// Version string reported in `/api/v1/health` responses.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
