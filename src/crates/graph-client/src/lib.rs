//! Client for the prerequisite concept graph.
//!
//! The graph store itself (Neo4j) is an external collaborator; this crate
//! owns only the query shapes, depth/size bounds, and connection discipline
//! that the orchestrator relies on.

pub mod error;
pub mod neo4j;
pub mod types;

pub use error::{GraphClientError, Result};
pub use types::{Concept, ConceptDetail, ConceptType, NewConcept, MAX_PATH_NODES, MAX_TRAVERSAL_DEPTH};

use async_trait::async_trait;

/// Everything the orchestrator needs from the prerequisite graph.
///
/// Implementations must make `resolve_ids` and `prerequisite_path` single
/// batch round trips rather than one query per name -- that N+1 pattern is
/// the dominant source of path-lookup latency.
#[async_trait]
pub trait GraphClient: Send + Sync {
    /// Resolve free-text concept names to stable ids. Unknown names are
    /// silently dropped; the result has no ordering guarantee.
    async fn resolve_ids(&self, names: &[String]) -> Result<Vec<String>>;

    /// Union of `target_ids` and all ancestors reachable via
    /// `PREREQUISITE_FOR` edges, bounded to [`MAX_TRAVERSAL_DEPTH`] hops and
    /// [`MAX_PATH_NODES`] ancestors. Ordered by type (target before
    /// prerequisite) then name.
    async fn prerequisite_path(&self, target_ids: &[String]) -> Result<Vec<Concept>>;

    /// Depth-1 neighborhood of a single concept, looked up by id or name.
    async fn concept_detail(&self, id_or_name: &str) -> Result<ConceptDetail>;

    /// All concepts, ordered by name.
    async fn all_concepts(&self) -> Result<Vec<Concept>>;

    /// Create or update a concept (idempotent merge on id).
    async fn create_concept(&self, concept: NewConcept) -> Result<Concept>;

    /// Create a `PREREQUISITE_FOR` edge from `prereq_id` to `concept_id`
    /// (idempotent merge). Rejects writes that would introduce a cycle.
    async fn create_prerequisite(&self, concept_id: &str, prereq_id: &str) -> Result<()>;

    /// Case-insensitive existence check by name.
    async fn exists_by_name(&self, name: &str) -> Result<bool>;
}
