//! Graph persistence layer
//!
//! [`GraphStore`] is implemented by [`Neo4jGraphStore`] (Bolt) and
//! [`MemoryGraphStore`] (in-process, same semantics). Each call is its own
//! single-statement unit; nothing spans a whole pipeline run.

mod memory;
mod neo4j;

pub use memory::MemoryGraphStore;
pub use neo4j::Neo4jGraphStore;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::graph::models::{ChunkNode, Concept, DocumentNode, Entity, EntityType, RelationType, Relationship};
use crate::graph::query::{
    ConceptSummary, ConnectedEntity, EntityContext, EntityMention, EntitySummary, GraphNode,
    GraphPath, GraphStats, RelationshipSummary, TypeCount,
};

/// Deepest traversal accepted by neighbour, path and context queries.
pub const MAX_TRAVERSAL_DEPTH: usize = 6;

/// Relationship label linking a chunk to its document.
pub const FROM_DOCUMENT: &str = "FROM_DOCUMENT";
/// Relationship label linking a chunk to an entity it mentions.
pub const MENTIONS: &str = "MENTIONS";
/// Relationship label linking a concept to its member entities.
pub const CLUSTERS: &str = "CLUSTERS";

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Trivial round-trip; fails with `ConnectionError` when unreachable.
    async fn verify_connection(&self) -> Result<()>;

    /// Create uniqueness constraints and lookup indexes.
    async fn init_schema(&self) -> Result<()>;

    /// Upsert a document keyed by id.
    async fn create_document_node(&self, document: &DocumentNode) -> Result<()>;

    /// Upsert a chunk and link it FROM_DOCUMENT to its document.
    ///
    /// Text is truncated to the store's chunk text limit. Fails with
    /// `NodeNotFound` when the document does not exist.
    async fn create_chunk_node(&self, chunk: &ChunkNode) -> Result<()>;

    /// Upsert an entity keyed by id. Properties are overwritten, not merged.
    async fn create_entity_node(&self, entity: &Entity) -> Result<()>;

    /// Upsert an edge keyed by (source, target, type).
    ///
    /// Both endpoints must exist; otherwise `NodeNotFound` is returned and
    /// nothing is written.
    async fn create_relationship(&self, relationship: &Relationship) -> Result<()>;

    /// Link a chunk to an entity it mentions.
    async fn create_mention(&self, chunk_id: &str, entity_id: &str) -> Result<()>;

    /// Upsert a concept and CLUSTERS edges to each existing member entity.
    async fn create_concept_node(&self, concept: &Concept) -> Result<()>;

    /// Distinct nodes within `depth` hops of an entity, in either direction.
    async fn get_entity_neighbors(
        &self,
        entity_id: &str,
        relation_type: Option<RelationType>,
        depth: usize,
    ) -> Result<Vec<GraphNode>>;

    /// Simple paths of at most `max_length` hops, shortest first, capped.
    async fn find_paths(
        &self,
        source_id: &str,
        target_id: &str,
        max_length: usize,
    ) -> Result<Vec<GraphPath>>;

    /// Entities ranked by degree, keeping those with at least `min_connections`.
    async fn get_concept_clusters(
        &self,
        min_connections: usize,
        limit: usize,
    ) -> Result<Vec<ConnectedEntity>>;

    async fn get_graph_stats(&self) -> Result<GraphStats>;

    /// Entity properties plus neighbourhood sizes; `None` for unknown ids.
    async fn get_entity_context(&self, entity_id: &str, depth: usize)
        -> Result<Option<EntityContext>>;

    async fn list_entities(
        &self,
        entity_type: Option<EntityType>,
        limit: usize,
    ) -> Result<Vec<EntitySummary>>;

    /// Entity-to-entity relationships, heaviest first.
    async fn list_relationships(&self, limit: usize) -> Result<Vec<RelationshipSummary>>;

    async fn list_concepts(&self, limit: usize) -> Result<Vec<ConceptSummary>>;

    /// Entities whose name matches `query` (see [`crate::graph::query::names_match`]).
    /// An empty `types` slice matches every type.
    async fn search_entities(
        &self,
        query: &str,
        types: &[EntityType],
        limit: usize,
    ) -> Result<Vec<EntitySummary>>;

    /// Relationships where either endpoint name matches `query`.
    async fn search_relationships(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RelationshipSummary>>;

    /// Entity counts per type, most common first.
    async fn entity_type_histogram(&self) -> Result<Vec<TypeCount>>;

    /// Most mentioned entities.
    async fn top_entities(&self, limit: usize) -> Result<Vec<EntityMention>>;
}

/// Reject traversal depths outside `1..=MAX_TRAVERSAL_DEPTH`.
pub(crate) fn check_depth(what: &str, depth: usize) -> Result<()> {
    if depth == 0 || depth > MAX_TRAVERSAL_DEPTH {
        return Err(Error::InvalidArgument(format!(
            "{what} must be between 1 and {MAX_TRAVERSAL_DEPTH}, got {depth}"
        )));
    }
    Ok(())
}
