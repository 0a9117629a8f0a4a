//! Knowledge graph construction
//!
//! Extraction, clustering and temporal bookkeeping, orchestrated by
//! [`KnowledgeGraphBuilder`] on top of a [`crate::store::GraphStore`].

pub mod builder;
pub mod clustering;
pub mod entity_extractor;
pub mod models;
pub mod query;
pub mod temporal;

pub use builder::{GraphBuildStats, KnowledgeGraphBuilder};
pub use clustering::ConceptClusterer;
pub use entity_extractor::EntityExtractor;
pub use models::{
    ChunkInput, ChunkNode, Concept, DocumentNode, Entity, EntityType, RelationType, Relationship,
};
pub use query::{GraphQuery, QueryResult};
pub use temporal::TemporalGraphBuilder;
