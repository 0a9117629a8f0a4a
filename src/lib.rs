//! Knowledge Graph Library
//!
//! This library provides tools to:
//! - Extract entities and co-occurrence relationships from document chunks
//! - Persist documents, chunks, entities and relationships in Neo4j
//!   (or an in-memory store for offline use)
//! - Cluster related entities into concept nodes using embeddings
//! - Track when entities were seen and query them by time window
//! - Search and traverse the graph for retrieval-augmented generation

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod graph;
pub mod metrics;
pub mod store;

// Re-export common types
pub use chunker::Chunker;
pub use config::Config;
pub use error::{Error, Result};
pub use graph::{
    ChunkInput, Entity, EntityExtractor, EntityType, GraphBuildStats, GraphQuery,
    KnowledgeGraphBuilder, QueryResult, RelationType, Relationship,
};
pub use store::{GraphStore, MemoryGraphStore, Neo4jGraphStore};

// Commands module uses re-exported types, so it must be declared after the re-exports
pub mod commands;
