//! End-to-end graph construction and the query surface over it

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::clustering::ConceptClusterer;
use super::entity_extractor::EntityExtractor;
use super::models::{
    iso_timestamp, ChunkInput, ChunkNode, Concept, DocumentNode, Entity, EntityType,
    RelationType, Relationship,
};
use super::query::{
    ConnectedEntity, EntityContext, GraphMetricsReport, GraphNode, GraphPath, GraphQuery,
    GraphSearchResponse, GraphStats, QueryResult,
};
use super::temporal::TemporalGraphBuilder;
use crate::config::{Config, GraphSettings};
use crate::embeddings::{provider_from_settings, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::metrics;
use crate::store::{GraphStore, MemoryGraphStore, Neo4jGraphStore};

/// Maximum entities and relationships returned by `graph_search`.
pub const SEARCH_LIMIT: usize = 20;
/// Entities listed under `top_entities` in the metrics report.
pub const REPORT_TOP_ENTITIES: usize = 10;

/// Running totals for one `build_graph_from_chunks` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphBuildStats {
    pub entities_extracted: usize,
    pub relationships_extracted: usize,
    /// Clusters found, singletons included
    pub clusters_created: usize,
    /// Clusters with more than one member, persisted as Concept nodes
    pub concepts_created: usize,
    pub nodes_created: usize,
    pub relationships_created: usize,
    pub mentions_created: usize,
}

impl AddAssign<&GraphBuildStats> for GraphBuildStats {
    fn add_assign(&mut self, other: &GraphBuildStats) {
        self.entities_extracted += other.entities_extracted;
        self.relationships_extracted += other.relationships_extracted;
        self.clusters_created += other.clusters_created;
        self.concepts_created += other.concepts_created;
        self.nodes_created += other.nodes_created;
        self.relationships_created += other.relationships_created;
        self.mentions_created += other.mentions_created;
    }
}

/// Orchestrates extraction, persistence, clustering and temporal tracking.
///
/// Each store call is its own unit of work. Relationship and mention
/// failures are logged and skipped; any node write failure aborts the
/// build with that error, leaving earlier writes in place. Re-running a
/// build is idempotent for nodes.
pub struct KnowledgeGraphBuilder {
    store: Arc<dyn GraphStore>,
    extractor: EntityExtractor,
    clusterer: ConceptClusterer,
    temporal: Option<TemporalGraphBuilder>,
    settings: GraphSettings,
}

impl KnowledgeGraphBuilder {
    /// Create a builder over `store`, failing if the store is unreachable.
    pub async fn new(
        store: Arc<dyn GraphStore>,
        settings: GraphSettings,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Self> {
        store.verify_connection().await?;
        info!("Knowledge graph builder using {} store", store.backend_name());

        let clusterer = if settings.enable_clustering {
            ConceptClusterer::with_cache_capacity(embedder, settings.embedding_cache_capacity)
        } else {
            ConceptClusterer::disabled()
        };
        let temporal = if settings.enable_temporal {
            Some(TemporalGraphBuilder::new(settings.temporal_window()?))
        } else {
            None
        };

        Ok(Self {
            store,
            extractor: EntityExtractor::new(),
            clusterer,
            temporal,
            settings,
        })
    }

    /// Build from config: Neo4j unless offline mode selects the memory store.
    pub async fn connect(config: &Config) -> Result<Self> {
        let store: Arc<dyn GraphStore> = if config.offline_mode {
            Arc::new(MemoryGraphStore::new(&config.graph))
        } else {
            Arc::new(Neo4jGraphStore::connect(&config.neo4j, &config.graph).await?)
        };
        let embedder = if config.graph.enable_clustering {
            provider_from_settings(&config.embedding)?
        } else {
            None
        };
        Self::new(store, config.graph.clone(), embedder).await
    }

    /// Replace the default extractor.
    pub fn with_extractor(mut self, extractor: EntityExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn extractor(&self) -> &EntityExtractor {
        &self.extractor
    }

    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    /// Temporal index, when temporal tracking is enabled.
    pub fn temporal(&self) -> Option<&TemporalGraphBuilder> {
        self.temporal.as_ref()
    }

    pub async fn init_schema(&self) -> Result<()> {
        self.store.init_schema().await
    }

    /// Ingest a document's chunks in order.
    pub async fn build_graph_from_chunks(
        &mut self,
        chunks: &[ChunkInput],
        document_id: &str,
        document_name: &str,
    ) -> Result<GraphBuildStats> {
        let document = DocumentNode::new(document_id, document_name);
        self.build_graph_from_document(&document, chunks).await
    }

    /// Same as [`Self::build_graph_from_chunks`] with a fully described document.
    pub async fn build_graph_from_document(
        &mut self,
        document: &DocumentNode,
        chunks: &[ChunkInput],
    ) -> Result<GraphBuildStats> {
        let started = Instant::now();
        let result = self.run_build(document, chunks).await;
        metrics::record_build(started.elapsed(), result.is_ok());

        match &result {
            Ok(stats) => info!(
                "Graph built for {} with {} nodes and {} relationships",
                document.id, stats.nodes_created, stats.relationships_created
            ),
            Err(e) => warn!("Graph build for {} aborted: {}", document.id, e),
        }
        result
    }

    async fn run_build(
        &mut self,
        document: &DocumentNode,
        chunks: &[ChunkInput],
    ) -> Result<GraphBuildStats> {
        debug!("Building graph for {} from {} chunks", document.id, chunks.len());
        let mut stats = GraphBuildStats::default();

        self.store.create_document_node(document).await?;
        stats.nodes_created += 1;
        metrics::record_node_created("document");

        // Entities seen in this call, merged by id, in first-seen order
        let mut seen: HashMap<String, Entity> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for (idx, chunk) in chunks.iter().enumerate() {
            let chunk_node = ChunkNode::new(&document.id, idx, chunk.text.as_str());
            self.store.create_chunk_node(&chunk_node).await?;
            stats.nodes_created += 1;
            metrics::record_node_created("chunk");

            let (entities, relationships) = self.extractor.extract(&chunk.text);
            stats.entities_extracted += entities.len();
            stats.relationships_extracted += relationships.len();

            for entity in entities {
                if let Some(temporal) = self.temporal.as_mut() {
                    let at = iso_timestamp(entity.last_seen);
                    temporal.add_temporal_entity(entity.clone(), Some(&at));
                }

                let merged = match seen.entry(entity.id.clone()) {
                    Entry::Occupied(mut slot) => {
                        slot.get_mut().record_mention(&entity);
                        slot.get().clone()
                    }
                    Entry::Vacant(slot) => {
                        order.push(entity.id.clone());
                        stats.nodes_created += 1;
                        slot.insert(entity).clone()
                    }
                };

                self.store.create_entity_node(&merged).await?;
                metrics::record_node_created("entity");

                let linked = self.store.create_mention(&chunk_node.id, &merged.id).await;
                if log_edge_result("mention", &chunk_node.id, &merged.id, linked) {
                    stats.mentions_created += 1;
                }
            }

            stats.relationships_created += self.add_relationships(&relationships).await;
        }

        if self.settings.enable_clustering && !order.is_empty() {
            let union: Vec<Entity> = order.iter().filter_map(|id| seen.get(id).cloned()).collect();
            let clusters = self
                .clusterer
                .cluster_entities(&union, self.settings.similarity_threshold)
                .await;
            stats.clusters_created = clusters.len();

            for (idx, cluster) in clusters.iter().enumerate() {
                if cluster.len() < 2 {
                    continue;
                }
                let concept = Concept::from_cluster(&document.id, idx, cluster);
                self.store.create_concept_node(&concept).await?;
                debug!("Created concept: {}", concept.name);
                stats.concepts_created += 1;
                stats.nodes_created += 1;
                metrics::record_node_created("concept");
            }
        }

        Ok(stats)
    }

    /// Persist relationships one by one; returns how many were written.
    pub async fn add_relationships(&self, relationships: &[Relationship]) -> usize {
        let mut created = 0;
        for rel in relationships {
            let result = self.store.create_relationship(rel).await;
            if log_edge_result("relationship", &rel.source_id, &rel.target_id, result) {
                created += 1;
            }
        }
        created
    }

    pub async fn query_graph(&self, query: GraphQuery) -> Result<QueryResult> {
        match query {
            GraphQuery::Entities { entity_type, limit } => Ok(QueryResult::Entities(
                self.store.list_entities(entity_type, limit).await?,
            )),
            GraphQuery::Relationships { limit } => Ok(QueryResult::Relationships(
                self.store.list_relationships(limit).await?,
            )),
            GraphQuery::Paths {
                source_id,
                target_id,
                max_length,
            } => Ok(QueryResult::Paths(
                self.store
                    .find_paths(&source_id, &target_id, max_length)
                    .await?,
            )),
            GraphQuery::Concepts { limit } => Ok(QueryResult::Concepts(
                self.store.list_concepts(limit).await?,
            )),
        }
    }

    /// Text search over entity names and relationship endpoints.
    pub async fn graph_search(
        &self,
        query: &str,
        entity_types: Option<&[EntityType]>,
    ) -> Result<GraphSearchResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidArgument("search query is empty".into()));
        }

        let types = entity_types.unwrap_or(&[]);
        let entities = self.store.search_entities(query, types, SEARCH_LIMIT).await?;
        let relationships = self.store.search_relationships(query, SEARCH_LIMIT).await?;
        Ok(GraphSearchResponse::new(query, entities, relationships))
    }

    pub async fn get_entity_context(
        &self,
        entity_id: &str,
        depth: usize,
    ) -> Result<Option<EntityContext>> {
        self.store.get_entity_context(entity_id, depth).await
    }

    pub async fn get_entity_neighbors(
        &self,
        entity_id: &str,
        relation_type: Option<RelationType>,
        depth: usize,
    ) -> Result<Vec<GraphNode>> {
        self.store
            .get_entity_neighbors(entity_id, relation_type, depth)
            .await
    }

    pub async fn find_paths(
        &self,
        source_id: &str,
        target_id: &str,
        max_length: usize,
    ) -> Result<Vec<GraphPath>> {
        self.store.find_paths(source_id, target_id, max_length).await
    }

    pub async fn get_concept_clusters(
        &self,
        min_connections: usize,
        limit: usize,
    ) -> Result<Vec<ConnectedEntity>> {
        self.store
            .get_concept_clusters(min_connections, limit)
            .await
    }

    pub async fn get_graph_stats(&self) -> Result<GraphStats> {
        self.store.get_graph_stats().await
    }

    /// Type histogram and most mentioned entities in one report.
    pub async fn export_graph_metrics(&self) -> Result<GraphMetricsReport> {
        let stats = self.store.get_graph_stats().await?;
        let entity_types = self.store.entity_type_histogram().await?;
        let top_entities = self.store.top_entities(REPORT_TOP_ENTITIES).await?;

        Ok(GraphMetricsReport {
            total_entities: stats.entity_count,
            total_relationships: stats.total_relationships,
            total_documents: stats.document_count,
            entity_types,
            top_entities,
            generated_at: Utc::now(),
        })
    }

    /// Temporal range query; empty when temporal tracking is disabled.
    pub fn query_temporal_entities(
        &self,
        entity_type: EntityType,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Vec<Entity> {
        self.temporal
            .as_ref()
            .map(|t| t.query_temporal_entities(entity_type, start, end))
            .unwrap_or_default()
    }

    pub fn get_entity_timeline(&self, entity_id: &str) -> Vec<(String, String)> {
        self.temporal
            .as_ref()
            .map(|t| t.get_entity_timeline(entity_id))
            .unwrap_or_default()
    }
}

/// Log a failed edge write and report whether it succeeded.
fn log_edge_result(kind: &str, source: &str, target: &str, result: Result<()>) -> bool {
    match result {
        Ok(()) => {
            metrics::record_relationship_write(kind, true);
            true
        }
        Err(e) => {
            metrics::record_relationship_write(kind, false);
            if e.is_recoverable() {
                debug!("Skipping {} {} -> {}: {}", kind, source, target, e);
            } else {
                warn!("Failed to write {} {} -> {}: {}", kind, source, target, e);
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct ConstantEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ConstantEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.5; 8])
        }

        fn dimension(&self) -> usize {
            8
        }
    }

    async fn builder_with(
        settings: GraphSettings,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> (KnowledgeGraphBuilder, Arc<MemoryGraphStore>) {
        let store = Arc::new(MemoryGraphStore::new(&settings));
        let builder = KnowledgeGraphBuilder::new(store.clone(), settings, embedder)
            .await
            .unwrap();
        (builder, store)
    }

    async fn builder() -> (KnowledgeGraphBuilder, Arc<MemoryGraphStore>) {
        builder_with(GraphSettings::default(), None).await
    }

    #[tokio::test]
    async fn trivial_chunks_still_create_document_and_chunks() {
        let (mut builder, _) = builder().await;
        let chunks = vec![ChunkInput::new("A"), ChunkInput::new("B")];

        let stats = builder
            .build_graph_from_chunks(&chunks, "doc1", "Doc One")
            .await
            .unwrap();

        assert!(stats.nodes_created >= 3);
        assert_eq!(stats.entities_extracted, 0);
        assert_eq!(stats.relationships_created, 0);

        let graph = builder.get_graph_stats().await.unwrap();
        assert_eq!(graph.document_count, 1);
        assert_eq!(graph.chunk_count, 2);
    }

    #[tokio::test]
    async fn entities_relationships_and_mentions_are_persisted() {
        let (mut builder, store) = builder().await;
        let chunks = vec![ChunkInput::new("Alice works at Google.")];

        let stats = builder
            .build_graph_from_chunks(&chunks, "doc1", "Doc One")
            .await
            .unwrap();

        assert_eq!(stats.entities_extracted, 2);
        assert_eq!(stats.relationships_extracted, 1);
        assert_eq!(stats.relationships_created, 1);
        assert_eq!(stats.mentions_created, 2);
        // document + chunk + two entities
        assert_eq!(stats.nodes_created, 4);

        let google = Entity::generate_id("Google", EntityType::Organization);
        assert_eq!(store.entity(&google).await.unwrap().name, "Google");
    }

    #[tokio::test]
    async fn repeated_mentions_across_chunks_are_aggregated() {
        let (mut builder, store) = builder().await;
        let chunks = vec![
            ChunkInput::new("Google announced a model."),
            ChunkInput::new("the team at Google shipped it."),
        ];

        let stats = builder
            .build_graph_from_chunks(&chunks, "doc1", "Doc One")
            .await
            .unwrap();
        assert_eq!(stats.entities_extracted, 2);
        assert_eq!(stats.mentions_created, 2);

        let google = Entity::generate_id("Google", EntityType::Organization);
        assert_eq!(store.entity(&google).await.unwrap().mention_count, 2);
    }

    #[tokio::test]
    async fn identical_embeddings_form_one_concept() {
        let (mut builder, _) =
            builder_with(GraphSettings::default(), Some(Arc::new(ConstantEmbedder))).await;
        let chunks = vec![ChunkInput::new("Rust and Python run on Kubernetes.")];

        let stats = builder
            .build_graph_from_chunks(&chunks, "doc1", "Doc One")
            .await
            .unwrap();

        assert_eq!(stats.clusters_created, 1);
        assert_eq!(stats.concepts_created, 1);

        let QueryResult::Concepts(concepts) = builder
            .query_graph(GraphQuery::Concepts { limit: 10 })
            .await
            .unwrap()
        else {
            panic!("expected concepts");
        };
        assert_eq!(concepts.len(), 1);
        assert_eq!(concepts[0].entity_count, 3);
        assert_eq!(concepts[0].id, "concept_doc1_0");
    }

    #[tokio::test]
    async fn singleton_clusters_are_not_promoted() {
        let (mut builder, _) = builder().await;
        let chunks = vec![ChunkInput::new("Rust and Python run on Kubernetes.")];

        let stats = builder
            .build_graph_from_chunks(&chunks, "doc1", "Doc One")
            .await
            .unwrap();

        assert_eq!(stats.clusters_created, 3);
        assert_eq!(stats.concepts_created, 0);
    }

    #[tokio::test]
    async fn clustering_can_be_disabled() {
        let settings = GraphSettings {
            enable_clustering: false,
            ..GraphSettings::default()
        };
        let (mut builder, _) = builder_with(settings, Some(Arc::new(ConstantEmbedder))).await;
        let chunks = vec![ChunkInput::new("Rust and Python run on Kubernetes.")];

        let stats = builder
            .build_graph_from_chunks(&chunks, "doc1", "Doc One")
            .await
            .unwrap();
        assert_eq!(stats.clusters_created, 0);
        assert_eq!(stats.concepts_created, 0);
    }

    #[tokio::test]
    async fn dangling_relationships_are_skipped() {
        let (builder, store) = builder().await;
        let alice = Entity::new("Alice", EntityType::Person);
        store.create_entity_node(&alice).await.unwrap();

        let dangling = Relationship::new(&alice.id, "missing", RelationType::References);
        assert_eq!(builder.add_relationships(&[dangling]).await, 0);

        let bob = Entity::new("Bob", EntityType::Person);
        store.create_entity_node(&bob).await.unwrap();
        let valid = Relationship::new(&alice.id, &bob.id, RelationType::RelatesTo);
        assert_eq!(builder.add_relationships(&[valid]).await, 1);
    }

    #[tokio::test]
    async fn temporal_index_tracks_extracted_entities() {
        let (mut builder, _) = builder().await;
        builder
            .build_graph_from_chunks(&[ChunkInput::new("Meetings in Berlin.")], "d", "D")
            .await
            .unwrap();

        let berlin = Entity::generate_id("Berlin", EntityType::Location);
        assert_eq!(builder.get_entity_timeline(&berlin).len(), 1);
        assert_eq!(
            builder
                .query_temporal_entities(EntityType::Location, None, None)
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn temporal_tracking_can_be_disabled() {
        let settings = GraphSettings {
            enable_temporal: false,
            ..GraphSettings::default()
        };
        let (mut builder, _) = builder_with(settings, None).await;
        builder
            .build_graph_from_chunks(&[ChunkInput::new("Meetings in Berlin.")], "d", "D")
            .await
            .unwrap();

        assert!(builder.temporal().is_none());
        let berlin = Entity::generate_id("Berlin", EntityType::Location);
        assert!(builder.get_entity_timeline(&berlin).is_empty());
    }

    #[tokio::test]
    async fn search_rejects_empty_query() {
        let (builder, _) = builder().await;
        assert!(matches!(
            builder.graph_search("  ", None).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn metrics_report_reflects_graph() {
        let (mut builder, _) = builder().await;
        builder
            .build_graph_from_chunks(
                &[ChunkInput::new("Alice works at Google. Google uses Rust.")],
                "doc1",
                "Doc One",
            )
            .await
            .unwrap();

        let report = builder.export_graph_metrics().await.unwrap();
        assert_eq!(report.total_documents, 1);
        assert_eq!(report.total_entities, 3);
        assert_eq!(
            report.entity_types.iter().map(|t| t.count).sum::<usize>(),
            3
        );
        assert!(report.top_entities.len() <= REPORT_TOP_ENTITIES);
    }
}
