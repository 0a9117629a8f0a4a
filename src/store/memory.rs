//! In-process graph store for offline mode and tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{check_depth, GraphStore, CLUSTERS, FROM_DOCUMENT, MENTIONS};
use crate::config::GraphSettings;
use crate::error::{Error, Result};
use crate::graph::models::{
    truncate_chars, ChunkNode, Concept, DocumentNode, Entity, EntityType, RelationType,
    Relationship,
};
use crate::graph::query::{
    names_match, ConceptSummary, ConnectedEntity, EntityContext, EntityMention, EntitySummary,
    GraphNode, GraphPath, GraphStats, RelationshipSummary, TypeCount,
};

/// (source id, target id, relationship label)
type EdgeKey = (String, String, &'static str);

#[derive(Debug, Default)]
struct MemoryGraph {
    documents: BTreeMap<String, DocumentNode>,
    chunks: BTreeMap<String, ChunkNode>,
    entities: BTreeMap<String, Entity>,
    concepts: BTreeMap<String, Concept>,
    /// Entity-to-entity edges carry their relationship; structural edges do not.
    edges: BTreeMap<EdgeKey, Option<Relationship>>,
    adjacency: HashMap<String, BTreeSet<EdgeKey>>,
}

impl MemoryGraph {
    fn insert_edge(&mut self, key: EdgeKey, relationship: Option<Relationship>) {
        self.adjacency
            .entry(key.0.clone())
            .or_default()
            .insert(key.clone());
        self.adjacency
            .entry(key.1.clone())
            .or_default()
            .insert(key.clone());
        self.edges.insert(key, relationship);
    }

    fn node(&self, id: &str) -> Option<GraphNode> {
        let (name, label) = if let Some(e) = self.entities.get(id) {
            (Some(e.name.clone()), "Entity")
        } else if let Some(c) = self.concepts.get(id) {
            (Some(c.name.clone()), "Concept")
        } else if self.chunks.contains_key(id) {
            (None, "Chunk")
        } else if let Some(d) = self.documents.get(id) {
            (Some(d.name.clone()), "Document")
        } else {
            return None;
        };

        Some(GraphNode {
            id: id.to_string(),
            name,
            labels: vec![label.to_string()],
        })
    }

    fn node_name(&self, id: &str) -> Option<&str> {
        if let Some(e) = self.entities.get(id) {
            Some(&e.name)
        } else if let Some(c) = self.concepts.get(id) {
            Some(&c.name)
        } else {
            self.documents.get(id).map(|d| d.name.as_str())
        }
    }

    /// `(other endpoint, edge)` for every edge touching `id`.
    fn incident<'a>(
        &'a self,
        id: &'a str,
        label: Option<&'a str>,
    ) -> impl Iterator<Item = (&'a str, &'a EdgeKey)> + 'a {
        self.adjacency
            .get(id)
            .into_iter()
            .flatten()
            .filter(move |key| label.map_or(true, |l| key.2 == l))
            .map(move |key| {
                let other = if key.0 == id { &key.1 } else { &key.0 };
                (other.as_str(), key)
            })
    }

    /// BFS hop distances from `start`, in discovery order (start first).
    fn reachable(&self, start: &str, label: Option<&str>, depth: usize) -> Vec<(String, usize)> {
        let mut seen: HashSet<String> = HashSet::from([start.to_string()]);
        let mut order = vec![(start.to_string(), 0)];
        let mut frontier = vec![start.to_string()];

        for hop in 1..=depth {
            let mut next = Vec::new();
            for id in &frontier {
                for (other, _) in self.incident(id, label) {
                    if seen.insert(other.to_string()) {
                        order.push((other.to_string(), hop));
                        next.push(other.to_string());
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        order
    }

    fn relationship_summary(&self, rel: &Relationship) -> RelationshipSummary {
        RelationshipSummary {
            source_id: rel.source_id.clone(),
            source_name: self.node_name(&rel.source_id).unwrap_or_default().to_string(),
            target_id: rel.target_id.clone(),
            target_name: self.node_name(&rel.target_id).unwrap_or_default().to_string(),
            relation_type: rel.relation_type,
            weight: rel.weight,
            confidence: rel.confidence,
        }
    }

    fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.edges.values().flatten()
    }
}

fn by_mentions(a: &Entity, b: &Entity) -> std::cmp::Ordering {
    b.mention_count
        .cmp(&a.mention_count)
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

fn by_weight(a: &RelationshipSummary, b: &RelationshipSummary) -> std::cmp::Ordering {
    b.weight
        .total_cmp(&a.weight)
        .then_with(|| a.source_id.cmp(&b.source_id))
        .then_with(|| a.target_id.cmp(&b.target_id))
}

/// Graph store kept entirely in memory.
///
/// Mirrors the Neo4j store's semantics: upserts keyed by id, edge upserts
/// keyed by (source, target, type), missing endpoints rejected.
#[derive(Debug)]
pub struct MemoryGraphStore {
    graph: RwLock<MemoryGraph>,
    chunk_text_limit: usize,
    max_path_results: usize,
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new(&GraphSettings::default())
    }
}

impl MemoryGraphStore {
    pub fn new(settings: &GraphSettings) -> Self {
        Self {
            graph: RwLock::new(MemoryGraph::default()),
            chunk_text_limit: settings.chunk_text_limit,
            max_path_results: settings.max_path_results,
        }
    }

    /// Stored copy of an entity.
    pub async fn entity(&self, entity_id: &str) -> Option<Entity> {
        self.graph.read().await.entities.get(entity_id).cloned()
    }

    /// Stored copy of a chunk.
    pub async fn chunk(&self, chunk_id: &str) -> Option<ChunkNode> {
        self.graph.read().await.chunks.get(chunk_id).cloned()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn verify_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn init_schema(&self) -> Result<()> {
        debug!("In-memory store needs no schema");
        Ok(())
    }

    async fn create_document_node(&self, document: &DocumentNode) -> Result<()> {
        let mut graph = self.graph.write().await;
        graph
            .documents
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn create_chunk_node(&self, chunk: &ChunkNode) -> Result<()> {
        let mut graph = self.graph.write().await;
        if !graph.documents.contains_key(&chunk.document_id) {
            return Err(Error::NodeNotFound(format!(
                "document {}",
                chunk.document_id
            )));
        }

        let mut stored = chunk.clone();
        stored.text = truncate_chars(&chunk.text, self.chunk_text_limit).to_string();
        graph.chunks.insert(chunk.id.clone(), stored);
        graph.insert_edge(
            (chunk.id.clone(), chunk.document_id.clone(), FROM_DOCUMENT),
            None,
        );
        Ok(())
    }

    async fn create_entity_node(&self, entity: &Entity) -> Result<()> {
        let mut graph = self.graph.write().await;
        graph.entities.insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    async fn create_relationship(&self, relationship: &Relationship) -> Result<()> {
        let mut graph = self.graph.write().await;
        for id in [&relationship.source_id, &relationship.target_id] {
            if !graph.entities.contains_key(id) {
                return Err(Error::NodeNotFound(format!("entity {id}")));
            }
        }

        graph.insert_edge(
            (
                relationship.source_id.clone(),
                relationship.target_id.clone(),
                relationship.relation_type.as_str(),
            ),
            Some(relationship.clone()),
        );
        Ok(())
    }

    async fn create_mention(&self, chunk_id: &str, entity_id: &str) -> Result<()> {
        let mut graph = self.graph.write().await;
        if !graph.chunks.contains_key(chunk_id) {
            return Err(Error::NodeNotFound(format!("chunk {chunk_id}")));
        }
        if !graph.entities.contains_key(entity_id) {
            return Err(Error::NodeNotFound(format!("entity {entity_id}")));
        }

        graph.insert_edge((chunk_id.to_string(), entity_id.to_string(), MENTIONS), None);
        Ok(())
    }

    async fn create_concept_node(&self, concept: &Concept) -> Result<()> {
        let mut graph = self.graph.write().await;
        graph.concepts.insert(concept.id.clone(), concept.clone());

        let members: Vec<String> = concept
            .entity_ids
            .iter()
            .filter(|id| graph.entities.contains_key(*id))
            .cloned()
            .collect();
        for entity_id in members {
            graph.insert_edge((concept.id.clone(), entity_id, CLUSTERS), None);
        }
        Ok(())
    }

    async fn get_entity_neighbors(
        &self,
        entity_id: &str,
        relation_type: Option<RelationType>,
        depth: usize,
    ) -> Result<Vec<GraphNode>> {
        check_depth("depth", depth)?;
        let graph = self.graph.read().await;
        if !graph.entities.contains_key(entity_id) {
            return Ok(Vec::new());
        }

        let label = relation_type.map(|t| t.as_str());
        Ok(graph
            .reachable(entity_id, label, depth)
            .into_iter()
            .skip(1)
            .filter_map(|(id, _)| graph.node(&id))
            .collect())
    }

    async fn find_paths(
        &self,
        source_id: &str,
        target_id: &str,
        max_length: usize,
    ) -> Result<Vec<GraphPath>> {
        check_depth("max_length", max_length)?;
        let graph = self.graph.read().await;
        if graph.node(source_id).is_none() || graph.node(target_id).is_none() {
            return Ok(Vec::new());
        }

        // Hop distance to the target bounds every extension.
        let to_target: HashMap<String, usize> = graph
            .reachable(target_id, None, max_length)
            .into_iter()
            .collect();
        if !to_target.contains_key(source_id) {
            return Ok(Vec::new());
        }

        let mut found: Vec<Vec<String>> = Vec::new();
        let mut frontier: Vec<Vec<String>> = vec![vec![source_id.to_string()]];

        'levels: for hops in 1..=max_length {
            let mut next = Vec::new();
            for path in &frontier {
                let Some(last) = path.last() else { continue };
                for (other, _) in graph.incident(last, None) {
                    let within_budget = to_target
                        .get(other)
                        .map_or(false, |d| hops + d <= max_length);
                    if !within_budget || path.iter().any(|id| id == other) {
                        continue;
                    }
                    let mut extended = path.clone();
                    extended.push(other.to_string());
                    if other == target_id {
                        found.push(extended);
                        if found.len() >= self.max_path_results {
                            break 'levels;
                        }
                    } else {
                        next.push(extended);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        Ok(found
            .into_iter()
            .map(|ids| GraphPath {
                nodes: ids.iter().filter_map(|id| graph.node(id)).collect(),
            })
            .collect())
    }

    async fn get_concept_clusters(
        &self,
        min_connections: usize,
        limit: usize,
    ) -> Result<Vec<ConnectedEntity>> {
        let graph = self.graph.read().await;

        let mut ranked: Vec<ConnectedEntity> = graph
            .entities
            .values()
            .filter_map(|entity| {
                let mut degree = 0;
                let mut neighbors = BTreeSet::new();
                for (other, _) in graph.incident(&entity.id, None) {
                    degree += 1;
                    if let Some(name) = graph.node_name(other) {
                        neighbors.insert(name.to_string());
                    }
                }
                (degree > 0 && degree >= min_connections).then(|| ConnectedEntity {
                    entity_id: entity.id.clone(),
                    entity_name: entity.name.clone(),
                    connections: degree,
                    neighbors: neighbors.into_iter().collect(),
                })
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.connections
                .cmp(&a.connections)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn get_graph_stats(&self) -> Result<GraphStats> {
        let graph = self.graph.read().await;
        Ok(GraphStats {
            total_nodes: graph.documents.len()
                + graph.chunks.len()
                + graph.entities.len()
                + graph.concepts.len(),
            total_relationships: graph.edges.len(),
            document_count: graph.documents.len(),
            entity_count: graph.entities.len(),
            chunk_count: graph.chunks.len(),
            concept_count: graph.concepts.len(),
        })
    }

    async fn get_entity_context(
        &self,
        entity_id: &str,
        depth: usize,
    ) -> Result<Option<EntityContext>> {
        check_depth("depth", depth)?;
        let graph = self.graph.read().await;
        let Some(entity) = graph.entities.get(entity_id) else {
            return Ok(None);
        };

        let reachable = graph.reachable(entity_id, None, depth);

        // An edge lies on a walk of at most `depth` hops iff one endpoint is
        // closer than `depth`.
        let mut edges: HashSet<&EdgeKey> = HashSet::new();
        for (id, hops) in &reachable {
            if *hops < depth {
                edges.extend(graph.incident(id, None).map(|(_, key)| key));
            }
        }

        Ok(Some(EntityContext {
            id: entity.id.clone(),
            name: entity.name.clone(),
            entity_type: entity.entity_type,
            confidence: entity.confidence,
            mention_count: entity.mention_count,
            description: entity.description.clone(),
            properties: entity.properties.clone(),
            neighbors_count: reachable.len() - 1,
            relationships_count: edges.len(),
        }))
    }

    async fn list_entities(
        &self,
        entity_type: Option<EntityType>,
        limit: usize,
    ) -> Result<Vec<EntitySummary>> {
        let graph = self.graph.read().await;
        let mut entities: Vec<&Entity> = graph
            .entities
            .values()
            .filter(|e| entity_type.map_or(true, |t| e.entity_type == t))
            .collect();
        entities.sort_by(|a, b| by_mentions(a, b));
        Ok(entities
            .into_iter()
            .take(limit)
            .map(EntitySummary::from)
            .collect())
    }

    async fn list_relationships(&self, limit: usize) -> Result<Vec<RelationshipSummary>> {
        let graph = self.graph.read().await;
        let mut relationships: Vec<RelationshipSummary> = graph
            .relationships()
            .map(|r| graph.relationship_summary(r))
            .collect();
        relationships.sort_by(by_weight);
        relationships.truncate(limit);
        Ok(relationships)
    }

    async fn list_concepts(&self, limit: usize) -> Result<Vec<ConceptSummary>> {
        let graph = self.graph.read().await;
        let mut concepts: Vec<ConceptSummary> = graph
            .concepts
            .values()
            .map(|c| ConceptSummary {
                id: c.id.clone(),
                name: c.name.clone(),
                entity_count: c.entity_count,
                entity_names: c
                    .entity_ids
                    .iter()
                    .filter_map(|id| graph.entities.get(id).map(|e| e.name.clone()))
                    .collect(),
            })
            .collect();
        concepts.sort_by(|a, b| {
            b.entity_count
                .cmp(&a.entity_count)
                .then_with(|| a.id.cmp(&b.id))
        });
        concepts.truncate(limit);
        Ok(concepts)
    }

    async fn search_entities(
        &self,
        query: &str,
        types: &[EntityType],
        limit: usize,
    ) -> Result<Vec<EntitySummary>> {
        let graph = self.graph.read().await;
        let mut matches: Vec<&Entity> = graph
            .entities
            .values()
            .filter(|e| types.is_empty() || types.contains(&e.entity_type))
            .filter(|e| names_match(&e.name, query))
            .collect();
        matches.sort_by(|a, b| by_mentions(a, b));
        Ok(matches
            .into_iter()
            .take(limit)
            .map(EntitySummary::from)
            .collect())
    }

    async fn search_relationships(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RelationshipSummary>> {
        let graph = self.graph.read().await;
        let mut matches: Vec<RelationshipSummary> = graph
            .relationships()
            .map(|r| graph.relationship_summary(r))
            .filter(|r| names_match(&r.source_name, query) || names_match(&r.target_name, query))
            .collect();
        matches.sort_by(by_weight);
        matches.truncate(limit);
        Ok(matches)
    }

    async fn entity_type_histogram(&self) -> Result<Vec<TypeCount>> {
        let graph = self.graph.read().await;
        let mut counts: BTreeMap<EntityType, usize> = BTreeMap::new();
        for entity in graph.entities.values() {
            *counts.entry(entity.entity_type).or_default() += 1;
        }

        let mut histogram: Vec<TypeCount> = counts
            .into_iter()
            .map(|(entity_type, count)| TypeCount { entity_type, count })
            .collect();
        histogram.sort_by(|a, b| b.count.cmp(&a.count).then(a.entity_type.cmp(&b.entity_type)));
        Ok(histogram)
    }

    async fn top_entities(&self, limit: usize) -> Result<Vec<EntityMention>> {
        let graph = self.graph.read().await;
        let mut entities: Vec<&Entity> = graph.entities.values().collect();
        entities.sort_by(|a, b| by_mentions(a, b));
        Ok(entities
            .into_iter()
            .take(limit)
            .map(|e| EntityMention {
                id: e.id.clone(),
                name: e.name.clone(),
                entity_type: e.entity_type,
                mention_count: e.mention_count,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_store() -> (MemoryGraphStore, Vec<Entity>) {
        let store = MemoryGraphStore::default();
        store
            .create_document_node(&DocumentNode::new("doc1", "Doc One"))
            .await
            .unwrap();
        store
            .create_chunk_node(&ChunkNode::new("doc1", 0, "Alice works at Google in London."))
            .await
            .unwrap();

        let alice = Entity::new("Alice", EntityType::Person);
        let google = Entity::new("Google", EntityType::Organization);
        let london = Entity::new("London", EntityType::Location);
        for entity in [&alice, &google, &london] {
            store.create_entity_node(entity).await.unwrap();
            store.create_mention("doc1_chunk_0", &entity.id).await.unwrap();
        }

        store
            .create_relationship(
                &Relationship::new(&alice.id, &google.id, RelationType::CoOccurs).with_weight(0.9),
            )
            .await
            .unwrap();
        store
            .create_relationship(
                &Relationship::new(&google.id, &london.id, RelationType::CoOccurs).with_weight(0.5),
            )
            .await
            .unwrap();

        (store, vec![alice, google, london])
    }

    #[tokio::test]
    async fn chunk_requires_document_and_truncates_text() {
        let mut settings = GraphSettings::default();
        settings.chunk_text_limit = 5;
        let store = MemoryGraphStore::new(&settings);

        let orphan = ChunkNode::new("missing", 0, "text");
        assert!(matches!(
            store.create_chunk_node(&orphan).await,
            Err(Error::NodeNotFound(_))
        ));

        store
            .create_document_node(&DocumentNode::new("doc", "Doc"))
            .await
            .unwrap();
        store
            .create_chunk_node(&ChunkNode::new("doc", 0, "long chunk text"))
            .await
            .unwrap();

        let chunk = store.chunk("doc_chunk_0").await.unwrap();
        assert_eq!(chunk.text, "long ");
    }

    #[tokio::test]
    async fn relationship_with_missing_endpoint_is_rejected() {
        let (store, entities) = seeded_store().await;
        let before = store.get_graph_stats().await.unwrap();

        let dangling = Relationship::new(&entities[0].id, "nope", RelationType::RelatesTo);
        assert!(matches!(
            store.create_relationship(&dangling).await,
            Err(Error::NodeNotFound(_))
        ));
        assert!(store.create_mention("doc1_chunk_0", "nope").await.is_err());
        assert!(store.create_mention("nope", &entities[0].id).await.is_err());

        let after = store.get_graph_stats().await.unwrap();
        assert_eq!(before.total_relationships, after.total_relationships);
    }

    #[tokio::test]
    async fn upserts_are_idempotent() {
        let (store, entities) = seeded_store().await;
        let before = store.get_graph_stats().await.unwrap();

        store.create_entity_node(&entities[0]).await.unwrap();
        store
            .create_relationship(&Relationship::new(
                &entities[0].id,
                &entities[1].id,
                RelationType::CoOccurs,
            ))
            .await
            .unwrap();

        assert_eq!(store.get_graph_stats().await.unwrap(), before);
    }

    #[tokio::test]
    async fn entity_upsert_overwrites_properties() {
        let store = MemoryGraphStore::default();
        let mut entity = Entity::new("Rust", EntityType::Technology);
        store.create_entity_node(&entity).await.unwrap();

        entity.mention_count = 7;
        store.create_entity_node(&entity).await.unwrap();

        assert_eq!(store.entity(&entity.id).await.unwrap().mention_count, 7);
    }

    #[tokio::test]
    async fn stats_count_every_node_kind() {
        let (store, _) = seeded_store().await;
        let stats = store.get_graph_stats().await.unwrap();

        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.chunk_count, 1);
        assert_eq!(stats.entity_count, 3);
        assert_eq!(stats.total_nodes, 5);
        // 1 FROM_DOCUMENT + 3 MENTIONS + 2 CO_OCCURS
        assert_eq!(stats.total_relationships, 6);
    }

    #[tokio::test]
    async fn neighbors_respect_depth_and_type_filter() {
        let (store, entities) = seeded_store().await;
        let alice = &entities[0].id;

        let direct = store
            .get_entity_neighbors(alice, Some(RelationType::CoOccurs), 1)
            .await
            .unwrap();
        assert_eq!(direct.len(), 1);
        assert_eq!(direct[0].name.as_deref(), Some("Google"));

        let two_hops = store
            .get_entity_neighbors(alice, Some(RelationType::CoOccurs), 2)
            .await
            .unwrap();
        assert_eq!(two_hops.len(), 2);

        // Untyped traversal also reaches the chunk through MENTIONS.
        let any = store.get_entity_neighbors(alice, None, 1).await.unwrap();
        assert!(any.iter().any(|n| n.labels == vec!["Chunk".to_string()]));

        assert!(store
            .get_entity_neighbors("unknown", None, 1)
            .await
            .unwrap()
            .is_empty());
        assert!(store.get_entity_neighbors(alice, None, 0).await.is_err());
    }

    #[tokio::test]
    async fn paths_are_simple_shortest_first_and_capped() {
        let (store, entities) = seeded_store().await;
        let (alice, london) = (&entities[0].id, &entities[2].id);

        let paths = store.find_paths(alice, london, 3).await.unwrap();
        assert!(!paths.is_empty());
        assert!(paths.windows(2).all(|w| w[0].length() <= w[1].length()));
        for path in &paths {
            assert_eq!(path.nodes.first().unwrap().id, *alice);
            assert_eq!(path.nodes.last().unwrap().id, *london);
            let unique: HashSet<&str> = path.nodes.iter().map(|n| n.id.as_str()).collect();
            assert_eq!(unique.len(), path.nodes.len());
        }
        // alice-chunk-london is as short as alice-google-london
        assert_eq!(paths[0].length(), 2);

        let mut settings = GraphSettings::default();
        settings.max_path_results = 1;
        let capped = MemoryGraphStore::new(&settings);
        for e in &entities {
            capped.create_entity_node(e).await.unwrap();
        }
        capped
            .create_relationship(&Relationship::new(alice, london, RelationType::RelatesTo))
            .await
            .unwrap();
        capped
            .create_relationship(&Relationship::new(alice, london, RelationType::Causes))
            .await
            .unwrap();
        assert_eq!(capped.find_paths(alice, london, 2).await.unwrap().len(), 1);
    }

    /// Every entity co-occurs with every other, as in one dense chunk.
    async fn dense_store(size: usize) -> (MemoryGraphStore, Vec<Entity>) {
        let store = MemoryGraphStore::default();
        let entities: Vec<Entity> = (0..size)
            .map(|i| Entity::new(format!("Entity {i}"), EntityType::Concept))
            .collect();
        for e in &entities {
            store.create_entity_node(e).await.unwrap();
        }
        for (i, a) in entities.iter().enumerate() {
            for b in &entities[i + 1..] {
                store
                    .create_relationship(&Relationship::new(&a.id, &b.id, RelationType::CoOccurs))
                    .await
                    .unwrap();
            }
        }
        (store, entities)
    }

    #[tokio::test]
    async fn paths_to_unreachable_target_return_immediately() {
        let (store, entities) = dense_store(30).await;
        let island = Entity::new("Island", EntityType::Location);
        store.create_entity_node(&island).await.unwrap();

        let paths = store
            .find_paths(&entities[0].id, &island.id, 6)
            .await
            .unwrap();
        assert!(paths.is_empty());
    }

    #[tokio::test]
    async fn paths_through_dense_graph_stay_bounded() {
        let (store, entities) = dense_store(30).await;
        let tail = Entity::new("Tail", EntityType::Location);
        store.create_entity_node(&tail).await.unwrap();
        store
            .create_relationship(&Relationship::new(
                &entities[29].id,
                &tail.id,
                RelationType::RelatesTo,
            ))
            .await
            .unwrap();

        let paths = store.find_paths(&entities[0].id, &tail.id, 6).await.unwrap();
        assert_eq!(paths.len(), GraphSettings::default().max_path_results);
        assert_eq!(paths[0].length(), 2);
        assert!(paths.iter().all(|p| p.length() <= 6));

        // Too short a budget to reach the tail at all
        assert!(store
            .find_paths(&entities[0].id, &tail.id, 1)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn concept_clusters_rank_by_degree() {
        let (store, entities) = seeded_store().await;

        let ranked = store.get_concept_clusters(1, 10).await.unwrap();
        assert_eq!(ranked.len(), 3);
        // Google: 2 CO_OCCURS + 1 MENTIONS
        assert_eq!(ranked[0].entity_id, entities[1].id);
        assert_eq!(ranked[0].connections, 3);
        assert!(ranked[0].neighbors.contains(&"Alice".to_string()));
        assert!(ranked.windows(2).all(|w| w[0].connections >= w[1].connections));

        let strict = store.get_concept_clusters(3, 10).await.unwrap();
        assert_eq!(strict.len(), 1);

        assert_eq!(store.get_concept_clusters(0, 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn entity_context_counts_neighbourhood() {
        let (store, entities) = seeded_store().await;

        let ctx = store
            .get_entity_context(&entities[0].id, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ctx.name, "Alice");
        assert_eq!(ctx.entity_type, EntityType::Person);
        // Google and the chunk
        assert_eq!(ctx.neighbors_count, 2);
        assert_eq!(ctx.relationships_count, 2);

        let wider = store
            .get_entity_context(&entities[0].id, 2)
            .await
            .unwrap()
            .unwrap();
        // + London and the document
        assert_eq!(wider.neighbors_count, 4);
        assert_eq!(wider.relationships_count, 6);

        assert!(store.get_entity_context("missing", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concepts_link_existing_members_only() {
        let (store, entities) = seeded_store().await;
        let concept = Concept {
            id: "concept_doc1_0".into(),
            name: "Alice / Google".into(),
            entity_ids: vec![entities[0].id.clone(), entities[1].id.clone(), "ghost".into()],
            entity_count: 3,
        };

        store.create_concept_node(&concept).await.unwrap();

        let stats = store.get_graph_stats().await.unwrap();
        assert_eq!(stats.concept_count, 1);
        assert_eq!(stats.total_relationships, 8);

        let concepts = store.list_concepts(10).await.unwrap();
        assert_eq!(concepts[0].entity_names, vec!["Alice", "Google"]);
    }

    #[tokio::test]
    async fn search_matches_substrings_both_ways() {
        let (store, entities) = seeded_store().await;

        let hits = store.search_entities("goo", &[], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, entities[1].id);

        let hits = store
            .search_entities("Where does Alice work?", &[], 10)
            .await
            .unwrap();
        assert_eq!(hits[0].name, "Alice");

        let filtered = store
            .search_entities("alice", &[EntityType::Organization], 10)
            .await
            .unwrap();
        assert!(filtered.is_empty());

        let rels = store.search_relationships("london", 10).await.unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].target_name, "London");
    }

    #[tokio::test]
    async fn listings_are_ordered() {
        let (store, _) = seeded_store().await;

        let rels = store.list_relationships(10).await.unwrap();
        assert_eq!(rels.len(), 2);
        assert!(rels[0].weight >= rels[1].weight);
        assert_eq!(rels[0].source_name, "Alice");

        let people = store
            .list_entities(Some(EntityType::Person), 10)
            .await
            .unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(store.list_entities(None, 2).await.unwrap().len(), 2);

        let histogram = store.entity_type_histogram().await.unwrap();
        assert_eq!(histogram.len(), 3);
        assert!(histogram.iter().all(|t| t.count == 1));

        assert_eq!(store.top_entities(1).await.unwrap().len(), 1);
    }
}
