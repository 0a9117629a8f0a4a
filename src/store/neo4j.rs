//! Graph store backed by Neo4j

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use neo4rs::{query, Graph, Query, Row};
use serde::Deserialize;
use tracing::{debug, info};

use super::{check_depth, GraphStore, CLUSTERS, FROM_DOCUMENT, MENTIONS};
use crate::config::{GraphSettings, Neo4jSettings};
use crate::error::{Error, Result};
use crate::graph::models::{
    iso_timestamp, truncate_chars, ChunkNode, Concept, DocumentNode, Entity, EntityType,
    RelationType, Relationship,
};
use crate::graph::query::{
    ConceptSummary, ConnectedEntity, EntityContext, EntityMention, EntitySummary, GraphNode,
    GraphPath, GraphStats, RelationshipSummary, TypeCount,
};
use crate::metrics;

const ENTITY_COLUMNS: &str = "e.id AS id, e.name AS name, e.type AS type, \
     e.confidence AS confidence, e.mention_count AS mention_count, \
     e.description AS description";

const RELATIONSHIP_COLUMNS: &str = "s.id AS source_id, s.name AS source_name, \
     t.id AS target_id, t.name AS target_name, type(r) AS type, \
     r.weight AS weight, r.confidence AS confidence";

/// Graph store speaking Bolt to a Neo4j server
pub struct Neo4jGraphStore {
    graph: Graph,
    timeout: Duration,
    chunk_text_limit: usize,
    max_path_results: usize,
}

impl Neo4jGraphStore {
    /// Connect and verify the server answers a trivial query.
    pub async fn connect(neo4j: &Neo4jSettings, settings: &GraphSettings) -> Result<Self> {
        info!("Connecting to Neo4j at {}", neo4j.uri);

        let graph = tokio::time::timeout(
            neo4j.query_timeout,
            Graph::new(&neo4j.uri, &neo4j.user, &neo4j.password),
        )
        .await
        .map_err(|_| Error::ConnectionError(format!("{} timed out", neo4j.uri)))?
        .map_err(|e| Error::ConnectionError(format!("{}: {}", neo4j.uri, e)))?;

        let store = Self {
            graph,
            timeout: neo4j.query_timeout,
            chunk_text_limit: settings.chunk_text_limit,
            max_path_results: settings.max_path_results,
        };
        store.verify_connection().await?;
        Ok(store)
    }

    /// Run `fut` under the per-call timeout and record it.
    async fn timed<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{operation} after {}s",
                self.timeout.as_secs()
            ))),
        };
        metrics::record_store_call(operation, started.elapsed(), result.is_ok());
        result
    }

    async fn fetch(&self, q: Query) -> Result<Vec<Row>> {
        let mut stream = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn count(&self, cypher: &str) -> Result<usize> {
        let rows = self.fetch(query(cypher)).await?;
        match rows.first() {
            Some(row) => Ok(column::<i64>(row, "count")?.max(0) as usize),
            None => Ok(0),
        }
    }

    /// Run a write that reports how many edges it matched; zero means an
    /// endpoint is missing.
    async fn write_edge(&self, q: Query, what: String) -> Result<()> {
        let rows = self.fetch(q).await?;
        let created = match rows.first() {
            Some(row) => column::<i64>(row, "created")?,
            None => 0,
        };
        if created == 0 {
            return Err(Error::NodeNotFound(what));
        }
        Ok(())
    }
}

fn column<'a, T: Deserialize<'a>>(row: &'a Row, key: &str) -> Result<T> {
    row.get::<T>(key)
        .map_err(|e| Error::QueryError(format!("column {key}: {e}")))
}

fn entity_summary(row: &Row) -> Result<EntitySummary> {
    Ok(EntitySummary {
        id: column(row, "id")?,
        name: column(row, "name")?,
        entity_type: column::<String>(row, "type")?.parse()?,
        confidence: column::<Option<f64>>(row, "confidence")?.unwrap_or(1.0) as f32,
        mention_count: column::<Option<i64>>(row, "mention_count")?.unwrap_or(1).max(0) as u32,
        description: column(row, "description")?,
    })
}

fn relationship_summary(row: &Row) -> Result<RelationshipSummary> {
    Ok(RelationshipSummary {
        source_id: column(row, "source_id")?,
        source_name: column::<Option<String>>(row, "source_name")?.unwrap_or_default(),
        target_id: column(row, "target_id")?,
        target_name: column::<Option<String>>(row, "target_name")?.unwrap_or_default(),
        relation_type: column::<String>(row, "type")?.parse()?,
        weight: column::<Option<f64>>(row, "weight")?.unwrap_or(1.0) as f32,
        confidence: column::<Option<f64>>(row, "confidence")?.unwrap_or(1.0) as f32,
    })
}

/// Relationship types and depths cannot be parameters; both come from
/// closed types here.
fn neighbors_cypher(relation_type: Option<RelationType>, depth: usize) -> String {
    let pattern = match relation_type {
        Some(t) => format!(":{}*1..{}", t.as_str(), depth),
        None => format!("*1..{depth}"),
    };
    format!(
        "MATCH (e:Entity {{id: $entity_id}})-[{pattern}]-(n)
         WHERE n <> e
         RETURN DISTINCT n.id AS id, n.name AS name, labels(n) AS labels"
    )
}

fn paths_cypher(max_length: usize) -> String {
    format!(
        "MATCH p = (source {{id: $source_id}})-[*1..{max_length}]-(target {{id: $target_id}})
         WHERE all(i IN range(0, size(nodes(p)) - 2) WHERE NOT nodes(p)[i] IN nodes(p)[i + 1..])
         RETURN [n IN nodes(p) | n.id] AS ids,
                [n IN nodes(p) | n.name] AS names,
                [n IN nodes(p) | labels(n)] AS labels,
                length(p) AS hops
         ORDER BY hops
         LIMIT $limit"
    )
}

fn context_cypher(depth: usize) -> String {
    format!(
        "MATCH (e:Entity {{id: $entity_id}})
         OPTIONAL MATCH p = (e)-[*1..{depth}]-(n)
         WITH e, collect(DISTINCT CASE WHEN n <> e THEN n.id END) AS neighbor_ids,
              collect(p) AS paths
         UNWIND CASE WHEN size(paths) = 0 THEN [null] ELSE paths END AS path
         UNWIND CASE WHEN path IS NULL THEN [null] ELSE relationships(path) END AS r
         WITH e, neighbor_ids, collect(DISTINCT r) AS rels
         RETURN {ENTITY_COLUMNS}, e.properties AS properties,
                size(neighbor_ids) AS neighbors_count,
                size(rels) AS relationships_count"
    )
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    fn backend_name(&self) -> &'static str {
        "neo4j"
    }

    async fn verify_connection(&self) -> Result<()> {
        self.timed("verify_connection", async {
            self.fetch(query("RETURN 1 AS ok"))
                .await
                .map_err(|e| Error::ConnectionError(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| match e {
            Error::Timeout(msg) => Error::ConnectionError(msg),
            other => other,
        })?;
        debug!("Neo4j connection verified");
        Ok(())
    }

    async fn init_schema(&self) -> Result<()> {
        info!("Initializing Neo4j schema...");

        let statements = [
            "CREATE CONSTRAINT document_id IF NOT EXISTS FOR (d:Document) REQUIRE d.id IS UNIQUE",
            "CREATE CONSTRAINT chunk_id IF NOT EXISTS FOR (c:Chunk) REQUIRE c.id IS UNIQUE",
            "CREATE CONSTRAINT entity_id IF NOT EXISTS FOR (e:Entity) REQUIRE e.id IS UNIQUE",
            "CREATE CONSTRAINT concept_id IF NOT EXISTS FOR (c:Concept) REQUIRE c.id IS UNIQUE",
            "CREATE INDEX entity_name IF NOT EXISTS FOR (e:Entity) ON (e.name)",
            "CREATE INDEX entity_type IF NOT EXISTS FOR (e:Entity) ON (e.type)",
        ];

        for statement in statements {
            self.timed("init_schema", async {
                self.graph.run(query(statement)).await?;
                Ok(())
            })
            .await?;
        }

        info!("Schema initialized successfully");
        Ok(())
    }

    async fn create_document_node(&self, document: &DocumentNode) -> Result<()> {
        let q = query(
            "MERGE (d:Document {id: $id})
             SET d.name = $name,
                 d.path = $path,
                 d.type = $type,
                 d.metadata = $metadata,
                 d.updated_at = datetime()",
        )
        .param("id", document.id.clone())
        .param("name", document.name.clone())
        .param("path", document.path.clone())
        .param("type", document.doc_type.clone())
        .param("metadata", serde_json::to_string(&document.metadata)?);

        self.timed("create_document_node", async {
            self.graph.run(q).await?;
            Ok(())
        })
        .await?;
        debug!("Upserted document: {}", document.id);
        Ok(())
    }

    async fn create_chunk_node(&self, chunk: &ChunkNode) -> Result<()> {
        let cypher = format!(
            "MATCH (d:Document {{id: $document_id}})
             MERGE (c:Chunk {{id: $id}})
             SET c.text = $text,
                 c.index = $index,
                 c.document_id = $document_id
             MERGE (c)-[r:{FROM_DOCUMENT}]->(d)
             RETURN count(r) AS created"
        );
        let q = query(&cypher)
            .param("id", chunk.id.clone())
            .param("document_id", chunk.document_id.clone())
            .param("text", truncate_chars(&chunk.text, self.chunk_text_limit))
            .param("index", chunk.index as i64);

        self.timed(
            "create_chunk_node",
            self.write_edge(q, format!("document {}", chunk.document_id)),
        )
        .await
    }

    async fn create_entity_node(&self, entity: &Entity) -> Result<()> {
        let q = query(
            "MERGE (e:Entity {id: $id})
             SET e.name = $name,
                 e.type = $type,
                 e.description = $description,
                 e.confidence = $confidence,
                 e.first_seen = $first_seen,
                 e.last_seen = $last_seen,
                 e.mention_count = $mention_count,
                 e.properties = $properties",
        )
        .param("id", entity.id.clone())
        .param("name", entity.name.clone())
        .param("type", entity.entity_type.as_str())
        .param("description", entity.description.clone())
        .param("confidence", entity.confidence as f64)
        .param("first_seen", iso_timestamp(entity.first_seen))
        .param("last_seen", iso_timestamp(entity.last_seen))
        .param("mention_count", entity.mention_count as i64)
        .param("properties", serde_json::to_string(&entity.properties)?);

        self.timed("create_entity_node", async {
            self.graph.run(q).await?;
            Ok(())
        })
        .await?;
        debug!("Upserted entity: {} ({})", entity.name, entity.id);
        Ok(())
    }

    async fn create_relationship(&self, relationship: &Relationship) -> Result<()> {
        let cypher = format!(
            "MATCH (s:Entity {{id: $source_id}})
             MATCH (t:Entity {{id: $target_id}})
             MERGE (s)-[r:{}]->(t)
             SET r.confidence = $confidence,
                 r.weight = $weight,
                 r.timestamp = $timestamp,
                 r.properties = $properties
             RETURN count(r) AS created",
            relationship.relation_type.as_str()
        );
        let q = query(&cypher)
            .param("source_id", relationship.source_id.clone())
            .param("target_id", relationship.target_id.clone())
            .param("confidence", relationship.confidence as f64)
            .param("weight", relationship.weight as f64)
            .param("timestamp", iso_timestamp(relationship.timestamp))
            .param("properties", serde_json::to_string(&relationship.properties)?);

        self.timed(
            "create_relationship",
            self.write_edge(
                q,
                format!(
                    "endpoint of {} -[{}]-> {}",
                    relationship.source_id, relationship.relation_type, relationship.target_id
                ),
            ),
        )
        .await
    }

    async fn create_mention(&self, chunk_id: &str, entity_id: &str) -> Result<()> {
        let cypher = format!(
            "MATCH (c:Chunk {{id: $chunk_id}})
             MATCH (e:Entity {{id: $entity_id}})
             MERGE (c)-[r:{MENTIONS}]->(e)
             RETURN count(r) AS created"
        );
        let q = query(&cypher)
            .param("chunk_id", chunk_id)
            .param("entity_id", entity_id);

        self.timed(
            "create_mention",
            self.write_edge(q, format!("chunk {chunk_id} or entity {entity_id}")),
        )
        .await
    }

    async fn create_concept_node(&self, concept: &Concept) -> Result<()> {
        let cypher = format!(
            "MERGE (c:Concept {{id: $id}})
             SET c.name = $name,
                 c.entity_count = $entity_count,
                 c.entity_ids = $entity_ids
             WITH c
             UNWIND $entity_ids AS entity_id
             MATCH (e:Entity {{id: entity_id}})
             MERGE (c)-[:{CLUSTERS}]->(e)"
        );
        let q = query(&cypher)
            .param("id", concept.id.clone())
            .param("name", concept.name.clone())
            .param("entity_count", concept.entity_count as i64)
            .param("entity_ids", concept.entity_ids.clone());

        self.timed("create_concept_node", async {
            self.graph.run(q).await?;
            Ok(())
        })
        .await?;
        debug!("Upserted concept: {} ({})", concept.name, concept.id);
        Ok(())
    }

    async fn get_entity_neighbors(
        &self,
        entity_id: &str,
        relation_type: Option<RelationType>,
        depth: usize,
    ) -> Result<Vec<GraphNode>> {
        check_depth("depth", depth)?;
        let q = query(&neighbors_cypher(relation_type, depth)).param("entity_id", entity_id);

        self.timed("get_entity_neighbors", async {
            self.fetch(q)
                .await?
                .iter()
                .map(|row| {
                    Ok(GraphNode {
                        id: column(row, "id")?,
                        name: column(row, "name")?,
                        labels: column(row, "labels")?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn find_paths(
        &self,
        source_id: &str,
        target_id: &str,
        max_length: usize,
    ) -> Result<Vec<GraphPath>> {
        check_depth("max_length", max_length)?;
        let q = query(&paths_cypher(max_length))
            .param("source_id", source_id)
            .param("target_id", target_id)
            .param("limit", self.max_path_results as i64);

        self.timed("find_paths", async {
            let mut paths = Vec::new();
            for row in self.fetch(q).await? {
                let ids: Vec<String> = column(&row, "ids")?;
                let names: Vec<Option<String>> = column(&row, "names")?;
                let labels: Vec<Vec<String>> = column(&row, "labels")?;

                let nodes = ids
                    .into_iter()
                    .zip(names)
                    .zip(labels)
                    .map(|((id, name), labels)| GraphNode { id, name, labels })
                    .collect();
                paths.push(GraphPath { nodes });
            }
            Ok(paths)
        })
        .await
    }

    async fn get_concept_clusters(
        &self,
        min_connections: usize,
        limit: usize,
    ) -> Result<Vec<ConnectedEntity>> {
        let q = query(
            "MATCH (e:Entity)-[r]-(c)
             WITH e, count(r) AS degree, collect(DISTINCT c.name) AS neighbors
             WHERE degree >= $min_connections
             RETURN e.id AS id, e.name AS name, degree, neighbors
             ORDER BY degree DESC, id
             LIMIT $limit",
        )
        .param("min_connections", min_connections as i64)
        .param("limit", limit as i64);

        self.timed("get_concept_clusters", async {
            self.fetch(q)
                .await?
                .iter()
                .map(|row| {
                    Ok(ConnectedEntity {
                        entity_id: column(row, "id")?,
                        entity_name: column::<Option<String>>(row, "name")?.unwrap_or_default(),
                        connections: column::<i64>(row, "degree")?.max(0) as usize,
                        neighbors: column(row, "neighbors")?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn get_graph_stats(&self) -> Result<GraphStats> {
        self.timed("get_graph_stats", async {
            Ok(GraphStats {
                total_nodes: self.count("MATCH (n) RETURN count(n) AS count").await?,
                total_relationships: self
                    .count("MATCH ()-[r]->() RETURN count(r) AS count")
                    .await?,
                document_count: self
                    .count("MATCH (d:Document) RETURN count(d) AS count")
                    .await?,
                entity_count: self.count("MATCH (e:Entity) RETURN count(e) AS count").await?,
                chunk_count: self.count("MATCH (c:Chunk) RETURN count(c) AS count").await?,
                concept_count: self
                    .count("MATCH (c:Concept) RETURN count(c) AS count")
                    .await?,
            })
        })
        .await
    }

    async fn get_entity_context(
        &self,
        entity_id: &str,
        depth: usize,
    ) -> Result<Option<EntityContext>> {
        check_depth("depth", depth)?;
        let q = query(&context_cypher(depth)).param("entity_id", entity_id);

        self.timed("get_entity_context", async {
            let rows = self.fetch(q).await?;
            let Some(row) = rows.first() else {
                return Ok(None);
            };

            let summary = entity_summary(row)?;
            let properties = match column::<Option<String>>(row, "properties")? {
                Some(raw) => serde_json::from_str(&raw)?,
                None => Default::default(),
            };

            Ok(Some(EntityContext {
                id: summary.id,
                name: summary.name,
                entity_type: summary.entity_type,
                confidence: summary.confidence,
                mention_count: summary.mention_count,
                description: summary.description,
                properties,
                neighbors_count: column::<i64>(row, "neighbors_count")?.max(0) as usize,
                relationships_count: column::<i64>(row, "relationships_count")?.max(0) as usize,
            }))
        })
        .await
    }

    async fn list_entities(
        &self,
        entity_type: Option<EntityType>,
        limit: usize,
    ) -> Result<Vec<EntitySummary>> {
        let cypher = format!(
            "MATCH (e:Entity)
             WHERE $type IS NULL OR e.type = $type
             RETURN {ENTITY_COLUMNS}
             ORDER BY e.mention_count DESC, e.name, e.id
             LIMIT $limit"
        );
        let q = query(&cypher)
            .param("type", entity_type.map(|t| t.as_str().to_string()))
            .param("limit", limit as i64);

        self.timed("list_entities", async {
            self.fetch(q).await?.iter().map(entity_summary).collect()
        })
        .await
    }

    async fn list_relationships(&self, limit: usize) -> Result<Vec<RelationshipSummary>> {
        let cypher = format!(
            "MATCH (s:Entity)-[r]->(t:Entity)
             RETURN {RELATIONSHIP_COLUMNS}
             ORDER BY weight DESC, source_id, target_id
             LIMIT $limit"
        );
        let q = query(&cypher).param("limit", limit as i64);

        self.timed("list_relationships", async {
            self.fetch(q).await?.iter().map(relationship_summary).collect()
        })
        .await
    }

    async fn list_concepts(&self, limit: usize) -> Result<Vec<ConceptSummary>> {
        let cypher = format!(
            "MATCH (c:Concept)
             OPTIONAL MATCH (c)-[:{CLUSTERS}]->(e:Entity)
             WITH c, collect(e.name) AS entity_names
             RETURN c.id AS id, c.name AS name, c.entity_count AS entity_count, entity_names
             ORDER BY entity_count DESC, id
             LIMIT $limit"
        );
        let q = query(&cypher).param("limit", limit as i64);

        self.timed("list_concepts", async {
            self.fetch(q)
                .await?
                .iter()
                .map(|row| {
                    Ok(ConceptSummary {
                        id: column(row, "id")?,
                        name: column::<Option<String>>(row, "name")?.unwrap_or_default(),
                        entity_count: column::<Option<i64>>(row, "entity_count")?
                            .unwrap_or(0)
                            .max(0) as usize,
                        entity_names: column(row, "entity_names")?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn search_entities(
        &self,
        search: &str,
        types: &[EntityType],
        limit: usize,
    ) -> Result<Vec<EntitySummary>> {
        let cypher = format!(
            "MATCH (e:Entity)
             WHERE (size($types) = 0 OR e.type IN $types)
               AND $query <> '' AND e.name <> ''
               AND (toLower(e.name) CONTAINS toLower($query)
                    OR toLower($query) CONTAINS toLower(e.name))
             RETURN {ENTITY_COLUMNS}
             ORDER BY e.mention_count DESC, e.name, e.id
             LIMIT $limit"
        );
        let types: Vec<String> = types.iter().map(|t| t.as_str().to_string()).collect();
        let q = query(&cypher)
            .param("query", search)
            .param("types", types)
            .param("limit", limit as i64);

        self.timed("search_entities", async {
            self.fetch(q).await?.iter().map(entity_summary).collect()
        })
        .await
    }

    async fn search_relationships(
        &self,
        search: &str,
        limit: usize,
    ) -> Result<Vec<RelationshipSummary>> {
        let cypher = format!(
            "MATCH (s:Entity)-[r]->(t:Entity)
             WHERE $query <> ''
               AND any(name IN [s.name, t.name] WHERE name <> ''
                   AND (toLower(name) CONTAINS toLower($query)
                        OR toLower($query) CONTAINS toLower(name)))
             RETURN {RELATIONSHIP_COLUMNS}
             ORDER BY weight DESC, source_id, target_id
             LIMIT $limit"
        );
        let q = query(&cypher)
            .param("query", search)
            .param("limit", limit as i64);

        self.timed("search_relationships", async {
            self.fetch(q).await?.iter().map(relationship_summary).collect()
        })
        .await
    }

    async fn entity_type_histogram(&self) -> Result<Vec<TypeCount>> {
        let q = query(
            "MATCH (e:Entity)
             RETURN e.type AS type, count(e) AS count
             ORDER BY count DESC, type",
        );

        self.timed("entity_type_histogram", async {
            self.fetch(q)
                .await?
                .iter()
                .map(|row| {
                    Ok(TypeCount {
                        entity_type: column::<String>(row, "type")?.parse()?,
                        count: column::<i64>(row, "count")?.max(0) as usize,
                    })
                })
                .collect()
        })
        .await
    }

    async fn top_entities(&self, limit: usize) -> Result<Vec<EntityMention>> {
        let cypher = format!(
            "MATCH (e:Entity)
             RETURN {ENTITY_COLUMNS}
             ORDER BY e.mention_count DESC, e.name, e.id
             LIMIT $limit"
        );
        let q = query(&cypher).param("limit", limit as i64);

        self.timed("top_entities", async {
            self.fetch(q)
                .await?
                .iter()
                .map(|row| {
                    let summary = entity_summary(row)?;
                    Ok(EntityMention {
                        id: summary.id,
                        name: summary.name,
                        entity_type: summary.entity_type,
                        mention_count: summary.mention_count,
                    })
                })
                .collect()
        })
        .await
    }
}
