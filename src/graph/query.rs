//! Typed graph queries and read-side result structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::models::{Entity, EntityType, RelationType};

/// Query kinds accepted by `KnowledgeGraphBuilder::query_graph`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphQuery {
    Entities {
        entity_type: Option<EntityType>,
        limit: usize,
    },
    Relationships {
        limit: usize,
    },
    Paths {
        source_id: String,
        target_id: String,
        max_length: usize,
    },
    Concepts {
        limit: usize,
    },
}

/// Result of a [`GraphQuery`], one variant per query kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "results", rename_all = "snake_case")]
pub enum QueryResult {
    Entities(Vec<EntitySummary>),
    Relationships(Vec<RelationshipSummary>),
    Paths(Vec<GraphPath>),
    Concepts(Vec<ConceptSummary>),
}

impl QueryResult {
    pub fn len(&self) -> usize {
        match self {
            QueryResult::Entities(v) => v.len(),
            QueryResult::Relationships(v) => v.len(),
            QueryResult::Paths(v) => v.len(),
            QueryResult::Concepts(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub id: String,
    pub name: String,
    pub entity_type: EntityType,
    pub confidence: f32,
    pub mention_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&Entity> for EntitySummary {
    fn from(entity: &Entity) -> Self {
        Self {
            id: entity.id.clone(),
            name: entity.name.clone(),
            entity_type: entity.entity_type,
            confidence: entity.confidence,
            mention_count: entity.mention_count,
            description: entity.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSummary {
    pub source_id: String,
    pub source_name: String,
    pub target_id: String,
    pub target_name: String,
    pub relation_type: RelationType,
    pub weight: f32,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptSummary {
    pub id: String,
    pub name: String,
    pub entity_count: usize,
    pub entity_names: Vec<String>,
}

/// Node as seen by traversal queries; `name` is absent on chunk nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub name: Option<String>,
    pub labels: Vec<String>,
}

/// One path between two nodes, endpoints included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphPath {
    pub nodes: Vec<GraphNode>,
}

impl GraphPath {
    /// Number of edges on the path.
    pub fn length(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }
}

/// Node ranked by degree in `get_concept_clusters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedEntity {
    pub entity_id: String,
    pub entity_name: String,
    pub connections: usize,
    /// Distinct names of directly connected nodes
    pub neighbors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_relationships: usize,
    pub document_count: usize,
    pub entity_count: usize,
    pub chunk_count: usize,
    pub concept_count: usize,
}

/// Lightweight summary of one entity and its neighbourhood size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityContext {
    pub id: String,
    pub name: String,
    pub entity_type: EntityType,
    pub confidence: f32,
    pub mention_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
    pub neighbors_count: usize,
    pub relationships_count: usize,
}

/// Text search over entities and relationships.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSearchResponse {
    pub query: String,
    pub entities: Vec<EntitySummary>,
    pub relationships: Vec<RelationshipSummary>,
    pub entity_count: usize,
    pub relationship_count: usize,
}

impl GraphSearchResponse {
    pub fn new(
        query: impl Into<String>,
        entities: Vec<EntitySummary>,
        relationships: Vec<RelationshipSummary>,
    ) -> Self {
        Self {
            query: query.into(),
            entity_count: entities.len(),
            relationship_count: relationships.len(),
            entities,
            relationships,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeCount {
    pub entity_type: EntityType,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    pub id: String,
    pub name: String,
    pub entity_type: EntityType,
    pub mention_count: u32,
}

/// Aggregate report returned by `export_graph_metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct GraphMetricsReport {
    pub total_entities: usize,
    pub total_relationships: usize,
    pub total_documents: usize,
    pub entity_types: Vec<TypeCount>,
    pub top_entities: Vec<EntityMention>,
    pub generated_at: DateTime<Utc>,
}

/// Case-insensitive substring match in either direction.
pub fn names_match(name: &str, query: &str) -> bool {
    let name = name.to_lowercase();
    let query = query.to_lowercase();
    if name.is_empty() || query.is_empty() {
        return false;
    }
    name.contains(&query) || query.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_both_directions() {
        assert!(names_match("Google Cloud", "google"));
        assert!(names_match("Google", "who founded google?"));
        assert!(!names_match("Microsoft", "google"));
        assert!(!names_match("", "google"));
        assert!(!names_match("Google", ""));
    }

    #[test]
    fn graph_query_deserializes_from_tagged_json() {
        let query: GraphQuery = serde_json::from_str(
            r#"{"kind":"paths","source_id":"a","target_id":"b","max_length":3}"#,
        )
        .unwrap();
        assert_eq!(
            query,
            GraphQuery::Paths {
                source_id: "a".into(),
                target_id: "b".into(),
                max_length: 3
            }
        );

        let query: GraphQuery =
            serde_json::from_str(r#"{"kind":"entities","entity_type":"PERSON","limit":5}"#)
                .unwrap();
        assert_eq!(
            query,
            GraphQuery::Entities {
                entity_type: Some(EntityType::Person),
                limit: 5
            }
        );

        assert!(serde_json::from_str::<GraphQuery>(r#"{"kind":"drop_all"}"#).is_err());
    }

    #[test]
    fn search_response_counts_match_lengths() {
        let response = GraphSearchResponse::new("q", Vec::new(), Vec::new());
        assert_eq!(response.entity_count, 0);
        assert_eq!(response.relationship_count, 0);
        assert_eq!(response.query, "q");
    }

    #[test]
    fn path_length_counts_edges() {
        let node = |id: &str| GraphNode {
            id: id.into(),
            name: None,
            labels: vec!["Entity".into()],
        };
        let path = GraphPath {
            nodes: vec![node("a"), node("b"), node("c")],
        };
        assert_eq!(path.length(), 2);
        assert_eq!(GraphPath { nodes: vec![] }.length(), 0);
    }

    #[test]
    fn query_result_serializes_with_kind_tag() {
        let result = QueryResult::Concepts(vec![ConceptSummary {
            id: "concept_doc_0".into(),
            name: "Rust / Go".into(),
            entity_count: 2,
            entity_names: vec!["Rust".into(), "Go".into()],
        }]);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["kind"], "concepts");
        assert_eq!(json["results"][0]["entity_count"], 2);
        assert_eq!(result.len(), 1);
    }
}
