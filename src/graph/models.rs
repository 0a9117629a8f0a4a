//! Data models for the knowledge graph

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Error;

/// Length of the hex prefix used as entity id.
const ENTITY_ID_LEN: usize = 12;

/// Supported entity types in the knowledge graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    Person,
    Organization,
    Concept,
    Location,
    Technology,
    Project,
    Event,
    Document,
    Chunk,
}

impl EntityType {
    pub const ALL: [EntityType; 9] = [
        EntityType::Person,
        EntityType::Organization,
        EntityType::Concept,
        EntityType::Location,
        EntityType::Technology,
        EntityType::Project,
        EntityType::Event,
        EntityType::Document,
        EntityType::Chunk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "PERSON",
            EntityType::Organization => "ORGANIZATION",
            EntityType::Concept => "CONCEPT",
            EntityType::Location => "LOCATION",
            EntityType::Technology => "TECHNOLOGY",
            EntityType::Project => "PROJECT",
            EntityType::Event => "EVENT",
            EntityType::Document => "DOCUMENT",
            EntityType::Chunk => "CHUNK",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown entity type: {s}")))
    }
}

/// Types of relationships between entities.
///
/// Rendered verbatim as the Neo4j relationship type, so the set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    Mentions,
    RelatesTo,
    PartOf,
    SimilarTo,
    Causes,
    TemporalBefore,
    TemporalAfter,
    CoOccurs,
    References,
    Defines,
}

impl RelationType {
    pub const ALL: [RelationType; 10] = [
        RelationType::Mentions,
        RelationType::RelatesTo,
        RelationType::PartOf,
        RelationType::SimilarTo,
        RelationType::Causes,
        RelationType::TemporalBefore,
        RelationType::TemporalAfter,
        RelationType::CoOccurs,
        RelationType::References,
        RelationType::Defines,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Mentions => "MENTIONS",
            RelationType::RelatesTo => "RELATES_TO",
            RelationType::PartOf => "PART_OF",
            RelationType::SimilarTo => "SIMILAR_TO",
            RelationType::Causes => "CAUSES",
            RelationType::TemporalBefore => "TEMPORAL_BEFORE",
            RelationType::TemporalAfter => "TEMPORAL_AFTER",
            RelationType::CoOccurs => "CO_OCCURS",
            RelationType::References => "REFERENCES",
            RelationType::Defines => "DEFINES",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase().replace('-', "_");
        RelationType::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown relation type: {s}")))
    }
}

/// Format a timestamp as fixed-width ISO-8601 (UTC, microseconds).
///
/// Temporal queries compare these strings lexicographically, which only
/// orders correctly while every timestamp uses this same format.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time in the format produced by [`iso_timestamp`].
pub fn now_timestamp() -> String {
    iso_timestamp(Utc::now())
}

/// Truncate text to at most `limit` characters on a char boundary.
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Named entity node in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable content hash of (name, type)
    pub id: String,
    /// Surface form as found in text
    pub name: String,
    pub entity_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Static per-method score, not a calibrated probability
    pub confidence: f32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub mention_count: u32,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl Entity {
    /// Create an entity seen for the first time now.
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: Self::generate_id(&name, entity_type),
            name,
            entity_type,
            description: None,
            confidence: 1.0,
            first_seen: now,
            last_seen: now,
            mention_count: 1,
            properties: HashMap::new(),
        }
    }

    /// Deterministic id: hex SHA-256 prefix of `"{name}_{TYPE}"`.
    ///
    /// Pure in (name, type), so concurrent extractors never need a
    /// coordinator to agree on ids.
    pub fn generate_id(name: &str, entity_type: EntityType) -> String {
        let digest = Sha256::digest(format!("{}_{}", name, entity_type.as_str()).as_bytes());
        let mut id = hex::encode(digest);
        id.truncate(ENTITY_ID_LEN);
        id
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Fold another sighting of the same entity into this one.
    pub fn record_mention(&mut self, other: &Entity) {
        self.mention_count = self.mention_count.saturating_add(other.mention_count.max(1));
        if other.last_seen > self.last_seen {
            self.last_seen = other.last_seen;
        }
        if other.first_seen < self.first_seen {
            self.first_seen = other.first_seen;
        }
        if self.description.is_none() {
            self.description = other.description.clone();
        }
    }
}

/// Directed, typed, weighted edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_id: String,
    pub target_id: String,
    pub relation_type: RelationType,
    pub confidence: f32,
    pub weight: f32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl Relationship {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relation_type: RelationType,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation_type,
            confidence: 1.0,
            weight: 1.0,
            timestamp: Utc::now(),
            properties: HashMap::new(),
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight.clamp(0.0, 1.0);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

/// Source document node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl DocumentNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            path: None,
            doc_type: None,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Chunk node; owned by exactly one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkNode {
    pub id: String,
    pub document_id: String,
    pub index: usize,
    pub text: String,
}

impl ChunkNode {
    pub fn new(document_id: &str, index: usize, text: impl Into<String>) -> Self {
        Self {
            id: format!("{document_id}_chunk_{index}"),
            document_id: document_id.to_string(),
            index,
            text: text.into(),
        }
    }
}

/// Chunk record handed to the pipeline by the document source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkInput {
    #[serde(default)]
    pub text: String,
}

impl ChunkInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl From<&str> for ChunkInput {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// Derived node grouping a cluster of similar entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    pub name: String,
    pub entity_ids: Vec<String>,
    pub entity_count: usize,
}

impl Concept {
    /// Number of member names joined into the synthesized concept name.
    pub const NAME_MEMBERS: usize = 3;

    pub fn from_cluster(document_id: &str, cluster_idx: usize, cluster: &[Entity]) -> Self {
        let name = cluster
            .iter()
            .take(Self::NAME_MEMBERS)
            .map(|e| e.name.as_str())
            .collect::<Vec<_>>()
            .join(" / ");

        Self {
            id: format!("concept_{document_id}_{cluster_idx}"),
            name,
            entity_ids: cluster.iter().map(|e| e.id.clone()).collect(),
            entity_count: cluster.len(),
        }
    }
}
