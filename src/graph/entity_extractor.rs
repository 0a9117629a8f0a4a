//! Pattern and keyword based entity extraction.
//!
//! This is deliberately not a learned NER model: a fixed, ordered set of
//! regular expressions per entity type plus a concept keyword dictionary.
//! Confidence values are static per extraction method.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::models::{Entity, EntityType, RelationType, Relationship};
use crate::error::{Error, Result};

/// Confidence assigned to regex pattern matches.
pub const PATTERN_CONFIDENCE: f32 = 0.8;
/// Confidence assigned to concept keyword matches.
pub const KEYWORD_CONFIDENCE: f32 = 0.7;
/// Maximum character distance for a co-occurrence edge.
pub const CO_OCCURRENCE_WINDOW: usize = 500;
/// Floor for co-occurrence weights inside the window.
pub const MIN_CO_OCCURRENCE_WEIGHT: f32 = 0.3;

/// Regex matcher producing entities of one type from a capture group.
#[derive(Debug, Clone)]
struct PatternMatcher {
    entity_type: EntityType,
    regex: Regex,
    group: usize,
}

impl PatternMatcher {
    fn new(entity_type: EntityType, pattern: &str, group: usize) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::InvalidArgument(format!("bad pattern {pattern:?}: {e}")))?;
        if group >= regex.captures_len() {
            return Err(Error::InvalidArgument(format!(
                "pattern {pattern:?} has no capture group {group}"
            )));
        }
        Ok(Self {
            entity_type,
            regex,
            group,
        })
    }
}

const DEFAULT_PATTERNS: &[(EntityType, &str, usize)] = &[
    // First Last
    (EntityType::Person, r"\b[A-Z][a-z]+ [A-Z][a-z]+\b", 0),
    // Initial Last
    (EntityType::Person, r"\b[A-Z]\.?\s+[A-Z][a-z]+\b", 0),
    (
        EntityType::Organization,
        r"\b[A-Z][a-z]+(?:\s+(?:Inc|LLC|Ltd|Corp|Co|Corporation|Company|Group))\b",
        0,
    ),
    (
        EntityType::Organization,
        r"\b(?:Google|Apple|Microsoft|Meta|Amazon|OpenAI|DeepMind)\b",
        0,
    ),
    (
        EntityType::Technology,
        r"\b(?:Python|JavaScript|TypeScript|Go|Rust|C\+\+|Java|C#)\b",
        0,
    ),
    (
        EntityType::Technology,
        r"\b(?:TensorFlow|PyTorch|FastAPI|Django|Flask|PostgreSQL|Neo4j)\b",
        0,
    ),
    (
        EntityType::Technology,
        r"\b(?:AWS|Azure|GCP|Kubernetes|Docker)\b",
        0,
    ),
    (
        EntityType::Location,
        r"\b(?:New York|San Francisco|London|Tokyo|Berlin|Paris)\b",
        0,
    ),
    (
        EntityType::Location,
        r"\b(?:USA|UK|China|Japan|Germany|France|India)\b",
        0,
    ),
    // Sentence-initial single name followed by a role verb ("Alice works at ...").
    // Runs after the fixed name lists so known names keep their type.
    (
        EntityType::Person,
        r"(?m)(?:^|[.!?]\s+)([A-Z][a-z]+)\s+(?:works|worked|joined|founded|leads|led|said|met|wrote|manages|created)\b",
        1,
    ),
];

const DEFAULT_CONCEPT_KEYWORDS: &[&str] = &[
    "machine learning",
    "deep learning",
    "neural network",
    "data science",
    "artificial intelligence",
    "nlp",
    "embeddings",
    "transformers",
    "llm",
    "rag",
    "vector database",
];

static DEFAULT_MATCHERS: Lazy<Vec<PatternMatcher>> = Lazy::new(|| {
    DEFAULT_PATTERNS
        .iter()
        .map(|(t, p, g)| PatternMatcher::new(*t, p, *g).expect("built-in entity pattern"))
        .collect()
});

/// Concept keyword with a word-bounded, case-insensitive matcher.
#[derive(Debug, Clone)]
struct ConceptKeyword {
    keyword: String,
    regex: Regex,
}

impl ConceptKeyword {
    fn new(keyword: &str) -> Result<Self> {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return Err(Error::InvalidArgument("empty concept keyword".into()));
        }
        let regex = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&keyword)))
            .map_err(|e| Error::InvalidArgument(e.to_string()))?;
        Ok(Self { keyword, regex })
    }
}

static DEFAULT_KEYWORDS: Lazy<Vec<ConceptKeyword>> = Lazy::new(|| {
    DEFAULT_CONCEPT_KEYWORDS
        .iter()
        .map(|k| ConceptKeyword::new(k).expect("built-in concept keyword"))
        .collect()
});

/// Extracts candidate entities and co-occurrence relationships from text.
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    patterns: Vec<PatternMatcher>,
    keywords: Vec<ConceptKeyword>,
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityExtractor {
    /// Extractor with the built-in pattern set and concept dictionary.
    pub fn new() -> Self {
        Self {
            patterns: DEFAULT_MATCHERS.clone(),
            keywords: DEFAULT_KEYWORDS.clone(),
        }
    }

    /// Extractor with no patterns or keywords.
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            keywords: Vec::new(),
        }
    }

    /// Append a pattern; the whole match becomes the entity name.
    ///
    /// Patterns run in insertion order, and earlier patterns claim a
    /// surface form first.
    pub fn add_pattern(&mut self, entity_type: EntityType, pattern: &str) -> Result<()> {
        self.patterns
            .push(PatternMatcher::new(entity_type, pattern, 0)?);
        Ok(())
    }

    /// Append a pattern whose capture group `group` becomes the entity name.
    pub fn add_pattern_group(
        &mut self,
        entity_type: EntityType,
        pattern: &str,
        group: usize,
    ) -> Result<()> {
        self.patterns
            .push(PatternMatcher::new(entity_type, pattern, group)?);
        Ok(())
    }

    pub fn add_concept_keyword(&mut self, keyword: &str) -> Result<()> {
        self.keywords.push(ConceptKeyword::new(keyword)?);
        Ok(())
    }

    /// Extract entities from text, deduplicated within the call.
    ///
    /// A surface form claimed by one pattern is never re-emitted by a later
    /// pattern, even under another type. Concept keywords dedupe on id
    /// instead, so a keyword may coexist with a same-named pattern entity
    /// of a different type (two distinct ids).
    pub fn extract_entities(&self, text: &str) -> Vec<Entity> {
        let mut entities = Vec::new();
        let mut seen_names: HashSet<String> = HashSet::new();
        let mut seen_ids: HashSet<String> = HashSet::new();

        if text.trim().is_empty() {
            return entities;
        }

        for matcher in &self.patterns {
            for caps in matcher.regex.captures_iter(text) {
                let Some(m) = caps.get(matcher.group) else {
                    continue;
                };
                let name = m.as_str();
                if name.is_empty() || seen_names.contains(name) {
                    continue;
                }

                let entity =
                    Entity::new(name, matcher.entity_type).with_confidence(PATTERN_CONFIDENCE);
                seen_names.insert(name.to_string());
                if seen_ids.insert(entity.id.clone()) {
                    entities.push(entity);
                }
            }
        }

        for keyword in &self.keywords {
            if !keyword.regex.is_match(text) {
                continue;
            }
            let entity = Entity::new(keyword.keyword.as_str(), EntityType::Concept)
                .with_confidence(KEYWORD_CONFIDENCE);
            if seen_ids.insert(entity.id.clone()) {
                entities.push(entity);
            }
        }

        debug!("Extracted {} entities", entities.len());
        entities
    }

    /// Build CO_OCCURS edges for every pair of entities whose names appear
    /// within [`CO_OCCURRENCE_WINDOW`] characters of each other.
    ///
    /// Distance uses the first case-insensitive occurrence of each name. When
    /// one name is a substring of another ("Google" in "Google Cloud") that
    /// first hit may not be the mention the entity came from.
    pub fn extract_relationships(&self, text: &str, entities: &[Entity]) -> Vec<Relationship> {
        let text_lower = text.to_lowercase();
        let positions: Vec<Option<usize>> = entities
            .iter()
            .map(|e| first_char_offset(&text_lower, &e.name.to_lowercase()))
            .collect();

        let mut relationships = Vec::new();

        for (i, source) in entities.iter().enumerate() {
            let Some(pos_a) = positions[i] else {
                continue;
            };
            for (j, target) in entities.iter().enumerate().skip(i + 1) {
                let Some(pos_b) = positions[j] else {
                    continue;
                };

                let distance = pos_a.abs_diff(pos_b);
                if distance >= CO_OCCURRENCE_WINDOW {
                    continue;
                }

                let weight = co_occurrence_weight(distance);
                relationships.push(
                    Relationship::new(source.id.clone(), target.id.clone(), RelationType::CoOccurs)
                        .with_weight(weight)
                        .with_confidence(weight),
                );
            }
        }

        relationships
    }

    /// Extract entities and their co-occurrence relationships in one pass.
    pub fn extract(&self, text: &str) -> (Vec<Entity>, Vec<Relationship>) {
        let entities = self.extract_entities(text);
        let relationships = self.extract_relationships(text, &entities);
        (entities, relationships)
    }
}

/// Weight for two mentions `distance` characters apart.
pub fn co_occurrence_weight(distance: usize) -> f32 {
    let weight = 1.0 - distance as f32 / CO_OCCURRENCE_WINDOW as f32;
    weight.max(MIN_CO_OCCURRENCE_WEIGHT)
}

/// Character offset of the first occurrence of `needle` in `haystack`.
fn first_char_offset(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack
        .find(needle)
        .map(|byte_idx| haystack[..byte_idx].chars().count())
}
