//! Concept clustering over entity embeddings.
//!
//! The algorithm is seed-based greedy threshold clustering: entities are
//! visited in input order, each unassigned entity seeds a new cluster, and
//! every later unassigned entity joins it when its cosine similarity to the
//! *seed* reaches the threshold. Members are never compared with each other,
//! so a cluster is only guaranteed to be coherent with respect to its seed.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use moka::future::Cache;
use tracing::{debug, warn};

use super::models::Entity;
use crate::config::DEFAULT_EMBEDDING_CACHE_CAPACITY;
use crate::embeddings::EmbeddingProvider;

const COSINE_EPSILON: f64 = 1e-10;
/// Embedding requests in flight at once.
const EMBED_CONCURRENCY: usize = 8;

/// Groups entities by embedding similarity.
pub struct ConceptClusterer {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    /// Embeddings keyed by entity id.
    cache: Cache<String, Arc<Vec<f32>>>,
}

impl ConceptClusterer {
    pub fn new(provider: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self::with_cache_capacity(provider, DEFAULT_EMBEDDING_CACHE_CAPACITY)
    }

    pub fn with_cache_capacity(provider: Option<Arc<dyn EmbeddingProvider>>, capacity: u64) -> Self {
        Self {
            provider,
            cache: Cache::builder().max_capacity(capacity).build(),
        }
    }

    /// Clusterer without a provider; every entity becomes a singleton.
    pub fn disabled() -> Self {
        Self::with_cache_capacity(None, 0)
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Number of cached embeddings (approximate, pending maintenance).
    pub fn cached_embeddings(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Cluster entities, preserving input order within and across clusters.
    ///
    /// Without a provider each entity is returned as its own cluster.
    pub async fn cluster_entities(&self, entities: &[Entity], threshold: f32) -> Vec<Vec<Entity>> {
        let Some(provider) = &self.provider else {
            return entities.iter().map(|e| vec![e.clone()]).collect();
        };

        let embeddings: Vec<Arc<Vec<f32>>> = stream::iter(entities)
            .map(|entity| self.embedding_for(provider.as_ref(), entity))
            .buffered(EMBED_CONCURRENCY)
            .collect()
            .await;

        let mut assigned = vec![false; entities.len()];
        let mut clusters = Vec::new();

        for seed in 0..entities.len() {
            if assigned[seed] {
                continue;
            }
            assigned[seed] = true;
            let mut cluster = vec![entities[seed].clone()];

            for candidate in (seed + 1)..entities.len() {
                if assigned[candidate] {
                    continue;
                }
                let similarity = cosine_similarity(&embeddings[seed], &embeddings[candidate]);
                if similarity >= threshold {
                    assigned[candidate] = true;
                    cluster.push(entities[candidate].clone());
                }
            }

            clusters.push(cluster);
        }

        debug!(
            "Clustered {} entities into {} clusters",
            entities.len(),
            clusters.len()
        );
        clusters
    }

    async fn embedding_for(&self, provider: &dyn EmbeddingProvider, entity: &Entity) -> Arc<Vec<f32>> {
        if let Some(cached) = self.cache.get(&entity.id).await {
            return cached;
        }

        match provider.embed(&entity.name).await {
            Ok(vector) => {
                let vector = Arc::new(vector);
                self.cache.insert(entity.id.clone(), vector.clone()).await;
                vector
            }
            Err(e) => {
                warn!("Failed to embed entity {}: {}", entity.name, e);
                Arc::new(vec![0.0; provider.dimension()])
            }
        }
    }
}

/// Assign names to clusters by index; unnamed clusters get `Concept_<index>`.
pub fn merge_clusters(
    clusters: Vec<Vec<Entity>>,
    names: &HashMap<usize, String>,
) -> HashMap<String, Vec<Entity>> {
    let mut merged: HashMap<String, Vec<Entity>> = HashMap::with_capacity(clusters.len());
    for (idx, cluster) in clusters.into_iter().enumerate() {
        let name = names
            .get(&idx)
            .cloned()
            .unwrap_or_else(|| format!("Concept_{idx}"));
        merged.entry(name).or_default().extend(cluster);
    }
    merged
}

/// Cosine similarity with an epsilon-guarded denominator.
///
/// Mismatched or empty vectors compare as 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt() + COSINE_EPSILON)) as f32
}
