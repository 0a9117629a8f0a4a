//! Configuration for the graph store, pipeline and embedding provider
//!
//! Loads configuration from config.yml file

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default constants (fallback if config.yml not found)
pub const DEFAULT_NEO4J_URI: &str = "bolt://localhost:7687";
pub const DEFAULT_NEO4J_USER: &str = "neo4j";
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;
pub const DEFAULT_TEMPORAL_WINDOW_DAYS: i64 = 7;
/// Upper bound for `graph.temporal_window_days` (100 years)
pub const MAX_TEMPORAL_WINDOW_DAYS: i64 = 36_500;
pub const DEFAULT_CHUNK_TEXT_LIMIT: usize = 1000;
pub const DEFAULT_EMBEDDING_CACHE_CAPACITY: u64 = 10_000;
pub const DEFAULT_MAX_PATH_RESULTS: usize = 10;
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
pub const DEFAULT_CHUNK_SIZE: usize = 200;
pub const DEFAULT_CHUNK_OVERLAP: usize = 40;

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    neo4j: Option<YamlNeo4j>,
    graph: Option<YamlGraph>,
    embedding: Option<YamlEmbedding>,
    chunking: Option<YamlChunking>,
    features: Option<YamlFeatures>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlNeo4j {
    uri: Option<String>,
    user: Option<String>,
    password: Option<String>,
    query_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlGraph {
    enable_temporal: Option<bool>,
    enable_clustering: Option<bool>,
    similarity_threshold: Option<f32>,
    temporal_window_days: Option<i64>,
    chunk_text_limit: Option<usize>,
    embedding_cache_capacity: Option<u64>,
    max_path_results: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlEmbedding {
    provider: Option<String>,
    model: Option<String>,
    dimension: Option<usize>,
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlChunking {
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct YamlFeatures {
    offline_mode: Option<bool>,
}

/// Neo4j connection settings
#[derive(Debug, Clone)]
pub struct Neo4jSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub query_timeout: Duration,
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            uri: DEFAULT_NEO4J_URI.to_string(),
            user: DEFAULT_NEO4J_USER.to_string(),
            password: String::new(),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        }
    }
}

/// Pipeline and query tuning
#[derive(Debug, Clone)]
pub struct GraphSettings {
    pub enable_temporal: bool,
    pub enable_clustering: bool,
    pub similarity_threshold: f32,
    pub temporal_window_days: i64,
    /// Maximum characters of chunk text persisted on a Chunk node
    pub chunk_text_limit: usize,
    pub embedding_cache_capacity: u64,
    pub max_path_results: usize,
}

impl GraphSettings {
    /// Temporal window as a chrono duration
    pub fn temporal_window(&self) -> Result<chrono::Duration> {
        if !(1..=MAX_TEMPORAL_WINDOW_DAYS).contains(&self.temporal_window_days) {
            return Err(Error::ConfigError(format!(
                "graph.temporal_window_days must be within [1, {}], got {}",
                MAX_TEMPORAL_WINDOW_DAYS, self.temporal_window_days
            )));
        }
        chrono::Duration::try_days(self.temporal_window_days).ok_or_else(|| {
            Error::ConfigError(format!(
                "graph.temporal_window_days out of range: {}",
                self.temporal_window_days
            ))
        })
    }
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            enable_temporal: true,
            enable_clustering: true,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            temporal_window_days: DEFAULT_TEMPORAL_WINDOW_DAYS,
            chunk_text_limit: DEFAULT_CHUNK_TEXT_LIMIT,
            embedding_cache_capacity: DEFAULT_EMBEDDING_CACHE_CAPACITY,
            max_path_results: DEFAULT_MAX_PATH_RESULTS,
        }
    }
}

/// Which embedding backend the clusterer uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProviderKind {
    OpenAi,
    Local,
    /// No provider: clustering degrades to singletons
    None,
}

impl FromStr for EmbeddingProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "local" | "hash" => Ok(Self::Local),
            "none" | "off" | "" => Ok(Self::None),
            other => Err(Error::ConfigError(format!(
                "unknown embedding provider: {other}"
            ))),
        }
    }
}

/// Embedding provider settings
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub dimension: usize,
    pub api_key: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Local,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            api_key: String::new(),
        }
    }
}

/// Word-window chunking settings
#[derive(Debug, Clone)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub neo4j: Neo4jSettings,
    pub graph: GraphSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    /// Use the in-memory graph store instead of Neo4j
    pub offline_mode: bool,
}

impl Config {
    /// Load configuration from config.yml or use defaults
    /// Environment variables take precedence over config.yml strings
    pub fn new() -> Self {
        Self::from_candidates(&["config.yml", "../config.yml"])
    }

    /// First candidate that loads and validates, else env defaults.
    ///
    /// Files that exist but fail to load are reported, not silently skipped.
    pub fn from_candidates<P: AsRef<Path>>(candidates: &[P]) -> Self {
        for candidate in candidates {
            let path = candidate.as_ref();
            if !path.exists() {
                continue;
            }
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => tracing::warn!("Ignoring {}: {}", path.display(), e),
            }
        }
        tracing::debug!("No usable config.yml, using defaults and environment");
        Self::from_env()
    }

    /// Defaults with environment fallbacks applied
    pub fn from_env() -> Self {
        Self::load_dotenv();
        Self::from_yaml(YamlConfig::default())
    }

    /// Resolve a value: prefer env var if config value looks like ${VAR}
    fn resolve_env_string(value: Option<String>, env_key: &str) -> Option<String> {
        if let Some(ref v) = value {
            if let Some(var_name) = v.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
                if let Ok(env_val) = std::env::var(var_name) {
                    return Some(env_val);
                }
            }
        }
        if let Ok(env_val) = std::env::var(env_key) {
            return Some(env_val);
        }
        value.filter(|v| !v.starts_with("${"))
    }

    /// Explicit YAML value wins; otherwise parse the env var
    fn resolve_env_parse<T: FromStr>(value: Option<T>, env_key: &str) -> Option<T> {
        value.or_else(|| std::env::var(env_key).ok().and_then(|v| v.trim().parse().ok()))
    }

    fn parse_bool_flag(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load_dotenv();

        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let yaml: YamlConfig = serde_yaml::from_str(&content)?;
        let config = Self::from_yaml(yaml);
        config.validate()?;
        Ok(config)
    }

    fn from_yaml(yaml: YamlConfig) -> Self {
        let neo4j = yaml.neo4j.unwrap_or_default();
        let graph = yaml.graph.unwrap_or_default();
        let embedding = yaml.embedding.unwrap_or_default();
        let chunking = yaml.chunking.unwrap_or_default();
        let features = yaml.features.unwrap_or_default();

        let provider = Self::resolve_env_string(embedding.provider, "EMBEDDING_PROVIDER")
            .and_then(|p| match p.parse() {
                Ok(kind) => Some(kind),
                Err(e) => {
                    tracing::warn!("{}; falling back to local embeddings", e);
                    None
                }
            })
            .unwrap_or(EmbeddingProviderKind::Local);

        let offline_mode = features.offline_mode.unwrap_or_else(|| {
            std::env::var("OFFLINE_MODE")
                .ok()
                .and_then(|v| Self::parse_bool_flag(&v))
                .unwrap_or(false)
        });

        Self {
            neo4j: Neo4jSettings {
                uri: Self::resolve_env_string(neo4j.uri, "NEO4J_URI")
                    .unwrap_or_else(|| DEFAULT_NEO4J_URI.to_string()),
                user: Self::resolve_env_string(neo4j.user, "NEO4J_USER")
                    .unwrap_or_else(|| DEFAULT_NEO4J_USER.to_string()),
                password: Self::resolve_env_string(neo4j.password, "NEO4J_PASSWORD")
                    .unwrap_or_default(),
                query_timeout: Duration::from_secs(
                    Self::resolve_env_parse(neo4j.query_timeout_secs, "NEO4J_QUERY_TIMEOUT")
                        .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS),
                ),
            },
            graph: GraphSettings {
                enable_temporal: graph.enable_temporal.unwrap_or(true),
                enable_clustering: graph.enable_clustering.unwrap_or(true),
                similarity_threshold: graph
                    .similarity_threshold
                    .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD),
                temporal_window_days: graph
                    .temporal_window_days
                    .unwrap_or(DEFAULT_TEMPORAL_WINDOW_DAYS),
                chunk_text_limit: graph.chunk_text_limit.unwrap_or(DEFAULT_CHUNK_TEXT_LIMIT),
                embedding_cache_capacity: graph
                    .embedding_cache_capacity
                    .unwrap_or(DEFAULT_EMBEDDING_CACHE_CAPACITY),
                max_path_results: graph.max_path_results.unwrap_or(DEFAULT_MAX_PATH_RESULTS),
            },
            embedding: EmbeddingSettings {
                provider,
                model: Self::resolve_env_string(embedding.model, "EMBEDDING_MODEL")
                    .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
                dimension: embedding.dimension.unwrap_or(DEFAULT_EMBEDDING_DIMENSION),
                api_key: Self::resolve_env_string(embedding.api_key, "OPENAI_API_KEY")
                    .unwrap_or_default(),
            },
            chunking: ChunkingSettings {
                chunk_size: chunking.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
                chunk_overlap: chunking.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP),
            },
            offline_mode,
        }
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.graph.similarity_threshold) {
            return Err(Error::ConfigError(format!(
                "graph.similarity_threshold must be within [0, 1], got {}",
                self.graph.similarity_threshold
            )));
        }
        self.graph.temporal_window()?;
        if self.graph.chunk_text_limit == 0 {
            return Err(Error::ConfigError(
                "graph.chunk_text_limit must be positive".into(),
            ));
        }
        if self.chunking.chunk_size == 0 {
            return Err(Error::ConfigError(
                "chunking.chunk_size must be positive".into(),
            ));
        }
        Ok(())
    }
}
