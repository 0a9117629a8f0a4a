//! Embedding providers used by concept clustering

use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    types::{CreateEmbeddingRequestArgs, EmbeddingInput},
    Client as OpenAIClient,
};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{EmbeddingProviderKind, EmbeddingSettings};
use crate::error::{Error, Result};

/// Maximum characters sent to the remote API per input.
const MAX_INPUT_CHARS: usize = 8000;

/// Source of fixed-dimension text embeddings.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dimension of every vector this provider returns.
    fn dimension(&self) -> usize;
}

/// Build the provider selected in config; `None` disables clustering.
pub fn provider_from_settings(
    settings: &EmbeddingSettings,
) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    match settings.provider {
        EmbeddingProviderKind::None => Ok(None),
        EmbeddingProviderKind::Local => Ok(Some(Arc::new(LocalEmbedder::new(settings.dimension)))),
        EmbeddingProviderKind::OpenAi => {
            let embedder = OpenAiEmbedder::new(&settings.api_key, &settings.model)?;
            Ok(Some(Arc::new(embedder)))
        }
    }
}

/// OpenAI embeddings API client
pub struct OpenAiEmbedder {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: &str, model: impl Into<String>) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::ConfigError("OPENAI_API_KEY not set".into()));
        }

        let config = OpenAIConfig::new().with_api_key(api_key);
        Ok(Self {
            client: OpenAIClient::with_config(config),
            model: model.into(),
        })
    }

    /// Create from the `OPENAI_API_KEY` environment variable.
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::ConfigError("OPENAI_API_KEY not set".into()))?;
        Self::new(&api_key, model)
    }

    /// Generate embeddings for multiple texts in one request.
    ///
    /// Blank inputs are not sent and come back as empty vectors.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let processed: Vec<String> = texts
            .iter()
            .map(|t| crate::graph::models::truncate_chars(t.trim(), MAX_INPUT_CHARS).to_string())
            .filter(|t| !t.is_empty())
            .collect();

        if processed.is_empty() {
            return Ok(vec![Vec::new(); texts.len()]);
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::StringArray(processed))
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        info!(
            "Generated {} embeddings, tokens used: {}",
            response.data.len(),
            response.usage.total_tokens
        );

        let mut result = Vec::with_capacity(texts.len());
        let mut embed_iter = response.data.into_iter();

        for text in texts {
            if text.trim().is_empty() {
                result.push(Vec::new());
            } else if let Some(embed) = embed_iter.next() {
                result.push(embed.embedding);
            } else {
                return Err(Error::EmbeddingError(
                    "fewer embeddings returned than requested".into(),
                ));
            }
        }

        Ok(result)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        match embeddings.into_iter().next() {
            Some(v) if !v.is_empty() => Ok(v),
            _ => Err(Error::EmbeddingError("No embedding returned".into())),
        }
    }

    fn dimension(&self) -> usize {
        match self.model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        }
    }
}

/// Deterministic hashed bag-of-tokens embedding for offline use.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dim: usize,
}

impl LocalEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut vec = vec![0.0f32; self.dim];
        for token in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let idx = (hasher.finish() as usize) % self.dim;
            vec[idx] += 1.0;
        }

        normalize(&mut vec);
        vec
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    } else if !vec.is_empty() {
        warn!("Embedding input had no tokens; returning zero vector");
    }
}
