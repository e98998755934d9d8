//! Embedding backends.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`OllamaEmbedder`]** calls a local Ollama instance's `/api/embed` endpoint.
//! - **[`OpenAIEmbedder`]** calls the OpenAI (or compatible) embeddings API.
//! - **`LocalEmbedder`** runs a model in-process via fastembed
//!   (`local-embeddings-fastembed` feature); no network after model download.
//!
//! Use [`create_embedder`] to pick one from configuration. Texts are sent in
//! batches of `embedding.batch_size`; transport retries are handled by
//! [`crate::http::post_json`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::EmbeddingConfig;
use crate::http;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, e.g. `"nomic-embed-text"`.
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text (e.g. a search query).
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// Instantiate the embedder selected by `config.provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embed `texts` in `batch_size` slices and check the result shape.
pub async fn embed_batched(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
    expected_dims: Option<usize>,
) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let vectors = embedder.embed(batch).await?;
        if vectors.len() != batch.len() {
            bail!(
                "embedding backend returned {} vectors for {} inputs",
                vectors.len(),
                batch.len()
            );
        }
        out.extend(vectors);
    }
    if let Some(dims) = expected_dims {
        if let Some(bad) = out.iter().find(|v| v.len() != dims) {
            bail!(
                "embedding dimension mismatch: expected {}, got {}",
                dims,
                bad.len()
            );
        }
    }
    Ok(out)
}

// ============ Ollama ============

const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Calls `POST /api/embed` on the configured Ollama URL.
///
/// Requires an embedding model to be pulled (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    model: String,
    url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string()),
            max_retries: config.max_retries,
            client: http::build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::post_json(
            &self.client,
            &format!("{}/api/embed", self.url.trim_end_matches('/')),
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .map(|values| values.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect())
                .ok_or_else(|| {
                    anyhow::anyhow!("Invalid Ollama response: embedding is not an array")
                })
        })
        .collect()
}

// ============ OpenAI ============

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com";

/// Calls `POST /v1/embeddings`. Requires `OPENAI_API_KEY`.
pub struct OpenAIEmbedder {
    model: String,
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string()),
            api_key: http::openai_api_key()?,
            max_retries: config.max_retries,
            client: http::build_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = http::post_json(
            &self.client,
            &format!("{}/v1/embeddings", self.url.trim_end_matches('/')),
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_openai_response(&json)
    }
}

/// Extracts `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vec));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Local (fastembed) ============

#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model_name: String,
    batch_size: usize,
    model: Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    /// Loads (downloading on first use) the configured model.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(config_to_fastembed_model(&config.model)?)
                .with_show_download_progress(true),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;
        Ok(Self {
            model_name: config.model.clone(),
            batch_size: config.batch_size,
            model: Arc::new(std::sync::Mutex::new(model)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text" | "nomic-embed-text-v1.5" => {
            Ok(fastembed::EmbeddingModel::NomicEmbedTextV15)
        }
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, nomic-embed-text-v1.5",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.model.clone();
        let texts = texts.to_vec();
        let batch_size = self.batch_size;
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| anyhow::anyhow!("local embedding model lock poisoned"))?;
            model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    #[async_trait]
    impl Embedder for Fixed {
        fn model_name(&self) -> &str {
            "fixed"
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[test]
    fn parses_ollama_embeddings() {
        let json = serde_json::json!({ "embeddings": [[0.1, 0.2], [0.3, 0.4]] });
        let vecs = parse_ollama_response(&json).unwrap();
        assert_eq!(vecs.len(), 2);
        assert!((vecs[1][0] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn ollama_missing_field_is_error() {
        let json = serde_json::json!({ "error": "model not found" });
        assert!(parse_ollama_response(&json).is_err());
    }

    #[test]
    fn openai_embeddings_are_ordered_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [2.0] },
                { "index": 0, "embedding": [1.0] }
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![1.0], vec![2.0]]);
    }

    #[tokio::test]
    async fn batching_preserves_order_and_checks_dims() {
        let texts: Vec<String> = (0..5).map(|i| "x".repeat(i)).collect();
        let vecs = embed_batched(&Fixed, &texts, 2, Some(2)).await.unwrap();
        assert_eq!(vecs.len(), 5);
        assert_eq!(vecs[4][0], 4.0);

        let err = embed_batched(&Fixed, &texts, 2, Some(3)).await.unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[tokio::test]
    async fn embed_one_returns_first_vector() {
        let v = Fixed.embed_one("abc").await.unwrap();
        assert_eq!(v, vec![3.0, 1.0]);
    }
}
