//! Embedding backends and vector utilities.
//!
//! Defines the [`Embedder`] trait that maps text to fixed-length dense
//! vectors, plus the concrete backends:
//! - **[`OpenAiEmbedder`]**: `POST /v1/embeddings`, keyed by `OPENAI_API_KEY`.
//! - **[`OllamaEmbedder`]**: a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalEmbedder`**: fastembed, behind the `local-embeddings` feature;
//!   the model loads once at startup and is reused for every call.
//!
//! Retrieval correctness depends on determinism: the same text under the
//! same model always yields the same vector, so backends never fall back to
//! a different model. A backend that cannot be reached fails the call with
//! [`PipelineError::ModelUnavailable`]; retry policy belongs to the caller.
//!
//! Also provides the helpers shared by the index:
//! - [`cosine_similarity`]: similarity between two embedding vectors
//! - [`vec_to_blob`] / [`blob_to_vec`]: little-endian f32 BLOB codec for
//!   SQLite storage

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::PipelineError;

/// Maps text to fixed-length vectors. One instance is built at startup and
/// shared by handle between ingestion and the query engine so both sides of
/// the index speak the same model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier persisted as provenance on every index record.
    fn model_name(&self) -> &str;
    /// Vector dimensionality; fixed for the lifetime of the index.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;
}

/// Build the embedder selected by configuration.
///
/// Fails fast on missing credentials or unknown models so a bad setup never
/// reaches the pipeline.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Box::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Embedding provider 'local' requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

// ============ OpenAI ============

/// Embedding backend using the OpenAI embeddings API.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            model,
            dims,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::ModelUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PipelineError::ModelUnavailable(format!(
                "OpenAI API error {status}: {detail}"
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::ModelUnavailable(e.to_string()))?;
        parse_openai_response(&json)
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, PipelineError> {
    let data = json.get("data").and_then(|d| d.as_array()).ok_or_else(|| {
        PipelineError::ModelUnavailable("invalid OpenAI response: missing data array".to_string())
    })?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                PipelineError::ModelUnavailable(
                    "invalid OpenAI response: missing embedding".to_string(),
                )
            })?;
        embeddings.push(
            embedding
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }
    Ok(embeddings)
}

// ============ Ollama ============

/// Embedding backend using a local Ollama instance.
///
/// Requires an embedding model pulled ahead of time
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            model,
            dims,
            url,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/api/embed", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                PipelineError::ModelUnavailable(format!(
                    "Ollama connection error (is Ollama running at {}?): {e}",
                    self.url
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PipelineError::ModelUnavailable(format!(
                "Ollama API error {status}: {detail}"
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::ModelUnavailable(e.to_string()))?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, PipelineError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            PipelineError::ModelUnavailable(
                "invalid Ollama response: missing embeddings array".to_string(),
            )
        })?;

    let mut result = Vec::with_capacity(embeddings.len());
    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| {
                PipelineError::ModelUnavailable(
                    "invalid Ollama response: embedding is not an array".to_string(),
                )
            })?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }
    Ok(result)
}

// ============ Local (fastembed) ============

/// Offline embedding backend. The model downloads on first use, then loads
/// once per process and is reused across calls.
#[cfg(feature = "local-embeddings")]
pub struct LocalEmbedder {
    model: std::sync::Arc<std::sync::Mutex<fastembed::TextEmbedding>>,
    model_name: String,
    dims: usize,
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        let (fastembed_model, default_dims) = resolve_local_model(&model_name)?;
        let dims = config.dims.unwrap_or(default_dims);

        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {e}"))?;

        Ok(Self {
            model: std::sync::Arc::new(std::sync::Mutex::new(model)),
            model_name,
            dims,
        })
    }
}

#[cfg(feature = "local-embeddings")]
fn resolve_local_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    match name {
        "all-minilm-l6-v2" => Ok((fastembed::EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((fastembed::EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((fastembed::EmbeddingModel::BGEBaseENV15, 768)),
        "nomic-embed-text-v1.5" => Ok((fastembed::EmbeddingModel::NomicEmbedTextV15, 768)),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported: all-minilm-l6-v2, \
             bge-small-en-v1.5, bge-base-en-v1.5, nomic-embed-text-v1.5",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        let model = self.model.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| PipelineError::ModelUnavailable("model lock poisoned".to_string()))?;
            guard
                .embed(texts, None)
                .map_err(|e| PipelineError::ModelUnavailable(e.to_string()))
        })
        .await
        .map_err(|e| PipelineError::ModelUnavailable(e.to_string()))?
    }
}

// ============ Vector utilities ============

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`] back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two embedding vectors, in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors or vectors of different lengths; the
/// latter only happens when records from a different model leak into the
/// index, and scoring them at zero keeps them out of the top ranks.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn blob_length_is_four_bytes_per_dim() {
        assert_eq!(vec_to_blob(&[1.0, 2.0, 3.0]).len(), 12);
    }

    #[test]
    fn cosine_identical_is_one() {
        let v = vec![0.3, 2.0, -1.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_is_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite_is_minus_one() {
        assert!((cosine_similarity(&[2.0, 0.0], &[-2.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn parse_openai_shape() {
        let json = serde_json::json!({
            "data": [
                { "embedding": [0.1, 0.2] },
                { "embedding": [0.3, 0.4] },
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs.len(), 2);
        assert_eq!(vecs[1].len(), 2);
    }

    #[test]
    fn parse_ollama_shape() {
        let json = serde_json::json!({ "embeddings": [[1.0, 0.0], [0.0, 1.0]] });
        let vecs = parse_ollama_response(&json).unwrap();
        assert_eq!(vecs.len(), 2);
    }

    #[test]
    fn malformed_response_is_model_unavailable() {
        let err = parse_openai_response(&serde_json::json!({"nope": true})).unwrap_err();
        assert!(matches!(err, PipelineError::ModelUnavailable(_)));
    }
}
