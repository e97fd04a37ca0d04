use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub index: IndexConfig,
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Path to the SQLite index database.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum segment length in characters.
    pub max_chunk_size: usize,
    /// Characters duplicated between adjacent segments.
    #[serde(default)]
    pub overlap: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Backend: "openai", "ollama", or "local" (feature-gated).
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL override (Ollama; ignored by other providers).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Result count when the caller does not pass `k`.
    #[serde(default = "default_top_k")]
    pub top_k_default: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k_default: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Fixed-size worker pool for segment embedding + writing.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    /// Retries per segment after the first attempt, with exponential backoff.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: default_worker_concurrency(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_max_retries() -> u32 {
    3
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

/// Fail-fast validation: a bad value stops startup, never mid-pipeline.
fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_chunk_size == 0 {
        anyhow::bail!("chunking.max_chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.max_chunk_size {
        anyhow::bail!(
            "chunking.overlap ({}) must be < chunking.max_chunk_size ({})",
            config.chunking.overlap,
            config.chunking.max_chunk_size
        );
    }

    if config.retrieval.top_k_default < 1 {
        anyhow::bail!("retrieval.top_k_default must be >= 1");
    }

    if config.ingest.worker_concurrency < 1 {
        anyhow::bail!("ingest.worker_concurrency must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be openai, ollama, or local.",
            other
        ),
    }

    // Local models carry their own dimensionality; remote ones must declare it
    // up front so the index schema and similarity search stay consistent.
    if config.embedding.provider != "local" {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified for provider '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 for provider '{}'",
                config.embedding.provider
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(chunking: &str) -> String {
        format!(
            r#"
[index]
path = "/tmp/sdx.sqlite"

[chunking]
{chunking}

[embedding]
provider = "ollama"
model = "nomic-embed-text"
dims = 768
"#
        )
    }

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn valid_config_parses() {
        let cfg = parse(&base_config("max_chunk_size = 500\noverlap = 50")).unwrap();
        assert_eq!(cfg.chunking.max_chunk_size, 500);
        assert_eq!(cfg.chunking.overlap, 50);
        assert_eq!(cfg.retrieval.top_k_default, 5);
        assert_eq!(cfg.ingest.worker_concurrency, 4);
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let err = parse(&base_config("max_chunk_size = 0")).unwrap_err();
        assert!(err.to_string().contains("max_chunk_size"));
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let err = parse(&base_config("max_chunk_size = 10\noverlap = 10")).unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn unknown_provider_rejected() {
        let toml_str = r#"
[index]
path = "/tmp/sdx.sqlite"

[chunking]
max_chunk_size = 500

[embedding]
provider = "magic"
"#;
        let err = parse(toml_str).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn remote_provider_requires_model_and_dims() {
        let toml_str = r#"
[index]
path = "/tmp/sdx.sqlite"

[chunking]
max_chunk_size = 500

[embedding]
provider = "openai"
"#;
        let err = parse(toml_str).unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }
}
