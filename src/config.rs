use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
    #[serde(default = "default_no_split_multiplier")]
    pub no_split_multiplier: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            min_chunk_size: default_min_chunk_size(),
            no_split_multiplier: default_no_split_multiplier(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_overlap() -> usize {
    100
}
fn default_min_chunk_size() -> usize {
    100
}
fn default_no_split_multiplier() -> f64 {
    1.2
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    /// Vector-similarity gate for long natural-language queries.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Lower gate applied to short keyword-style queries.
    #[serde(default = "default_short_query_threshold")]
    pub short_query_threshold: f64,
    /// Queries shorter than this many trimmed characters count as short.
    #[serde(default = "default_short_query_max_chars")]
    pub short_query_max_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            keyword_weight: default_keyword_weight(),
            similarity_threshold: default_similarity_threshold(),
            short_query_threshold: default_short_query_threshold(),
            short_query_max_chars: default_short_query_max_chars(),
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_keyword_weight() -> f64 {
    0.3
}
fn default_similarity_threshold() -> f64 {
    0.3
}
fn default_short_query_threshold() -> f64 {
    0.2
}
fn default_short_query_max_chars() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            endpoint: default_endpoint(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_endpoint() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Dimensionality used for zero-vector substitution when a backend call
    /// fails. Zero when embeddings are disabled.
    pub fn effective_dims(&self) -> usize {
        self.dims.unwrap_or(0)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.overlap must be smaller than chunking.chunk_size");
    }
    if config.chunking.no_split_multiplier < 1.0 {
        anyhow::bail!("chunking.no_split_multiplier must be >= 1.0");
    }

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.keyword_weight) {
        anyhow::bail!("retrieval.keyword_weight must be in [0.0, 1.0]");
    }
    for (name, value) in [
        ("similarity_threshold", config.retrieval.similarity_threshold),
        (
            "short_query_threshold",
            config.retrieval.short_query_threshold,
        ),
    ] {
        if !(0.0..=1.0).contains(&value) {
            anyhow::bail!("retrieval.{} must be in [0.0, 1.0]", name);
        }
    }

    // Validate embedding
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("ragbase.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults_applied() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[db]
path = "data/rag.sqlite"

[server]
bind = "127.0.0.1:7411"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.chunking.chunk_size, 500);
        assert_eq!(cfg.chunking.overlap, 100);
        assert_eq!(cfg.chunking.min_chunk_size, 100);
        assert_eq!(cfg.retrieval.top_k, 10);
        assert!((cfg.retrieval.keyword_weight - 0.3).abs() < 1e-9);
        assert!((cfg.retrieval.similarity_threshold - 0.3).abs() < 1e-9);
        assert!((cfg.retrieval.short_query_threshold - 0.2).abs() < 1e-9);
        assert_eq!(cfg.retrieval.short_query_max_chars, 20);
        assert!(!cfg.embedding.is_enabled());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[db]
path = "data/rag.sqlite"

[chunking]
chunk_size = 100
overlap = 100

[server]
bind = "127.0.0.1:7411"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_enabled_embedding_requires_model_and_dims() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[db]
path = "data/rag.sqlite"

[embedding]
provider = "openai"

[server]
bind = "127.0.0.1:7411"
"#,
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[db]
path = "data/rag.sqlite"

[embedding]
provider = "sorcery"
model = "m"
dims = 8

[server]
bind = "127.0.0.1:7411"
"#,
        );
        assert!(load_config(&path).is_err());
    }
}
