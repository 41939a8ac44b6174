//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]** — returns errors; used when embeddings are not configured.
//! - **[`OpenAiProvider`]** — calls an OpenAI-compatible embeddings endpoint
//!   with batching, retry, and backoff.
//!
//! On top of the raw providers sits the degradation layer used by the
//! ingestion and query pipelines: [`embed_batch`] and [`embed_query`] never
//! fail. Any backend error (inference failure, timeout, misconfiguration)
//! yields zero vectors of the configured dimension and a logged warning, so
//! a transient inference hiccup cannot fail an entire document upload or
//! hang a query. Blank inputs are replaced with a single-space placeholder
//! before reaching the backend, since some backends reject empty strings.
//!
//! Also provides vector utilities:
//! - [`cosine_similarity`] — similarity between two embedding vectors
//! - [`vec_to_json`] / [`json_to_vec`] — (de)serialize a vector as the JSON
//!   float array stored in the chunks table
//!
//! # Retry Strategy
//!
//! The OpenAI-compatible provider uses exponential backoff for transient
//! errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Trait for embedding providers.
///
/// The vector dimensionality is fixed at construction and constant for the
/// provider's lifetime.
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1024`).
    fn dims(&self) -> usize;
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration. The
/// degradation layer turns those errors into zero vectors.
pub struct DisabledProvider;

impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
}

// ============ OpenAI-compatible Provider ============

/// Embedding provider for OpenAI-compatible inference backends.
///
/// Posts to the configured `embedding.endpoint` (`/v1/embeddings` shape).
/// Reads the API key from the `EMBEDDING_API_KEY` environment variable,
/// falling back to `OPENAI_API_KEY`; self-hosted backends may need neither.
pub struct OpenAiProvider {
    model: String,
    dims: usize,
}

impl OpenAiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for openai provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for openai provider"))?;

        Ok(Self { model, dims })
    }
}

impl EmbeddingProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledProvider)),
        "openai" => Ok(Box::new(OpenAiProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embed a batch of texts using the configured provider, propagating errors.
///
/// This is the raw layer; pipelines use [`embed_batch`] / [`embed_query`],
/// which add the zero-vector degradation policy on top.
pub async fn embed_texts(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    match config.provider.as_str() {
        "openai" => embed_openai(config, texts).await,
        "disabled" => bail!("Embedding provider is disabled"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Call an OpenAI-compatible embeddings endpoint with retry/backoff.
async fn embed_openai(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let api_key = std::env::var("EMBEDDING_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .unwrap_or_default();

    let model = config
        .model
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(&config.endpoint)
            .header("Content-Type", "application/json")
            .json(&body);
        if !api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return parse_embeddings_response(&json);
                }

                // Rate limited or server error — retry
                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow::anyhow!(
                        "embedding API error {}: {}",
                        status,
                        body_text
                    ));
                    continue;
                }

                // Client error (not 429) — don't retry
                let body_text = response.text().await.unwrap_or_default();
                bail!("embedding API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(e.into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
}

/// Parse the `data[].embedding` arrays out of an embeddings API response.
fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing embedding"))?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Degradation layer ============

/// Embed a batch of texts, never failing.
///
/// Order is preserved 1:1 with the input. Blank or whitespace-only inputs
/// are sent as a single-space placeholder. Any backend failure substitutes
/// zero vectors of the configured dimension and logs a warning — degraded,
/// not fatal.
pub async fn embed_batch(config: &EmbeddingConfig, texts: &[String]) -> Vec<Vec<f32>> {
    if texts.is_empty() {
        return Vec::new();
    }

    let sanitized: Vec<String> = texts
        .iter()
        .map(|t| {
            if t.trim().is_empty() {
                " ".to_string()
            } else {
                t.clone()
            }
        })
        .collect();

    match embed_texts(config, &sanitized).await {
        Ok(vectors) if vectors.len() == texts.len() => vectors,
        Ok(vectors) => {
            eprintln!(
                "Warning: embedding backend returned {} vectors for {} inputs; substituting zero vectors",
                vectors.len(),
                texts.len()
            );
            zero_vectors(config.effective_dims(), texts.len())
        }
        Err(e) => {
            eprintln!("Warning: embedding batch failed ({}); substituting zero vectors", e);
            zero_vectors(config.effective_dims(), texts.len())
        }
    }
}

/// Embed a single query text, never failing. See [`embed_batch`].
pub async fn embed_query(config: &EmbeddingConfig, text: &str) -> Vec<f32> {
    embed_batch(config, &[text.to_string()])
        .await
        .into_iter()
        .next()
        .unwrap_or_else(|| vec![0.0; config.effective_dims()])
}

fn zero_vectors(dims: usize, count: usize) -> Vec<Vec<f32>> {
    (0..count).map(|_| vec![0.0; dims]).collect()
}

// ============ Vector utilities ============

/// Serialize a vector as the JSON float array stored in `chunks.embedding`.
pub fn vec_to_json(vec: &[f32]) -> String {
    serde_json::to_string(vec).unwrap_or_else(|_| "[]".to_string())
}

/// Deserialize a JSON float array back into a vector. Returns `None` for
/// malformed or empty arrays (such chunks are skipped during scoring).
pub fn json_to_vec(json: &str) -> Option<Vec<f32>> {
    let vec: Vec<f32> = serde_json::from_str(json).ok()?;
    if vec.is_empty() {
        None
    } else {
        Some(vec)
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`: dot product divided by the product of
/// magnitudes. Returns `0.0` (not NaN, not an error) for empty vectors,
/// length-mismatched vectors, or when either magnitude is zero.
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
    fn test_vec_json_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let json = vec_to_json(&vec);
        let restored = json_to_vec(&json).unwrap();
        assert_eq!(vec, restored);
    }

    #[test]
    fn test_json_to_vec_rejects_empty_and_malformed() {
        assert!(json_to_vec("[]").is_none());
        assert!(json_to_vec("not json").is_none());
        assert!(json_to_vec("{\"a\": 1}").is_none());
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0, 2.0];
        let b = vec![-1.0, 0.0, -2.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector_is_zero_not_nan() {
        let a = vec![1.0, 2.0, 3.0];
        let zero = vec![0.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_cosine_length_mismatch_is_zero() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[tokio::test]
    async fn test_disabled_provider_degrades_to_zero_vectors() {
        let config = EmbeddingConfig {
            provider: "disabled".to_string(),
            dims: Some(4),
            ..Default::default()
        };
        let vectors = embed_batch(&config, &["hello".to_string(), "world".to_string()]).await;
        assert_eq!(vectors.len(), 2);
        for v in &vectors {
            assert_eq!(v.len(), 4);
            assert!(v.iter().all(|&x| x == 0.0));
        }
    }

    #[tokio::test]
    async fn test_embed_query_never_fails() {
        let config = EmbeddingConfig {
            provider: "disabled".to_string(),
            dims: Some(3),
            ..Default::default()
        };
        let v = embed_query(&config, "anything").await;
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_provider_dims_fixed_at_construction() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            model: Some("test-embed".to_string()),
            dims: Some(1024),
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.dims(), 1024);
        assert_eq!(provider.model_name(), "test-embed");
    }
}
