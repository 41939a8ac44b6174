//! Hybrid vector+keyword retrieval.
//!
//! The query pipeline: authorize the requested collections, embed the query,
//! extract its keywords, pick an adaptive similarity threshold, fetch
//! candidates, score, rank, truncate.
//!
//! Scoring is a linear scan over the candidate set — valid at
//! small-to-moderate corpus sizes (thousands of chunks per query). The
//! candidate fetch is isolated behind [`CandidateSource`] so an
//! approximate-nearest-neighbor index can substitute later without touching
//! the ranking contract.
//!
//! The vector-similarity threshold is a hard recall gate: a candidate below
//! it is discarded outright, and no keyword score can rescue it. Short
//! keyword-style queries produce lower absolute cosine similarity than long
//! natural-language queries, so queries under `short_query_max_chars`
//! trimmed characters use the lower `short_query_threshold`.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::access::{self, Access};
use crate::config::Config;
use crate::context;
use crate::embedding;
use crate::keywords;
use crate::models::{RetrievalResult, SharePermission};

/// A chunk eligible for scoring, joined with its document and collection.
#[derive(Debug, Clone)]
pub struct CandidateChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub document_name: String,
    pub collection_id: String,
    pub collection_name: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub chunk_index: i64,
}

/// Source of retrieval candidates for a set of collections.
///
/// Implementations must only yield chunks from completed documents with
/// non-null embeddings. The SQLite implementation is a full scan of the
/// filtered join; an ANN-backed source may pre-narrow the set as long as
/// that contract holds.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn candidates(&self, collection_ids: &[String]) -> Result<Vec<CandidateChunk>>;
}

#[async_trait]
impl CandidateSource for SqlitePool {
    async fn candidates(&self, collection_ids: &[String]) -> Result<Vec<CandidateChunk>> {
        if collection_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; collection_ids.len()].join(", ");
        let sql = format!(
            r#"
            SELECT c.id AS chunk_id, c.content, c.embedding, c.chunk_index,
                   d.id AS document_id, d.filename AS document_name,
                   k.id AS collection_id, k.name AS collection_name
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            JOIN collections k ON k.id = d.collection_id
            WHERE k.id IN ({})
              AND d.status = 'completed'
              AND c.embedding IS NOT NULL
            ORDER BY k.created_at ASC, d.created_at ASC, c.chunk_index ASC
            "#,
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for id in collection_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(self).await?;

        let candidates = rows
            .iter()
            .filter_map(|row| {
                let chunk_id: String = row.get("chunk_id");
                let embedding_json: String = row.get("embedding");
                let embedding = match embedding::json_to_vec(&embedding_json) {
                    Some(v) => v,
                    None => {
                        eprintln!("Warning: chunk {} has an unparseable embedding; skipping", chunk_id);
                        return None;
                    }
                };
                Some(CandidateChunk {
                    chunk_id,
                    document_id: row.get("document_id"),
                    document_name: row.get("document_name"),
                    collection_id: row.get("collection_id"),
                    collection_name: row.get("collection_name"),
                    content: row.get("content"),
                    embedding,
                    chunk_index: row.get("chunk_index"),
                })
            })
            .collect();

        Ok(candidates)
    }
}

/// Pick the similarity gate for a query: short keyword-style queries get the
/// lower threshold, everything else the standard one.
pub fn effective_threshold(query: &str, config: &Config) -> f64 {
    let query_chars = query.trim().chars().count();
    if query_chars < config.retrieval.short_query_max_chars {
        config.retrieval.short_query_threshold
    } else {
        config.retrieval.similarity_threshold
    }
}

/// Score candidates against a query vector and keyword set.
///
/// Applies the hard vector gate, then combines the surviving candidates'
/// vector similarity and keyword score into the hybrid score. Preserves the
/// candidate fetch order.
pub fn score_candidates(
    query_vec: &[f32],
    query_keywords: &[String],
    candidates: Vec<CandidateChunk>,
    threshold: f64,
    keyword_weight: f64,
) -> Vec<RetrievalResult> {
    candidates
        .into_iter()
        .filter_map(|candidate| {
            let similarity =
                embedding::cosine_similarity(query_vec, &candidate.embedding) as f64;
            if similarity < threshold {
                return None;
            }

            let keyword_score = keywords::keyword_score(query_keywords, &candidate.content);
            let hybrid_score =
                (1.0 - keyword_weight) * similarity + keyword_weight * keyword_score;

            Some(RetrievalResult {
                chunk_id: candidate.chunk_id,
                document_id: candidate.document_id,
                document_name: candidate.document_name,
                collection_id: candidate.collection_id,
                collection_name: candidate.collection_name,
                content: candidate.content,
                similarity,
                keyword_score,
                hybrid_score,
                chunk_index: candidate.chunk_index,
            })
        })
        .collect()
}

/// Sort by hybrid score descending and truncate to `top_k`.
///
/// The sort is stable, so candidates with equal hybrid scores keep their
/// retrieval order — an implementation choice, not a semantic guarantee.
pub fn rank_results(mut results: Vec<RetrievalResult>, top_k: usize) -> Vec<RetrievalResult> {
    results.sort_by(|a, b| {
        b.hybrid_score
            .partial_cmp(&a.hybrid_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(top_k);
    results
}

/// Run hybrid retrieval for a caller's query over the requested collections.
///
/// Collections the caller cannot read — no access, or a grant with `none`
/// permission — are silently dropped from the candidate set. An empty
/// authorized set yields an empty result, indistinguishable from a query
/// with no matches: the retrieval layer does not leak which ids were denied.
pub async fn retrieve(
    pool: &SqlitePool,
    config: &Config,
    query: &str,
    collection_ids: &[String],
    caller_id: &str,
    top_k: Option<usize>,
) -> Result<Vec<RetrievalResult>> {
    let query_vec = embedding::embed_query(&config.embedding, query).await;
    retrieve_with_vector(pool, config, &query_vec, query, collection_ids, caller_id, top_k).await
}

/// Like [`retrieve`], but with a caller-supplied query vector. Useful when
/// the caller already holds an embedding for the query text.
pub async fn retrieve_with_vector(
    pool: &SqlitePool,
    config: &Config,
    query_vec: &[f32],
    query: &str,
    collection_ids: &[String],
    caller_id: &str,
    top_k: Option<usize>,
) -> Result<Vec<RetrievalResult>> {
    let mut authorized = Vec::new();
    for id in collection_ids {
        match access::resolve_access(pool, id, caller_id).await? {
            Access::Owner | Access::Shared(SharePermission::Read) => {
                authorized.push(id.clone());
            }
            // Shared(None) is an explicit deny; both it and NoAccess are
            // silently dropped.
            Access::Shared(SharePermission::None) | Access::NoAccess => {}
        }
    }
    if authorized.is_empty() {
        return Ok(Vec::new());
    }

    let query_keywords = keywords::extract_keywords(query);
    let threshold = effective_threshold(query, config);

    let candidates = pool.candidates(&authorized).await?;

    let results = score_candidates(
        query_vec,
        &query_keywords,
        candidates,
        threshold,
        config.retrieval.keyword_weight,
    );

    let top_k = top_k.unwrap_or(config.retrieval.top_k);
    Ok(rank_results(results, top_k))
}

/// Retrieval entry point for the surrounding application: run hybrid
/// retrieval and format the results into a model-ready context block.
pub async fn retrieve_and_format(
    pool: &SqlitePool,
    config: &Config,
    query: &str,
    collection_ids: &[String],
    caller_id: &str,
    top_k: Option<usize>,
) -> Result<(String, Vec<RetrievalResult>)> {
    let results = retrieve(pool, config, query, collection_ids, caller_id, top_k).await?;
    let context = context::format_context(&results);
    Ok((context, results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DbConfig, ServerConfig};

    fn test_config() -> Config {
        Config {
            db: DbConfig {
                path: "unused.sqlite".into(),
            },
            chunking: Default::default(),
            retrieval: Default::default(),
            embedding: Default::default(),
            server: ServerConfig {
                bind: "127.0.0.1:0".to_string(),
            },
        }
    }

    fn candidate(id: &str, embedding: Vec<f32>, content: &str) -> CandidateChunk {
        CandidateChunk {
            chunk_id: id.to_string(),
            document_id: format!("doc-{}", id),
            document_name: format!("{}.txt", id),
            collection_id: "kb-1".to_string(),
            collection_name: "manuals".to_string(),
            content: content.to_string(),
            embedding,
            chunk_index: 0,
        }
    }

    #[test]
    fn test_adaptive_threshold_short_vs_long() {
        let config = test_config();
        // 5 chars, trimmed: short query → 0.2
        assert!((effective_threshold("hello", &config) - 0.2).abs() < 1e-9);
        assert!((effective_threshold("  hello  ", &config) - 0.2).abs() < 1e-9);
        // 20+ chars: long query → 0.3
        let long = "how does the reactor shutdown sequence work";
        assert!((effective_threshold(long, &config) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_gate_keeps_short_drops_long() {
        // One candidate at similarity 0.25: retained under the short-query
        // gate (0.2), dropped under the long-query gate (0.3).
        let query_vec = vec![1.0f32, 0.0];
        // cos(theta) = 0.25
        let angle = 0.25f32.acos();
        let chunk_vec = vec![angle.cos(), angle.sin()];
        let cands = vec![candidate("c1", chunk_vec, "reactor notes")];

        let kept = score_candidates(&query_vec, &[], cands.clone(), 0.2, 0.3);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].similarity - 0.25).abs() < 1e-4);

        let dropped = score_candidates(&query_vec, &[], cands, 0.3, 0.3);
        assert!(dropped.is_empty());
    }

    #[test]
    fn test_keyword_score_cannot_rescue_gated_candidate() {
        let query_vec = vec![1.0f32, 0.0];
        let orthogonal = vec![0.0f32, 1.0];
        let kws = vec!["reactor".to_string()];
        let cands = vec![candidate("c1", orthogonal, "reactor reactor reactor")];
        let results = score_candidates(&query_vec, &kws, cands, 0.2, 0.3);
        assert!(results.is_empty());
    }

    #[test]
    fn test_hybrid_score_monotonic_in_both_signals() {
        let w = 0.3;
        let hybrid = |sim: f64, kw: f64| (1.0 - w) * sim + w * kw;
        assert!(hybrid(0.6, 0.5) > hybrid(0.5, 0.5));
        assert!(hybrid(0.5, 0.6) > hybrid(0.5, 0.5));
    }

    #[test]
    fn test_zero_vector_candidates_never_survive() {
        // Total embedding-backend outage: every stored vector is zero, so
        // cosine similarity is 0 and no positive threshold admits anything.
        let query_vec = vec![1.0f32, 0.0];
        let cands = vec![
            candidate("c1", vec![0.0, 0.0], "alpha"),
            candidate("c2", vec![0.0, 0.0], "beta"),
        ];
        let results = score_candidates(&query_vec, &[], cands, 0.2, 0.3);
        assert!(results.is_empty());
    }

    #[test]
    fn test_rank_orders_by_hybrid_desc_and_truncates() {
        let query_vec = vec![1.0f32, 0.0];
        let near = vec![1.0f32, 0.1];
        let nearer = vec![1.0f32, 0.01];
        let kws = vec!["turbine".to_string()];
        let cands = vec![
            candidate("low", near, "no match here"),
            candidate("high", nearer, "turbine details"),
        ];
        let results = score_candidates(&query_vec, &kws, cands, 0.2, 0.3);
        let ranked = rank_results(results, 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].chunk_id, "high");
    }

    #[test]
    fn test_equal_hybrid_scores_keep_retrieval_order() {
        // Identical vectors and contents → identical hybrid scores; the
        // stable sort must preserve candidate order.
        let query_vec = vec![1.0f32, 0.0];
        let v = vec![1.0f32, 0.0];
        let cands = vec![
            candidate("first", v.clone(), "same text"),
            candidate("second", v.clone(), "same text"),
            candidate("third", v, "same text"),
        ];
        let results = score_candidates(&query_vec, &[], cands, 0.2, 0.3);
        let ranked = rank_results(results, 10);
        let order: Vec<&str> = ranked.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }
}
