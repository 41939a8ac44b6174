//! Context assembly for retrieval-augmented generation.
//!
//! Formats ranked retrieval results into a reference block for the
//! chat-completion model, builds the final augmented prompt, and selects
//! the single citation persisted alongside a generated answer.

use anyhow::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{Citation, RetrievalResult};

/// Format ranked results into a labeled reference block.
///
/// Empty input yields an empty string — the signal to proceed without
/// augmentation. Each entry carries its source collection, document,
/// similarity, and content, wrapped in instructions marking the block as
/// reference material.
pub fn format_context(results: &[RetrievalResult]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut parts = Vec::new();
    parts.push("[Reference Material]".to_string());

    for (i, result) in results.iter().enumerate() {
        parts.push(format!(
            "\n[Source {}] {} - {} (similarity: {:.2})",
            i + 1,
            result.collection_name,
            result.document_name,
            result.similarity
        ));
        parts.push(result.content.clone());
    }

    parts.push(
        "\n[The material above is reference only. Answer the user's question based on it.]\n"
            .to_string(),
    );

    parts.join("\n")
}

/// Build the augmented prompt handed to the chat-completion model.
///
/// With no context the user query passes through unchanged.
pub fn build_prompt(context: &str, user_query: &str) -> String {
    if context.is_empty() {
        return user_query.to_string();
    }

    format!(
        "{}\n\nQuestion: {}\n\nAnswer the question using the reference material above. \
         If the material does not contain the relevant information, state that explicitly.",
        context, user_query
    )
}

/// Select the result to cite: the single highest **vector-similarity**
/// result, which is not necessarily the top hybrid-ranked one. A deliberate
/// cite-the-strongest-single-match simplification; other results may still
/// have informed generation.
pub fn select_citation(results: &[RetrievalResult]) -> Option<Citation> {
    let mut best: Option<&RetrievalResult> = None;
    for result in results {
        match best {
            Some(b) if result.similarity <= b.similarity => {}
            _ => best = Some(result),
        }
    }

    best.map(|r| Citation {
        collection_name: r.collection_name.clone(),
        document_name: r.document_name.clone(),
        similarity: r.similarity,
        chunk_index: r.chunk_index,
        content: r.content.clone(),
    })
}

/// Persist a citation against a caller-supplied answer id.
pub async fn record_citation(
    pool: &SqlitePool,
    answer_id: &str,
    citation: &Citation,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO citations (id, answer_id, collection_name, document_name, similarity, chunk_index, content, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(answer_id)
    .bind(&citation.collection_name)
    .bind(&citation.document_name)
    .bind(citation.similarity)
    .bind(citation.chunk_index)
    .bind(&citation.content)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}
