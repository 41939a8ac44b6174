//! Document ingestion pipeline.
//!
//! Coordinates the full upload flow: extract → chunk → embed (batch) →
//! persist. Runs once per document, end to end. Any failure after the
//! document row exists marks it `failed` with the error text verbatim;
//! success marks it `completed`. Embedding failures never abort ingestion —
//! they degrade to zero vectors inside the embedding layer.

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::path::Path;
use uuid::Uuid;

use crate::chunker;
use crate::config::Config;
use crate::embedding;
use crate::extract;
use crate::models::{Chunk, Document, DocumentStatus};

/// Ingest a file into a collection. Owner only.
///
/// The document row is created in `processing` state before the pipeline
/// runs, so a failed extraction still leaves an inspectable `failed` row
/// behind. Unsupported file types are rejected before any row is created.
pub async fn add_document(
    pool: &SqlitePool,
    config: &Config,
    collection_id: &str,
    caller_id: &str,
    file_path: &Path,
) -> Result<Document> {
    require_owner(pool, collection_id, caller_id).await?;

    let filename = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .unwrap_or_default();
    let file_type = extract::file_type_of(&filename)?;

    let bytes = std::fs::read(file_path)?;
    let mut doc = insert_document(pool, collection_id, &filename, &file_type, &bytes).await?;

    let outcome = async {
        let text = extract::extract_text(file_path, &file_type)?;
        store_chunks(pool, config, &doc.id, &text).await
    }
    .await;

    finish_document(pool, &mut doc, outcome).await?;
    Ok(doc)
}

/// Ingest already-extracted text into a collection. Owner only.
///
/// Used by callers that hold the document body directly (e.g. the HTTP
/// surface); follows the same status protocol as [`add_document`].
pub async fn add_text_document(
    pool: &SqlitePool,
    config: &Config,
    collection_id: &str,
    caller_id: &str,
    filename: &str,
    text: &str,
) -> Result<Document> {
    require_owner(pool, collection_id, caller_id).await?;

    let file_type = extract::file_type_of(filename).unwrap_or_else(|_| "txt".to_string());
    let mut doc =
        insert_document(pool, collection_id, filename, &file_type, text.as_bytes()).await?;

    let outcome = store_chunks(pool, config, &doc.id, text).await;
    finish_document(pool, &mut doc, outcome).await?;
    Ok(doc)
}

/// Chunk the text, embed every chunk in batches, and persist the chunk rows
/// in a single transaction. Returns the number of chunks written.
pub async fn store_chunks(
    pool: &SqlitePool,
    config: &Config,
    document_id: &str,
    text: &str,
) -> Result<usize> {
    let pieces = chunker::split_text(text, &config.chunking);
    if pieces.is_empty() {
        bail!("document contains no text");
    }

    // One inference round-trip per batch rather than one per chunk.
    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(pieces.len());
    for batch in pieces.chunks(config.embedding.batch_size) {
        vectors.extend(embedding::embed_batch(&config.embedding, batch).await);
    }

    let chunks: Vec<Chunk> = pieces
        .into_iter()
        .zip(vectors)
        .enumerate()
        .map(|(index, (content, vector))| Chunk {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            chunk_index: index as i64,
            content,
            // A zero-dimension vector means embeddings are not configured
            // at all; store no vector so the chunk is never a candidate.
            embedding: if vector.is_empty() { None } else { Some(vector) },
        })
        .collect();

    let mut tx = pool.begin().await?;
    for chunk in &chunks {
        let embedding_json = chunk.embedding.as_deref().map(embedding::vec_to_json);

        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, content, embedding) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.content)
        .bind(embedding_json)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(chunks.len())
}

async fn require_owner(pool: &SqlitePool, collection_id: &str, caller_id: &str) -> Result<()> {
    let owned: Option<String> =
        sqlx::query_scalar("SELECT id FROM collections WHERE id = ? AND owner_id = ?")
            .bind(collection_id)
            .bind(caller_id)
            .fetch_optional(pool)
            .await?;
    if owned.is_none() {
        bail!("collection not found or not owned by caller: {}", collection_id);
    }
    Ok(())
}

async fn insert_document(
    pool: &SqlitePool,
    collection_id: &str,
    filename: &str,
    file_type: &str,
    bytes: &[u8],
) -> Result<Document> {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let content_hash = format!("{:x}", hasher.finalize());

    let now = chrono::Utc::now().timestamp();
    let doc = Document {
        id: Uuid::new_v4().to_string(),
        collection_id: collection_id.to_string(),
        filename: filename.to_string(),
        file_type: file_type.to_string(),
        file_size: bytes.len() as i64,
        status: DocumentStatus::Processing,
        error_message: None,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO documents (id, collection_id, filename, file_type, file_size, status, error_message, content_hash, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&doc.id)
    .bind(&doc.collection_id)
    .bind(&doc.filename)
    .bind(&doc.file_type)
    .bind(doc.file_size)
    .bind(doc.status.as_str())
    .bind(&doc.error_message)
    .bind(&content_hash)
    .bind(doc.created_at)
    .bind(doc.updated_at)
    .execute(pool)
    .await?;

    Ok(doc)
}

/// Record the pipeline outcome on the document row: `completed` on success,
/// `failed` with the error's display text on any error.
async fn finish_document(
    pool: &SqlitePool,
    doc: &mut Document,
    outcome: Result<usize>,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    match outcome {
        Ok(_) => {
            sqlx::query("UPDATE documents SET status = 'completed', updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(&doc.id)
                .execute(pool)
                .await?;
            doc.status = DocumentStatus::Completed;
        }
        Err(e) => {
            let message = e.to_string();
            sqlx::query(
                "UPDATE documents SET status = 'failed', error_message = ?, updated_at = ? WHERE id = ?",
            )
            .bind(&message)
            .bind(now)
            .bind(&doc.id)
            .execute(pool)
            .await?;
            doc.status = DocumentStatus::Failed;
            doc.error_message = Some(message);
        }
    }
    doc.updated_at = now;
    Ok(())
}
