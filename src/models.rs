//! Core data models for the knowledge-base engine.
//!
//! These types represent the collections, documents, chunks, and retrieval
//! results that flow through the ingestion and query pipeline.

use serde::Serialize;

/// A knowledge base: an owned, optionally shareable grouping of documents
/// that is searched as a unit.
#[derive(Debug, Clone, Serialize)]
pub struct Collection {
    pub id: String,
    pub owner_id: String,
    /// Unique per owner.
    pub name: String,
    pub description: String,
    pub is_shareable: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Processing state of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(DocumentStatus::Processing),
            "completed" => Some(DocumentStatus::Completed),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }
}

/// A document uploaded into a collection. Immutable once `Completed`,
/// except for deletion.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub collection_id: String,
    pub filename: String,
    pub file_type: String,
    pub file_size: i64,
    pub status: DocumentStatus,
    /// Present only when status is `Failed`; holds the extraction or
    /// pipeline error verbatim.
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A contiguous span of a document's text, the unit of retrieval.
///
/// `embedding` is `None` when the vector has not been produced; such chunks
/// are never retrieval candidates.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    /// Zero-based, unique within the document; defines original order.
    pub chunk_index: i64,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
}

/// Permission carried by a share grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SharePermission {
    /// Grantee may read and search the collection.
    Read,
    /// Explicit deny: the grant exists but exposes nothing readable.
    None,
}

impl SharePermission {
    pub fn as_str(&self) -> &'static str {
        match self {
            SharePermission::Read => "read",
            SharePermission::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(SharePermission::Read),
            "none" => Some(SharePermission::None),
            _ => None,
        }
    }
}

/// An explicit permission record linking a collection to a grantee.
/// At most one grant exists per (collection, grantee) pair.
#[derive(Debug, Clone, Serialize)]
pub struct ShareGrant {
    pub collection_id: String,
    pub grantee_id: String,
    pub permission: SharePermission,
    pub granted_by: String,
    pub created_at: i64,
}

/// A scored chunk returned from hybrid retrieval. Transient: constructed
/// fresh per query and never persisted, except for the single citation
/// recorded alongside a generated answer.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub chunk_id: String,
    pub document_id: String,
    pub document_name: String,
    pub collection_id: String,
    pub collection_name: String,
    pub content: String,
    /// Cosine similarity between the query vector and the chunk vector.
    pub similarity: f64,
    pub keyword_score: f64,
    pub hybrid_score: f64,
    pub chunk_index: i64,
}

/// The single source reference persisted alongside a generated answer.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub collection_name: String,
    pub document_name: String,
    pub similarity: f64,
    pub chunk_index: i64,
    pub content: String,
}
