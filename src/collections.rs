//! Collection (knowledge base) and share-grant management.
//!
//! Collections are owned groupings of documents. Owners create, populate,
//! and delete them; sharing hands other callers an explicit `read` or `none`
//! grant. Deleting a collection cascades to its documents, chunks, and
//! grants in one transaction.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{Collection, DocumentStatus, ShareGrant, SharePermission};

/// A caller-owned collection with document counts, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub document_count: i64,
    pub has_processing_docs: bool,
    pub is_shareable: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A collection shared to the caller by someone else.
#[derive(Debug, Clone, Serialize)]
pub struct SharedCollectionSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner_id: String,
    pub permission: SharePermission,
    pub document_count: i64,
    pub shared_at: i64,
}

/// Outcome of a share operation.
#[derive(Debug, Clone, Serialize)]
pub struct ShareOutcome {
    /// Grants newly created.
    pub granted: usize,
    /// Existing grants whose permission was overwritten.
    pub updated: usize,
    /// True when the owner appeared in the grantee list and was skipped.
    pub skipped_owner: bool,
}

/// A document row with its chunk count, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub filename: String,
    pub file_type: String,
    pub file_size: i64,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub chunk_count: i64,
    pub created_at: i64,
}

/// Create a collection. Names are unique per owner.
pub async fn create_collection(
    pool: &SqlitePool,
    owner_id: &str,
    name: &str,
    description: &str,
) -> Result<Collection> {
    let name = name.trim();
    if name.is_empty() {
        bail!("collection name must not be empty");
    }

    let existing: Option<String> =
        sqlx::query_scalar("SELECT id FROM collections WHERE owner_id = ? AND name = ?")
            .bind(owner_id)
            .bind(name)
            .fetch_optional(pool)
            .await?;
    if existing.is_some() {
        bail!("collection '{}' already exists for this owner", name);
    }

    let now = chrono::Utc::now().timestamp();
    let collection = Collection {
        id: Uuid::new_v4().to_string(),
        owner_id: owner_id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        is_shareable: true,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO collections (id, owner_id, name, description, is_shareable, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&collection.id)
    .bind(&collection.owner_id)
    .bind(&collection.name)
    .bind(&collection.description)
    .bind(collection.is_shareable as i64)
    .bind(collection.created_at)
    .bind(collection.updated_at)
    .execute(pool)
    .await?;

    Ok(collection)
}

/// List the caller's own collections with document counts.
pub async fn list_own_collections(
    pool: &SqlitePool,
    owner_id: &str,
) -> Result<Vec<CollectionSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT c.id, c.name, c.description, c.is_shareable, c.created_at, c.updated_at,
               COUNT(d.id) AS document_count,
               SUM(CASE WHEN d.status = 'processing' THEN 1 ELSE 0 END) AS processing_count
        FROM collections c
        LEFT JOIN documents d ON d.collection_id = c.id
        WHERE c.owner_id = ?
        GROUP BY c.id
        ORDER BY c.created_at ASC
        "#,
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    let summaries = rows
        .iter()
        .map(|row| {
            let is_shareable: i64 = row.get("is_shareable");
            let processing_count: Option<i64> = row.get("processing_count");
            CollectionSummary {
                id: row.get("id"),
                name: row.get("name"),
                description: row.get("description"),
                document_count: row.get("document_count"),
                has_processing_docs: processing_count.unwrap_or(0) > 0,
                is_shareable: is_shareable != 0,
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            }
        })
        .collect();

    Ok(summaries)
}

/// List collections shared to the caller, with the grant's permission.
pub async fn list_shared_collections(
    pool: &SqlitePool,
    caller_id: &str,
) -> Result<Vec<SharedCollectionSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT c.id, c.name, c.description, c.owner_id,
               s.permission, s.created_at AS shared_at,
               (SELECT COUNT(*) FROM documents d WHERE d.collection_id = c.id) AS document_count
        FROM share_grants s
        JOIN collections c ON c.id = s.collection_id
        WHERE s.grantee_id = ?
        ORDER BY s.created_at ASC
        "#,
    )
    .bind(caller_id)
    .fetch_all(pool)
    .await?;

    let summaries = rows
        .iter()
        .filter_map(|row| {
            let permission: String = row.get("permission");
            let permission = SharePermission::parse(&permission)?;
            Some(SharedCollectionSummary {
                id: row.get("id"),
                name: row.get("name"),
                description: row.get("description"),
                owner_id: row.get("owner_id"),
                permission,
                document_count: row.get("document_count"),
                shared_at: row.get("shared_at"),
            })
        })
        .collect();

    Ok(summaries)
}

/// Delete a collection and everything under it. Owner only.
///
/// Returns false when the collection does not exist or the caller does not
/// own it.
pub async fn delete_collection(
    pool: &SqlitePool,
    collection_id: &str,
    caller_id: &str,
) -> Result<bool> {
    let owned: Option<String> =
        sqlx::query_scalar("SELECT id FROM collections WHERE id = ? AND owner_id = ?")
            .bind(collection_id)
            .bind(caller_id)
            .fetch_optional(pool)
            .await?;
    if owned.is_none() {
        return Ok(false);
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        "DELETE FROM chunks WHERE document_id IN (SELECT id FROM documents WHERE collection_id = ?)",
    )
    .bind(collection_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM documents WHERE collection_id = ?")
        .bind(collection_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM share_grants WHERE collection_id = ?")
        .bind(collection_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM collections WHERE id = ?")
        .bind(collection_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}

/// Share a collection to a set of grantees with the given permission.
///
/// The owner never needs a grant and is skipped if listed. Re-granting an
/// existing (collection, grantee) pair overwrites the permission instead of
/// duplicating the row.
pub async fn share_collection(
    pool: &SqlitePool,
    collection_id: &str,
    acting_user: &str,
    grantee_ids: &[String],
    permission: SharePermission,
) -> Result<ShareOutcome> {
    let row = sqlx::query("SELECT owner_id, is_shareable FROM collections WHERE id = ?")
        .bind(collection_id)
        .fetch_optional(pool)
        .await?;
    let row = match row {
        Some(row) => row,
        None => bail!("collection not found: {}", collection_id),
    };
    let owner_id: String = row.get("owner_id");
    let is_shareable: i64 = row.get("is_shareable");
    if is_shareable == 0 {
        bail!("collection is not shareable: {}", collection_id);
    }

    let now = chrono::Utc::now().timestamp();
    let mut granted = 0usize;
    let mut updated = 0usize;
    let mut skipped_owner = false;

    for grantee in grantee_ids {
        if *grantee == owner_id {
            skipped_owner = true;
            continue;
        }

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT permission FROM share_grants WHERE collection_id = ? AND grantee_id = ?",
        )
        .bind(collection_id)
        .bind(grantee)
        .fetch_optional(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO share_grants (collection_id, grantee_id, permission, granted_by, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(collection_id, grantee_id) DO UPDATE SET
                permission = excluded.permission,
                granted_by = excluded.granted_by
            "#,
        )
        .bind(collection_id)
        .bind(grantee)
        .bind(permission.as_str())
        .bind(acting_user)
        .bind(now)
        .execute(pool)
        .await?;

        if existing.is_some() {
            updated += 1;
        } else {
            granted += 1;
        }
    }

    Ok(ShareOutcome {
        granted,
        updated,
        skipped_owner,
    })
}

/// Remove grants for the given grantees. Returns how many were removed.
pub async fn unshare_collection(
    pool: &SqlitePool,
    collection_id: &str,
    grantee_ids: &[String],
) -> Result<usize> {
    let mut removed = 0usize;
    for grantee in grantee_ids {
        let result =
            sqlx::query("DELETE FROM share_grants WHERE collection_id = ? AND grantee_id = ?")
                .bind(collection_id)
                .bind(grantee)
                .execute(pool)
                .await?;
        removed += result.rows_affected() as usize;
    }
    Ok(removed)
}

/// List all grants on a collection.
pub async fn list_share_grants(
    pool: &SqlitePool,
    collection_id: &str,
) -> Result<Vec<ShareGrant>> {
    let rows = sqlx::query(
        r#"
        SELECT collection_id, grantee_id, permission, granted_by, created_at
        FROM share_grants
        WHERE collection_id = ?
        ORDER BY created_at ASC
        "#,
    )
    .bind(collection_id)
    .fetch_all(pool)
    .await?;

    let grants = rows
        .iter()
        .filter_map(|row| {
            let permission: String = row.get("permission");
            let permission = SharePermission::parse(&permission)?;
            Some(ShareGrant {
                collection_id: row.get("collection_id"),
                grantee_id: row.get("grantee_id"),
                permission,
                granted_by: row.get("granted_by"),
                created_at: row.get("created_at"),
            })
        })
        .collect();

    Ok(grants)
}

/// List a collection's documents with chunk counts. Requires readable access.
pub async fn list_documents(
    pool: &SqlitePool,
    collection_id: &str,
    caller_id: &str,
) -> Result<Vec<DocumentSummary>> {
    let access = crate::access::resolve_access(pool, collection_id, caller_id).await?;
    if !access.can_read() {
        bail!("collection not found or not readable: {}", collection_id);
    }

    let rows = sqlx::query(
        r#"
        SELECT d.id, d.filename, d.file_type, d.file_size, d.status, d.error_message, d.created_at,
               (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id) AS chunk_count
        FROM documents d
        WHERE d.collection_id = ?
        ORDER BY d.created_at ASC
        "#,
    )
    .bind(collection_id)
    .fetch_all(pool)
    .await?;

    let docs = rows
        .iter()
        .map(|row| {
            let status: String = row.get("status");
            DocumentSummary {
                id: row.get("id"),
                filename: row.get("filename"),
                file_type: row.get("file_type"),
                file_size: row.get("file_size"),
                status: DocumentStatus::parse(&status).unwrap_or(DocumentStatus::Failed),
                error_message: row.get("error_message"),
                chunk_count: row.get("chunk_count"),
                created_at: row.get("created_at"),
            }
        })
        .collect();

    Ok(docs)
}

/// Delete a document and its chunks. Owner only.
pub async fn delete_document(
    pool: &SqlitePool,
    document_id: &str,
    caller_id: &str,
) -> Result<bool> {
    let owned: Option<String> = sqlx::query_scalar(
        r#"
        SELECT d.id
        FROM documents d
        JOIN collections c ON c.id = d.collection_id
        WHERE d.id = ? AND c.owner_id = ?
        "#,
    )
    .bind(document_id)
    .bind(caller_id)
    .fetch_optional(pool)
    .await?;
    if owned.is_none() {
        return Ok(false);
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM chunks WHERE document_id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(document_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(true)
}
