//! Caller authorization for collections.
//!
//! Resolves a caller's standing against a collection into a three-case
//! outcome. Callers are forced to handle all three explicitly; there is no
//! nullable lookup. Ownership is implicit and supersedes any share grant.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::models::SharePermission;

/// A caller's resolved standing against one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The caller owns the collection.
    Owner,
    /// The caller holds an explicit share grant with the given permission.
    /// `Shared(SharePermission::None)` is an explicit deny: excluded from
    /// retrieval, but distinct from having no grant at all.
    Shared(SharePermission),
    /// No ownership and no grant; unknown collection ids land here too.
    NoAccess,
}

impl Access {
    /// Whether this standing admits the collection into retrieval.
    pub fn can_read(&self) -> bool {
        matches!(self, Access::Owner | Access::Shared(SharePermission::Read))
    }
}

/// Resolve a caller's access to a collection.
///
/// Checks ownership first, then share grants. Unknown collection ids and
/// unparseable grant rows resolve to [`Access::NoAccess`]; only storage
/// failures surface as errors.
pub async fn resolve_access(
    pool: &SqlitePool,
    collection_id: &str,
    caller_id: &str,
) -> Result<Access> {
    let owner: Option<String> =
        sqlx::query_scalar("SELECT owner_id FROM collections WHERE id = ?")
            .bind(collection_id)
            .fetch_optional(pool)
            .await?;

    match owner {
        Some(owner_id) if owner_id == caller_id => return Ok(Access::Owner),
        Some(_) => {}
        None => return Ok(Access::NoAccess),
    }

    let permission: Option<String> = sqlx::query_scalar(
        "SELECT permission FROM share_grants WHERE collection_id = ? AND grantee_id = ?",
    )
    .bind(collection_id)
    .bind(caller_id)
    .fetch_optional(pool)
    .await?;

    Ok(match permission.as_deref().and_then(SharePermission::parse) {
        Some(p) => Access::Shared(p),
        None => Access::NoAccess,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_read_matrix() {
        assert!(Access::Owner.can_read());
        assert!(Access::Shared(SharePermission::Read).can_read());
        assert!(!Access::Shared(SharePermission::None).can_read());
        assert!(!Access::NoAccess.can_read());
    }
}
