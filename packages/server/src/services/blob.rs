use common::storage::{BlobStore, ContentHash};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, Statement, TransactionTrait,
};
use tracing::{debug, warn};

use crate::entity::{document, document_version};
use crate::error::AppError;

/// Take the transaction-scoped advisory lock for one content hash.
///
/// Writers that are about to reference a blob and the cleanup that removes
/// unreferenced blobs both hold this lock, so a blob is never deleted between
/// an upload finding it on disk and that upload's rows becoming visible.
pub async fn lock_hash<C: ConnectionTrait>(conn: &C, sha256: &str) -> Result<(), DbErr> {
    conn.execute_raw(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock(hashtext($1))",
        [sha256.into()],
    ))
    .await?;
    Ok(())
}

/// Whether any document or version row still points at `sha256`.
pub async fn is_referenced<C: ConnectionTrait>(conn: &C, sha256: &str) -> Result<bool, DbErr> {
    let documents = document::Entity::find()
        .filter(document::Column::Sha256.eq(sha256))
        .count(conn)
        .await?;
    if documents > 0 {
        return Ok(true);
    }

    let versions = document_version::Entity::find()
        .filter(document_version::Column::Sha256.eq(sha256))
        .count(conn)
        .await?;
    Ok(versions > 0)
}

/// Remove blobs no row references any more. Call after the deleting
/// transaction has committed.
///
/// Failures are logged and skipped.
pub async fn release_unreferenced(
    db: &DatabaseConnection,
    blob_store: &dyn BlobStore,
    hashes: &[String],
) {
    for sha256 in hashes {
        match release_one(db, blob_store, sha256).await {
            Ok(Released::StillReferenced) => {
                debug!(sha256 = %sha256, "Blob still referenced, keeping");
            }
            Ok(Released::Deleted) => debug!(sha256 = %sha256, "Released blob"),
            Ok(Released::AlreadyGone) => debug!(sha256 = %sha256, "Blob already gone"),
            Err(e) => warn!(sha256 = %sha256, error = ?e, "Failed to release blob"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Released {
    StillReferenced,
    Deleted,
    AlreadyGone,
}

async fn release_one(
    db: &DatabaseConnection,
    blob_store: &dyn BlobStore,
    sha256: &str,
) -> Result<Released, AppError> {
    let hash = ContentHash::from_hex(sha256)?;

    let txn = db.begin().await?;
    lock_hash(&txn, sha256).await?;

    if is_referenced(&txn, sha256).await? {
        txn.commit().await?;
        return Ok(Released::StillReferenced);
    }

    // The lock is held until commit, so the file goes before any waiting
    // upload re-checks it.
    let deleted = blob_store.delete(&hash).await?;
    txn.commit().await?;

    Ok(if deleted {
        Released::Deleted
    } else {
        Released::AlreadyGone
    })
}
