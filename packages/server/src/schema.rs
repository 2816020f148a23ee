use sea_orm::sea_query::{Index, IndexCreateStatement, PostgresQueryBuilder};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr};
use tracing::{info, warn};

use crate::entity::{document, document_version, login_device};

/// Ensure required database indexes exist.
///
/// SeaORM's schema-sync doesn't create composite indexes, so the uniqueness
/// invariants on versions and login devices are created here on startup.
/// Failing to create a unique index is fatal; lookup indexes only warn.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_index(
        db,
        "ux_document_versions_document_version",
        Index::create()
            .unique()
            .table(document_version::Entity)
            .col(document_version::Column::DocumentId)
            .col(document_version::Column::Version)
            .to_owned(),
    )
    .await?;

    create_index(
        db,
        "ux_login_devices_user_fingerprint",
        Index::create()
            .unique()
            .table(login_device::Entity)
            .col(login_device::Column::UserId)
            .col(login_device::Column::FingerprintHash)
            .to_owned(),
    )
    .await?;

    let lookup = [
        // WHERE owner_id = ? ORDER BY id DESC
        (
            "idx_documents_owner_id",
            Index::create()
                .table(document::Entity)
                .col(document::Column::OwnerId)
                .col(document::Column::Id)
                .to_owned(),
        ),
        // Duplicate lookups and blob reference checks
        (
            "idx_documents_sha256",
            Index::create()
                .table(document::Entity)
                .col(document::Column::Sha256)
                .to_owned(),
        ),
        (
            "idx_document_versions_sha256",
            Index::create()
                .table(document_version::Entity)
                .col(document_version::Column::Sha256)
                .to_owned(),
        ),
    ];

    for (name, stmt) in lookup {
        if let Err(e) = create_index(db, name, stmt).await {
            warn!("Failed to create index {}: {}", name, e);
        }
    }

    Ok(())
}

async fn create_index(
    db: &DatabaseConnection,
    name: &str,
    mut stmt: IndexCreateStatement,
) -> Result<(), DbErr> {
    let sql = stmt
        .if_not_exists()
        .name(name)
        .to_string(PostgresQueryBuilder);
    db.execute_unprepared(&sql).await?;
    info!("Ensured index {} exists", name);
    Ok(())
}
