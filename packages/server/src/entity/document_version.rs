use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One immutable revision of a document. `(document_id, version)` is unique;
/// see `schema::ensure_indexes`.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "document_versions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub document_id: i64,
    #[sea_orm(belongs_to, from = "document_id", to = "id")]
    pub document: HasOne<super::document::Entity>,

    /// 1-based, contiguous per document.
    pub version: i32,
    pub size: i64,
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub sha256: String,
    pub storage_path: String,
    pub mime_type: Option<String>,
    pub note: Option<String>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
