use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub owner_id: i32,
    #[sea_orm(belongs_to, from = "owner_id", to = "id")]
    pub owner: HasOne<super::user::Entity>,

    /// Sanitized display name.
    pub name: String,
    pub size: i64,
    /// Lowercase hex SHA-256 of the current content.
    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub sha256: String,
    /// Blob store key of the current content.
    pub storage_path: String,
    pub mime_type: Option<String>,

    #[sea_orm(has_many)]
    pub versions: HasMany<super::document_version::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
