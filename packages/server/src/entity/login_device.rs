use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A device a user has logged in from, keyed by `(user_id, fingerprint_hash)`.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "login_devices")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,
    #[sea_orm(belongs_to, from = "user_id", to = "id")]
    pub user: HasOne<super::user::Entity>,

    #[sea_orm(column_type = "String(StringLen::N(64))")]
    pub fingerprint_hash: String,

    pub first_seen_at: DateTimeUtc,
    pub last_seen_at: DateTimeUtc,

    pub last_ip: Option<String>,
    pub last_user_agent: Option<String>,
}

impl ActiveModelBehavior for ActiveModel {}
