use chrono::Utc;
use common::storage::StoredBlob;
use sea_orm::sea_query::{Expr, ExprTrait, Func, LikeExpr, LockType, Query as SeaQuery};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};

use crate::entity::{document, document_version};
use crate::models::shared::escape_like;

/// Blob-backed content as recorded on a document or version row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    pub sha256: String,
    pub storage_path: String,
    pub size: i64,
    pub mime_type: Option<String>,
}

impl StoredContent {
    pub fn from_blob(blob: &StoredBlob, mime_type: Option<String>) -> Self {
        Self {
            sha256: blob.hash.to_hex(),
            storage_path: blob.hash.storage_key(),
            size: i64::try_from(blob.size).unwrap_or(i64::MAX),
            mime_type,
        }
    }
}

impl From<&document::Model> for StoredContent {
    fn from(doc: &document::Model) -> Self {
        Self {
            sha256: doc.sha256.clone(),
            storage_path: doc.storage_path.clone(),
            size: doc.size,
            mime_type: doc.mime_type.clone(),
        }
    }
}

impl From<&document_version::Model> for StoredContent {
    fn from(version: &document_version::Model) -> Self {
        Self {
            sha256: version.sha256.clone(),
            storage_path: version.storage_path.clone(),
            size: version.size,
            mime_type: version.mime_type.clone(),
        }
    }
}

/// One page of a document listing plus the size of the whole filtered set.
#[derive(Debug)]
pub struct DocumentPage {
    pub items: Vec<document::Model>,
    pub total: u64,
}

pub struct DocumentService<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> DocumentService<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Insert a document and its version 1. Run inside a transaction.
    pub async fn create(
        &self,
        owner_id: i32,
        name: &str,
        content: &StoredContent,
    ) -> Result<document::Model, DbErr> {
        let now = Utc::now();
        let doc = document::ActiveModel {
            owner_id: Set(owner_id),
            name: Set(name.to_string()),
            size: Set(content.size),
            sha256: Set(content.sha256.clone()),
            storage_path: Set(content.storage_path.clone()),
            mime_type: Set(content.mime_type.clone()),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(self.conn)
        .await?;

        self.insert_version(doc.id, 1, content, None).await?;

        Ok(doc)
    }

    /// List an owner's documents, newest first, optionally filtered by a
    /// case-insensitive substring of the name.
    pub async fn list(
        &self,
        owner_id: i32,
        search: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> Result<DocumentPage, DbErr> {
        let mut select = document::Entity::find().filter(document::Column::OwnerId.eq(owner_id));

        if let Some(search) = search {
            let term = escape_like(search.trim());
            if !term.is_empty() {
                select = select.filter(
                    Expr::expr(Func::lower(Expr::col(document::Column::Name)))
                        .like(LikeExpr::new(format!("%{}%", term.to_lowercase())).escape('\\')),
                );
            }
        }

        let total = select.clone().count(self.conn).await?;

        let items = select
            .order_by_desc(document::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(self.conn)
            .await?;

        Ok(DocumentPage { items, total })
    }

    /// A document owned by `owner_id`. Someone else's document reads as `None`.
    pub async fn find_owned(
        &self,
        owner_id: i32,
        id: i64,
    ) -> Result<Option<document::Model>, DbErr> {
        document::Entity::find_by_id(id)
            .filter(document::Column::OwnerId.eq(owner_id))
            .one(self.conn)
            .await
    }

    /// Like [`Self::find_owned`], holding a row lock until the transaction ends.
    pub async fn find_owned_for_update(
        &self,
        owner_id: i32,
        id: i64,
    ) -> Result<Option<document::Model>, DbErr> {
        document::Entity::find_by_id(id)
            .filter(document::Column::OwnerId.eq(owner_id))
            .lock(LockType::Update)
            .one(self.conn)
            .await
    }

    /// The owner's documents whose current content has the given hash.
    pub async fn find_by_hash(
        &self,
        owner_id: i32,
        sha256: &str,
    ) -> Result<Vec<document::Model>, DbErr> {
        document::Entity::find()
            .filter(document::Column::OwnerId.eq(owner_id))
            .filter(document::Column::Sha256.eq(sha256))
            .order_by_desc(document::Column::Id)
            .all(self.conn)
            .await
    }

    /// Highest version number of a document, 0 if it has none.
    pub async fn current_version(&self, document_id: i64) -> Result<i32, DbErr> {
        let max: Option<Option<i32>> = document_version::Entity::find()
            .select_only()
            .column_as(document_version::Column::Version.max(), "max_version")
            .filter(document_version::Column::DocumentId.eq(document_id))
            .into_tuple()
            .one(self.conn)
            .await?;
        Ok(max.flatten().unwrap_or(0))
    }

    /// Append a version and point the document at the new content.
    ///
    /// `doc` must have been loaded with [`Self::find_owned_for_update`] in the
    /// same transaction so version numbers are allocated one at a time.
    pub async fn add_version(
        &self,
        doc: document::Model,
        content: &StoredContent,
        note: Option<String>,
    ) -> Result<(document::Model, document_version::Model), DbErr> {
        let next = self.current_version(doc.id).await? + 1;
        let version = self.insert_version(doc.id, next, content, note).await?;

        let mut active: document::ActiveModel = doc.into();
        active.size = Set(content.size);
        active.sha256 = Set(content.sha256.clone());
        active.storage_path = Set(content.storage_path.clone());
        active.mime_type = Set(content.mime_type.clone());
        let doc = active.update(self.conn).await?;

        Ok((doc, version))
    }

    /// Give a document a new display name. The history records it as a
    /// version with unchanged content.
    ///
    /// Same locking requirement as [`Self::add_version`].
    pub async fn rename(
        &self,
        doc: document::Model,
        name: &str,
    ) -> Result<(document::Model, document_version::Model), DbErr> {
        let content = StoredContent::from(&doc);
        let note = format!("Renamed to '{name}'");
        let (doc, version) = self.add_version(doc, &content, Some(note)).await?;

        let mut active: document::ActiveModel = doc.into();
        active.name = Set(name.to_string());
        let doc = active.update(self.conn).await?;

        Ok((doc, version))
    }

    /// Append a copy of an earlier version as the newest one. Earlier
    /// versions are never rewritten.
    ///
    /// Same locking requirement as [`Self::add_version`].
    pub async fn restore(
        &self,
        doc: document::Model,
        source: &document_version::Model,
    ) -> Result<(document::Model, document_version::Model), DbErr> {
        let content = StoredContent::from(source);
        let note = format!("Restored from v{}", source.version);
        self.add_version(doc, &content, Some(note)).await
    }

    pub async fn find_version(
        &self,
        document_id: i64,
        version: i32,
    ) -> Result<Option<document_version::Model>, DbErr> {
        document_version::Entity::find()
            .filter(document_version::Column::DocumentId.eq(document_id))
            .filter(document_version::Column::Version.eq(version))
            .one(self.conn)
            .await
    }

    async fn insert_version(
        &self,
        document_id: i64,
        version: i32,
        content: &StoredContent,
        note: Option<String>,
    ) -> Result<document_version::Model, DbErr> {
        document_version::ActiveModel {
            document_id: Set(document_id),
            version: Set(version),
            size: Set(content.size),
            sha256: Set(content.sha256.clone()),
            storage_path: Set(content.storage_path.clone()),
            mime_type: Set(content.mime_type.clone()),
            note: Set(note),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.conn)
        .await
    }

    /// Versions of a document, oldest first.
    pub async fn list_versions(
        &self,
        document_id: i64,
    ) -> Result<Vec<document_version::Model>, DbErr> {
        document_version::Entity::find()
            .filter(document_version::Column::DocumentId.eq(document_id))
            .order_by_asc(document_version::Column::Version)
            .all(self.conn)
            .await
    }

    /// Delete a document and its versions. Run inside a transaction.
    ///
    /// Returns the content hashes that were referenced, or `None` if the
    /// document does not exist or belongs to someone else.
    pub async fn delete(&self, owner_id: i32, id: i64) -> Result<Option<Vec<String>>, DbErr> {
        let Some(doc) = self.find_owned_for_update(owner_id, id).await? else {
            return Ok(None);
        };

        let mut hashes: Vec<String> = document_version::Entity::find()
            .select_only()
            .column(document_version::Column::Sha256)
            .filter(document_version::Column::DocumentId.eq(doc.id))
            .into_tuple()
            .all(self.conn)
            .await?;
        hashes.push(doc.sha256);

        document_version::Entity::delete_many()
            .filter(document_version::Column::DocumentId.eq(doc.id))
            .exec(self.conn)
            .await?;
        document::Entity::delete_by_id(doc.id)
            .exec(self.conn)
            .await?;

        Ok(Some(dedup(hashes)))
    }

    /// Delete every document of an owner together with their versions.
    /// Run inside a transaction. Returns the referenced content hashes.
    pub async fn delete_all_for_owner(&self, owner_id: i32) -> Result<Vec<String>, DbErr> {
        let owned_ids = SeaQuery::select()
            .column(document::Column::Id)
            .from(document::Entity)
            .and_where(document::Column::OwnerId.eq(owner_id))
            .to_owned();

        let mut hashes: Vec<String> = document::Entity::find()
            .select_only()
            .column(document::Column::Sha256)
            .filter(document::Column::OwnerId.eq(owner_id))
            .into_tuple()
            .all(self.conn)
            .await?;
        let version_hashes: Vec<String> = document_version::Entity::find()
            .select_only()
            .column(document_version::Column::Sha256)
            .filter(document_version::Column::DocumentId.in_subquery(owned_ids.clone()))
            .into_tuple()
            .all(self.conn)
            .await?;
        hashes.extend(version_hashes);

        document_version::Entity::delete_many()
            .filter(document_version::Column::DocumentId.in_subquery(owned_ids))
            .exec(self.conn)
            .await?;
        document::Entity::delete_many()
            .filter(document::Column::OwnerId.eq(owner_id))
            .exec(self.conn)
            .await?;

        Ok(dedup(hashes))
    }
}

fn dedup(mut hashes: Vec<String>) -> Vec<String> {
    hashes.sort_unstable();
    hashes.dedup();
    hashes
}
