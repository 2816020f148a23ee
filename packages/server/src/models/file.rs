use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{document, document_version};
use crate::error::AppError;
use crate::utils::filename::sanitize_display_name;

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 200;
pub const MAX_NOTE_CHARS: usize = 255;

/// Query parameters for listing files.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct FileListQuery {
    /// Case-insensitive substring of the file name.
    #[param(example = "invoice")]
    pub q: Option<String>,
    /// Page size (1-200, default 50).
    #[param(example = 50)]
    pub limit: Option<i64>,
    /// Number of items to skip (>= 0, default 0).
    #[param(example = 0)]
    pub offset: Option<i64>,
}

impl FileListQuery {
    /// Resolve defaults and check bounds, returning `(limit, offset)`.
    pub fn page(&self) -> Result<(u64, u64), AppError> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(AppError::Validation("offset must be >= 0".into()));
        }
        Ok((limit as u64, offset as u64))
    }
}

/// Validate an optional version note (trimmed, at most 255 characters, empty = none).
pub fn normalize_note(note: Option<String>) -> Result<Option<String>, AppError> {
    let Some(note) = note else {
        return Ok(None);
    };
    let trimmed = note.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_NOTE_CHARS {
        return Err(AppError::Validation(format!(
            "Note must be at most {MAX_NOTE_CHARS} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

/// Request body for renaming a file.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct RenameRequest {
    /// New display name. Without an extension the current one is kept.
    #[schema(example = "invoice-2024-03-final")]
    pub name: String,
}

impl RenameRequest {
    /// The sanitized display name. Blank names are rejected, not replaced.
    pub fn display_name(&self) -> Result<String, AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("Name must not be empty".into()));
        }
        Ok(sanitize_display_name(&self.name))
    }
}

/// File summary for list views.
#[derive(Serialize, utoipa::ToSchema)]
pub struct FileItem {
    #[schema(example = 17)]
    pub id: i64,
    #[schema(example = "invoice-2024-03.pdf")]
    pub name: String,
    /// Size in bytes.
    #[schema(example = 48213)]
    pub size: i64,
    /// Lowercase hex SHA-256 of the current content.
    #[schema(example = "2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae")]
    pub sha256: String,
}

impl From<document::Model> for FileItem {
    fn from(model: document::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            size: model.size,
            sha256: model.sha256,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct FileListResponse {
    pub items: Vec<FileItem>,
    /// Matching files before pagination.
    #[schema(example = 1)]
    pub total: u64,
}

/// Full file view.
#[derive(Serialize, utoipa::ToSchema)]
pub struct FileDetail {
    #[schema(example = 17)]
    pub id: i64,
    #[schema(example = "invoice-2024-03.pdf")]
    pub name: String,
    #[schema(example = 48213)]
    pub size: i64,
    #[schema(example = "2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae")]
    pub sha256: String,
    #[schema(example = "application/pdf")]
    pub mime_type: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Number of the newest version.
    #[schema(example = 1)]
    pub current_version: i32,
}

impl FileDetail {
    pub fn new(model: document::Model, current_version: i32) -> Self {
        Self {
            id: model.id,
            name: model.name,
            size: model.size,
            sha256: model.sha256,
            mime_type: model.mime_type,
            created_at: model.created_at,
            current_version,
        }
    }
}

/// `{"file": {...}}`
#[derive(Serialize, utoipa::ToSchema)]
pub struct FileEnvelope {
    pub file: FileDetail,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct VersionResponse {
    #[schema(example = 31)]
    pub id: i64,
    #[schema(example = 17)]
    pub document_id: i64,
    /// 1-based version number.
    #[schema(example = 2)]
    pub version: i32,
    #[schema(example = 50122)]
    pub size: i64,
    #[schema(example = "fcde2b2edba56bf408601fb721fe9b5c338d10ee429ea04fae5511b68fbf8fb9")]
    pub sha256: String,
    #[schema(example = "application/pdf")]
    pub mime_type: Option<String>,
    #[schema(example = "Corrected totals")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<document_version::Model> for VersionResponse {
    fn from(model: document_version::Model) -> Self {
        Self {
            id: model.id,
            document_id: model.document_id,
            version: model.version,
            size: model.size,
            sha256: model.sha256,
            mime_type: model.mime_type,
            note: model.note,
            created_at: model.created_at,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct VersionListResponse {
    pub items: Vec<VersionResponse>,
    #[schema(example = 2)]
    pub total: u64,
}

impl From<Vec<document_version::Model>> for VersionListResponse {
    fn from(models: Vec<document_version::Model>) -> Self {
        let total = models.len() as u64;
        Self {
            items: models.into_iter().map(VersionResponse::from).collect(),
            total,
        }
    }
}

/// `{"version": {...}}`
#[derive(Serialize, utoipa::ToSchema)]
pub struct VersionEnvelope {
    pub version: VersionResponse,
}
