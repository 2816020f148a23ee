use std::path::PathBuf;

use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, body::Body};
use common::storage::{BlobStore, BoxReader, ContentHash, StoredBlob};
use sea_orm::{ConnectionTrait, DbErr, SqlErr, TransactionTrait};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entity::document;
use crate::error::{AppError, ErrorResponse};
use crate::extractors::auth::AuthUser;
use crate::extractors::input::{AppJson, AppPath, AppQuery};
use crate::models::file::{
    FileDetail, FileEnvelope, FileItem, FileListQuery, FileListResponse, RenameRequest,
    VersionEnvelope, VersionListResponse, VersionResponse, normalize_note,
};
use crate::models::shared::{Empty, parse_sha256};
use crate::services::blob::{lock_hash, release_unreferenced};
use crate::services::document::{DocumentService, StoredContent};
use crate::state::AppState;
use crate::utils::filename::{content_disposition_value, keep_extension, sanitize_display_name};

/// Multipart framing on top of the largest accepted file.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

pub fn upload_body_limit(max_upload_bytes: u64) -> DefaultBodyLimit {
    let limit = max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);
    DefaultBodyLimit::max(usize::try_from(limit).unwrap_or(usize::MAX))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Files",
    operation_id = "listFiles",
    summary = "List the caller's files",
    description = "Newest first. `q` filters by a case-insensitive substring of the name. \
        `total` counts every match, not just the returned page.",
    params(FileListQuery),
    responses(
        (status = 200, description = "Page of files", body = FileListResponse),
        (status = 400, description = "Invalid query (VALIDATION_ERROR)", body = ErrorResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorResponse),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(user_id = auth_user.id()))]
pub async fn list_files(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppQuery(query): AppQuery<FileListQuery>,
) -> Result<Json<FileListResponse>, AppError> {
    let (limit, offset) = query.page()?;

    let page = DocumentService::new(&state.db)
        .list(auth_user.id(), query.q.as_deref(), limit, offset)
        .await?;

    Ok(Json(FileListResponse {
        items: page.items.into_iter().map(FileItem::from).collect(),
        total: page.total,
    }))
}

#[utoipa::path(
    post,
    path = "/upload",
    tag = "Files",
    operation_id = "uploadFile",
    summary = "Upload a file",
    description = "Stores the `file` multipart field as a new document with version 1. \
        The display name is taken from the part's filename. Identical content uploaded \
        twice becomes two documents.",
    request_body(content_type = "multipart/form-data", description = "Multipart form with a `file` field"),
    responses(
        (status = 201, description = "File stored", body = FileEnvelope),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorResponse),
        (status = 413, description = "File too large (PAYLOAD_TOO_LARGE)", body = ErrorResponse),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(user_id = auth_user.id()))]
pub async fn upload_file(
    auth_user: AuthUser,
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AppError> {
    let upload = receive_upload(multipart, &state).await?;
    let name = sanitize_display_name(upload.filename().unwrap_or(""));
    let content = upload.content(&name);

    let result = async {
        let txn = state.db.begin().await?;
        upload.pin_blob(&txn, &*state.blob_store).await?;
        let doc = DocumentService::new(&txn)
            .create(auth_user.id(), &name, &content)
            .await?;
        txn.commit().await?;
        Ok::<_, AppError>(doc)
    }
    .await;

    let doc = match result {
        Ok(doc) => doc,
        Err(e) => {
            release_unreferenced(&state.db, &*state.blob_store, &[content.sha256]).await;
            return Err(e);
        }
    };

    info!(document_id = doc.id, size = doc.size, "Stored new document");

    Ok((
        StatusCode::CREATED,
        Json(FileEnvelope {
            file: FileDetail::new(doc, 1),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/by-hash/{sha256}",
    tag = "Files",
    operation_id = "findFilesByHash",
    summary = "Find the caller's files with the given content",
    description = "Matches the current content of each file. Useful as a duplicate hint before \
        uploading; uploads are never deduplicated.",
    params(("sha256" = String, Path, description = "Hex SHA-256 (64 characters)")),
    responses(
        (status = 200, description = "Matching files", body = FileListResponse),
        (status = 400, description = "Malformed hash (VALIDATION_ERROR)", body = ErrorResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorResponse),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.id()))]
pub async fn find_by_hash(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppPath(sha256): AppPath<String>,
) -> Result<Json<FileListResponse>, AppError> {
    let sha256 = parse_sha256(&sha256)?;

    let docs = DocumentService::new(&state.db)
        .find_by_hash(auth_user.id(), &sha256)
        .await?;

    Ok(Json(FileListResponse {
        total: docs.len() as u64,
        items: docs.into_iter().map(FileItem::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Files",
    operation_id = "getFile",
    summary = "Get file details",
    params(("id" = i64, Path, description = "File ID")),
    responses(
        (status = 200, description = "File details", body = FileEnvelope),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorResponse),
        (status = 404, description = "File not found (NOT_FOUND)", body = ErrorResponse),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.id()))]
pub async fn get_file(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<FileEnvelope>, AppError> {
    let service = DocumentService::new(&state.db);
    let doc = find_owned(&service, auth_user.id(), id).await?;
    let current_version = service.current_version(doc.id).await?;

    Ok(Json(FileEnvelope {
        file: FileDetail::new(doc, current_version),
    }))
}

#[utoipa::path(
    get,
    path = "/{id}/download",
    tag = "Files",
    operation_id = "downloadFile",
    summary = "Download the current content of a file",
    description = "Streams the newest version. The ETag is the quoted SHA-256; a matching \
        `If-None-Match` yields 304.",
    params(("id" = i64, Path, description = "File ID")),
    responses(
        (status = 200, description = "File content"),
        (status = 304, description = "Not Modified (ETag match)"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorResponse),
        (status = 404, description = "File not found (NOT_FOUND)", body = ErrorResponse),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, headers), fields(user_id = auth_user.id()))]
pub async fn download_file(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let service = DocumentService::new(&state.db);
    let doc = find_owned(&service, auth_user.id(), id).await?;

    build_blob_response(&doc, &headers, &*state.blob_store).await
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Files",
    operation_id = "deleteFile",
    summary = "Delete a file and all of its versions",
    description = "Stored content is removed once no other file or version refers to it.",
    params(("id" = i64, Path, description = "File ID")),
    responses(
        (status = 200, description = "File deleted", body = Empty),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorResponse),
        (status = 404, description = "File not found (NOT_FOUND)", body = ErrorResponse),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.id()))]
pub async fn delete_file(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Empty>, AppError> {
    let txn = state.db.begin().await?;
    let hashes = DocumentService::new(&txn)
        .delete(auth_user.id(), id)
        .await?
        .ok_or_else(not_found)?;
    txn.commit().await?;

    info!(document_id = id, "Deleted document");

    release_unreferenced(&state.db, &*state.blob_store, &hashes).await;

    Ok(Json(Empty {}))
}

#[utoipa::path(
    get,
    path = "/{id}/versions",
    tag = "Versions",
    operation_id = "listVersions",
    summary = "List the versions of a file",
    description = "Oldest first, numbered from 1.",
    params(("id" = i64, Path, description = "File ID")),
    responses(
        (status = 200, description = "Version history", body = VersionListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorResponse),
        (status = 404, description = "File not found (NOT_FOUND)", body = ErrorResponse),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.id()))]
pub async fn list_versions(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<VersionListResponse>, AppError> {
    let service = DocumentService::new(&state.db);
    let doc = find_owned(&service, auth_user.id(), id).await?;
    let versions = service.list_versions(doc.id).await?;

    Ok(Json(VersionListResponse::from(versions)))
}

#[utoipa::path(
    post,
    path = "/{id}/versions",
    tag = "Versions",
    operation_id = "addVersion",
    summary = "Upload a new version of a file",
    description = "Stores the `file` multipart field as the next version. An optional `note` \
        field (at most 255 characters) is kept with it. The file itself then serves the \
        new content.",
    params(("id" = i64, Path, description = "File ID")),
    request_body(content_type = "multipart/form-data", description = "Multipart form with a `file` field and an optional `note` field"),
    responses(
        (status = 201, description = "Version stored", body = VersionEnvelope),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorResponse),
        (status = 404, description = "File not found (NOT_FOUND)", body = ErrorResponse),
        (status = 409, description = "Concurrent version upload (CONFLICT)", body = ErrorResponse),
        (status = 413, description = "File too large (PAYLOAD_TOO_LARGE)", body = ErrorResponse),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(user_id = auth_user.id()))]
pub async fn add_version(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, AppError> {
    let upload = receive_upload(multipart, &state).await?;
    let note = normalize_note(upload.note.clone());

    // Versions keep the document's display name; the part filename only
    // drives the MIME type.
    let mime_source = upload
        .filename()
        .map(sanitize_display_name)
        .unwrap_or_default();
    let content = upload.content(&mime_source);

    let result = async {
        let note = note?;
        let txn = state.db.begin().await?;
        let service = DocumentService::new(&txn);
        let doc = find_owned_for_update(&service, auth_user.id(), id).await?;
        upload.pin_blob(&txn, &*state.blob_store).await?;
        let (_, version) = service
            .add_version(doc, &content, note)
            .await
            .map_err(version_conflict)?;
        txn.commit().await?;
        Ok::<_, AppError>(version)
    }
    .await;

    let version = match result {
        Ok(version) => version,
        Err(e) => {
            release_unreferenced(&state.db, &*state.blob_store, &[content.sha256]).await;
            return Err(e);
        }
    };

    info!(document_id = id, version = version.version, "Stored new version");

    Ok((
        StatusCode::CREATED,
        Json(VersionEnvelope {
            version: VersionResponse::from(version),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/{id}/rename",
    tag = "Files",
    operation_id = "renameFile",
    summary = "Rename a file",
    description = "Changes the display name and records the rename as a new version with \
        unchanged content. A name without an extension keeps the current extension.",
    params(("id" = i64, Path, description = "File ID")),
    request_body = RenameRequest,
    responses(
        (status = 200, description = "File renamed", body = FileEnvelope),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorResponse),
        (status = 404, description = "File not found (NOT_FOUND)", body = ErrorResponse),
        (status = 409, description = "Concurrent version upload (CONFLICT)", body = ErrorResponse),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.id()))]
pub async fn rename_file(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppJson(payload): AppJson<RenameRequest>,
) -> Result<Json<FileEnvelope>, AppError> {
    let requested = payload.display_name()?;

    let txn = state.db.begin().await?;
    let service = DocumentService::new(&txn);
    let doc = find_owned_for_update(&service, auth_user.id(), id).await?;
    let name = keep_extension(&requested, &doc.name);
    let (doc, version) = service
        .rename(doc, &name)
        .await
        .map_err(version_conflict)?;
    txn.commit().await?;

    info!(document_id = id, version = version.version, "Renamed document");

    Ok(Json(FileEnvelope {
        file: FileDetail::new(doc, version.version),
    }))
}

#[utoipa::path(
    post,
    path = "/{id}/versions/{version}/restore",
    tag = "Versions",
    operation_id = "restoreVersion",
    summary = "Restore an earlier version",
    description = "Appends a copy of the chosen version as the newest one, noted as \
        \"Restored from vN\". Existing versions are left untouched.",
    params(
        ("id" = i64, Path, description = "File ID"),
        ("version" = i32, Path, description = "Version number to restore"),
    ),
    responses(
        (status = 201, description = "Version restored", body = VersionEnvelope),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorResponse),
        (status = 404, description = "File or version not found (NOT_FOUND)", body = ErrorResponse),
        (status = 409, description = "Concurrent version upload (CONFLICT)", body = ErrorResponse),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.id()))]
pub async fn restore_version(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppPath((id, number)): AppPath<(i64, i32)>,
) -> Result<impl IntoResponse, AppError> {
    let txn = state.db.begin().await?;
    let service = DocumentService::new(&txn);
    let doc = find_owned_for_update(&service, auth_user.id(), id).await?;
    let source = service
        .find_version(doc.id, number)
        .await?
        .ok_or_else(|| AppError::NotFound("Version not found".into()))?;
    let (_, version) = service
        .restore(doc, &source)
        .await
        .map_err(version_conflict)?;
    txn.commit().await?;

    info!(
        document_id = id,
        restored = number,
        version = version.version,
        "Restored version"
    );

    Ok((
        StatusCode::CREATED,
        Json(VersionEnvelope {
            version: VersionResponse::from(version),
        }),
    ))
}

fn version_conflict(err: DbErr) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AppError::Conflict("Another version was uploaded at the same time".into())
        }
        _ => AppError::from(err),
    }
}

fn not_found() -> AppError {
    AppError::NotFound("File not found".into())
}

async fn find_owned<C: sea_orm::ConnectionTrait>(
    service: &DocumentService<'_, C>,
    owner_id: i32,
    id: i64,
) -> Result<document::Model, AppError> {
    service.find_owned(owner_id, id).await?.ok_or_else(not_found)
}

async fn find_owned_for_update<C: sea_orm::ConnectionTrait>(
    service: &DocumentService<'_, C>,
    owner_id: i32,
    id: i64,
) -> Result<document::Model, AppError> {
    service
        .find_owned_for_update(owner_id, id)
        .await?
        .ok_or_else(not_found)
}

/// A multipart upload after its `file` part has been written to the blob store.
struct ReceivedUpload {
    file: StoredPart,
    note: Option<String>,
}

struct StoredPart {
    hash: ContentHash,
    size: u64,
    spool: SpooledFile,
    filename: Option<String>,
    client_mime: Option<String>,
}

impl ReceivedUpload {
    fn filename(&self) -> Option<&str> {
        self.file.filename.as_deref()
    }

    /// Describe the stored blob, guessing the MIME type from `name` first and
    /// falling back to what the client declared.
    fn content(&self, name: &str) -> StoredContent {
        let mime_type = mime_guess::from_path(name)
            .first()
            .map(|m| m.to_string())
            .or_else(|| self.file.client_mime.clone());
        StoredContent::from_blob(
            &StoredBlob {
                hash: self.file.hash,
                size: self.file.size,
            },
            mime_type,
        )
    }

    /// Hold the content hash lock for the rest of `txn` and make sure the blob
    /// is still on disk, writing it again from the spooled copy if a
    /// concurrent delete released it.
    async fn pin_blob<C: ConnectionTrait>(
        &self,
        txn: &C,
        blob_store: &dyn BlobStore,
    ) -> Result<(), AppError> {
        lock_hash(txn, &self.file.hash.to_hex()).await?;
        if blob_store.exists(&self.file.hash).await? {
            return Ok(());
        }

        warn!(sha256 = %self.file.hash, "Blob released during upload, storing it again");
        let blob = blob_store.put_stream(self.file.spool.open().await?).await?;
        if blob.hash != self.file.hash {
            return Err(AppError::Internal(
                "Spooled upload no longer matches its hash".into(),
            ));
        }
        Ok(())
    }
}

/// Upload bytes spooled to a temp file. The file is removed on drop.
struct SpooledFile {
    path: PathBuf,
}

impl SpooledFile {
    fn new() -> Self {
        Self {
            path: std::env::temp_dir().join(format!("docvault-upload-{}", Uuid::new_v4())),
        }
    }

    async fn open(&self) -> Result<BoxReader, AppError> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to reopen temp file: {e}")))?;
        Ok(Box::new(file))
    }
}

impl Drop for SpooledFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Read the multipart body, streaming the `file` part into the blob store.
/// Unknown parts are ignored. If the body fails after the file was stored,
/// the blob is released again.
async fn receive_upload(
    multipart: Result<Multipart, MultipartRejection>,
    state: &AppState,
) -> Result<ReceivedUpload, AppError> {
    let mut multipart =
        multipart.map_err(|e| AppError::Validation(format!("Expected a multipart form: {e}")))?;
    let max_size = state.config.storage.max_upload_bytes;

    let mut file: Option<StoredPart> = None;
    let mut note: Option<String> = None;

    let read = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, max_size))?
        {
            match field.name() {
                Some("file") if file.is_none() => {
                    file = Some(stream_field_to_store(field, &*state.blob_store, max_size).await?);
                }
                Some("note") => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| multipart_error(e, max_size))?;
                    note = Some(text);
                }
                _ => {}
            }
        }
        Ok::<_, AppError>(())
    }
    .await;

    if let Err(e) = read {
        if let Some(part) = &file {
            release_unreferenced(&state.db, &*state.blob_store, &[part.hash.to_hex()]).await;
        }
        return Err(e);
    }

    let file = file.ok_or_else(|| AppError::Validation("Missing 'file' field".into()))?;

    Ok(ReceivedUpload { file, note })
}

fn multipart_error(err: MultipartError, max_size: u64) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge { limit: max_size }
    } else {
        AppError::Validation(format!("Multipart error: {}", err.body_text()))
    }
}

/// Stream a multipart field to blob storage via a temp file, which is kept
/// until the upload is committed.
async fn stream_field_to_store(
    mut field: Field<'_>,
    blob_store: &dyn BlobStore,
    max_size: u64,
) -> Result<StoredPart, AppError> {
    let filename = field.file_name().map(|s| s.to_string());
    let client_mime = field.content_type().map(|s| s.to_string());
    let spool = SpooledFile::new();

    let mut temp_file = tokio::fs::File::create(&spool.path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create temp file: {e}")))?;

    let mut total_size: u64 = 0;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, max_size))?
    {
        total_size += chunk.len() as u64;
        if total_size > max_size {
            return Err(AppError::PayloadTooLarge { limit: max_size });
        }
        temp_file
            .write_all(&chunk)
            .await
            .map_err(|e| AppError::Internal(format!("Temp file write failed: {e}")))?;
    }

    temp_file
        .flush()
        .await
        .map_err(|e| AppError::Internal(format!("Temp file flush failed: {e}")))?;
    drop(temp_file);

    let blob = blob_store.put_stream(spool.open().await?).await?;

    Ok(StoredPart {
        hash: blob.hash,
        size: blob.size,
        spool,
        filename,
        client_mime,
    })
}

/// Build a streaming download response for a document's current content.
async fn build_blob_response(
    doc: &document::Model,
    headers: &HeaderMap,
    blob_store: &dyn BlobStore,
) -> Result<Response, AppError> {
    let etag_value = format!("\"{}\"", doc.sha256);
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH)
        && let Ok(val) = if_none_match.to_str()
        && val.split(',').any(|tag| {
            let tag = tag.trim();
            tag == etag_value || tag == "*"
        })
    {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let hash = ContentHash::from_hex(&doc.sha256)?;
    let reader = blob_store.get_stream(&hash).await?;
    let body = Body::from_stream(ReaderStream::new(reader));

    let content_type = doc
        .mime_type
        .as_deref()
        .unwrap_or("application/octet-stream");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, doc.size.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_value(&doc.name),
        )
        .header(header::ETAG, &etag_value)
        .header(header::CACHE_CONTROL, "private, no-cache")
        .body(body)
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}
