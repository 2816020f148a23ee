use axum::{Json, extract::State};
use sea_orm::TransactionTrait;
use tracing::{info, instrument};

use crate::error::{AppError, ErrorResponse};
use crate::extractors::auth::AuthUser;
use crate::extractors::input::AppJson;
use crate::models::auth::UserEnvelope;
use crate::models::shared::Empty;
use crate::models::user::{DeviceListResponse, PreferencesRequest};
use crate::services::blob::release_unreferenced;
use crate::services::device::DeviceService;
use crate::services::user::{PreferenceChanges, UserService};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/me",
    tag = "Users",
    operation_id = "getMe",
    summary = "Get the current user",
    responses(
        (status = 200, description = "Current user", body = UserEnvelope),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorResponse),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(auth_user), fields(user_id = auth_user.id()))]
pub async fn me(auth_user: AuthUser) -> Json<UserEnvelope> {
    Json(UserEnvelope::from(auth_user.user))
}

#[utoipa::path(
    patch,
    path = "/me/preferences",
    tag = "Users",
    operation_id = "updatePreferences",
    summary = "Update notification preferences",
    description = "Fields that are absent stay unchanged.",
    request_body = PreferencesRequest,
    responses(
        (status = 200, description = "Updated user", body = UserEnvelope),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorResponse),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.id()))]
pub async fn update_preferences(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<PreferencesRequest>,
) -> Result<Json<UserEnvelope>, AppError> {
    let changes = PreferenceChanges {
        notifications_enabled: payload.notifications_enabled,
        security_email_new_device_enabled: payload.security_email_new_device_enabled,
    };

    let user = UserService::new(&state.db)
        .update_preferences(auth_user.user, changes)
        .await?;

    Ok(Json(UserEnvelope::from(user)))
}

#[utoipa::path(
    get,
    path = "/me/devices",
    tag = "Users",
    operation_id = "listDevices",
    summary = "List devices this account has signed in from",
    description = "Most recently seen first.",
    responses(
        (status = 200, description = "Known devices", body = DeviceListResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorResponse),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.id()))]
pub async fn list_devices(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<DeviceListResponse>, AppError> {
    let devices = DeviceService::new(&state.db).list(auth_user.id()).await?;
    Ok(Json(DeviceListResponse::from(devices)))
}

#[utoipa::path(
    delete,
    path = "/me",
    tag = "Users",
    operation_id = "deleteAccount",
    summary = "Delete the current account",
    description = "Deletes the account together with all of its files, versions, and login \
        devices. Issued tokens stop working immediately.",
    responses(
        (status = 200, description = "Account deleted", body = Empty),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorResponse),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.id()))]
pub async fn delete_account(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Empty>, AppError> {
    let user_id = auth_user.id();

    let txn = state.db.begin().await?;
    let hashes = UserService::new(&txn).delete_cascade(user_id).await?;
    txn.commit().await?;

    info!(user_id, "Deleted account");

    release_unreferenced(&state.db, &*state.blob_store, &hashes).await;

    Ok(Json(Empty {}))
}
