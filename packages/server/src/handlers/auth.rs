use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use sea_orm::SqlErr;
use tracing::{info, instrument, warn};

use crate::error::{AppError, ErrorResponse};
use crate::extractors::client::ClientInfo;
use crate::extractors::input::AppJson;
use crate::mail::new_device_mail;
use crate::models::auth::{
    LoginRequest, LoginResponse, RegisterRequest, UserEnvelope, validate_login_request,
    validate_register_request,
};
use crate::services::device::{DeviceSeen, DeviceService};
use crate::services::user::UserService;
use crate::state::AppState;
use crate::utils::{hash, jwt};

#[utoipa::path(
    post,
    path = "/register",
    tag = "Auth",
    operation_id = "register",
    summary = "Register a new account",
    description = "Creates an account. The email is trimmed and lowercased before it is stored. \
        Passwords must be 8-128 characters with at least one digit and one special character.",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = UserEnvelope),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorResponse),
        (status = 409, description = "Email already registered (EMAIL_TAKEN)", body = ErrorResponse),
    ),
)]
#[instrument(skip(state, payload), fields(email = %payload.email.trim()))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = validate_register_request(&payload)?;

    let hash = hash::hash_password(&payload.password)
        .map_err(|e| AppError::Internal(format!("Password hash error: {}", e)))?;

    let user = UserService::new(&state.db)
        .create(&email, hash)
        .await
        .map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                tracing::debug!("Registration race condition: unique constraint caught on insert");
                AppError::EmailTaken
            }
            _ => AppError::from(e),
        })?;

    info!(user_id = user.id, "Registered new account");

    Ok((StatusCode::CREATED, Json(UserEnvelope::from(user))))
}

#[utoipa::path(
    post,
    path = "/login",
    tag = "Auth",
    operation_id = "login",
    summary = "Log in and obtain a bearer token",
    description = "Verifies the credentials and issues a JWT. Unknown emails and wrong passwords \
        produce the same response. The login device (user agent and client IP) is recorded; \
        the first login from a new device sends a security email unless the account has \
        disabled it.",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorResponse),
        (status = 401, description = "Wrong email or password (INVALID_CREDENTIALS)", body = ErrorResponse),
    ),
)]
#[instrument(skip(state, client, payload), fields(email = %payload.email.trim()))]
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let email = validate_login_request(&payload)?;

    let Some(user) = UserService::new(&state.db).find_by_email(&email).await? else {
        hash::verify_dummy(&payload.password);
        return Err(AppError::InvalidCredentials);
    };

    let is_valid = hash::verify_password(&payload.password, &user.password_hash)
        .map_err(|e| AppError::Internal(format!("Password verify error: {}", e)))?;

    if !is_valid {
        return Err(AppError::InvalidCredentials);
    }

    let token = jwt::sign(
        user.id,
        &user.email,
        &state.config.auth.jwt_secret,
        state.config.auth.token_ttl_minutes,
    )
    .map_err(|e| AppError::Internal(format!("JWT sign error: {}", e)))?;

    let seen = DeviceService::new(&state.db)
        .record_login(user.id, &client)
        .await?;
    let new_device = seen == DeviceSeen::New;

    if new_device && user.security_email_new_device_enabled {
        let mail = new_device_mail(&user.email, Utc::now(), &client.ip, &client.user_agent);
        match state.mailer.send(mail).await {
            Ok(()) => info!(user_id = user.id, "Sent new device notice"),
            Err(e) => warn!(user_id = user.id, error = %e, "Failed to send new device notice"),
        }
    }

    Ok(Json(LoginResponse {
        token,
        user: user.into(),
        new_device,
    }))
}
