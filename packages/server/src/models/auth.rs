use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::user;
use crate::error::AppError;

/// Request body for user registration.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    /// Email address; stored trimmed and lowercased.
    #[schema(example = "alice@example.com")]
    pub email: String,
    /// Password (8-128 characters, at least one digit and one symbol).
    #[schema(example = "s3cure_P@ss!")]
    pub password: String,
}

/// Trim and lowercase an email address.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Validate an already-normalized email address.
pub fn validate_email(email: &str) -> Result<(), AppError> {
    let len = email.chars().count();
    if !(3..=255).contains(&len) {
        return Err(AppError::Validation("Email must be 3-255 characters".into()));
    }
    if email.chars().any(char::is_whitespace) {
        return Err(AppError::Validation("Email must not contain spaces".into()));
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AppError::Validation(
            "Email must contain exactly one '@'".into(),
        ));
    };
    if local.is_empty()
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(AppError::Validation("Email address is not valid".into()));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    let len = password.chars().count();
    if !(8..=128).contains(&len) {
        return Err(AppError::Validation(
            "Password must be 8-128 characters".into(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AppError::Validation(
            "Password must contain at least one digit".into(),
        ));
    }
    if !password.chars().any(|c| !c.is_ascii_alphanumeric()) {
        return Err(AppError::Validation(
            "Password must contain at least one special character".into(),
        ));
    }
    Ok(())
}

/// Validate a registration request, returning the normalized email.
pub fn validate_register_request(payload: &RegisterRequest) -> Result<String, AppError> {
    let email = normalize_email(&payload.email);
    validate_email(&email)?;
    validate_password(&payload.password)?;
    Ok(email)
}

/// Request body for user login.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    #[schema(example = "alice@example.com")]
    pub email: String,
    #[schema(example = "s3cure_P@ss!")]
    pub password: String,
}

/// Validate a login request, returning the normalized email.
///
/// Only emptiness is checked so that malformed and unknown accounts fail the
/// same way.
pub fn validate_login_request(payload: &LoginRequest) -> Result<String, AppError> {
    let email = normalize_email(&payload.email);
    if email.is_empty() {
        return Err(AppError::Validation("Email must not be empty".into()));
    }
    if payload.password.is_empty() {
        return Err(AppError::Validation("Password must not be empty".into()));
    }
    Ok(email)
}

/// Public view of an account.
#[derive(Serialize, utoipa::ToSchema)]
pub struct UserResponse {
    #[schema(example = 42)]
    pub id: i32,
    #[schema(example = "alice@example.com")]
    pub email: String,
    pub created_at: DateTime<Utc>,
    #[schema(example = true)]
    pub notifications_enabled: bool,
    /// Send a security email when signing in from a new device.
    #[schema(example = true)]
    pub security_email_new_device_enabled: bool,
}

impl From<user::Model> for UserResponse {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            email: user.email,
            created_at: user.created_at,
            notifications_enabled: user.notifications_enabled,
            security_email_new_device_enabled: user.security_email_new_device_enabled,
        }
    }
}

/// `{"user": {...}}`
#[derive(Serialize, utoipa::ToSchema)]
pub struct UserEnvelope {
    pub user: UserResponse,
}

impl From<user::Model> for UserEnvelope {
    fn from(user: user::Model) -> Self {
        Self { user: user.into() }
    }
}

/// Successful login response.
#[derive(Serialize, utoipa::ToSchema)]
pub struct LoginResponse {
    /// HS256 bearer token.
    #[schema(example = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9...")]
    pub token: String,
    pub user: UserResponse,
    /// `true` if this login came from a device not seen before for this account.
    #[schema(example = false)]
    pub new_device: bool,
}
