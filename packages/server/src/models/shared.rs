use serde::Serialize;

use crate::error::AppError;

/// Escape LIKE wildcard characters in a search string.
pub fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Empty JSON object returned by delete endpoints.
#[derive(Serialize, utoipa::ToSchema)]
pub struct Empty {}

/// Parse a lowercase or uppercase 64-char hex SHA-256 and return it lowercased.
pub fn parse_sha256(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.len() != 64 || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::Validation(
            "SHA-256 must be 64 hexadecimal characters".into(),
        ));
    }
    Ok(trimmed.to_ascii_lowercase())
}
