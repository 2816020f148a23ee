use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::login_device;

/// Partial update of the caller's preferences. Absent fields stay unchanged.
#[derive(Deserialize, utoipa::ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PreferencesRequest {
    #[schema(example = true)]
    pub notifications_enabled: Option<bool>,
    #[schema(example = false)]
    pub security_email_new_device_enabled: Option<bool>,
}

/// A device the account has signed in from.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DeviceResponse {
    #[schema(example = 3)]
    pub id: i32,
    /// Hex SHA-256 of `user_agent|ip`.
    #[schema(example = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08")]
    pub fingerprint_hash: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    #[schema(example = "203.0.113.7")]
    pub last_ip: Option<String>,
    #[schema(example = "Mozilla/5.0 (X11; Linux x86_64)")]
    pub last_user_agent: Option<String>,
}

impl From<login_device::Model> for DeviceResponse {
    fn from(model: login_device::Model) -> Self {
        Self {
            id: model.id,
            fingerprint_hash: model.fingerprint_hash,
            first_seen_at: model.first_seen_at,
            last_seen_at: model.last_seen_at,
            last_ip: model.last_ip,
            last_user_agent: model.last_user_agent,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct DeviceListResponse {
    pub items: Vec<DeviceResponse>,
    #[schema(example = 1)]
    pub total: u64,
}

impl From<Vec<login_device::Model>> for DeviceListResponse {
    fn from(models: Vec<login_device::Model>) -> Self {
        let total = models.len() as u64;
        Self {
            items: models.into_iter().map(DeviceResponse::from).collect(),
            total,
        }
    }
}
