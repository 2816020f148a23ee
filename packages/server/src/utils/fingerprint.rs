use std::net::SocketAddr;

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

pub const MAX_USER_AGENT_CHARS: usize = 512;
pub const UNKNOWN_IP: &str = "unknown";

/// Resolve the client IP: first `X-Forwarded-For` hop, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => UNKNOWN_IP.to_string(),
    }
}

/// `User-Agent` header, trimmed and capped at [`MAX_USER_AGENT_CHARS`].
pub fn user_agent(headers: &HeaderMap) -> String {
    let raw = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    normalize_user_agent(raw)
}

pub fn normalize_user_agent(raw: &str) -> String {
    raw.trim().chars().take(MAX_USER_AGENT_CHARS).collect()
}

/// Hex SHA-256 of `"{user_agent}|{ip}"`.
pub fn fingerprint_hash(user_agent: &str, ip: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_agent.as_bytes());
    hasher.update(b"|");
    hasher.update(ip.as_bytes());
    hex::encode(hasher.finalize())
}
