use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;

use crate::utils::fingerprint;

/// Where a request came from, as used for login-device tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn fingerprint(&self) -> String {
        fingerprint::fingerprint_hash(&self.user_agent, &self.ip)
    }
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Absent when the router is served without connect info (e.g. in-process tests).
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(ClientInfo {
            ip: fingerprint::client_ip(&parts.headers, peer),
            user_agent: fingerprint::user_agent(&parts.headers),
        })
    }
}
