//! Client address resolution for rate limiting

use async_trait::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use std::convert::Infallible;
use std::net::SocketAddr;

/// TCP peer IP, absent when the router runs without connect info (tests)
pub struct PeerIp(pub Option<String>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for PeerIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(Self(ip))
    }
}

/// First `X-Forwarded-For` entry when `trust_proxy` is set, else the peer
/// address, else `"unknown"`.
///
/// The header is client-controlled; only trust it behind a proxy that
/// overwrites it.
pub fn client_ip(headers: &HeaderMap, trust_proxy: bool, peer_ip: Option<&str>) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    peer_ip.map_or_else(|| "unknown".to_string(), str::to_string)
}
