//! Client address and user agent, recorded on QR scans

use crate::AppState;
use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{header::USER_AGENT, request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::SocketAddr;

#[derive(Clone, Debug)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: Option<String>,
}

#[async_trait]
impl FromRequestParts<AppState> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Absent when the router is driven without connect info (tests)
        let peer_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string());
        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(ClientInfo {
            ip: client_ip(&parts.headers, state.settings.trust_proxy, peer_ip.as_deref()),
            user_agent,
        })
    }
}

/// First `X-Forwarded-For` hop when proxies are trusted, else the peer address
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
    peer_ip.unwrap_or("unknown").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_for_is_ignored_unless_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.50, 10.0.0.1".parse().unwrap());

        assert_eq!(client_ip(&headers, true, Some("10.0.0.9")), "203.0.113.50");
        assert_eq!(client_ip(&headers, false, Some("10.0.0.9")), "10.0.0.9");
        assert_eq!(client_ip(&HeaderMap::new(), true, None), "unknown");
    }
}
