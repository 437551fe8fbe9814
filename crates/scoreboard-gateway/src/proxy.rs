//! Relays a request to its backend service and the response back

use crate::client_ip::{client_ip, PeerIp};
use crate::error::GatewayError;
use crate::upstream::{bucket_limit, classify, Upstream};
use crate::GatewayState;
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use scoreboard_core::bearer_token;
use tracing::debug;

/// Connection-level headers that must not cross the proxy
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.contains(&name)
}

/// Fallback handler: every path not served by the gateway itself
pub async fn relay(
    State(state): State<GatewayState>,
    PeerIp(peer): PeerIp,
    req: Request,
) -> Result<Response, GatewayError> {
    let rule = classify(req.uri().path()).ok_or(GatewayError::NotFound)?;

    if let Some(bucket) = rule.bucket {
        let client = client_ip(req.headers(), state.settings.trust_proxy, peer.as_deref());
        let max = bucket_limit(bucket, &state.settings);
        if !state.limiter.check(bucket, &client, max) {
            debug!("Rate limited {} on {}", client, req.uri().path());
            return Err(GatewayError::RateLimited);
        }
    }

    if !rule.public && !has_valid_token(&state, req.headers()) {
        return Err(GatewayError::Unauthenticated);
    }

    forward(&state, rule.upstream, req).await
}

fn has_valid_token(state: &GatewayState, headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .is_some_and(|token| state.tokens.decode(token).is_ok())
}

pub async fn forward(
    state: &GatewayState,
    upstream: Upstream,
    req: Request,
) -> Result<Response, GatewayError> {
    let (parts, body) = req.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", upstream.base_url(&state.settings), path_and_query);

    let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
        .map_err(|_| GatewayError::MethodNotAllowed)?;
    let body = to_bytes(body, state.body_limit())
        .await
        .map_err(|_| GatewayError::PayloadTooLarge)?;

    let mut request = state.client.request(method, &url);
    for (name, value) in &parts.headers {
        if is_hop_by_hop(name.as_str())
            || *name == header::HOST
            || *name == header::CONTENT_LENGTH
        {
            continue;
        }
        request = request.header(name.as_str(), value.as_bytes());
    }

    debug!("{} {} -> {}", parts.method, path_and_query, upstream.name());
    let upstream_response = request
        .body(body)
        .send()
        .await
        .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

    let status = StatusCode::from_u16(upstream_response.status().as_u16())
        .unwrap_or(StatusCode::BAD_GATEWAY);
    let mut headers = HeaderMap::new();
    for (name, value) in upstream_response.headers() {
        let name = name.as_str();
        // CORS is answered by the gateway's own layer
        if is_hop_by_hop(name) || name == "content-length" || name.starts_with("access-control-") {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }
    let bytes = upstream_response
        .bytes()
        .await
        .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
