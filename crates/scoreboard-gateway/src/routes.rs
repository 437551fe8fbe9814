//! Gateway router: own endpoints first, everything else is relayed

use crate::{health, proxy, GatewayState};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health::index))
        .route("/health", get(health::health))
        .route("/api/health/services", get(health::services))
        .fallback(proxy::relay)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, Bytes};
    use axum::http::{header, HeaderMap, Method, Request, StatusCode, Uri};
    use axum::Json;
    use http_body_util::BodyExt;
    use scoreboard_core::{Settings, TokenCodec};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const SECRET: &str = "gateway-test-secret";

    async fn echo(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> (StatusCode, Json<Value>) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let status = if method == Method::POST {
            StatusCode::CREATED
        } else {
            StatusCode::OK
        };
        let echoed = json!({
            "method": method.as_str(),
            "uri": uri.to_string(),
            "host": header("host"),
            "authorization": header("authorization"),
            "x_custom": header("x-custom"),
            "body": String::from_utf8_lossy(&body),
        });
        (status, Json(echoed))
    }

    /// Local service answering `/health` and echoing everything else
    async fn spawn_upstream() -> String {
        let app = Router::new()
            .route("/health", get(|| async { Json(json!({"status": "healthy"})) }))
            .fallback(echo);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    /// Address nothing listens on
    async fn closed_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    /// Gateway with every service at `url` unless overridden in `extra`
    fn gateway(url: &str, extra: &[(&str, &str)]) -> Router {
        let mut pairs = vec![
            ("JWT_SECRET_KEY", SECRET),
            ("AUTH_SERVICE_URL", url),
            ("USER_SERVICE_URL", url),
            ("GROUP_SERVICE_URL", url),
            ("SCORING_SERVICE_URL", url),
            ("LEADERBOARD_SERVICE_URL", url),
        ];
        pairs.extend_from_slice(extra);
        let settings = Settings::from_pairs(&pairs).unwrap();
        router(GatewayState::new(settings).unwrap())
    }

    fn token() -> String {
        TokenCodec::new(SECRET)
            .issue_access("u1", "alice", "alice@example.com", None, Some("org-1"))
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get_req(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_req(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn serves_own_endpoints() {
        let app = gateway(&closed_url().await, &[]);

        let (status, json) = send(&app, get_req("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["service"], "api-gateway");

        let (status, json) = send(&app, get_req("/", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["services"]["leaderboards"], "/api/leaderboards");

        let (status, _) = send(&app, get_req("/api/nowhere", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn protected_paths_require_a_valid_token() {
        let upstream = spawn_upstream().await;
        let app = gateway(&upstream, &[]);

        let (status, json) = send(&app, get_req("/api/users", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Authentication required");

        let (status, _) = send(&app, get_req("/api/users", Some("garbage"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let forged = TokenCodec::new("other-secret")
            .issue_access("u1", "alice", "alice@example.com", None, None)
            .unwrap();
        let (status, _) = send(&app, get_req("/api/users", Some(&forged))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let token = token();
        let request = get_req("/api/users?page=2&per_page=5", Some(&token));
        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["method"], "GET");
        assert_eq!(json["uri"], "/api/users?page=2&per_page=5");
        assert_eq!(json["authorization"], format!("Bearer {token}"));
    }

    #[tokio::test]
    async fn relays_public_requests_with_body_and_status() {
        let upstream = spawn_upstream().await;
        let app = gateway(&upstream, &[]);

        let mut request = post_req("/api/auth/register", json!({"username": "alice"}));
        request
            .headers_mut()
            .insert(header::HOST, "public.example".parse().unwrap());
        request
            .headers_mut()
            .insert("x-custom", "kept".parse().unwrap());

        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["x_custom"], "kept");
        assert_eq!(json["host"], upstream.trim_start_matches("http://"));
        let body: Value = serde_json::from_str(json["body"].as_str().unwrap()).unwrap();
        assert_eq!(body["username"], "alice");
    }

    #[tokio::test]
    async fn rate_limits_per_bucket() {
        let upstream = spawn_upstream().await;
        let app = gateway(&upstream, &[("RATE_LIMIT_REGISTER", "2")]);

        for _ in 0..2 {
            let (status, _) = send(&app, post_req("/api/auth/register", json!({}))).await;
            assert_eq!(status, StatusCode::CREATED);
        }
        let (status, json) = send(&app, post_req("/api/auth/register", json!({}))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["error"], "Rate limit exceeded");

        // login has its own window
        let (status, _) = send(&app, post_req("/api/auth/login", json!({}))).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn rate_limit_applies_before_token_check() {
        let upstream = spawn_upstream().await;
        let app = gateway(&upstream, &[("RATE_LIMIT_DEFAULT", "1")]);

        let (status, _) = send(&app, get_req("/api/groups", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, get_req("/api/groups", Some(&token()))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn unreachable_service_is_503() {
        let upstream = spawn_upstream().await;
        let down = closed_url().await;
        let app = gateway(&upstream, &[("SCORING_SERVICE_URL", down.as_str())]);

        let (status, json) = send(&app, get_req("/api/scores", Some(&token()))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("Service unavailable: "));

        let (status, _) = send(&app, get_req("/api/groups", Some(&token()))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn aggregates_service_health() {
        let upstream = spawn_upstream().await;

        let app = gateway(&upstream, &[]);
        let (status, json) = send(&app, get_req("/api/health/services", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["overall_status"], "healthy");
        assert_eq!(json["services"]["auth"]["status"], "healthy");
        assert!(json["services"]["auth"]["response_time"].is_number());

        let down = closed_url().await;
        let app = gateway(&upstream, &[("LEADERBOARD_SERVICE_URL", down.as_str())]);
        let (_, json) = send(&app, get_req("/api/health/services", None)).await;
        assert_eq!(json["overall_status"], "degraded");
        assert_eq!(json["services"]["leaderboard"]["status"], "unreachable");
        assert!(json["services"]["leaderboard"].get("response_time").is_none());
        assert_eq!(json["services"]["scoring"]["status"], "healthy");
    }
}
