//! Router fixtures shared by handler tests

use crate::storage::{Database, NewUser};
use crate::{routes, AppState, ServiceRole};
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use scoreboard_core::password::hash_password;
use scoreboard_core::{Organization, Role, Settings, User};
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tower::ServiceExt;

pub const PASSWORD: &str = "password123";

/// Hashing is slow in debug builds, so every fixture user shares one hash
fn password_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(PASSWORD).unwrap())
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
}

pub async fn app() -> TestApp {
    app_for(ServiceRole::All).await
}

pub async fn app_for(role: ServiceRole) -> TestApp {
    let upload_dir = std::env::temp_dir().join(format!("scoreboard-test-{}", uuid::Uuid::new_v4()));
    let upload_dir = upload_dir.to_string_lossy().to_string();
    let settings = Settings::from_pairs(&[
        ("JWT_SECRET_KEY", "test-secret"),
        ("UPLOAD_DIR", upload_dir.as_str()),
        ("MAX_UPLOAD_BYTES", "1024"),
    ])
    .unwrap();
    let db = Arc::new(Database::in_memory().await.unwrap());
    let state = AppState::new(role.name(), db, settings);
    let router = routes::router(role, state.clone());
    TestApp { state, router }
}

impl TestApp {
    pub async fn user(&self, username: &str) -> User {
        self.state
            .db
            .create_user(NewUser {
                username,
                email: &format!("{username}@example.com"),
                password_hash: password_hash(),
                first_name: username,
                last_name: "Tester",
            })
            .await
            .unwrap()
    }

    /// Organization administered by a fresh user; returns the admin's token
    pub async fn org(&self, name: &str, admin: &str) -> (Organization, User, String) {
        let admin = self.user(admin).await;
        let org = self
            .state
            .db
            .create_organization(name, None, &admin.id)
            .await
            .unwrap();
        let token = self.token(&admin, &org.id);
        (org, admin, token)
    }

    /// Fresh user added to the organization with `role`
    pub async fn member(&self, org: &Organization, username: &str, role: Role) -> (User, String) {
        let user = self.user(username).await;
        self.state.db.add_member(&user.id, &org.id, role).await.unwrap();
        let token = self.token(&user, &org.id);
        (user, token)
    }

    /// Platform administrator `root`; returns its token
    pub async fn super_admin(&self) -> String {
        let admin = self
            .state
            .db
            .create_super_admin("root", password_hash())
            .await
            .unwrap();
        self.state
            .tokens
            .issue_super_admin(&admin.id, &admin.username)
            .unwrap()
    }

    pub fn token(&self, user: &User, organization_id: &str) -> String {
        self.state
            .tokens
            .issue_access(&user.id, &user.username, &user.email, None, Some(organization_id))
            .unwrap()
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.raw(request).await
    }

    pub async fn raw(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, token, None).await
    }
}
