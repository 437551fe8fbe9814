//! HTTP error type shared by every handler

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use scoreboard_core::CoreError;
use serde_json::json;
use thiserror::Error;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    /// Error carrying a boolean marker field next to the message,
    /// e.g. `{"error": "...", "join_request_submitted": true}`
    #[error("{message}")]
    Flagged {
        status: StatusCode,
        message: String,
        flag: &'static str,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn flagged(status: StatusCode, message: impl Into<String>, flag: &'static str) -> Self {
        Self::Flagged {
            status,
            message: message.into(),
            flag,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Flagged { status, .. } => *status,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Flagged { message, flag, .. } => {
                let mut body = json!({ "error": message });
                body[*flag] = json!(true);
                body
            }
            Self::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                json!({ "error": e.to_string() })
            }
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::TokenExpired => Self::unauthorized("Token has expired"),
            CoreError::InvalidToken(_) => Self::unauthorized("Invalid token"),
            CoreError::PasswordTooShort(min) => Self::BadRequest(format!(
                "Password must be at least {} characters long",
                min
            )),
            other => Self::Internal(other.into()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::PayloadTooLarge("File too large".to_string());
        }
        Self::BadRequest(format!("Invalid multipart body: {}", err.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn bad_request_returns_400() {
        let resp = ApiError::bad_request("Username is required").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "Username is required");
    }

    #[tokio::test]
    async fn flagged_error_carries_marker() {
        let resp = ApiError::flagged(
            StatusCode::FORBIDDEN,
            "Join request submitted",
            "join_request_submitted",
        )
        .into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "Join request submitted");
        assert_eq!(json["join_request_submitted"], true);
    }

    #[tokio::test]
    async fn internal_error_returns_500_with_message() {
        let resp = ApiError::from(anyhow::anyhow!("disk full")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["error"], "disk full");
    }

    #[tokio::test]
    async fn expired_token_maps_to_401() {
        let resp = ApiError::from(CoreError::TokenExpired).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(resp).await["error"], "Token has expired");
    }

    #[tokio::test]
    async fn payload_too_large_returns_413() {
        let resp = ApiError::PayloadTooLarge("File too large".into()).into_response();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
