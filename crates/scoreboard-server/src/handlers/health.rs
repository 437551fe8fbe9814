//! Liveness endpoint mounted by every service role

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "service": state.service,
                "version": env!("CARGO_PKG_VERSION"),
                "database": "connected",
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {:#}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": state.service,
                    "error": e.to_string(),
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::app_for;
    use crate::ServiceRole;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn each_role_reports_its_name_and_routes() {
        let app = app_for(ServiceRole::Scoring).await;
        let (status, json) = app.get("/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["service"], "scoring-service");
        assert_eq!(json["database"], "connected");

        let (_org, _admin, token) = app.org("Acme", "admin").await;
        let (status, _) = app.get("/api/scores/categories", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.get("/api/users", Some(&token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
