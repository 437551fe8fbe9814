//! Gateway liveness, index and aggregated service health

use crate::upstream::Upstream;
use crate::GatewayState;
use axum::extract::State;
use axum::Json;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::time::Instant;

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "api-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn index() -> Json<Value> {
    Json(json!({
        "message": "Multi-Tenant Scoreboard API Gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "auth": "/api/auth",
            "users": "/api/users",
            "groups": "/api/groups",
            "scores": "/api/scores",
            "leaderboards": "/api/leaderboards",
            "organizations": "/api/organizations",
        },
    }))
}

#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub status: &'static str,
    /// Seconds until the probe answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
    pub url: String,
}

impl ServiceHealth {
    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

async fn probe(state: &GatewayState, upstream: Upstream) -> ServiceHealth {
    let url = upstream.base_url(&state.settings).to_string();
    let started = Instant::now();
    let result = state
        .client
        .get(format!("{url}/health"))
        .timeout(state.health_timeout())
        .send()
        .await;

    match result {
        Ok(response) => ServiceHealth {
            status: if response.status().is_success() {
                "healthy"
            } else {
                "unhealthy"
            },
            response_time: Some(started.elapsed().as_secs_f64()),
            url,
        },
        Err(e) => {
            tracing::warn!("Health probe for {} failed: {}", upstream.name(), e);
            ServiceHealth {
                status: "unreachable",
                response_time: None,
                url,
            }
        }
    }
}

/// Probes every service concurrently
pub async fn services(State(state): State<GatewayState>) -> Json<Value> {
    let results = join_all(Upstream::ALL.iter().map(|u| probe(&state, *u))).await;
    let overall = if results.iter().all(ServiceHealth::is_healthy) {
        "healthy"
    } else {
        "degraded"
    };

    let mut services = Map::new();
    for (upstream, health) in Upstream::ALL.iter().zip(results) {
        services.insert(upstream.name().to_string(), json!(health));
    }
    Json(json!({
        "overall_status": overall,
        "services": services,
    }))
}
