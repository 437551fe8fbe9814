//! Ranked user and group leaderboards

use super::non_empty;
use crate::error::{ApiError, ApiResult};
use crate::extractors::{ApiQuery, AuthUser};
use crate::services::leaderboard::{DEFAULT_LIMIT, MAX_LIMIT};
use crate::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use scoreboard_core::{EntityKind, ScoreTarget, DEFAULT_CATEGORY};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Default, Deserialize)]
pub struct BoardQuery {
    category: Option<String>,
    limit: Option<usize>,
}

impl BoardQuery {
    fn category(&self) -> &str {
        non_empty(self.category.as_deref()).unwrap_or(DEFAULT_CATEGORY)
    }
}

async fn board(
    state: AppState,
    auth: AuthUser,
    kind: EntityKind,
    query: BoardQuery,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(ApiError::bad_request(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }

    let (board, cached) = state
        .leaderboards
        .get(org_id, kind, query.category(), limit)
        .await?;
    Ok(Json(json!({
        "leaderboard": board.entries,
        "entity_type": board.entity_type,
        "category": board.category,
        "organization_id": board.organization_id,
        "generated_at": board.generated_at,
        "cached": cached,
    })))
}

pub async fn users(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<BoardQuery>,
) -> ApiResult<Json<Value>> {
    board(state, auth, EntityKind::User, query).await
}

pub async fn groups(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<BoardQuery>,
) -> ApiResult<Json<Value>> {
    board(state, auth, EntityKind::Group, query).await
}

async fn rank(
    state: AppState,
    auth: AuthUser,
    target: ScoreTarget,
    query: BoardQuery,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let info = state
        .db
        .rank(org_id, &target, query.category())
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("No scores for this {} in category", target.kind()))
        })?;
    Ok(Json(json!({ "rank": info })))
}

pub async fn user_rank(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
    ApiQuery(query): ApiQuery<BoardQuery>,
) -> ApiResult<Json<Value>> {
    rank(state, auth, ScoreTarget::User(user_id), query).await
}

pub async fn group_rank(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(group_id): Path<String>,
    ApiQuery(query): ApiQuery<BoardQuery>,
) -> ApiResult<Json<Value>> {
    rank(state, auth, ScoreTarget::Group(group_id), query).await
}

pub async fn categories(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let categories = state.db.leaderboard_categories(org_id).await?;
    Ok(Json(json!({ "categories": categories })))
}

pub async fn refresh(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    let org_id = auth.require_admin()?;
    let cleared = state.leaderboards.invalidate(org_id);
    info!("Leaderboard cache refreshed for {} ({} entries)", org_id, cleared);
    Ok(Json(json!({
        "message": "Leaderboard cache cleared",
        "cleared": cleared,
    })))
}

#[cfg(test)]
mod tests {
    use crate::test_support::app;
    use axum::http::StatusCode;
    use scoreboard_core::Role;
    use serde_json::json;

    #[tokio::test]
    async fn ranks_users_and_serves_from_cache() {
        let app = app().await;
        let (org, _admin, admin_token) = app.org("Acme", "admin").await;
        let (bob, bob_token) = app.member(&org, "bob", Role::User).await;
        let (carol, _) = app.member(&org, "carol", Role::User).await;
        let (dave, _) = app.member(&org, "dave", Role::User).await;

        for (user, value) in [(&bob, 30), (&carol, 50), (&dave, 30)] {
            let (status, _) = app
                .post(
                    "/api/scores",
                    Some(&admin_token),
                    json!({"user_id": user.id, "score_value": value}),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, json) = app.get("/api/leaderboards/users?limit=2", Some(&bob_token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["cached"], false);
        let rows = json["leaderboard"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["username"], "carol");
        assert_eq!(rows[0]["rank"], 1);
        assert_eq!(rows[1]["rank"], 2);

        let (_, json) = app.get("/api/leaderboards/users", Some(&bob_token)).await;
        assert_eq!(json["cached"], true);
        assert_eq!(json["leaderboard"].as_array().unwrap().len(), 3);

        // bob and dave tie behind carol
        let (status, json) = app
            .get(&format!("/api/leaderboards/user/{}/rank", bob.id), Some(&bob_token))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["rank"]["rank"], 2);
        assert_eq!(json["rank"]["total_participants"], 3);

        let (status, _) = app
            .get(
                &format!("/api/leaderboards/user/{}/rank?category=academic", bob.id),
                Some(&bob_token),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // a new score invalidates the cached list
        app.post("/api/scores", Some(&admin_token), json!({"user_id": bob.id, "score_value": 100}))
            .await;
        let (_, json) = app.get("/api/leaderboards/users", Some(&bob_token)).await;
        assert_eq!(json["cached"], false);
        assert_eq!(json["leaderboard"][0]["username"], "bob");

        let (_, json) = app.get("/api/leaderboards/categories", Some(&bob_token)).await;
        assert_eq!(json["categories"], json!(["general"]));
    }

    #[tokio::test]
    async fn groups_board_and_refresh() {
        let app = app().await;
        let (org, admin, admin_token) = app.org("Acme", "admin").await;
        let (_bob, bob_token) = app.member(&org, "bob", Role::User).await;
        let group = app
            .state
            .db
            .create_group(&org.id, "Blue", Some("blue team"), &admin.id)
            .await
            .unwrap();

        app.post(
            "/api/scores",
            Some(&admin_token),
            json!({"group_id": group.id, "score_value": 7, "category": "teamwork"}),
        )
        .await;

        let (status, json) = app
            .get("/api/leaderboards/groups?category=teamwork", Some(&bob_token))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["leaderboard"][0]["group_name"], "Blue");
        assert_eq!(json["leaderboard"][0]["total_score"], 7);

        let (status, _) = app.get("/api/leaderboards/groups?limit=0", Some(&bob_token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app.post("/api/leaderboards/refresh", Some(&bob_token), json!({})).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, json) = app
            .post("/api/leaderboards/refresh", Some(&admin_token), json!({}))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["cleared"], 1);
    }
}
