//! Members of the caller's current organization

use super::{non_empty, parse_role};
use crate::error::{ApiError, ApiResult};
use crate::extractors::{ApiJson, ApiQuery, AuthUser};
use crate::storage::{AccountChanges, MemberSearch};
use crate::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use scoreboard_core::{Member, Role};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

const SEARCH_LIMIT: i64 = 20;

async fn find_member(state: &AppState, org_id: &str, user_id: &str) -> ApiResult<Member> {
    state
        .db
        .get_member(org_id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found in organization"))
}

pub async fn list(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let users = state.db.list_members(org_id).await?;
    Ok(Json(json!({ "users": users })))
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let member = find_member(&state, org_id, &user_id).await?;
    Ok(Json(json!({ "user": member })))
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateMemberRequest {
    first_name: Option<String>,
    last_name: Option<String>,
    department: Option<String>,
    role: Option<String>,
    email: Option<String>,
}

/// Applies name and department changes, plus role and email when the
/// caller is an admin
async fn apply_update(
    state: &AppState,
    auth: &AuthUser,
    org_id: &str,
    user_id: &str,
    req: UpdateMemberRequest,
) -> ApiResult<Member> {
    find_member(state, org_id, user_id).await?;

    let email = non_empty(req.email.as_deref());
    let role = non_empty(req.role.as_deref());
    if (email.is_some() || role.is_some()) && !auth.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required to change role or email"));
    }

    if let Some(email) = email {
        if !email.contains('@') {
            return Err(ApiError::bad_request("Invalid email address"));
        }
        if state.db.email_taken(email, Some(user_id)).await? {
            return Err(ApiError::bad_request("Email already exists"));
        }
    }
    let role = role
        .map(|r| parse_role(r, &[Role::User, Role::OrgAdmin]))
        .transpose()?;

    let changes = AccountChanges {
        email: email.map(str::to_string),
        first_name: non_empty(req.first_name.as_deref()).map(str::to_string),
        last_name: non_empty(req.last_name.as_deref()).map(str::to_string),
        ..Default::default()
    };
    state.db.update_account(user_id, &changes).await?;

    if let Some(department) = req.department.as_deref() {
        state
            .db
            .set_member_department(user_id, org_id, non_empty(Some(department)))
            .await?;
    }
    if let Some(role) = role {
        state.db.set_member_role(user_id, org_id, role).await?;
        info!("Role of {} in {} set to {}", user_id, org_id, role);
    }

    find_member(state, org_id, user_id).await
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
    ApiJson(req): ApiJson<UpdateMemberRequest>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    if user_id != auth.id() && !auth.is_admin() {
        return Err(ApiError::forbidden("You can only update your own profile"));
    }
    let member = apply_update(&state, &auth, org_id, &user_id, req).await?;
    Ok(Json(json!({ "message": "User updated successfully", "user": member })))
}

pub async fn remove(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_admin()?;
    if user_id == auth.id() {
        return Err(ApiError::bad_request("You cannot remove yourself from the organization"));
    }
    if !state.db.deactivate_member(&user_id, org_id).await? {
        return Err(ApiError::not_found("User not found in organization"));
    }
    info!("User {} removed from {} by {}", user_id, org_id, auth.user.username);
    Ok(Json(json!({ "message": "User removed from organization" })))
}

pub async fn groups(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    find_member(&state, org_id, &user_id).await?;
    let groups = state.db.user_groups(org_id, &user_id).await?;
    Ok(Json(json!({ "groups": groups })))
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
}

pub async fn search(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let q = non_empty(query.q.as_deref())
        .ok_or_else(|| ApiError::bad_request("Search query is required"))?;

    let search = MemberSearch {
        query: Some(q.to_string()),
        ..Default::default()
    };
    let (users, _) = state.db.search_members(org_id, &search, 0, SEARCH_LIMIT).await?;
    Ok(Json(json!({ "users": users })))
}

pub async fn profile(State(state): State<AppState>, auth: AuthUser) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let member = find_member(&state, org_id, auth.id()).await?;
    Ok(Json(json!({ "user": member })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileRequest {
    first_name: Option<String>,
    last_name: Option<String>,
    department: Option<String>,
}

pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(req): ApiJson<ProfileRequest>,
) -> ApiResult<Json<Value>> {
    let org_id = auth.require_org()?;
    let req = UpdateMemberRequest {
        first_name: req.first_name,
        last_name: req.last_name,
        department: req.department,
        ..Default::default()
    };
    let member = apply_update(&state, &auth, org_id, auth.id(), req).await?;
    Ok(Json(json!({ "message": "Profile updated successfully", "user": member })))
}

#[cfg(test)]
mod tests {
    use crate::test_support::app;
    use axum::http::StatusCode;
    use scoreboard_core::Role;
    use serde_json::json;

    #[tokio::test]
    async fn members_update_themselves_but_not_others() {
        let app = app().await;
        let (org, _admin, admin_token) = app.org("Acme", "admin").await;
        let (bob, bob_token) = app.member(&org, "bob", Role::User).await;
        let (carol, _) = app.member(&org, "carol", Role::User).await;

        let (status, json) = app
            .put(
                "/api/users/profile",
                Some(&bob_token),
                json!({"first_name": "Robert", "department": "R&D"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["user"]["first_name"], "Robert");
        assert_eq!(json["user"]["department"], "R&D");

        let (status, _) = app
            .put(&format!("/api/users/{}", carol.id), Some(&bob_token), json!({"first_name": "X"}))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .put(&format!("/api/users/{}", bob.id), Some(&bob_token), json!({"role": "ORG_ADMIN"}))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, json) = app
            .put(
                &format!("/api/users/{}", bob.id),
                Some(&admin_token),
                json!({"role": "ORG_ADMIN"}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["user"]["role"], "ORG_ADMIN");

        let (status, _) = app
            .put(
                &format!("/api/users/{}", carol.id),
                Some(&admin_token),
                json!({"email": "bob@example.com"}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_search_and_remove() {
        let app = app().await;
        let (org, admin, admin_token) = app.org("Acme", "admin").await;
        let (bob, bob_token) = app.member(&org, "bob", Role::User).await;
        app.member(&org, "carol", Role::User).await;
        app.user("stranger").await;

        let (_, json) = app.get("/api/users", Some(&bob_token)).await;
        assert_eq!(json["users"].as_array().unwrap().len(), 3);

        let (status, _) = app.get("/api/users/search?q=", Some(&bob_token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = app.get("/api/users/search?q=car", Some(&bob_token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["users"].as_array().unwrap().len(), 1);

        let (_, json) = app.get("/api/users/search?q=stranger", Some(&bob_token)).await;
        assert!(json["users"].as_array().unwrap().is_empty());

        let (status, _) = app.delete(&format!("/api/users/{}", admin.id), Some(&admin_token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app.delete(&format!("/api/users/{}", bob.id), Some(&admin_token)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app.get(&format!("/api/users/{}", bob.id), Some(&admin_token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = app
            .get(&format!("/api/users/{}/groups", bob.id), Some(&admin_token))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
